use spool::{
  ComponentHandle, ComponentPostProcessor, Container, ContainerError, DefinitionBuilder,
  ValueSource,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// --- Test Fixtures ---

struct Service {
  label: Mutex<String>,
  ready: AtomicBool,
}

fn service() -> Service {
  Service {
    label: Mutex::new(String::new()),
    ready: AtomicBool::new(false),
  }
}

/// Records build/destroy events into a shared log.
type EventLog = Arc<Mutex<Vec<String>>>;

fn logged_definition(name: &'static str, log: EventLog) -> spool::ComponentDefinition {
  let build_log = log.clone();
  DefinitionBuilder::new()
    .constructor(move |_| {
      build_log.lock().unwrap().push(format!("build {name}"));
      Ok(service())
    })
    .destroy("log-destroy", move |_: &Service| {
      log.lock().unwrap().push(format!("destroy {name}"));
      Ok(())
    })
    .build()
}

// --- Lifecycle Tests ---

#[test]
fn test_init_hook_runs_after_property_population() {
  // Arrange
  let container = Container::new();
  container
    .register(
      "svc",
      DefinitionBuilder::new()
        .constructor(|_| Ok(service()))
        .property("label", ValueSource::value("configured".to_string()), |svc: &Service, label: Arc<String>| {
          *svc.label.lock().unwrap() = (*label).clone();
        })
        .init("check-label", |svc: &Service| {
          // Properties are in place before the hook runs.
          if svc.label.lock().unwrap().is_empty() {
            return Err(ContainerError::Initialization {
              name: "svc".to_string(),
              reason: "label missing".to_string(),
            });
          }
          svc.ready.store(true, Ordering::SeqCst);
          Ok(())
        })
        .build(),
    )
    .unwrap();

  // Act
  let svc = container.get_as::<Service>("svc").unwrap();

  // Assert
  assert!(svc.ready.load(Ordering::SeqCst));
  assert_eq!(*svc.label.lock().unwrap(), "configured");
}

#[test]
fn test_init_hook_failure_aborts_the_build() {
  // Arrange
  let container = Container::new();
  container
    .register(
      "doomed",
      DefinitionBuilder::new()
        .constructor(|_| Ok(service()))
        .init("always-fails", |_: &Service| {
          Err(ContainerError::Initialization {
            name: "doomed".to_string(),
            reason: "refused".to_string(),
          })
        })
        .build(),
    )
    .unwrap();

  // Act
  let error = container.get("doomed").err().unwrap();

  // Assert: the failure surfaces and nothing was cached.
  assert!(matches!(error, ContainerError::Initialization { .. }));
  assert!(container.get("doomed").is_err(), "a rebuilt instance would fail the same way");
}

#[test]
fn test_destroy_hooks_run_in_reverse_creation_order() {
  // Arrange: c -> b -> a through constructor references, so creation
  // completes a, b, c.
  let log: EventLog = Arc::new(Mutex::new(Vec::new()));
  let container = Container::new();
  for (name, dependency) in [("a", None), ("b", Some("a")), ("c", Some("b"))] {
    let build_log = log.clone();
    let destroy_log = log.clone();
    let mut builder = DefinitionBuilder::new()
      .constructor(move |_| {
        build_log.lock().unwrap().push(format!("build {name}"));
        Ok(service())
      })
      .destroy("log-destroy", move |_: &Service| {
        destroy_log.lock().unwrap().push(format!("destroy {name}"));
        Ok(())
      });
    if let Some(dependency) = dependency {
      builder = builder.depends_on(dependency);
    }
    container.register(name, builder.build()).unwrap();
  }
  container.get("c").unwrap();

  // Act
  container.shutdown();

  // Assert
  let events = log.lock().unwrap().clone();
  assert_eq!(
    events,
    vec![
      "build a".to_string(),
      "build b".to_string(),
      "build c".to_string(),
      "destroy c".to_string(),
      "destroy b".to_string(),
      "destroy a".to_string(),
    ]
  );
}

#[test]
fn test_failing_destroy_hook_does_not_stop_the_rest() {
  // Arrange
  let log: EventLog = Arc::new(Mutex::new(Vec::new()));
  let container = Container::new();
  container.register("a", logged_definition("a", log.clone())).unwrap();
  container
    .register(
      "b",
      DefinitionBuilder::new()
        .constructor(|_| Ok(service()))
        .destroy("explodes", |_: &Service| {
          Err(ContainerError::Initialization {
            name: "b".to_string(),
            reason: "destroy failed".to_string(),
          })
        })
        .build(),
    )
    .unwrap();
  container.register("c", logged_definition("c", log.clone())).unwrap();
  container.preinstantiate_singletons().unwrap();

  // Act: b's failing hook is logged and swallowed.
  container.shutdown();

  // Assert: a and c were still destroyed, in reverse order.
  let events = log.lock().unwrap().clone();
  let destroys: Vec<&String> = events.iter().filter(|e| e.starts_with("destroy")).collect();
  assert_eq!(destroys, vec!["destroy c", "destroy a"]);
}

#[test]
fn test_shutdown_is_terminal_and_idempotent() {
  // Arrange
  let container = Container::new();
  container
    .register(
      "svc",
      DefinitionBuilder::new().constructor(|_| Ok(service())).build(),
    )
    .unwrap();
  container.get("svc").unwrap();

  // Act
  container.shutdown();
  container.shutdown();

  // Assert: every further lookup and registration is refused.
  assert!(container.is_closed());
  assert_eq!(container.get("svc").err().unwrap(), ContainerError::ContainerClosed);
  assert_eq!(
    container
      .register("late", DefinitionBuilder::new().constructor(|_| Ok(service())).build())
      .err()
      .unwrap(),
    ContainerError::ContainerClosed
  );
  assert_eq!(
    container.get_by_type::<Service>().err().unwrap(),
    ContainerError::ContainerClosed
  );
}

#[test]
fn test_dropping_the_container_destroys_singletons() {
  // Arrange
  let destroyed = Arc::new(AtomicBool::new(false));
  let flag = destroyed.clone();
  let container = Container::new();
  container
    .register(
      "svc",
      DefinitionBuilder::new()
        .constructor(|_| Ok(service()))
        .destroy("flag", move |_: &Service| {
          flag.store(true, Ordering::SeqCst);
          Ok(())
        })
        .build(),
    )
    .unwrap();
  container.get("svc").unwrap();

  // Act
  drop(container);

  // Assert
  assert!(destroyed.load(Ordering::SeqCst));
}

#[test]
fn test_eager_initialization_follows_registration_order_and_skips_lazy() {
  // Arrange
  let log: EventLog = Arc::new(Mutex::new(Vec::new()));
  let container = Container::new();
  container.register("first", logged_definition("first", log.clone())).unwrap();
  container.register("second", logged_definition("second", log.clone())).unwrap();
  let lazy_log = log.clone();
  container
    .register(
      "sleepy",
      DefinitionBuilder::new()
        .constructor(move |_| {
          lazy_log.lock().unwrap().push("build sleepy".to_string());
          Ok(service())
        })
        .lazy_init(true)
        .build(),
    )
    .unwrap();
  let proto_log = log.clone();
  container
    .register(
      "fresh",
      DefinitionBuilder::new()
        .constructor(move |_| {
          proto_log.lock().unwrap().push("build fresh".to_string());
          Ok(service())
        })
        .prototype()
        .build(),
    )
    .unwrap();

  // Act
  container.preinstantiate_singletons().unwrap();

  // Assert: non-lazy singletons only, in declaration order.
  let events = log.lock().unwrap().clone();
  assert_eq!(events, vec!["build first".to_string(), "build second".to_string()]);
}

#[test]
fn test_declared_dependency_is_created_first() {
  // Arrange
  let log: EventLog = Arc::new(Mutex::new(Vec::new()));
  let container = Container::new();
  container.register("store", logged_definition("store", log.clone())).unwrap();
  let build_log = log.clone();
  container
    .register(
      "server",
      DefinitionBuilder::new()
        .constructor(move |_| {
          build_log.lock().unwrap().push("build server".to_string());
          Ok(service())
        })
        .depends_on("store")
        .build(),
    )
    .unwrap();

  // Act
  container.get("server").unwrap();

  // Assert
  let events = log.lock().unwrap().clone();
  assert_eq!(events, vec!["build store".to_string(), "build server".to_string()]);
}

#[test]
fn test_unsatisfiable_declared_dependency_fails_at_first_use() {
  // Arrange: registration accepts the dangling name.
  let container = Container::new();
  container
    .register(
      "server",
      DefinitionBuilder::new()
        .constructor(|_| Ok(service()))
        .depends_on("missing-store")
        .build(),
    )
    .unwrap();

  // Act
  let error = container.get("server").err().unwrap();

  // Assert
  assert!(matches!(error, ContainerError::NoMatchingComponent { .. }));
}

#[test]
fn test_post_processor_may_wrap_the_instance() {
  // Arrange: a processor that swaps in an audited wrapper after init.
  struct Audited {
    inner: Arc<Service>,
  }
  struct AuditProcessor {
    wrapped: AtomicUsize,
  }
  impl ComponentPostProcessor for AuditProcessor {
    fn after_init(&self, instance: ComponentHandle, name: &str) -> spool::Result<ComponentHandle> {
      if name != "svc" {
        return Ok(instance);
      }
      self.wrapped.fetch_add(1, Ordering::SeqCst);
      let inner = instance
        .downcast::<Service>()
        .ok_or_else(|| ContainerError::TypeMismatch {
          name: name.to_string(),
          actual: instance.type_key().name().to_string(),
          requested: "Service".to_string(),
        })?;
      Ok(ComponentHandle::of(Audited { inner }))
    }
  }

  let container = Container::new();
  let processor = Arc::new(AuditProcessor {
    wrapped: AtomicUsize::new(0),
  });
  container.add_post_processor(processor.clone());
  container
    .register(
      "svc",
      DefinitionBuilder::new().constructor(|_| Ok(service())).build(),
    )
    .unwrap();

  // Act
  let audited = container.get_as::<Audited>("svc").unwrap();

  // Assert: the wrapper is what the cache holds from now on.
  assert_eq!(processor.wrapped.load(Ordering::SeqCst), 1);
  let again = container.get_as::<Audited>("svc").unwrap();
  assert!(Arc::ptr_eq(&audited, &again));
  let _unused = audited.inner.label.lock().unwrap();
}

#[test]
fn test_post_processor_failure_aborts_the_build() {
  // Arrange
  struct Rejecting;
  impl ComponentPostProcessor for Rejecting {
    fn before_init(&self, _instance: ComponentHandle, name: &str) -> spool::Result<ComponentHandle> {
      Err(ContainerError::Initialization {
        name: name.to_string(),
        reason: "vetoed".to_string(),
      })
    }
  }

  let container = Container::new();
  container.add_post_processor(Arc::new(Rejecting));
  container
    .register(
      "svc",
      DefinitionBuilder::new().constructor(|_| Ok(service())).build(),
    )
    .unwrap();

  // Act & Assert
  let error = container.get("svc").err().unwrap();
  match error {
    ContainerError::Initialization { name, reason } => {
      assert_eq!(name, "svc");
      assert_eq!(reason, "vetoed");
    }
    other => panic!("expected an initialization failure, got {other:?}"),
  }
}
