use spool::{Container, ContainerError, DefinitionBuilder};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

// --- Test Fixtures ---

struct SlowService {
  id: u32,
}

// --- Concurrency Tests ---

#[test]
fn test_concurrent_first_lookup_builds_exactly_once() {
  // Arrange: a constructor slow enough that every thread overlaps it.
  let container = Container::new();
  let builds = Arc::new(AtomicUsize::new(0));
  let counter = builds.clone();
  container
    .register(
      "slow",
      DefinitionBuilder::new()
        .constructor(move |_| {
          counter.fetch_add(1, Ordering::SeqCst);
          thread::sleep(Duration::from_millis(50));
          Ok(SlowService { id: 1 })
        })
        .build(),
    )
    .unwrap();

  // Act: twenty threads race the first lookup.
  let barrier = Barrier::new(20);
  let handles: Vec<Arc<SlowService>> = thread::scope(|s| {
    let mut joins = Vec::new();
    for _ in 0..20 {
      joins.push(s.spawn(|| {
        barrier.wait();
        container.get_as::<SlowService>("slow").unwrap()
      }));
    }
    joins.into_iter().map(|j| j.join().unwrap()).collect()
  });

  // Assert: one build, one shared instance.
  assert_eq!(builds.load(Ordering::SeqCst), 1, "the factory must run exactly once");
  for handle in &handles[1..] {
    assert!(Arc::ptr_eq(&handles[0], handle));
  }
}

#[test]
fn test_waiters_receive_the_leader_failure_and_retry_succeeds() {
  // Arrange: the build fails while the toggle is down.
  let container = Container::new();
  let healthy = Arc::new(AtomicBool::new(false));
  let attempts = Arc::new(AtomicUsize::new(0));
  let toggle = healthy.clone();
  let counter = attempts.clone();
  container
    .register(
      "flaky",
      DefinitionBuilder::new()
        .constructor(move |_| {
          counter.fetch_add(1, Ordering::SeqCst);
          // Hold the build open long enough for every waiter to park.
          thread::sleep(Duration::from_millis(200));
          if toggle.load(Ordering::SeqCst) {
            Ok(SlowService { id: 7 })
          } else {
            Err(ContainerError::Instantiation {
              name: "flaky".to_string(),
              reason: "backend unavailable".to_string(),
            })
          }
        })
        .build(),
    )
    .unwrap();

  // Act: every racing thread sees the same failure.
  let barrier = Barrier::new(8);
  let errors: Vec<ContainerError> = thread::scope(|s| {
    let mut joins = Vec::new();
    for _ in 0..8 {
      joins.push(s.spawn(|| {
        barrier.wait();
        container.get_as::<SlowService>("flaky").err().unwrap()
      }));
    }
    joins.into_iter().map(|j| j.join().unwrap()).collect()
  });

  // Assert: the single in-flight failure reached all eight callers.
  assert_eq!(attempts.load(Ordering::SeqCst), 1);
  for error in errors {
    assert!(matches!(error, ContainerError::Instantiation { .. }));
  }

  // A later request retries with a fresh build; the name is not poisoned.
  healthy.store(true, Ordering::SeqCst);
  let service = container.get_as::<SlowService>("flaky").unwrap();
  assert_eq!(service.id, 7);
  assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unrelated_singletons_build_in_parallel() {
  // Arrange: two independent components that each sleep while building.
  let container = Container::new();
  for name in ["first", "second"] {
    container
      .register(
        name,
        DefinitionBuilder::new()
          .constructor(move |_| {
            thread::sleep(Duration::from_millis(250));
            Ok(SlowService { id: 0 })
          })
          .build(),
      )
      .unwrap();
  }

  // Act
  let started = Instant::now();
  thread::scope(|s| {
    let a = s.spawn(|| container.get_as::<SlowService>("first").unwrap());
    let b = s.spawn(|| container.get_as::<SlowService>("second").unwrap());
    a.join().unwrap();
    b.join().unwrap();
  });

  // Assert: no global lock serialized the two builds.
  let elapsed = started.elapsed();
  assert!(
    elapsed < Duration::from_millis(450),
    "independent builds should overlap, took {elapsed:?}"
  );
}

#[test]
fn test_prototype_requests_never_block_on_a_singleton_build() {
  // Arrange
  let container = Container::new();
  container
    .register(
      "glacial",
      DefinitionBuilder::new()
        .constructor(|_| {
          thread::sleep(Duration::from_millis(500));
          Ok(SlowService { id: 1 })
        })
        .build(),
    )
    .unwrap();
  container
    .register(
      "quick",
      DefinitionBuilder::new()
        .constructor(|_| Ok(SlowService { id: 2 }))
        .prototype()
        .build(),
    )
    .unwrap();

  // Act
  thread::scope(|s| {
    let slow = s.spawn(|| container.get_as::<SlowService>("glacial").unwrap());
    // Give the singleton build a moment to become the in-flight leader.
    thread::sleep(Duration::from_millis(50));
    let started = Instant::now();
    let quick = container.get_as::<SlowService>("quick").unwrap();
    let elapsed = started.elapsed();

    // Assert
    assert_eq!(quick.id, 2);
    assert!(
      elapsed < Duration::from_millis(250),
      "a prototype request must not wait on the in-flight singleton, took {elapsed:?}"
    );
    slow.join().unwrap();
  });
}

#[test]
fn test_steady_state_lookups_are_lock_free_of_the_build_path() {
  // Arrange: a cached singleton plus a concurrent stream of readers.
  let container = Container::new();
  container
    .register(
      "shared",
      DefinitionBuilder::new()
        .constructor(|_| Ok(SlowService { id: 3 }))
        .build(),
    )
    .unwrap();
  let warm = container.get_as::<SlowService>("shared").unwrap();

  // Act: readers on many threads all observe the same instance.
  thread::scope(|s| {
    for _ in 0..8 {
      s.spawn(|| {
        for _ in 0..1_000 {
          let handle = container.get_as::<SlowService>("shared").unwrap();
          assert_eq!(handle.id, 3);
        }
      });
    }
  });

  // Assert
  let after = container.get_as::<SlowService>("shared").unwrap();
  assert!(Arc::ptr_eq(&warm, &after));
}
