use spool::{Container, ContainerError, DefinitionBuilder, ValueSource};
use std::sync::Mutex;

// --- Test Fixtures ---

struct Widget {
  label: String,
  size: u32,
  tag: Mutex<String>,
}

fn widget_template() -> spool::ComponentDefinition {
  DefinitionBuilder::new()
    .constructor(|args| {
      Ok(Widget {
        label: (*args.get::<String>(0)?).clone(),
        size: *args.get::<u32>(1)?,
        tag: Mutex::new(String::new()),
      })
    })
    .arg(ValueSource::value("template".to_string()))
    .arg(ValueSource::value(10u32))
    .abstract_definition()
    .build()
}

// --- Inheritance Tests ---

#[test]
fn test_abstract_definitions_cannot_be_instantiated() {
  // Arrange
  let container = Container::new();
  container.register("widget-base", widget_template()).unwrap();

  // Act
  let error = container.get("widget-base").err().unwrap();

  // Assert
  assert!(matches!(error, ContainerError::InvalidRegistration { .. }));
}

#[test]
fn test_child_inherits_constructor_and_overrides_arguments() {
  // Arrange
  let container = Container::new();
  container.register("widget-base", widget_template()).unwrap();
  container
    .register(
      "button",
      DefinitionBuilder::new()
        .parent("widget-base")
        .arg_at(0, ValueSource::value("button".to_string()))
        .build(),
    )
    .unwrap();

  // Act
  let button = container.get_as::<Widget>("button").unwrap();

  // Assert: argument 0 overridden by the child, argument 1 inherited.
  assert_eq!(button.label, "button");
  assert_eq!(button.size, 10);
}

#[test]
fn test_grandparent_chain_flattens_depth_first() {
  // Arrange
  let container = Container::new();
  container.register("widget-base", widget_template()).unwrap();
  container
    .register(
      "sized-base",
      DefinitionBuilder::new()
        .parent("widget-base")
        .arg_at(1, ValueSource::value(42u32))
        .abstract_definition()
        .build(),
    )
    .unwrap();
  container
    .register(
      "dialog",
      DefinitionBuilder::new()
        .parent("sized-base")
        .arg_at(0, ValueSource::value("dialog".to_string()))
        .build(),
    )
    .unwrap();

  // Act
  let dialog = container.get_as::<Widget>("dialog").unwrap();

  // Assert: each level contributes the field it declared.
  assert_eq!(dialog.label, "dialog");
  assert_eq!(dialog.size, 42);
}

#[test]
fn test_child_overrides_scope() {
  // Arrange: the parent is a singleton, the child declares prototype.
  let container = Container::new();
  container.register("widget-base", widget_template()).unwrap();
  container
    .register(
      "ephemeral",
      DefinitionBuilder::new().parent("widget-base").prototype().build(),
    )
    .unwrap();

  // Act & Assert
  assert!(container.is_prototype("ephemeral").unwrap());
  let first = container.get_as::<Widget>("ephemeral").unwrap();
  let second = container.get_as::<Widget>("ephemeral").unwrap();
  assert!(!std::sync::Arc::ptr_eq(&first, &second));
}

#[test]
fn test_property_merge_child_wins_by_name() {
  // Arrange
  let container = Container::new();
  container
    .register(
      "tagged-base",
      DefinitionBuilder::new()
        .constructor(|_| {
          Ok(Widget {
            label: String::new(),
            size: 0,
            tag: Mutex::new(String::new()),
          })
        })
        .property("tag", ValueSource::value("parent".to_string()), |widget: &Widget, tag: std::sync::Arc<String>| {
          *widget.tag.lock().unwrap() = (*tag).clone();
        })
        .abstract_definition()
        .build(),
    )
    .unwrap();
  container
    .register(
      "tagged",
      DefinitionBuilder::new()
        .parent("tagged-base")
        .property("tag", ValueSource::value("child".to_string()), |widget: &Widget, tag: std::sync::Arc<String>| {
          *widget.tag.lock().unwrap() = (*tag).clone();
        })
        .build(),
    )
    .unwrap();

  // Act
  let tagged = container.get_as::<Widget>("tagged").unwrap();

  // Assert
  assert_eq!(*tagged.tag.lock().unwrap(), "child");
}

#[test]
fn test_missing_parent_fails_at_first_use_not_registration() {
  // Arrange: registration itself accepts the dangling parent reference.
  let container = Container::new();
  container
    .register("orphan", DefinitionBuilder::new().parent("ghost").build())
    .unwrap();

  // Act
  let error = container.get("orphan").err().unwrap();

  // Assert
  match error {
    ContainerError::InvalidRegistration { name, reason } => {
      assert_eq!(name, "orphan");
      assert!(reason.contains("ghost"), "reason should name the missing parent: {reason}");
    }
    other => panic!("expected an invalid registration, got {other:?}"),
  }
}

#[test]
fn test_parent_cycle_is_rejected_at_merge() {
  // Arrange
  let container = Container::new();
  container
    .register("a", DefinitionBuilder::new().parent("b").build())
    .unwrap();
  container
    .register("b", DefinitionBuilder::new().parent("a").build())
    .unwrap();

  // Act
  let error = container.get("a").err().unwrap();

  // Assert
  match error {
    ContainerError::InvalidRegistration { reason, .. } => {
      assert!(reason.contains("cycle"), "reason should mention the cycle: {reason}");
    }
    other => panic!("expected an invalid registration, got {other:?}"),
  }
}

#[test]
fn test_child_without_own_creator_requires_parent_chain_creator() {
  // Arrange: the whole chain is abstract templates without constructors.
  let container = Container::new();
  container
    .register(
      "base",
      DefinitionBuilder::new().abstract_definition().build(),
    )
    .unwrap();
  container
    .register("leaf", DefinitionBuilder::new().parent("base").build())
    .unwrap();

  // Act
  let error = container.get("leaf").err().unwrap();

  // Assert
  assert!(matches!(error, ContainerError::InvalidRegistration { .. }));
}

#[test]
fn test_reregistration_invalidates_merged_state() {
  // Arrange
  let container = Container::new();
  container.register("widget-base", widget_template()).unwrap();
  container
    .register("plain", DefinitionBuilder::new().parent("widget-base").prototype().build())
    .unwrap();
  assert_eq!(container.get_as::<Widget>("plain").unwrap().size, 10);

  // Act: replace the parent; the child's flattened view must follow.
  let replacement = DefinitionBuilder::new()
    .constructor(|args| {
      Ok(Widget {
        label: (*args.get::<String>(0)?).clone(),
        size: *args.get::<u32>(1)?,
        tag: Mutex::new(String::new()),
      })
    })
    .arg(ValueSource::value("template".to_string()))
    .arg(ValueSource::value(99u32))
    .abstract_definition()
    .build();
  container.register("widget-base", replacement).unwrap();

  // Assert
  assert_eq!(container.get_as::<Widget>("plain").unwrap().size, 99);
}
