//! The post-processing pipeline: ordered hooks that run around component
//! initialization and may wrap or replace the instance.

use crate::definition::ComponentHandle;
use crate::error::{ContainerError, Result};

use std::sync::Arc;

/// A hook invoked around every component's initialization. Both methods
/// receive the current handle and return the handle to continue with,
/// which allows a processor to substitute a wrapped instance.
pub trait ComponentPostProcessor: Send + Sync {
  fn before_init(&self, instance: ComponentHandle, name: &str) -> Result<ComponentHandle> {
    let _ = name;
    Ok(instance)
  }

  fn after_init(&self, instance: ComponentHandle, name: &str) -> Result<ComponentHandle> {
    let _ = name;
    Ok(instance)
  }
}

pub(crate) fn apply_before_init(
  processors: &[Arc<dyn ComponentPostProcessor>],
  mut instance: ComponentHandle,
  name: &str,
) -> Result<ComponentHandle> {
  for processor in processors {
    instance = processor
      .before_init(instance, name)
      .map_err(|error| as_initialization(error, name))?;
  }
  Ok(instance)
}

pub(crate) fn apply_after_init(
  processors: &[Arc<dyn ComponentPostProcessor>],
  mut instance: ComponentHandle,
  name: &str,
) -> Result<ComponentHandle> {
  for processor in processors {
    instance = processor
      .after_init(instance, name)
      .map_err(|error| as_initialization(error, name))?;
  }
  Ok(instance)
}

/// Pipeline failures surface uniformly as initialization errors, keeping
/// whatever detail the processor reported.
fn as_initialization(error: ContainerError, name: &str) -> ContainerError {
  match error {
    already @ ContainerError::Initialization { .. } => already,
    other => ContainerError::Initialization {
      name: name.to_string(),
      reason: other.to_string(),
    },
  }
}
