//! The instantiation seam: how a merged definition becomes a raw,
//! unconfigured instance.

use crate::container::Container;
use crate::definition::{Arguments, ComponentHandle, Creator, MergedDefinition};
use crate::error::{ContainerError, Result};

/// Produces a raw instance from a merged definition and its resolved
/// constructor arguments. The container ships a closure-dispatching
/// default; alternative strategies (instrumented, pooling, test doubles)
/// can be swapped in before the container starts serving lookups.
pub trait InstantiationStrategy: Send + Sync {
  fn instantiate(
    &self,
    definition: &MergedDefinition,
    args: &Arguments,
    container: &Container,
  ) -> Result<ComponentHandle>;
}

/// The default strategy: invoke the supplier closure, or the declared
/// method on another registered component for factory-method definitions.
pub struct SimpleInstantiationStrategy;

impl InstantiationStrategy for SimpleInstantiationStrategy {
  fn instantiate(
    &self,
    definition: &MergedDefinition,
    args: &Arguments,
    container: &Container,
  ) -> Result<ComponentHandle> {
    match definition.creator() {
      Creator::Supplier(supply) => supply(args, container),
      Creator::FactoryMethod(factory_method) => {
        let factory = container.get(&factory_method.component)?;
        factory_method.invoke(&factory, args)
      }
      Creator::Inherited => Err(ContainerError::Instantiation {
        name: definition.name().to_string(),
        reason: "no constructor or factory method declared".to_string(),
      }),
    }
  }
}
