//! A thread-safe dependency-injection container for Rust.
//!
//! Components are declared as definitions (name, type, scope, dependencies,
//! lifecycle hooks); the container instantiates them on demand, wires their
//! dependencies, and manages the lifecycle of the resulting object graph.
//!
//! # Features
//! - **Named components with scopes**: one shared instance per container
//!   (`singleton`), a fresh instance per request (`prototype`), and named
//!   custom scopes.
//! - **Concurrency-safe creation**: at most one build ever runs per
//!   singleton name; concurrent requesters park until the in-flight build
//!   completes or fails, and unrelated components build in parallel.
//! - **Cycle handling**: setter/property cycles are satisfied through a
//!   provisionally exposed instance; constructor cycles fail fast with the
//!   full cycle path.
//! - **Autowiring**: resolution by type with `primary` and name-qualifier
//!   tie-breaking, aggregate (collection-valued) injection points, and
//!   trait-object views.
//! - **Extension seams**: a pluggable instantiation strategy and an ordered
//!   post-processing pipeline that may wrap instances.
//! - **Deterministic teardown**: `shutdown()` destroys singletons in
//!   reverse dependency order; destroy-hook failures are logged, never
//!   propagated.
//!
//! # Quick Start
//!
//! ```
//! use spool::{Container, DefinitionBuilder, ValueSource};
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!   fn greet(&self) -> String;
//! }
//!
//! struct EnglishGreeter {
//!   message: String,
//! }
//!
//! impl Greeter for EnglishGreeter {
//!   fn greet(&self) -> String {
//!     self.message.clone()
//!   }
//! }
//!
//! let container = Container::new();
//!
//! container
//!   .register(
//!     "greeting",
//!     DefinitionBuilder::new()
//!       .constructor(|_| Ok(String::from("Hello, World!")))
//!       .build(),
//!   )
//!   .unwrap();
//!
//! container
//!   .register(
//!     "greeter",
//!     DefinitionBuilder::new()
//!       .constructor(|args| {
//!         Ok(EnglishGreeter {
//!           message: (*args.get::<String>(0)?).clone(),
//!         })
//!       })
//!       .arg(ValueSource::reference("greeting"))
//!       .expose_as(|greeter: Arc<EnglishGreeter>| greeter as Arc<dyn Greeter>)
//!       .build(),
//!   )
//!   .unwrap();
//!
//! let greeter = container.get_by_type::<dyn Greeter>().unwrap();
//! assert_eq!(greeter.greet(), "Hello, World!");
//! ```

// Public modules that form the API
pub mod builder;
pub mod container;
pub mod definition;
pub mod error;
pub mod instantiate;
pub mod processor;
pub mod resolver;

// Internal, crate-only modules
mod registry;
mod singleton;

// Re-export the primary user-facing types for convenience
pub use builder::DefinitionBuilder;
pub use container::{Container, FACTORY_PREFIX};
pub use definition::{
  Arguments, ComponentDefinition, ComponentFactory, ComponentHandle, Creator, LifecycleHook,
  MergedDefinition, Role, Scope, TypeKey, ValueSource,
};
pub use error::{ContainerError, Result};
pub use instantiate::{InstantiationStrategy, SimpleInstantiationStrategy};
pub use processor::ComponentPostProcessor;
pub use resolver::DependencyRequest;
