//! A consuming, chainable builder for [`ComponentDefinition`]s.
//!
//! The builder is where typed user closures (constructors, property setters,
//! lifecycle hooks, trait casts) are erased into the closure forms the
//! container stores and invokes.

use crate::container::Container;
use crate::definition::{
  Arguments, ComponentDefinition, ComponentFactory, ComponentHandle, ConstructorArg, Creator,
  FactoryAdapter, FactoryMethodCreator, LifecycleHook, PropertyBinding, Role, Scope, TypeBinding,
  TypeKey, ValueSource,
};
use crate::error::{ContainerError, Result};
use crate::resolver::Resolved;

use std::any::type_name;
use std::sync::Arc;

/// Builds one [`ComponentDefinition`].
///
/// ```
/// use spool::{DefinitionBuilder, ValueSource};
///
/// struct Greeter {
///   message: String,
/// }
///
/// let definition = DefinitionBuilder::new()
///   .constructor(|args| {
///     Ok(Greeter {
///       message: (*args.get::<String>(0)?).clone(),
///     })
///   })
///   .arg(ValueSource::value("hello".to_string()))
///   .build();
/// ```
#[derive(Default)]
pub struct DefinitionBuilder {
  definition: ComponentDefinition,
}

impl DefinitionBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Declares the component type without a creator. Useful on abstract
  /// parents that fix the type for their children.
  pub fn typed<T: ?Sized + Send + Sync + 'static>(mut self) -> Self {
    self.definition.type_key = Some(TypeKey::of::<T>());
    self
  }

  /// Sets the constructor. Arguments declared with [`arg`](Self::arg) are
  /// resolved by the container and handed in positionally.
  pub fn constructor<T, F>(self, construct: F) -> Self
  where
    T: Send + Sync + 'static,
    F: Fn(&Arguments) -> Result<T> + Send + Sync + 'static,
  {
    self.constructor_with(move |args, _| construct(args))
  }

  /// Like [`constructor`](Self::constructor), but the closure also receives
  /// the container for service-locator style lookups.
  pub fn constructor_with<T, F>(mut self, construct: F) -> Self
  where
    T: Send + Sync + 'static,
    F: Fn(&Arguments, &Container) -> Result<T> + Send + Sync + 'static,
  {
    self.definition.type_key = Some(TypeKey::of::<T>());
    self.definition.creator = Creator::Supplier(Arc::new(move |args, container| {
      construct(args, container).map(ComponentHandle::of)
    }));
    self
  }

  /// Creates instances by invoking a method on another registered
  /// component instead of a plain constructor.
  pub fn factory_method<FC, P, F>(mut self, component: &str, method: &str, invoke: F) -> Self
  where
    FC: ?Sized + Send + Sync + 'static,
    P: Send + Sync + 'static,
    F: Fn(&FC, &Arguments) -> Result<P> + Send + Sync + 'static,
  {
    let component_name = component.to_string();
    let erased = Arc::new(move |factory: &ComponentHandle, args: &Arguments| -> Result<ComponentHandle> {
      let typed = factory.downcast::<FC>().ok_or_else(|| ContainerError::TypeMismatch {
        name: component_name.clone(),
        actual: factory.type_key().name().to_string(),
        requested: type_name::<FC>().to_string(),
      })?;
      invoke(&typed, args).map(ComponentHandle::of)
    });
    self.definition.creator = Creator::FactoryMethod(FactoryMethodCreator {
      component: component.to_string(),
      method: method.to_string(),
      invoke: erased,
    });
    self.definition.type_key = Some(TypeKey::of::<P>());
    self
  }

  /// Appends the next positional constructor argument.
  pub fn arg(mut self, source: impl Into<ValueSource>) -> Self {
    let index = self.definition.constructor_args.len();
    self.definition.constructor_args.push(ConstructorArg {
      index,
      source: source.into(),
    });
    self
  }

  /// Declares (or, in a child definition, overrides) the argument at an
  /// explicit index.
  pub fn arg_at(mut self, index: usize, source: impl Into<ValueSource>) -> Self {
    self.definition.constructor_args.push(ConstructorArg {
      index,
      source: source.into(),
    });
    self
  }

  /// Declares a single-valued property injection point. The `apply`
  /// closure writes the resolved value into the instance; components use
  /// their own interior mutability for post-construction population.
  /// An optional, unsatisfied source leaves the property untouched.
  pub fn property<T, D, F>(mut self, name: &str, source: impl Into<ValueSource>, apply: F) -> Self
  where
    T: ?Sized + Send + Sync + 'static,
    D: ?Sized + Send + Sync + 'static,
    F: Fn(&T, Arc<D>) + Send + Sync + 'static,
  {
    let property = name.to_string();
    let erased = Arc::new(move |target: &ComponentHandle, value: Resolved| -> Result<()> {
      let typed = target.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
        name: property.clone(),
        actual: target.type_key().name().to_string(),
        requested: type_name::<T>().to_string(),
      })?;
      match value {
        Resolved::One(handle) => {
          let value = handle.downcast::<D>().ok_or_else(|| ContainerError::TypeMismatch {
            name: property.clone(),
            actual: handle.type_key().name().to_string(),
            requested: type_name::<D>().to_string(),
          })?;
          apply(&typed, value);
          Ok(())
        }
        Resolved::None => Ok(()),
        Resolved::Many(_) => Err(ContainerError::Initialization {
          name: property.clone(),
          reason: "aggregate value offered to a single-valued property".to_string(),
        }),
      }
    });
    self.definition.properties.push(PropertyBinding {
      name: name.to_string(),
      source: source.into(),
      apply: erased,
    });
    self
  }

  /// Declares a collection-valued property injection point; every matching
  /// candidate is handed over in declaration order.
  pub fn property_all<T, D, F>(mut self, name: &str, source: impl Into<ValueSource>, apply: F) -> Self
  where
    T: ?Sized + Send + Sync + 'static,
    D: ?Sized + Send + Sync + 'static,
    F: Fn(&T, Vec<Arc<D>>) + Send + Sync + 'static,
  {
    let property = name.to_string();
    let erased = Arc::new(move |target: &ComponentHandle, value: Resolved| -> Result<()> {
      let typed = target.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
        name: property.clone(),
        actual: target.type_key().name().to_string(),
        requested: type_name::<T>().to_string(),
      })?;
      let handles = match value {
        Resolved::Many(handles) => handles,
        Resolved::One(handle) => vec![handle],
        Resolved::None => Vec::new(),
      };
      let values = handles
        .into_iter()
        .map(|handle| {
          handle.downcast::<D>().ok_or_else(|| ContainerError::TypeMismatch {
            name: property.clone(),
            actual: handle.type_key().name().to_string(),
            requested: type_name::<D>().to_string(),
          })
        })
        .collect::<Result<Vec<_>>>()?;
      apply(&typed, values);
      Ok(())
    });
    self.definition.properties.push(PropertyBinding {
      name: name.to_string(),
      source: source.into(),
      apply: erased,
    });
    self
  }

  /// Attaches a named init hook, run after property population and the
  /// before-init processors. A failure aborts the build.
  pub fn init<T, F>(mut self, hook_name: &str, hook: F) -> Self
  where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&T) -> Result<()> + Send + Sync + 'static,
  {
    self.definition.init_hook = Some(Self::lifecycle_hook(hook_name, hook));
    self
  }

  /// Attaches a named destroy hook, run at container shutdown. Failures
  /// are logged and swallowed.
  pub fn destroy<T, F>(mut self, hook_name: &str, hook: F) -> Self
  where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&T) -> Result<()> + Send + Sync + 'static,
  {
    self.definition.destroy_hook = Some(Self::lifecycle_hook(hook_name, hook));
    self
  }

  fn lifecycle_hook<T, F>(hook_name: &str, hook: F) -> LifecycleHook
  where
    T: ?Sized + Send + Sync + 'static,
    F: Fn(&T) -> Result<()> + Send + Sync + 'static,
  {
    let name = hook_name.to_string();
    let func = Arc::new(move |instance: &ComponentHandle| -> Result<()> {
      let typed = instance.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
        name: name.clone(),
        actual: instance.type_key().name().to_string(),
        requested: type_name::<T>().to_string(),
      })?;
      hook(&typed)
    });
    LifecycleHook {
      name: hook_name.to_string(),
      func,
    }
  }

  /// Registers an additional type this component can be retrieved or
  /// autowired as, typically a trait object view of the concrete type:
  ///
  /// ```ignore
  /// .expose_as(|svc: Arc<PostgresStore>| svc as Arc<dyn Store>)
  /// ```
  pub fn expose_as<T, I, F>(mut self, cast: F) -> Self
  where
    T: ?Sized + Send + Sync + 'static,
    I: ?Sized + Send + Sync + 'static,
    F: Fn(Arc<T>) -> Arc<I> + Send + Sync + 'static,
  {
    let erased = Arc::new(move |handle: &ComponentHandle| -> Option<ComponentHandle> {
      handle.downcast::<T>().map(|arc| ComponentHandle::new(cast(arc)))
    });
    self.definition.bindings.push(TypeBinding {
      key: TypeKey::of::<I>(),
      cast: erased,
    });
    self
  }

  /// Marks this component as a factory for another component. `F` must be
  /// the component's own type as declared by its constructor. Plain
  /// lookups of the name then yield the product; the `&`-prefixed name
  /// addresses the factory itself.
  pub fn as_factory<F: ComponentFactory>(mut self) -> Self {
    let produce = Arc::new(|handle: &ComponentHandle, container: &Container| -> Result<ComponentHandle> {
      let factory = handle.downcast::<F>().ok_or_else(|| ContainerError::TypeMismatch {
        name: type_name::<F>().to_string(),
        actual: handle.type_key().name().to_string(),
        requested: type_name::<F>().to_string(),
      })?;
      factory.produce(container).map(ComponentHandle::new)
    });
    let singleton_product = Arc::new(|handle: &ComponentHandle| -> bool {
      handle
        .downcast::<F>()
        .map(|factory| factory.singleton_product())
        .unwrap_or(true)
    });
    self.definition.factory = Some(FactoryAdapter {
      product_key: TypeKey::of::<F::Product>(),
      produce,
      singleton_product,
    });
    self
  }

  pub fn parent(mut self, name: impl Into<String>) -> Self {
    self.definition.parent = Some(name.into());
    self
  }

  pub fn scope(mut self, scope: Scope) -> Self {
    self.definition.scope = Some(scope);
    self
  }

  /// Shorthand for `scope(Scope::Prototype)`.
  pub fn prototype(self) -> Self {
    self.scope(Scope::Prototype)
  }

  pub fn lazy_init(mut self, lazy: bool) -> Self {
    self.definition.lazy_init = Some(lazy);
    self
  }

  /// Declares that the named component must be fully created before this
  /// one. May be called repeatedly.
  pub fn depends_on(mut self, name: impl Into<String>) -> Self {
    self.definition.depends_on.push(name.into());
    self
  }

  pub fn autowire_candidate(mut self, candidate: bool) -> Self {
    self.definition.autowire_candidate = Some(candidate);
    self
  }

  pub fn primary(mut self, primary: bool) -> Self {
    self.definition.primary = Some(primary);
    self
  }

  pub fn role(mut self, role: Role) -> Self {
    self.definition.role = Some(role);
    self
  }

  /// Marks the definition as a template: it can be inherited from but
  /// never instantiated.
  pub fn abstract_definition(mut self) -> Self {
    self.definition.is_abstract = true;
    self
  }

  pub fn description(mut self, text: impl Into<String>) -> Self {
    self.definition.description = Some(text.into());
    self
  }

  /// Records the definition this one was derived from, for diagnostics.
  pub fn originating(mut self, definition: ComponentDefinition) -> Self {
    self.definition.originating = Some(Arc::new(definition));
    self
  }

  pub fn build(self) -> ComponentDefinition {
    self.definition
  }
}
