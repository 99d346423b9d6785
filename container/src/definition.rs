//! The declarative data model: component definitions, merged definitions,
//! type keys, and the type-erased instance handles the container trades in.

use crate::container::Container;
use crate::error::{ContainerError, Result};
use crate::resolver::{DependencyRequest, Resolved};

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A value-level stand-in for a runtime type: the `TypeId` plus the type
/// name for diagnostics. This is how a "required type" is expressed without
/// reflection; trait objects work as well as concrete types.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
  pub(crate) type_id: TypeId,
  pub(crate) type_name: &'static str,
}

impl TypeKey {
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.type_name
  }
}

impl fmt::Debug for TypeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "TypeKey({})", self.type_name)
  }
}

/// A type-erased, shareable handle to a component instance.
///
/// The erased payload is always the component's `Arc<T>` itself, so the
/// handle can be cloned freely and downcast back to `Arc<T>`, including
/// when `T` is a trait object such as `dyn Service`.
#[derive(Clone)]
pub struct ComponentHandle {
  any: Arc<dyn Any + Send + Sync>,
  type_key: TypeKey,
}

impl ComponentHandle {
  /// Wraps an already-shared instance.
  pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
    Self {
      any: Arc::new(value),
      type_key: TypeKey::of::<T>(),
    }
  }

  /// Wraps an owned value.
  pub fn of<T: Send + Sync + 'static>(value: T) -> Self {
    Self::new(Arc::new(value))
  }

  /// Recovers the typed `Arc<T>`, or `None` if the payload is a different
  /// type. Views registered through [`DefinitionBuilder::expose_as`] are
  /// applied by the container, not here.
  ///
  /// [`DefinitionBuilder::expose_as`]: crate::builder::DefinitionBuilder::expose_as
  pub fn downcast<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
    self.any.downcast_ref::<Arc<T>>().cloned()
  }

  pub fn type_key(&self) -> TypeKey {
    self.type_key
  }

  /// Identity comparison: do both handles share the same payload allocation?
  pub fn ptr_eq(&self, other: &ComponentHandle) -> bool {
    Arc::ptr_eq(&self.any, &other.any)
  }
}

impl fmt::Debug for ComponentHandle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ComponentHandle({})", self.type_key.type_name)
  }
}

/// Instance cardinality and lifetime policy.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Scope {
  /// One shared instance per container, created at most once.
  #[default]
  Singleton,
  /// A fresh instance per request; nothing is cached.
  Prototype,
  /// A named custom scope. The container treats it as fresh-build, like
  /// [`Scope::Prototype`]; the name is retained for callers that layer
  /// their own caching on top.
  Custom(String),
}

impl Scope {
  pub fn is_singleton(&self) -> bool {
    matches!(self, Scope::Singleton)
  }

  pub fn is_prototype(&self) -> bool {
    matches!(self, Scope::Prototype)
  }
}

/// Classification of a definition, for tooling and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Role {
  #[default]
  Application,
  Support,
  Infrastructure,
}

/// Where the value for one injection point comes from.
#[derive(Clone)]
pub enum ValueSource {
  /// A configuration-time constant.
  Value(ComponentHandle),
  /// A reference to another component by name (aliases allowed).
  Ref(String),
  /// Autowired by type through the dependency resolver.
  Autowired(DependencyRequest),
}

impl ValueSource {
  pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
    ValueSource::Value(ComponentHandle::of(value))
  }

  pub fn reference(name: impl Into<String>) -> Self {
    ValueSource::Ref(name.into())
  }

  pub fn by_type<T: ?Sized + Send + Sync + 'static>() -> Self {
    ValueSource::Autowired(DependencyRequest::of::<T>())
  }

  pub fn all_of<T: ?Sized + Send + Sync + 'static>() -> Self {
    ValueSource::Autowired(DependencyRequest::of::<T>().aggregate())
  }
}

impl From<DependencyRequest> for ValueSource {
  fn from(request: DependencyRequest) -> Self {
    ValueSource::Autowired(request)
  }
}

/// The resolved constructor arguments handed to a supplier closure,
/// positionally indexed as declared on the definition.
pub struct Arguments {
  pub(crate) component: String,
  pub(crate) values: Vec<Resolved>,
}

impl Arguments {
  pub(crate) fn new(component: impl Into<String>, values: Vec<Resolved>) -> Self {
    Self {
      component: component.into(),
      values,
    }
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }

  /// Returns the required argument at `index` as `Arc<T>`.
  pub fn get<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
    match self.values.get(index) {
      Some(Resolved::One(handle)) => handle.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
        name: self.component.clone(),
        actual: handle.type_key().name().to_string(),
        requested: std::any::type_name::<T>().to_string(),
      }),
      Some(Resolved::None) => Err(ContainerError::Instantiation {
        name: self.component.clone(),
        reason: format!("constructor argument {index} resolved to nothing; use get_opt"),
      }),
      Some(Resolved::Many(_)) => Err(ContainerError::Instantiation {
        name: self.component.clone(),
        reason: format!("constructor argument {index} is an aggregate; use get_all"),
      }),
      None => Err(ContainerError::Instantiation {
        name: self.component.clone(),
        reason: format!("constructor argument {index} is missing"),
      }),
    }
  }

  /// Returns an optional argument, mapping an unsatisfied injection point
  /// to `None`.
  pub fn get_opt<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<T>>> {
    match self.values.get(index) {
      Some(Resolved::One(_)) => self.get::<T>(index).map(Some),
      _ => Ok(None),
    }
  }

  /// Returns an aggregate argument, in candidate declaration order.
  pub fn get_all<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> Result<Vec<Arc<T>>> {
    let handles: &[ComponentHandle] = match self.values.get(index) {
      Some(Resolved::Many(handles)) => handles,
      Some(Resolved::One(handle)) => std::slice::from_ref(handle),
      _ => return Ok(Vec::new()),
    };
    handles
      .iter()
      .map(|handle| {
        handle.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
          name: self.component.clone(),
          actual: handle.type_key().name().to_string(),
          requested: std::any::type_name::<T>().to_string(),
        })
      })
      .collect()
  }
}

/// Supplier closure: resolved arguments plus the container (for
/// service-locator style lookups) to a raw instance.
pub type ConstructorFn =
  Arc<dyn Fn(&Arguments, &Container) -> Result<ComponentHandle> + Send + Sync>;

/// Indirect creation through a method on another registered component.
#[derive(Clone)]
pub struct FactoryMethodCreator {
  pub component: String,
  pub method: String,
  pub(crate) invoke: Arc<dyn Fn(&ComponentHandle, &Arguments) -> Result<ComponentHandle> + Send + Sync>,
}

impl FactoryMethodCreator {
  pub fn invoke(&self, factory: &ComponentHandle, args: &Arguments) -> Result<ComponentHandle> {
    (self.invoke)(factory, args)
  }
}

impl fmt::Debug for FactoryMethodCreator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "FactoryMethodCreator({}::{})", self.component, self.method)
  }
}

/// How a raw instance comes into being.
#[derive(Clone, Default)]
pub enum Creator {
  /// Nothing declared at this level; only valid on abstract definitions
  /// and on children that inherit a creator from a parent.
  #[default]
  Inherited,
  Supplier(ConstructorFn),
  FactoryMethod(FactoryMethodCreator),
}

impl fmt::Debug for Creator {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Creator::Inherited => write!(f, "Inherited"),
      Creator::Supplier(_) => write!(f, "Supplier"),
      Creator::FactoryMethod(fm) => fm.fmt(f),
    }
  }
}

/// A named init or destroy callback attached to a definition.
#[derive(Clone)]
pub struct LifecycleHook {
  pub(crate) name: String,
  pub(crate) func: Arc<dyn Fn(&ComponentHandle) -> Result<()> + Send + Sync>,
}

impl LifecycleHook {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub(crate) fn invoke(&self, instance: &ComponentHandle) -> Result<()> {
    (self.func)(instance)
  }
}

impl fmt::Debug for LifecycleHook {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "LifecycleHook({})", self.name)
  }
}

/// An additional type a component may be retrieved or autowired as,
/// together with the cast from the concrete handle to that view.
#[derive(Clone)]
pub(crate) struct TypeBinding {
  pub(crate) key: TypeKey,
  pub(crate) cast: Arc<dyn Fn(&ComponentHandle) -> Option<ComponentHandle> + Send + Sync>,
}

/// A single named property injection point: its value source plus the
/// closure that writes the resolved value into the target instance.
#[derive(Clone)]
pub(crate) struct PropertyBinding {
  pub(crate) name: String,
  pub(crate) source: ValueSource,
  pub(crate) apply: Arc<dyn Fn(&ComponentHandle, Resolved) -> Result<()> + Send + Sync>,
}

/// One positional constructor argument.
#[derive(Clone)]
pub(crate) struct ConstructorArg {
  pub(crate) index: usize,
  pub(crate) source: ValueSource,
}

/// A component that manufactures another component. Registered definitions
/// gain factory behavior through
/// [`DefinitionBuilder::as_factory`](crate::builder::DefinitionBuilder::as_factory):
/// looking the name up yields the product, while the `&`-prefixed name
/// addresses the factory itself.
pub trait ComponentFactory: Send + Sync + 'static {
  type Product: ?Sized + Send + Sync + 'static;

  fn produce(&self, container: &Container) -> Result<Arc<Self::Product>>;

  /// Whether the product is shared (produced at most once per container)
  /// or freshly manufactured on every request.
  fn singleton_product(&self) -> bool {
    true
  }
}

/// Type-erased adapter stored on factory-backed definitions.
#[derive(Clone)]
pub(crate) struct FactoryAdapter {
  pub(crate) product_key: TypeKey,
  pub(crate) produce: Arc<dyn Fn(&ComponentHandle, &Container) -> Result<ComponentHandle> + Send + Sync>,
  pub(crate) singleton_product: Arc<dyn Fn(&ComponentHandle) -> bool + Send + Sync>,
}

/// The declarative description of one component, keyed by name in the
/// registry. Inheritable fields are optional so that merging can tell
/// "unset" apart from an explicit value; defaults are applied when the
/// definition is flattened into a [`MergedDefinition`].
#[derive(Clone, Default)]
pub struct ComponentDefinition {
  pub(crate) parent: Option<String>,
  pub(crate) type_key: Option<TypeKey>,
  pub(crate) scope: Option<Scope>,
  pub(crate) lazy_init: Option<bool>,
  pub(crate) depends_on: Vec<String>,
  pub(crate) autowire_candidate: Option<bool>,
  pub(crate) primary: Option<bool>,
  pub(crate) role: Option<Role>,
  pub(crate) is_abstract: bool,
  pub(crate) creator: Creator,
  pub(crate) constructor_args: Vec<ConstructorArg>,
  pub(crate) properties: Vec<PropertyBinding>,
  pub(crate) init_hook: Option<LifecycleHook>,
  pub(crate) destroy_hook: Option<LifecycleHook>,
  pub(crate) bindings: Vec<TypeBinding>,
  pub(crate) factory: Option<FactoryAdapter>,
  pub(crate) description: Option<String>,
  pub(crate) originating: Option<Arc<ComponentDefinition>>,
}

impl ComponentDefinition {
  pub fn parent(&self) -> Option<&str> {
    self.parent.as_deref()
  }

  pub fn type_key(&self) -> Option<TypeKey> {
    self.type_key
  }

  pub fn is_abstract(&self) -> bool {
    self.is_abstract
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  /// The definition this one was derived from, if any. Non-owning in
  /// spirit: purely for diagnostics, never consulted during creation.
  pub fn originating(&self) -> Option<&ComponentDefinition> {
    self.originating.as_deref()
  }

  /// Structural validation performed at registration time. Semantic checks
  /// that need the parent chain happen at merge time instead.
  pub(crate) fn validate(&self, name: &str) -> Result<()> {
    if name.is_empty() {
      return Err(ContainerError::InvalidRegistration {
        name: String::new(),
        reason: "component name must not be empty".to_string(),
      });
    }
    let constructible = !matches!(self.creator, Creator::Inherited)
      || self.factory.is_some()
      || self.parent.is_some()
      || self.is_abstract;
    if !constructible {
      return Err(ContainerError::InvalidRegistration {
        name: name.to_string(),
        reason: "definition declares neither a constructor, a factory method, a parent, nor abstract status".to_string(),
      });
    }
    Ok(())
  }
}

impl fmt::Debug for ComponentDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ComponentDefinition")
      .field("parent", &self.parent)
      .field("type", &self.type_key.map(|k| k.name()))
      .field("scope", &self.scope)
      .field("abstract", &self.is_abstract)
      .field("creator", &self.creator)
      .finish_non_exhaustive()
  }
}

/// A definition with its parent chain flattened and defaults applied.
/// Effectively immutable: cached per name and rebuilt only when the
/// registry is mutated.
pub struct MergedDefinition {
  pub(crate) name: String,
  pub(crate) type_key: Option<TypeKey>,
  pub(crate) scope: Scope,
  pub(crate) lazy_init: bool,
  pub(crate) depends_on: Vec<String>,
  pub(crate) autowire_candidate: bool,
  pub(crate) primary: bool,
  pub(crate) role: Role,
  pub(crate) is_abstract: bool,
  pub(crate) creator: Creator,
  pub(crate) constructor_args: Vec<ConstructorArg>,
  pub(crate) properties: Vec<PropertyBinding>,
  pub(crate) init_hook: Option<LifecycleHook>,
  pub(crate) destroy_hook: Option<LifecycleHook>,
  pub(crate) bindings: Vec<TypeBinding>,
  pub(crate) factory: Option<FactoryAdapter>,
}

impl MergedDefinition {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn type_key(&self) -> Option<TypeKey> {
    self.type_key
  }

  pub fn scope(&self) -> &Scope {
    &self.scope
  }

  pub fn is_singleton(&self) -> bool {
    self.scope.is_singleton()
  }

  pub fn is_lazy(&self) -> bool {
    self.lazy_init
  }

  pub fn depends_on(&self) -> &[String] {
    &self.depends_on
  }

  pub fn is_autowire_candidate(&self) -> bool {
    self.autowire_candidate
  }

  pub fn is_primary(&self) -> bool {
    self.primary
  }

  pub fn role(&self) -> Role {
    self.role
  }

  pub fn is_abstract(&self) -> bool {
    self.is_abstract
  }

  pub fn creator(&self) -> &Creator {
    &self.creator
  }

  pub fn is_factory(&self) -> bool {
    self.factory.is_some()
  }

  /// The type this name yields from a plain lookup: the factory product
  /// type for factory-backed definitions, the component type otherwise.
  pub fn exposed_type(&self) -> Option<TypeKey> {
    match &self.factory {
      Some(adapter) => Some(adapter.product_key),
      None => self.type_key,
    }
  }

  /// Rejects definitions that must never be instantiated directly.
  pub(crate) fn require_concrete(&self) -> Result<()> {
    if self.is_abstract {
      return Err(ContainerError::InvalidRegistration {
        name: self.name.clone(),
        reason: "abstract definitions cannot be instantiated".to_string(),
      });
    }
    if matches!(self.creator, Creator::Inherited) {
      return Err(ContainerError::InvalidRegistration {
        name: self.name.clone(),
        reason: "no constructor or factory method is declared anywhere in the parent chain".to_string(),
      });
    }
    Ok(())
  }

  /// Whether this definition can satisfy a request for `key`, either
  /// directly, through an exposed view, or through its factory product.
  /// Factory-backed names offer only their product: the factory object
  /// itself is reachable solely through the `&`-prefixed name.
  pub(crate) fn satisfies(&self, key: &TypeKey) -> bool {
    if let Some(adapter) = &self.factory {
      return adapter.product_key == *key;
    }
    if self.type_key.as_ref() == Some(key) {
      return true;
    }
    self.bindings.iter().any(|b| b.key == *key)
  }

  pub(crate) fn binding_for(&self, key: &TypeKey) -> Option<&TypeBinding> {
    self.bindings.iter().find(|b| b.key == *key)
  }
}

impl fmt::Debug for MergedDefinition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MergedDefinition")
      .field("name", &self.name)
      .field("type", &self.type_key.map(|k| k.name()))
      .field("scope", &self.scope)
      .field("lazy_init", &self.lazy_init)
      .field("abstract", &self.is_abstract)
      .finish_non_exhaustive()
  }
}
