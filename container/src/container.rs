//! The container facade: the public lookup surface, the build algorithm,
//! and the shutdown path. This is the only place that spans both the
//! descriptor store and the singleton coordinator, because only the facade
//! can decide per call which scope strategy applies.

use crate::definition::{
  Arguments, ComponentDefinition, ComponentHandle, FactoryAdapter, MergedDefinition, Scope,
  TypeKey, ValueSource,
};
use crate::error::{ContainerError, Result};
use crate::instantiate::{InstantiationStrategy, SimpleInstantiationStrategy};
use crate::processor::{self, ComponentPostProcessor};
use crate::registry::DefinitionRegistry;
use crate::resolver::{self, DependencyRequest, Resolved};
use crate::singleton::{self, CreationGuard, SingletonRegistry};

use std::any::type_name;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::RwLock;

/// Addressing a factory-backed name with this prefix returns the factory
/// component itself instead of its product.
pub const FACTORY_PREFIX: &str = "&";

/// A process-scoped dependency-injection container with an explicit
/// lifecycle: create it, register definitions, serve lookups from any
/// thread, and [`shutdown`](Container::shutdown) to destroy every cached
/// singleton in reverse dependency order.
pub struct Container {
  definitions: DefinitionRegistry,
  singletons: SingletonRegistry,
  /// Cached factory products, keyed by the factory component's name.
  factory_products: DashMap<String, ComponentHandle, RandomState>,
  strategy: RwLock<Arc<dyn InstantiationStrategy>>,
  processors: RwLock<Vec<Arc<dyn ComponentPostProcessor>>>,
  closed: AtomicBool,
}

impl Default for Container {
  fn default() -> Self {
    Self::new()
  }
}

impl Container {
  pub fn new() -> Self {
    Self {
      definitions: DefinitionRegistry::new(),
      singletons: SingletonRegistry::new(),
      factory_products: DashMap::with_hasher(RandomState::new()),
      strategy: RwLock::new(Arc::new(SimpleInstantiationStrategy)),
      processors: RwLock::new(Vec::new()),
      closed: AtomicBool::new(false),
    }
  }

  // --- Configuration-time registration ---

  /// Registers (or replaces) a component definition under `name`.
  pub fn register(&self, name: &str, definition: ComponentDefinition) -> Result<()> {
    self.ensure_open()?;
    self.definitions.register(name, definition)
  }

  /// Removes a definition; cached singleton instances are unaffected.
  pub fn remove_definition(&self, name: &str) -> Result<()> {
    self.ensure_open()?;
    self.definitions.remove(name)
  }

  /// Registers `alias` as another name for `canonical`.
  pub fn register_alias(&self, alias: &str, canonical: &str) -> Result<()> {
    self.ensure_open()?;
    self.definitions.alias(alias, canonical)
  }

  /// Registers a pre-built instance as a completed singleton, bypassing
  /// the creation protocol. The name can never be overwritten.
  pub fn register_instance<T: Send + Sync + 'static>(&self, name: &str, value: T) -> Result<()> {
    self.register_arc(name, Arc::new(value))
  }

  /// Like [`register_instance`](Container::register_instance) for values
  /// that are already shared, including trait objects.
  pub fn register_arc<T: ?Sized + Send + Sync + 'static>(&self, name: &str, value: Arc<T>) -> Result<()> {
    self.ensure_open()?;
    self.singletons.register(name, ComponentHandle::new(value))
  }

  /// Appends a post-processor. Processors run in registration order around
  /// every subsequently created component.
  pub fn add_post_processor(&self, processor: Arc<dyn ComponentPostProcessor>) {
    self.processors.write().push(processor);
  }

  /// Replaces the instantiation strategy used for every subsequent build.
  pub fn set_instantiation_strategy(&self, strategy: Arc<dyn InstantiationStrategy>) {
    *self.strategy.write() = strategy;
  }

  /// Withholds `name` from autowiring candidate enumeration until
  /// [`include_in_autowiring`](Container::include_in_autowiring) restores it.
  pub fn exclude_from_autowiring(&self, name: &str) {
    let canonical = self.definitions.canonical_name(name);
    self.singletons.exclude(&canonical);
  }

  pub fn include_in_autowiring(&self, name: &str) {
    let canonical = self.definitions.canonical_name(name);
    self.singletons.include(&canonical);
  }

  // --- Lookups ---

  /// Looks a component up by name, creating it as its scope demands. The
  /// returned handle can be downcast to the component's type; prefer
  /// [`get_as`](Container::get_as) when the type is statically known.
  pub fn get(&self, name: &str) -> Result<ComponentHandle> {
    self.ensure_open()?;
    let (stripped, prefixed) = strip_factory_prefix(name);
    let canonical = self.definitions.canonical_name(stripped);

    if let Some(existing) = self.singletons.get(&canonical) {
      return self.finish_lookup(&canonical, existing, prefixed);
    }

    let merged = match self.definitions.merged(&canonical) {
      Ok(merged) => merged,
      Err(ContainerError::NotFound(_)) => return Err(ContainerError::NotFound(name.to_string())),
      Err(other) => return Err(other),
    };
    merged.require_concrete()?;

    let handle = match merged.scope() {
      Scope::Singleton => {
        if let Some(path) = singleton::cycle_path(self.singletons.id(), &canonical) {
          // Re-entrant request from this thread's own build chain: hand
          // back the provisional instance if construction already passed,
          // otherwise the cycle is constructor-based and unresolvable.
          match self.singletons.early(&canonical) {
            Some(early) => return self.finish_lookup(&canonical, early, prefixed),
            None => return Err(ContainerError::CircularDependency { path }),
          }
        }
        self.singletons.get_or_create(&canonical, || {
          let _guard = CreationGuard::enter(self.singletons.id(), &canonical)?;
          self.build_component(&canonical, &merged)
        })?
      }
      Scope::Prototype | Scope::Custom(_) => {
        // Fresh instance per request; the guard still catches cycles
        // within this one build.
        let _guard = CreationGuard::enter(self.singletons.id(), &canonical)?;
        self.build_component(&canonical, &merged)?
      }
    };
    self.finish_lookup(&canonical, handle, prefixed)
  }

  /// Looks a component up by name and returns it as `Arc<T>`, consulting
  /// the definition's exposed views when the concrete type differs.
  pub fn get_as<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
    let handle = self.get(name)?;
    if let Some(typed) = handle.downcast::<T>() {
      return Ok(typed);
    }
    let (stripped, prefixed) = strip_factory_prefix(name);
    if !prefixed {
      let canonical = self.definitions.canonical_name(stripped);
      if let Ok(merged) = self.definitions.merged(&canonical) {
        if let Some(binding) = merged.binding_for(&TypeKey::of::<T>()) {
          if let Some(view) = (binding.cast)(&handle) {
            if let Some(typed) = view.downcast::<T>() {
              return Ok(typed);
            }
          }
        }
      }
    }
    Err(ContainerError::TypeMismatch {
      name: name.to_string(),
      actual: handle.type_key().name().to_string(),
      requested: type_name::<T>().to_string(),
    })
  }

  /// Resolves the single component of type `T`, applying the resolver's
  /// tie-break rules.
  pub fn get_by_type<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
    self.ensure_open()?;
    let request = DependencyRequest::of::<T>();
    let resolution = resolver::resolve(self, &request, None)?;
    match resolution.value {
      Resolved::One(handle) => {
        let typed = handle.downcast::<T>();
        typed.ok_or_else(|| ContainerError::TypeMismatch {
          name: resolution.contributors.first().cloned().unwrap_or_default(),
          actual: handle.type_key().name().to_string(),
          requested: type_name::<T>().to_string(),
        })
      }
      _ => Err(ContainerError::NoMatchingComponent {
        requester: "<caller>".to_string(),
        type_name: type_name::<T>().to_string(),
      }),
    }
  }

  /// Collects every component of type `T`, in declaration order. An empty
  /// result is not an error.
  pub fn get_all_of<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
    self.ensure_open()?;
    let request = DependencyRequest::of::<T>().aggregate().optional();
    let resolution = resolver::resolve(self, &request, None)?;
    let handles = match resolution.value {
      Resolved::Many(handles) => handles,
      Resolved::One(handle) => vec![handle],
      Resolved::None => Vec::new(),
    };
    handles
      .into_iter()
      .map(|handle| {
        handle.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
          name: String::new(),
          actual: handle.type_key().name().to_string(),
          requested: type_name::<T>().to_string(),
        })
      })
      .collect()
  }

  /// Resolves one injection point on behalf of `requester`, returning the
  /// matching handles and the names that contributed them.
  pub fn resolve(
    &self,
    request: &DependencyRequest,
    requester: Option<&str>,
  ) -> Result<(Vec<ComponentHandle>, Vec<String>)> {
    self.ensure_open()?;
    let resolution = resolver::resolve(self, request, requester)?;
    let values = match resolution.value {
      Resolved::One(handle) => vec![handle],
      Resolved::Many(handles) => handles,
      Resolved::None => Vec::new(),
    };
    Ok((values, resolution.contributors))
  }

  // --- Predicates and queries ---

  /// Whether a definition or registered singleton answers to `name`
  /// (aliases included).
  pub fn contains(&self, name: &str) -> bool {
    let (stripped, _) = strip_factory_prefix(name);
    let canonical = self.definitions.canonical_name(stripped);
    self.definitions.contains(&canonical) || self.singletons.contains(&canonical)
  }

  pub fn is_singleton(&self, name: &str) -> Result<bool> {
    let (stripped, _) = strip_factory_prefix(name);
    let canonical = self.definitions.canonical_name(stripped);
    if let Ok(merged) = self.definitions.merged(&canonical) {
      return Ok(merged.is_singleton());
    }
    if self.singletons.contains(&canonical) {
      return Ok(true);
    }
    Err(ContainerError::NotFound(name.to_string()))
  }

  pub fn is_prototype(&self, name: &str) -> Result<bool> {
    let (stripped, _) = strip_factory_prefix(name);
    let canonical = self.definitions.canonical_name(stripped);
    if let Ok(merged) = self.definitions.merged(&canonical) {
      return Ok(merged.scope().is_prototype());
    }
    if self.singletons.contains(&canonical) {
      return Ok(false);
    }
    Err(ContainerError::NotFound(name.to_string()))
  }

  /// The type a lookup of `name` yields: the product type for unprefixed
  /// factory-backed names, the component type otherwise. `None` when the
  /// definition declares no type (for instance an abstract template).
  pub fn type_of(&self, name: &str) -> Result<Option<TypeKey>> {
    let (stripped, prefixed) = strip_factory_prefix(name);
    let canonical = self.definitions.canonical_name(stripped);
    if let Ok(merged) = self.definitions.merged(&canonical) {
      if prefixed {
        return Ok(merged.type_key());
      }
      return Ok(merged.exposed_type());
    }
    if let Some(handle) = self.singletons.get(&canonical) {
      return Ok(Some(handle.type_key()));
    }
    Err(ContainerError::NotFound(name.to_string()))
  }

  /// Whether a lookup of `name` can be viewed as `T`, exposed views
  /// included.
  pub fn is_type_match<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<bool> {
    let key = TypeKey::of::<T>();
    let (stripped, prefixed) = strip_factory_prefix(name);
    let canonical = self.definitions.canonical_name(stripped);
    if let Ok(merged) = self.definitions.merged(&canonical) {
      if prefixed {
        return Ok(merged.type_key() == Some(key));
      }
      return Ok(merged.satisfies(&key));
    }
    if let Some(handle) = self.singletons.get(&canonical) {
      return Ok(handle.type_key() == key);
    }
    Err(ContainerError::NotFound(name.to_string()))
  }

  pub fn aliases_of(&self, name: &str) -> Vec<String> {
    self.definitions.aliases_of(name)
  }

  pub fn is_alias(&self, name: &str) -> bool {
    self.definitions.is_alias(name)
  }

  /// Definition names in declaration order.
  pub fn names(&self) -> Vec<String> {
    self.definitions.names()
  }

  pub fn count(&self) -> usize {
    self.definitions.count()
  }

  // --- Lifecycle ---

  /// Eagerly creates every non-lazy singleton in declaration order.
  /// Factory-backed definitions create the factory component itself.
  pub fn preinstantiate_singletons(&self) -> Result<()> {
    self.ensure_open()?;
    for name in self.definitions.names() {
      let merged = self.definitions.merged(&name)?;
      if merged.is_abstract() || !merged.is_singleton() || merged.is_lazy() {
        continue;
      }
      if merged.is_factory() {
        self.get(&format!("{}{}", FACTORY_PREFIX, name))?;
      } else {
        self.get(&name)?;
      }
    }
    Ok(())
  }

  /// Destroys every cached singleton in reverse dependency order and
  /// transitions the container to a terminal state in which all further
  /// lookups fail with [`ContainerError::ContainerClosed`]. Idempotent.
  pub fn shutdown(&self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    log::debug!("shutting down container, destroying {} singleton(s)", self.singletons.count());
    self.factory_products.clear();
    let definitions = &self.definitions;
    self.singletons.destroy_all(|name| {
      definitions
        .merged(name)
        .ok()
        .and_then(|merged| merged.destroy_hook.clone())
    });
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  // --- Internals ---

  fn ensure_open(&self) -> Result<()> {
    if self.is_closed() {
      return Err(ContainerError::ContainerClosed);
    }
    Ok(())
  }

  pub(crate) fn definitions(&self) -> &DefinitionRegistry {
    &self.definitions
  }

  pub(crate) fn singletons(&self) -> &SingletonRegistry {
    &self.singletons
  }

  /// Fetches `name` for the resolver and applies the exposed-view cast
  /// when the candidate matched through a binding rather than directly.
  pub(crate) fn candidate_handle(&self, name: &str, key: &TypeKey) -> Result<ComponentHandle> {
    let handle = self.get(name)?;
    if handle.type_key() == *key {
      return Ok(handle);
    }
    if let Ok(merged) = self.definitions.merged(name) {
      if let Some(binding) = merged.binding_for(key) {
        if let Some(view) = (binding.cast)(&handle) {
          return Ok(view);
        }
      }
    }
    Err(ContainerError::TypeMismatch {
      name: name.to_string(),
      actual: handle.type_key().name().to_string(),
      requested: key.name().to_string(),
    })
  }

  /// Routes a created or cached handle to what the caller addressed: the
  /// factory component for `&`-prefixed names, the (possibly cached)
  /// product for unprefixed factory-backed names, the handle itself
  /// otherwise.
  fn finish_lookup(&self, canonical: &str, handle: ComponentHandle, prefixed: bool) -> Result<ComponentHandle> {
    let adapter = self
      .definitions
      .merged(canonical)
      .ok()
      .and_then(|merged| merged.factory.clone());
    match (prefixed, adapter) {
      (true, Some(_)) => Ok(handle),
      (true, None) => Err(ContainerError::TypeMismatch {
        name: format!("{}{}", FACTORY_PREFIX, canonical),
        actual: handle.type_key().name().to_string(),
        requested: "a factory component".to_string(),
      }),
      (false, Some(adapter)) => self.product_from_factory(canonical, &handle, &adapter),
      (false, None) => Ok(handle),
    }
  }

  fn product_from_factory(
    &self,
    name: &str,
    factory: &ComponentHandle,
    adapter: &FactoryAdapter,
  ) -> Result<ComponentHandle> {
    if (adapter.singleton_product)(factory) {
      if let Some(cached) = self.factory_products.get(name).map(|entry| entry.value().clone()) {
        return Ok(cached);
      }
      let product = (adapter.produce)(factory, self)?;
      let product = processor::apply_after_init(&self.processors.read().clone(), product, name)?;
      // First completed production wins; a concurrent duplicate is dropped.
      let entry = self.factory_products.entry(name.to_string()).or_insert(product);
      Ok(entry.value().clone())
    } else {
      let product = (adapter.produce)(factory, self)?;
      processor::apply_after_init(&self.processors.read().clone(), product, name)
    }
  }

  /// The build algorithm: declared dependencies, constructor arguments,
  /// instantiation, early exposure, property population, then the
  /// initialization pipeline.
  fn build_component(&self, name: &str, merged: &MergedDefinition) -> Result<ComponentHandle> {
    log::debug!("creating component `{name}`");

    for declared in merged.depends_on() {
      let dependency = self.definitions.canonical_name(declared);
      if !self.definitions.contains(&dependency) && !self.singletons.contains(&dependency) {
        return Err(ContainerError::NoMatchingComponent {
          requester: name.to_string(),
          type_name: format!("declared dependency `{declared}`"),
        });
      }
      if self.singletons.is_dependent(name, &dependency) {
        return Err(ContainerError::CircularDependency {
          path: vec![name.to_string(), dependency.clone(), name.to_string()],
        });
      }
      self.singletons.record_dependent(&dependency, name);
      self.get(&dependency)?;
    }

    let args = self.resolve_constructor_args(name, merged)?;
    let strategy = self.strategy.read().clone();
    let raw = strategy.instantiate(merged, &args, self)?;

    if merged.is_singleton() {
      // From here on a re-entrant request from this build chain receives
      // the raw instance, which is what lets property cycles close.
      self.singletons.expose_early(name, raw.clone());
      log::trace!("exposed provisional instance of `{name}`");
    }

    for binding in &merged.properties {
      let resolved = self.resolve_source(name, &binding.source)?;
      (binding.apply)(&raw, resolved).map_err(|error| ContainerError::Initialization {
        name: name.to_string(),
        reason: format!("applying property `{}`: {error}", binding.name),
      })?;
    }

    let processors = self.processors.read().clone();
    let mut instance = processor::apply_before_init(&processors, raw, name)?;
    if let Some(hook) = &merged.init_hook {
      hook.invoke(&instance).map_err(|error| ContainerError::Initialization {
        name: name.to_string(),
        reason: format!("init hook `{}`: {error}", hook.name()),
      })?;
    }
    instance = processor::apply_after_init(&processors, instance, name)?;
    Ok(instance)
  }

  fn resolve_constructor_args(&self, name: &str, merged: &MergedDefinition) -> Result<Arguments> {
    let len = merged
      .constructor_args
      .iter()
      .map(|arg| arg.index + 1)
      .max()
      .unwrap_or(0);
    let mut values = Vec::with_capacity(len);
    values.resize_with(len, || Resolved::None);
    for arg in &merged.constructor_args {
      values[arg.index] = self.resolve_source(name, &arg.source)?;
    }
    Ok(Arguments::new(name, values))
  }

  pub(crate) fn resolve_source(&self, requester: &str, source: &ValueSource) -> Result<Resolved> {
    match source {
      ValueSource::Value(handle) => Ok(Resolved::One(handle.clone())),
      ValueSource::Ref(target) => {
        let canonical = self.definitions.canonical_name(target);
        let handle = self.get(&canonical)?;
        self.singletons.record_dependent(&canonical, requester);
        Ok(Resolved::One(handle))
      }
      ValueSource::Autowired(request) => {
        resolver::resolve(self, request, Some(requester)).map(|resolution| resolution.value)
      }
    }
  }
}

impl Drop for Container {
  fn drop(&mut self) {
    self.shutdown();
  }
}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("definitions", &self.definitions.count())
      .field("singletons", &self.singletons.count())
      .field("closed", &self.is_closed())
      .finish_non_exhaustive()
  }
}

/// Strips every leading factory prefix, reporting whether any was present.
fn strip_factory_prefix(name: &str) -> (&str, bool) {
  let mut stripped = name;
  let mut prefixed = false;
  while let Some(rest) = stripped.strip_prefix(FACTORY_PREFIX) {
    stripped = rest;
    prefixed = true;
  }
  (stripped, prefixed)
}
