//! The singleton cache and its creation coordinator: per-name creation
//! gates with parked waiters, same-thread re-entrance tracking, early
//! exposure for property cycles, dependent tracking, and reverse-order
//! destruction.

use crate::definition::{ComponentHandle, LifecycleHook};
use crate::error::{ContainerError, Result};

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, Thread};

use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;

type FastMap<K, V> = HashMap<K, V, RandomState>;
type FastSet<T> = HashSet<T, RandomState>;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
  // The ordered chain of component names this thread is currently building,
  // tagged with the owning registry so independent containers sharing a
  // thread cannot see each other's frames. This is the key to telling a
  // same-thread re-entrant request (a dependency cycle) apart from another
  // thread's concurrent request (which waits instead).
  static CREATION_STACK: RefCell<Vec<(u64, String)>> = RefCell::new(Vec::new());
}

/// Returns the cycle path if `name` is already being built by the current
/// thread: every frame from the first occurrence of `name` to the top of
/// the stack, with the repeated name appended.
pub(crate) fn cycle_path(registry: u64, name: &str) -> Option<Vec<String>> {
  CREATION_STACK.with(|stack| {
    let stack = stack.borrow();
    let mut path: Vec<String> = stack
      .iter()
      .filter(|(owner, _)| *owner == registry)
      .map(|(_, frame)| frame.clone())
      .collect();
    let first = path.iter().position(|frame| frame == name)?;
    path.drain(..first);
    path.push(name.to_string());
    Some(path)
  })
}

/// An RAII frame on the thread-local creation stack. Entering a name that
/// is already on the stack is a creation cycle and fails with the full
/// path; the frame is popped when the guard drops, including on the error
/// paths of a build.
pub(crate) struct CreationGuard {
  _registry: u64,
}

impl CreationGuard {
  pub(crate) fn enter(registry: u64, name: &str) -> Result<Self> {
    if let Some(path) = cycle_path(registry, name) {
      return Err(ContainerError::CircularDependency { path });
    }
    CREATION_STACK.with(|stack| {
      stack.borrow_mut().push((registry, name.to_string()));
    });
    Ok(Self {
      _registry: registry,
    })
  }
}

impl Drop for CreationGuard {
  fn drop(&mut self) {
    CREATION_STACK.with(|stack| {
      stack.borrow_mut().pop();
    });
  }
}

enum GateState {
  Building,
  Done(ComponentHandle),
  Failed(ContainerError),
}

struct GateInner {
  state: GateState,
  waiters: Vec<Thread>,
}

/// The synchronization point for one in-flight singleton build. The thread
/// that created the gate runs the build; every other thread parks here and
/// is woken with the result, success or failure.
struct CreationGate {
  inner: Mutex<GateInner>,
}

impl CreationGate {
  fn new() -> Self {
    Self {
      inner: Mutex::new(GateInner {
        state: GateState::Building,
        waiters: Vec::new(),
      }),
    }
  }

  fn complete(&self, handle: ComponentHandle) {
    let mut inner = self.inner.lock();
    inner.state = GateState::Done(handle);
    for waiter in inner.waiters.drain(..) {
      waiter.unpark();
    }
  }

  fn fail(&self, error: ContainerError) {
    let mut inner = self.inner.lock();
    inner.state = GateState::Failed(error);
    for waiter in inner.waiters.drain(..) {
      waiter.unpark();
    }
  }

  /// Blocks the calling thread until the build completes or fails. Parked
  /// threads may wake spuriously, so the state is re-checked in a loop.
  fn wait(&self) -> Result<ComponentHandle> {
    let mut inner = self.inner.lock();
    loop {
      match &inner.state {
        GateState::Done(handle) => return Ok(handle.clone()),
        GateState::Failed(error) => return Err(error.clone()),
        GateState::Building => {
          inner.waiters.push(thread::current());
          drop(inner); // unlock before parking
          thread::park();
          inner = self.inner.lock();
        }
      }
    }
  }
}

/// Owns every shared instance for the lifetime of the container.
pub(crate) struct SingletonRegistry {
  id: u64,
  /// Completed singletons; entries are inserted exactly once and never
  /// overwritten.
  singletons: DashMap<String, ComponentHandle, RandomState>,
  /// Raw instances exposed mid-build so property-based cycles can close.
  early: DashMap<String, ComponentHandle, RandomState>,
  /// One gate per name currently being built; membership is the
  /// cross-thread in-creation set.
  in_flight: Mutex<FastMap<String, Arc<CreationGate>>>,
  /// Completion order, for reverse-order destruction.
  creation_order: Mutex<Vec<String>>,
  /// Insertion order of externally registered instances.
  manual_order: Mutex<Vec<String>>,
  /// contributing name -> names that depend on it.
  dependents: Mutex<FastMap<String, Vec<String>>>,
  /// Names withheld from autowiring candidate enumeration.
  excluded: Mutex<FastSet<String>>,
}

impl SingletonRegistry {
  pub(crate) fn new() -> Self {
    Self {
      id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
      singletons: DashMap::with_hasher(RandomState::new()),
      early: DashMap::with_hasher(RandomState::new()),
      in_flight: Mutex::new(FastMap::default()),
      creation_order: Mutex::new(Vec::new()),
      manual_order: Mutex::new(Vec::new()),
      dependents: Mutex::new(FastMap::default()),
      excluded: Mutex::new(FastSet::default()),
    }
  }

  pub(crate) fn id(&self) -> u64 {
    self.id
  }

  pub(crate) fn get(&self, name: &str) -> Option<ComponentHandle> {
    self.singletons.get(name).map(|entry| entry.value().clone())
  }

  pub(crate) fn contains(&self, name: &str) -> bool {
    self.singletons.contains_key(name)
  }

  pub(crate) fn count(&self) -> usize {
    self.singletons.len()
  }

  pub(crate) fn manual_names(&self) -> Vec<String> {
    self.manual_order.lock().clone()
  }

  /// Registers a pre-built instance. Once a name holds an instance it can
  /// never be replaced, and a name mid-build cannot be usurped.
  pub(crate) fn register(&self, name: &str, handle: ComponentHandle) -> Result<()> {
    {
      let in_flight = self.in_flight.lock();
      if in_flight.contains_key(name) {
        return Err(ContainerError::InvalidRegistration {
          name: name.to_string(),
          reason: "component is currently being created".to_string(),
        });
      }
      if self.singletons.contains_key(name) {
        return Err(ContainerError::InvalidRegistration {
          name: name.to_string(),
          reason: "a singleton instance is already registered under this name".to_string(),
        });
      }
      self.singletons.insert(name.to_string(), handle);
    }
    self.manual_order.lock().push(name.to_string());
    Ok(())
  }

  pub(crate) fn expose_early(&self, name: &str, handle: ComponentHandle) {
    self.early.insert(name.to_string(), handle);
  }

  pub(crate) fn early(&self, name: &str) -> Option<ComponentHandle> {
    self.early.get(name).map(|entry| entry.value().clone())
  }

  /// The at-most-once creation protocol. The fast path reads the cache;
  /// otherwise one caller is elected leader under the bookkeeping lock and
  /// runs `build` with no lock held, while every other caller parks on the
  /// gate. A failed build evicts the gate so a later request may retry.
  pub(crate) fn get_or_create<F>(&self, name: &str, build: F) -> Result<ComponentHandle>
  where
    F: FnOnce() -> Result<ComponentHandle>,
  {
    if let Some(handle) = self.get(name) {
      return Ok(handle);
    }

    let (gate, leader) = {
      let mut in_flight = self.in_flight.lock();
      // Re-check under the lock: the build may have completed between the
      // optimistic read above and acquiring the lock.
      if let Some(handle) = self.get(name) {
        return Ok(handle);
      }
      match in_flight.get(name) {
        Some(existing) => (existing.clone(), false),
        None => {
          let gate = Arc::new(CreationGate::new());
          in_flight.insert(name.to_string(), gate.clone());
          (gate, true)
        }
      }
    };

    if !leader {
      return gate.wait();
    }

    let result = build();
    match result {
      Ok(handle) => {
        // Publish before evicting the gate: a caller arriving in between
        // sees either the cached instance or the still-live gate, never a
        // window that would elect a second leader.
        self.singletons.insert(name.to_string(), handle.clone());
        self.creation_order.lock().push(name.to_string());
        self.in_flight.lock().remove(name);
        self.early.remove(name);
        gate.complete(handle.clone());
        log::debug!("created singleton `{name}`");
        Ok(handle)
      }
      Err(error) => {
        self.in_flight.lock().remove(name);
        self.early.remove(name);
        gate.fail(error.clone());
        Err(error)
      }
    }
  }

  pub(crate) fn exclude(&self, name: &str) {
    self.excluded.lock().insert(name.to_string());
  }

  pub(crate) fn include(&self, name: &str) {
    self.excluded.lock().remove(name);
  }

  pub(crate) fn is_excluded(&self, name: &str) -> bool {
    self.excluded.lock().contains(name)
  }

  /// Records `dependent` as depending on `contributor`, driving both
  /// declared-dependency cycle detection and destruction order.
  pub(crate) fn record_dependent(&self, contributor: &str, dependent: &str) {
    let mut dependents = self.dependents.lock();
    let entry = dependents.entry(contributor.to_string()).or_default();
    if !entry.iter().any(|existing| existing == dependent) {
      entry.push(dependent.to_string());
    }
  }

  /// Does `candidate` (transitively) depend on `name`?
  pub(crate) fn is_dependent(&self, name: &str, candidate: &str) -> bool {
    let dependents = self.dependents.lock();
    let mut visited = FastSet::default();
    walk_dependents(&dependents, name, candidate, &mut visited)
  }

  /// Destroys every cached singleton in reverse completion order, with
  /// dependents destroyed before the components they depend on. A failing
  /// destroy hook is logged and never stops the remaining destruction.
  pub(crate) fn destroy_all<F>(&self, hook_for: F)
  where
    F: Fn(&str) -> Option<LifecycleHook>,
  {
    let created = {
      let mut order = self.creation_order.lock();
      std::mem::take(&mut *order)
    };
    for name in created.iter().rev() {
      self.destroy_singleton(name, &hook_for);
    }
    let manual = {
      let mut order = self.manual_order.lock();
      std::mem::take(&mut *order)
    };
    for name in manual.iter().rev() {
      self.destroy_singleton(name, &hook_for);
    }
    self.singletons.clear();
    self.early.clear();
    self.dependents.lock().clear();
  }

  fn destroy_singleton<F>(&self, name: &str, hook_for: &F)
  where
    F: Fn(&str) -> Option<LifecycleHook>,
  {
    // Removal doubles as the re-entrance guard for mutually dependent
    // components: the second visit finds nothing and returns.
    let handle = match self.singletons.remove(name) {
      Some((_, handle)) => handle,
      None => return,
    };
    let dependents = self
      .dependents
      .lock()
      .get(name)
      .cloned()
      .unwrap_or_default();
    for dependent in dependents.iter().rev() {
      self.destroy_singleton(dependent, hook_for);
    }
    if let Some(hook) = hook_for(name) {
      log::debug!("running destroy hook `{}` for `{name}`", hook.name());
      if let Err(error) = hook.invoke(&handle) {
        log::warn!("destroy hook `{}` for `{name}` failed: {error}", hook.name());
      }
    }
  }
}

fn walk_dependents(
  dependents: &FastMap<String, Vec<String>>,
  name: &str,
  candidate: &str,
  visited: &mut FastSet<String>,
) -> bool {
  if !visited.insert(name.to_string()) {
    return false;
  }
  match dependents.get(name) {
    Some(direct) => direct
      .iter()
      .any(|d| d == candidate || walk_dependents(dependents, d, candidate, visited)),
    None => false,
  }
}
