//! Autowiring: candidate enumeration, tie-breaking, and aggregate
//! collection for one injection point.

use crate::container::Container;
use crate::definition::{ComponentHandle, TypeKey};
use crate::error::{ContainerError, Result};

/// Describes one injection point to be satisfied by type: the required
/// type, whether it is mandatory, an optional name qualifier used as a
/// tie-breaker, and whether every candidate should be aggregated instead
/// of tie-broken.
#[derive(Clone, Debug)]
pub struct DependencyRequest {
  pub(crate) type_key: TypeKey,
  pub(crate) required: bool,
  pub(crate) hint: Option<String>,
  pub(crate) aggregate: bool,
  pub(crate) allow_self: bool,
}

impl DependencyRequest {
  pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
    Self {
      type_key: TypeKey::of::<T>(),
      required: true,
      hint: None,
      aggregate: false,
      allow_self: false,
    }
  }

  /// An unsatisfied optional point resolves to nothing instead of failing.
  pub fn optional(mut self) -> Self {
    self.required = false;
    self
  }

  /// Prefers the candidate with this name when type matching alone is
  /// ambiguous.
  pub fn qualified(mut self, name: impl Into<String>) -> Self {
    self.hint = Some(name.into());
    self
  }

  /// Collects every surviving candidate, in declaration order, instead of
  /// applying ambiguity rules.
  pub fn aggregate(mut self) -> Self {
    self.aggregate = true;
    self
  }

  /// Permits the requesting component itself to be selected.
  pub fn allow_self(mut self) -> Self {
    self.allow_self = true;
    self
  }

  pub fn type_key(&self) -> TypeKey {
    self.type_key
  }
}

/// The outcome of resolving one injection point.
#[derive(Clone, Debug)]
pub(crate) enum Resolved {
  One(ComponentHandle),
  Many(Vec<ComponentHandle>),
  None,
}

pub(crate) struct Resolution {
  pub(crate) value: Resolved,
  pub(crate) contributors: Vec<String>,
}

/// Resolves `request` on behalf of `requester` (when known), fetching the
/// chosen candidates through the container and recording the dependent
/// edges for destruction ordering.
pub(crate) fn resolve(
  container: &Container,
  request: &DependencyRequest,
  requester: Option<&str>,
) -> Result<Resolution> {
  let names = candidates(container, request, requester);

  if request.aggregate {
    if names.is_empty() && request.required {
      return Err(no_match(request, requester));
    }
    let mut handles = Vec::with_capacity(names.len());
    let mut contributors = Vec::with_capacity(names.len());
    for name in names {
      handles.push(fetch(container, &name, request, requester)?);
      contributors.push(name);
    }
    return Ok(Resolution {
      value: Resolved::Many(handles),
      contributors,
    });
  }

  let chosen = match names.len() {
    0 => {
      if request.required {
        return Err(no_match(request, requester));
      }
      return Ok(Resolution {
        value: Resolved::None,
        contributors: Vec::new(),
      });
    }
    1 => names.into_iter().next().unwrap_or_default(),
    _ => tie_break(container, names, request, requester)?,
  };

  let handle = fetch(container, &chosen, request, requester)?;
  Ok(Resolution {
    value: Resolved::One(handle),
    contributors: vec![chosen],
  })
}

/// Step one of the algorithm: every registered, non-abstract,
/// autowirable definition (plus manually registered singletons) whose
/// exposed type matches, in declaration order, minus the requester itself
/// and anything excluded from inference.
fn candidates(container: &Container, request: &DependencyRequest, requester: Option<&str>) -> Vec<String> {
  let mut out = Vec::new();
  for name in container.definitions().names() {
    if Some(name.as_str()) == requester && !request.allow_self {
      continue;
    }
    if container.singletons().is_excluded(&name) {
      continue;
    }
    // A candidate whose own parent chain is broken is skipped here; it
    // fails with a precise error at its own first use instead.
    let merged = match container.definitions().merged(&name) {
      Ok(merged) => merged,
      Err(error) => {
        log::trace!("skipping unmergeable candidate `{name}`: {error}");
        continue;
      }
    };
    if merged.is_abstract() || !merged.is_autowire_candidate() {
      continue;
    }
    if merged.satisfies(&request.type_key) {
      out.push(name);
    }
  }
  for name in container.singletons().manual_names() {
    if Some(name.as_str()) == requester && !request.allow_self {
      continue;
    }
    if container.singletons().is_excluded(&name) || container.definitions().contains(&name) {
      continue;
    }
    if let Some(handle) = container.singletons().get(&name) {
      if handle.type_key() == request.type_key {
        out.push(name);
      }
    }
  }
  out
}

/// Step three: a unique `primary` flag wins; failing that, a unique name
/// match against the request's qualifier; anything else is ambiguous.
fn tie_break(
  container: &Container,
  names: Vec<String>,
  request: &DependencyRequest,
  requester: Option<&str>,
) -> Result<String> {
  let mut primaries: Vec<&String> = Vec::new();
  for name in &names {
    let primary = container
      .definitions()
      .merged(name)
      .map(|merged| merged.is_primary())
      .unwrap_or(false);
    if primary {
      primaries.push(name);
    }
  }
  match primaries.len() {
    1 => return Ok(primaries[0].clone()),
    n if n > 1 => {
      return Err(ContainerError::AmbiguousComponent {
        requester: requester.unwrap_or("<caller>").to_string(),
        type_name: request.type_key.name().to_string(),
        candidates: primaries.into_iter().cloned().collect(),
      })
    }
    _ => {}
  }

  if let Some(hint) = &request.hint {
    let canonical = container.definitions().canonical_name(hint);
    if let Some(matched) = names.iter().find(|name| **name == canonical) {
      return Ok(matched.clone());
    }
  }

  Err(ContainerError::AmbiguousComponent {
    requester: requester.unwrap_or("<caller>").to_string(),
    type_name: request.type_key.name().to_string(),
    candidates: names,
  })
}

/// Step four: retrieval through the facade, re-entering the creation
/// protocol, with the view cast applied when the candidate matched through
/// an exposed binding.
fn fetch(
  container: &Container,
  name: &str,
  request: &DependencyRequest,
  requester: Option<&str>,
) -> Result<ComponentHandle> {
  let handle = container.candidate_handle(name, &request.type_key)?;
  if let Some(requester) = requester {
    container.singletons().record_dependent(name, requester);
  }
  Ok(handle)
}

fn no_match(request: &DependencyRequest, requester: Option<&str>) -> ContainerError {
  ContainerError::NoMatchingComponent {
    requester: requester.unwrap_or("<caller>").to_string(),
    type_name: request.type_key.name().to_string(),
  }
}
