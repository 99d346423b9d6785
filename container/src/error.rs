use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors produced by the container.
///
/// The enum is `Clone` on purpose: when several threads wait on the same
/// in-flight singleton build, a failure must be delivered to every one of
/// them, not just the thread that ran the build.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContainerError {
  /// No component or alias is registered under the given name.
  #[error("no component named `{0}` is registered")]
  NotFound(String),

  /// A definition (or alias) is malformed, conflicts with an existing
  /// registration, or its parent chain cannot be flattened.
  #[error("invalid registration for `{name}`: {reason}")]
  InvalidRegistration { name: String, reason: String },

  /// The instantiation strategy could not produce a raw instance.
  #[error("failed to instantiate component `{name}`: {reason}")]
  Instantiation { name: String, reason: String },

  /// A post-processor or init hook rejected the instance.
  #[error("initialization of component `{name}` failed: {reason}")]
  Initialization { name: String, reason: String },

  /// An unresolvable creation cycle, e.g. two components that require each
  /// other through their constructors. The path lists every component on
  /// the cycle in request order, ending with the repeated name.
  #[error("circular dependency between components: {}", .path.join(" -> "))]
  CircularDependency { path: Vec<String> },

  /// A required dependency had no matching candidate.
  #[error("no component of type `{type_name}` available for `{requester}`")]
  NoMatchingComponent { requester: String, type_name: String },

  /// More than one candidate survived tie-breaking for a single-valued
  /// injection point.
  #[error("ambiguous dependency of type `{type_name}` for `{requester}`: candidates {candidates:?}")]
  AmbiguousComponent {
    requester: String,
    type_name: String,
    candidates: Vec<String>,
  },

  /// The named component exists but cannot be viewed as the requested type.
  #[error("component `{name}` has type `{actual}`, which cannot be viewed as `{requested}`")]
  TypeMismatch {
    name: String,
    actual: String,
    requested: String,
  },

  /// The container has been shut down; no further lookups are served.
  #[error("container has been shut down")]
  ContainerClosed,
}
