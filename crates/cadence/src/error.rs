//! Error types.
//!
//! Three families, matching how failures surface:
//!
//! - [`BuildError`] — scene construction problems. Fatal: the scene cannot be
//!   built, there is nothing to retry.
//! - [`InvalidIdentity`] — a stale or foreign handle failed to resolve.
//!   Local and recoverable: treat it as "entity no longer exists".
//! - [`WorkerFailure`] — one or more parallel jobs panicked. Reported to the
//!   `dispatch` caller after every sibling range has finished; writes already
//!   made by completed ranges are not rolled back.
//!
//! Nothing in this crate retries automatically.

use thiserror::Error;

use crate::entity::Identity;

/// A scene could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// A system declared a dependency on a type that is not part of the
    /// scene's declared sets.
    #[error("{system} requires {missing}, which is not declared in this scene")]
    MissingDependency {
        system: &'static str,
        missing: &'static str,
    },

    /// The same container or system type was declared twice.
    #[error("{name} is declared more than once")]
    DuplicateDeclaration { name: &'static str },

    /// A system declared a dependency on its own type.
    #[error("{name} cannot depend on its own type")]
    SelfDependency { name: &'static str },
}

/// A handle did not resolve to a live entity.
///
/// Either the entity was removed by a sweep, or the handle was never issued by
/// this container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("identity {index}v{generation} does not resolve to a live entity", index = .0.index(), generation = .0.generation())]
pub struct InvalidIdentity(pub Identity);

/// One or more parallel jobs panicked during a dispatch.
///
/// The pool waits for all ranges to finish before returning this, so the
/// index space was fully visited by the surviving ranges.
#[derive(Debug, Clone, Error)]
#[error("{count} parallel job(s) panicked: {joined}", count = .panics.len(), joined = .panics.join("; "))]
pub struct WorkerFailure {
    /// Panic messages, one per failed range, in completion order.
    pub panics: Vec<String>,
}

/// A configuration file could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_identity_message_names_the_handle() {
        let err = InvalidIdentity(Identity::new(5, 2));
        assert_eq!(
            err.to_string(),
            "identity 5v2 does not resolve to a live entity"
        );
    }

    #[test]
    fn worker_failure_aggregates_messages() {
        let err = WorkerFailure {
            panics: vec!["boom".into(), "bang".into()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 parallel job(s) panicked"));
        assert!(msg.contains("boom; bang"));
    }
}
