//! Error types for the `tor-guard-select` crate.

use tor_error::{ErrorKind, HasKind};

/// An error encountered while picking a guard or fallback candidate from a
/// pool.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PickGuardError {
    /// The pool passed to a [`WeightedChoice`](crate::WeightedChoice)
    /// implementation was empty.
    #[error("tried to pick from an empty list")]
    NoCandidatesAvailable,

    /// An internal programming error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HasKind for PickGuardError {
    fn kind(&self) -> ErrorKind {
        match self {
            PickGuardError::NoCandidatesAvailable => ErrorKind::NoPath,
            PickGuardError::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// An error encountered while constructing or reloading a
/// [`GuardController`](crate::GuardController)'s durable state.
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GuardMgrError {
    /// An error manipulating persistent state.
    #[error("problem accessing persistent guard state")]
    State(#[from] tor_persist::Error),
}

impl HasKind for GuardMgrError {
    fn kind(&self) -> ErrorKind {
        match self {
            GuardMgrError::State(e) => e.kind(),
        }
    }
}
