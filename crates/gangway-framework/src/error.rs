//! Framework error types.

use thiserror::Error;

/// Result type alias for framework operations.
pub type FrameworkResult<T> = Result<T, FrameworkError>;

/// Errors that can occur in the scheduling framework API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameworkError {
    /// A batch operation on a single-workload unit received a batch of
    /// the wrong size.
    #[error("cannot add {0} pods to a single pod unit")]
    InvalidPodBatch(usize),

    #[error("error reading {key:?} from cycle state: not found")]
    StateKeyNotFound { key: String },

    #[error("cycle state entry {key:?} holds an unexpected data type")]
    StateTypeMismatch { key: String },

    #[error("unknown node {0} in snapshot")]
    UnknownNode(String),
}
