//! Scheduler error types.

use thiserror::Error;

use gangway_framework::FrameworkError;
use gangway_plugins::PluginError;

/// Result type alias for scheduler operations.
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Errors that can occur while driving placement cycles.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown plugin {0} in scheduler profile")]
    UnknownPlugin(String),

    #[error("score plugin {0} has weight outside [1, 100]")]
    InvalidPluginWeight(String),

    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("framework error: {0}")]
    Framework(#[from] FrameworkError),

    #[error("decision sink error: {0}")]
    Sink(String),
}
