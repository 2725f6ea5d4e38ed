//! Plugin error types.

use thiserror::Error;

use gangway_framework::FrameworkError;

/// Result type alias for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Errors raised by plugin construction and execution.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Argument validation failed; the plugin is never constructed and
    /// the error is not retried.
    #[error("invalid arguments for plugin {plugin}: {reason}")]
    InvalidArgs {
        plugin: &'static str,
        reason: String,
    },

    #[error("failed to parse arguments for plugin {plugin}: {source}")]
    ParseArgs {
        plugin: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Framework(#[from] FrameworkError),
}
