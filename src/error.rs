//! Unified error type for jp2derive.
//!
//! Every failure mode gets its own variant so callers can react to the
//! classification rather than parsing messages: a timed-out encoder is not
//! the same thing as an encoder that ran and failed, and neither is a
//! directive that was misconfigured before anything was spawned.

use std::time::Duration;

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while producing a derivative.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external tool could not be located.
    #[error("tool not found: {tool}; is it installed and in PATH?")]
    ToolNotFound {
        /// Name of the missing tool.
        tool: String,
    },

    /// The encoder process could not be spawned (missing executable,
    /// permission denied). Raised before any timeout logic applies.
    #[error("failed to spawn \"{command}\": {source}")]
    Spawn {
        /// The command line that failed to start.
        command: String,
        /// The underlying spawn error.
        source: std::io::Error,
    },

    /// The encoder ran past its wall-clock deadline and was killed.
    #[error("command \"{command}\" timed out after {timeout:?}")]
    Timeout {
        /// The command line that was killed.
        command: String,
        /// The configured deadline.
        timeout: Duration,
    },

    /// The encoder ran to completion but reported failure.
    #[error("command \"{command}\" exited with {status}: {stderr}")]
    ExitStatus {
        /// The command line that failed.
        command: String,
        /// The non-zero exit status.
        status: std::process::ExitStatus,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// The caller aborted the invocation through its cancellation token.
    #[error("command \"{command}\" was cancelled")]
    Cancelled {
        /// The command line that was aborted.
        command: String,
    },

    /// A directive is missing a required option (e.g. target format).
    /// Raised before any file is staged or process spawned.
    #[error("configuration error: {0}")]
    Config(String),

    /// Image decoding or metadata extraction failed.
    #[error("image inspection failed: {0}")]
    Inspect(String),

    /// Temp-space staging failed.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Convenience constructor for [`Error::ToolNotFound`].
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Error::ToolNotFound { tool: tool.into() }
    }

    /// Convenience constructor for [`Error::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Convenience constructor for [`Error::Inspect`].
    pub fn inspect(message: impl Into<String>) -> Self {
        Error::Inspect(message.into())
    }

    /// Convenience constructor for [`Error::Workspace`].
    pub fn workspace(message: impl Into<String>) -> Self {
        Error::Workspace(message.into())
    }
}
