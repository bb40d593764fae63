//! Error types for inwatch

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for watch operations
///
/// Every variant is cheap to clone so the same outcome can be handed to
/// each caller of [`crate::Watch::stop`] and forwarded on the event stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// The watch root is missing, unreadable or not a directory.
    #[error("Cannot watch {}: {reason}", .path.display())]
    Configuration { path: PathBuf, reason: String },

    #[error("Invalid filter pattern: {0}")]
    Pattern(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notifier error: {0}")]
    Notifier(#[from] NotifierError),

    /// The driver task ended without reporting an outcome.
    #[error("Watch aborted: {0}")]
    Aborted(String),
}

/// Fatal conditions reported by the notifier process
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifierError {
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("notifier exited ({status}){}", stderr_suffix(.stderr))]
    Exited { status: String, stderr: Option<String> },

    #[error("unparsable record {line:?}: {reason}")]
    MalformedRecord { line: String, reason: String },

    #[error("I/O error: {0}")]
    Io(String),
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr {
        Some(line) => format!(": {}", line),
        None => String::new(),
    }
}

impl WatchError {
    pub fn configuration(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Configuration {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// True for errors raised by the notifier after the watch went live.
    pub fn is_notifier_fatal(&self) -> bool {
        matches!(self, Self::Notifier(_))
    }
}

impl NotifierError {
    pub fn malformed(line: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            line: line.into(),
            reason: reason.into(),
        }
    }
}

impl From<regex::Error> for WatchError {
    fn from(err: regex::Error) -> Self {
        Self::Pattern(err.to_string())
    }
}

impl From<toml::de::Error> for WatchError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for watch operations
pub type Result<T> = std::result::Result<T, WatchError>;
