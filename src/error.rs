//! Error types for regwatch.

use std::fmt;

/// Result type alias for regwatch operations.
pub type Result<T> = std::result::Result<T, WatchError>;

/// Errors that can occur while watching a key.
///
/// The type is `Clone` so a fatal error can travel inside a
/// [`ChangeEvent`](crate::core::ChangeEvent) to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    /// The key path is invalid or inaccessible. Fatal before the watch loop starts.
    #[error("Failed to open {target}: {reason}")]
    OpenError {
        /// Display form of the watch target
        target: String,
        /// Underlying OS or source message
        reason: String,
    },

    /// The native wait call failed. Fatal to the watcher instance.
    #[error("Change notification failed on {target}: {reason}")]
    NotifyError {
        /// Display form of the watch target
        target: String,
        /// Underlying OS or source message
        reason: String,
    },

    /// Releasing the key handle failed. Logged, never propagated.
    #[error("Failed to release handle for {target}: {reason}")]
    HandleCloseError {
        /// Display form of the watch target
        target: String,
        /// Underlying OS or source message
        reason: String,
    },

    /// Failed to load or parse configuration.
    #[error("Failed to load configuration: {0}")]
    ConfigError(String),

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// The process interrupt handler was already installed.
    #[error("Interrupt handler already installed")]
    HandlerInstalled,

    /// No change source exists for this platform and feature set.
    #[error("No change source available: {0}")]
    SourceUnavailable(String),

    /// A watcher or dispatcher task panicked or was aborted.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl WatchError {
    /// Create an open error for `target`.
    pub fn open(target: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::OpenError {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a notification error for `target`.
    pub fn notify(target: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::NotifyError {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a handle release error for `target`.
    pub fn handle_close(target: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::HandleCloseError {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Validation error for configuration validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: `None` when empty, the sole error when
    /// there is one, `Multiple` otherwise.
    pub fn collect(mut errors: Vec<ValidationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for WatchError {
    fn from(err: ValidationError) -> Self {
        WatchError::ValidationError(err.to_string())
    }
}

impl From<config::ConfigError> for WatchError {
    fn from(err: config::ConfigError) -> Self {
        WatchError::ConfigError(err.to_string())
    }
}
