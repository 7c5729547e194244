//! Configuration validation support.

use crate::error::ValidationError;

/// Trait for configuration validation.
///
/// [`ConfigLoader`](super::ConfigLoader) runs it on every loaded
/// configuration, so an invalid file or environment never reaches a watcher.
///
/// # Examples
///
/// ```rust
/// use regwatch::error::ValidationError;
/// use regwatch::settings::{Validate, WatchConfig};
///
/// let mut config = WatchConfig::default();
/// assert!(config.validate().is_ok());
///
/// config.poll_interval_ms = 0;
/// assert!(config.validate().is_err());
/// ```
pub trait Validate {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Should return a `ValidationError` describing what validation failed.
    fn validate(&self) -> Result<(), ValidationError>;
}
