//! Watch configuration: target key, poll interval and source tuning.

mod loader;
mod validation;

pub use loader::ConfigLoader;
pub use validation::Validate;

use crate::core::{NotifyFilter, RegistryRoot, WatchTarget};
use crate::error::ValidationError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Key watched when nothing else is configured.
pub const DEFAULT_KEY_PATH: &str = r"SOFTWARE\Wow6432Node\SAAZOD\ManagedPosix";

/// Upper bound for `poll_interval_ms`.
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;

const MAX_KEY_NAME_LEN: usize = 255;

/// Settings for a single watch.
///
/// Every field has a default, so an empty file or no file at all is valid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Key to monitor, e.g. `HKLM\SOFTWARE\Example`.
    pub target: WatchTarget,
    /// Longest time a watcher blocks before re-checking cancellation.
    pub poll_interval_ms: u64,
    /// Also report changes in subkeys.
    pub watch_subtree: bool,
    /// Raw `REG_NOTIFY_CHANGE_*` mask.
    pub notify_filter: u32,
    /// Buffer size of the watcher to dispatcher channel.
    pub channel_capacity: usize,
    /// Base directory for the filesystem-backed source.
    pub fs_root: Option<PathBuf>,
}

impl WatchConfig {
    /// Poll interval as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The notification filter, or the default one if the mask is invalid.
    pub fn filter(&self) -> NotifyFilter {
        NotifyFilter::from_bits(self.notify_filter).unwrap_or_default()
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            target: WatchTarget::new(RegistryRoot::LocalMachine, DEFAULT_KEY_PATH),
            poll_interval_ms: 1_000,
            watch_subtree: true,
            notify_filter: NotifyFilter::default().bits(),
            channel_capacity: 16,
            fs_root: None,
        }
    }
}

impl Validate for WatchConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.poll_interval_ms == 0 || self.poll_interval_ms > MAX_POLL_INTERVAL_MS {
            errors.push(ValidationError::invalid_field(
                "poll_interval_ms",
                format!("must be between 1 and {}", MAX_POLL_INTERVAL_MS),
            ));
        }

        if self.channel_capacity == 0 {
            errors.push(ValidationError::invalid_field(
                "channel_capacity",
                "must be greater than 0",
            ));
        }

        if NotifyFilter::from_bits(self.notify_filter).is_none() {
            errors.push(ValidationError::invalid_field(
                "notify_filter",
                format!(
                    "{:#x} must be a non-empty combination of {}",
                    self.notify_filter,
                    NotifyFilter::ALL.describe()
                ),
            ));
        }

        if let Some(segment) = self
            .target
            .segments()
            .find(|s| s.chars().count() > MAX_KEY_NAME_LEN)
        {
            errors.push(ValidationError::invalid_field(
                "target",
                format!(
                    "key name '{}...' exceeds {} characters",
                    segment.chars().take(16).collect::<String>(),
                    MAX_KEY_NAME_LEN
                ),
            ));
        }

        match ValidationError::collect(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
