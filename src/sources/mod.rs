//! Change source implementations.
//!
//! A [`ChangeSource`] opens a [`WatchTarget`] and hands back a
//! [`ChangeHandle`]: a one-shot notification primitive that must be re-armed
//! after every firing.

mod scripted;

#[cfg(feature = "file-watch")]
mod fs;

#[cfg(windows)]
#[allow(unsafe_code)]
mod registry;

pub use scripted::{ScriptCounters, ScriptedSource, Step};

#[cfg(feature = "file-watch")]
pub use fs::FsSource;

#[cfg(windows)]
pub use registry::RegistrySource;

use crate::core::WatchTarget;
use crate::error::Result;
use crate::settings::WatchConfig;
use std::sync::Arc;
use std::time::Duration;

/// Result of one bounded wait on an armed handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The armed request fired. It is spent and must be re-armed.
    Fired,
    /// Nothing happened within the timeout. The request stays armed.
    TimedOut,
}

/// Something that can open a watch target for change notification.
pub trait ChangeSource: Send + Sync {
    /// Open `target` with notify access.
    ///
    /// # Errors
    ///
    /// Returns `OpenError` if the target does not exist or cannot be accessed.
    fn open(&self, target: &WatchTarget) -> Result<Box<dyn ChangeHandle>>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;
}

/// An open target with a one-shot notification primitive.
///
/// Owned by exactly one watcher, which calls [`close`](ChangeHandle::close)
/// exactly once.
pub trait ChangeHandle: Send {
    /// Issue the next one-shot notification request.
    fn arm(&mut self) -> Result<()>;

    /// Block for at most `timeout` waiting for the armed request to fire.
    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome>;

    /// Release the underlying handle.
    fn close(self: Box<Self>) -> Result<()>;
}

/// The change source for the running platform.
///
/// The native registry on Windows; elsewhere the filesystem substitute
/// rooted at `fs_root` (or the working directory).
///
/// # Errors
///
/// Returns `SourceUnavailable` when neither is compiled in.
#[allow(unused_variables)]
pub fn platform_source(config: &WatchConfig) -> Result<Arc<dyn ChangeSource>> {
    #[cfg(windows)]
    {
        Ok(Arc::new(RegistrySource::new(
            config.filter(),
            config.watch_subtree,
        )))
    }

    #[cfg(all(not(windows), feature = "file-watch"))]
    {
        let base = config.fs_root.clone().unwrap_or_else(|| ".".into());
        Ok(Arc::new(FsSource::new(
            base,
            config.filter(),
            config.watch_subtree,
        )))
    }

    #[cfg(all(not(windows), not(feature = "file-watch")))]
    {
        Err(crate::error::WatchError::SourceUnavailable(
            "no registry on this platform and the `file-watch` feature is disabled".to_string(),
        ))
    }
}
