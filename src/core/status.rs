//! Lock-free view of a watcher's lifecycle state.

use crate::error::WatchError;
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;

/// Lifecycle of a watcher: `Opening -> Watching -> (Stopped | Failed)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchState {
    /// Acquiring the key handle.
    Opening,
    /// Looping on one-shot notification requests.
    Watching,
    /// Cancelled or abandoned by the consumer.
    Stopped,
    /// Ended by a fatal error.
    Failed(WatchError),
}

impl WatchState {
    /// Whether the watcher has exited.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }
}

impl fmt::Display for WatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opening => f.write_str("opening"),
            Self::Watching => f.write_str("watching"),
            Self::Stopped => f.write_str("stopped"),
            Self::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Shared handle to the current [`WatchState`].
///
/// The watcher thread writes; any number of readers load without locking.
#[derive(Debug, Clone)]
pub struct WatchStatus {
    current: Arc<ArcSwap<WatchState>>,
}

impl WatchStatus {
    /// A new status in the `Opening` state.
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(WatchState::Opening)),
        }
    }

    /// Snapshot of the current state.
    pub fn get(&self) -> Arc<WatchState> {
        self.current.load_full()
    }

    pub(crate) fn set(&self, state: WatchState) {
        self.current.store(Arc::new(state));
    }
}

impl Default for WatchStatus {
    fn default() -> Self {
        Self::new()
    }
}
