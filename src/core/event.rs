//! Change events passed from watchers to the dispatcher.

use crate::error::WatchError;
use std::fmt;

/// Signal that the watched key (or one of its values) changed.
///
/// Carries no description of what changed. The final event of a failed
/// watcher carries the error that ended it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    sequence: u64,
    error: Option<WatchError>,
}

impl ChangeEvent {
    /// A successful notification.
    pub fn changed(sequence: u64) -> Self {
        Self {
            sequence,
            error: None,
        }
    }

    /// A notification that failed.
    pub fn failed(sequence: u64, error: WatchError) -> Self {
        Self {
            sequence,
            error: Some(error),
        }
    }

    /// Position of this event in its watcher's output, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The error carried by this event, if any.
    pub fn error(&self) -> Option<&WatchError> {
        self.error.as_ref()
    }

    /// Whether this event carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            None => write!(f, "change #{}", self.sequence),
            Some(err) => write!(f, "change #{} (error: {})", self.sequence, err),
        }
    }
}
