//! Core watch types.

mod event;
mod status;
mod target;

pub use event::ChangeEvent;
pub use status::{WatchState, WatchStatus};
pub use target::{NotifyFilter, RegistryRoot, WatchTarget};
