//! Change notification pipeline.
//!
//! A [`Watcher`] turns one-shot notifications into [`ChangeEvent`](crate::core::ChangeEvent)s
//! on a channel; [`consume`] reports them until the channel closes or
//! cancellation is requested.

pub mod dispatcher;
pub mod watcher;

pub use dispatcher::{DispatchExit, DispatchReport, EventSink, LogSink, consume};
pub use watcher::{DEFAULT_POLL_INTERVAL, Watcher};
