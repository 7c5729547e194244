//! # regwatch
//!
//! Registry change notification watcher with cooperative, bounded-latency
//! cancellation.
//!
//! ## Overview
//!
//! `regwatch` opens a registry key, asks the OS to signal the next change to
//! it, and republishes every signal as a [`ChangeEvent`](crate::core::ChangeEvent)
//! on a channel consumed by a dispatcher:
//! - A [`Watcher`](notify::Watcher) owns the key handle and loops on one-shot
//!   notification requests, re-arming after each firing
//! - Every wait is bounded by a poll interval, so Ctrl-C is honoured even if
//!   the key never changes
//! - The [dispatcher](notify::consume) races the next event against
//!   cancellation and reports to a log or a callback
//! - Events only say "something changed", never what
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use regwatch::prelude::*;
//!
//! # async fn example() -> regwatch::error::Result<()> {
//! let config = ConfigLoader::new()
//!     .with_override("target", r"HKCU\Software\Example")
//!     .load()?;
//!
//! let shutdown = Shutdown::new();
//! let _signal = shutdown.install_interrupt_handler()?;
//!
//! let source = platform_source(&config)?;
//! let report = run(&config, source, LogSink, shutdown).await?;
//! println!("delivered {} events", report.dispatch.delivered);
//! # Ok(())
//! # }
//! ```
//!
//! ## Change sources
//!
//! On Windows the native registry is used. Elsewhere, with the `file-watch`
//! feature, a directory tree stands in for the registry so the same pipeline
//! can run and be tested anywhere.

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod app;
pub mod core;
pub mod error;
pub mod notify;
pub mod settings;
pub mod shutdown;
pub mod sources;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::app::{RunReport, run};
    pub use crate::core::{ChangeEvent, NotifyFilter, RegistryRoot, WatchTarget};
    pub use crate::error::{Result, ValidationError, WatchError};
    pub use crate::notify::{DispatchExit, EventSink, LogSink, Watcher, consume};
    pub use crate::settings::{ConfigLoader, Validate, WatchConfig};
    pub use crate::shutdown::Shutdown;
    pub use crate::sources::{ChangeSource, platform_source};
}
