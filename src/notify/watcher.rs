//! The watch loop: one-shot notification requests re-armed after every firing.

use crate::core::{ChangeEvent, WatchState, WatchStatus, WatchTarget};
use crate::error::{Result, WatchError};
use crate::sources::{ChangeHandle, ChangeSource, WaitOutcome};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Default upper bound on how long a wait blocks before cancellation is re-checked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest pause between attempts to push into a full channel.
const SEND_BACKOFF: Duration = Duration::from_millis(10);

enum Delivery {
    Sent,
    Closed,
    Cancelled,
}

/// Watches a single target and emits a [`ChangeEvent`] per notification.
///
/// The watcher walks `Opening -> Watching -> (Stopped | Failed)`. While
/// watching, a delivered notification spends the armed request and the only
/// way forward is to arm the next one. Every wait is bounded by the poll
/// interval, so cancellation is observed within that interval even if the key
/// never changes. A full channel does not hold the watcher past cancellation
/// either; the undelivered event is dropped.
///
/// # Examples
///
/// ```rust,no_run
/// use regwatch::notify::Watcher;
/// use regwatch::sources::ScriptedSource;
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let source = Arc::new(ScriptedSource::new().fire_after(Duration::from_millis(10)));
/// let target = r"HKLM\SOFTWARE\Example".parse().unwrap();
/// let token = CancellationToken::new();
///
/// let (mut rx, handle) = Watcher::new(source, target)
///     .with_poll_interval(Duration::from_millis(50))
///     .spawn(16, token.clone());
///
/// if let Some(event) = rx.recv().await {
///     println!("{}", event);
/// }
/// token.cancel();
/// handle.await.unwrap().unwrap();
/// # }
/// ```
pub struct Watcher {
    source: Arc<dyn ChangeSource>,
    target: WatchTarget,
    poll_interval: Duration,
    status: WatchStatus,
}

impl Watcher {
    /// Create a watcher for `target` using `source`.
    pub fn new(source: Arc<dyn ChangeSource>, target: WatchTarget) -> Self {
        Self {
            source,
            target,
            poll_interval: DEFAULT_POLL_INTERVAL,
            status: WatchStatus::new(),
        }
    }

    /// Set the longest time a single wait may block.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// The watched target.
    pub fn target(&self) -> &WatchTarget {
        &self.target
    }

    /// Get the poll interval for this watcher.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Shared handle to this watcher's lifecycle state.
    pub fn status(&self) -> WatchStatus {
        self.status.clone()
    }

    /// Run on a blocking thread, emitting into a new channel of `capacity`.
    ///
    /// The channel closes when the watcher exits.
    pub fn spawn(
        self,
        capacity: usize,
        token: CancellationToken,
    ) -> (mpsc::Receiver<ChangeEvent>, JoinHandle<Result<()>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (rx, self.spawn_into(tx, token))
    }

    /// Run on a blocking thread, emitting into an existing channel.
    ///
    /// Several watchers may share clones of one sender to feed a single
    /// dispatcher.
    pub fn spawn_into(
        self,
        tx: mpsc::Sender<ChangeEvent>,
        token: CancellationToken,
    ) -> JoinHandle<Result<()>> {
        tokio::task::spawn_blocking(move || self.run(tx, token))
    }

    /// The watch loop. Blocks the calling thread until cancelled or failed.
    ///
    /// # Errors
    ///
    /// - `OpenError` if the target cannot be opened; nothing is emitted.
    /// - `NotifyError` if arming or waiting fails; an event carrying the
    ///   error is emitted first.
    pub fn run(&self, tx: mpsc::Sender<ChangeEvent>, token: CancellationToken) -> Result<()> {
        self.status.set(WatchState::Opening);
        let handle = match self.source.open(&self.target) {
            Ok(handle) => handle,
            Err(err) => {
                error!(target_key = %self.target, source = %self.source.name(), error = %err, "watch aborted");
                self.status.set(WatchState::Failed(err.clone()));
                return Err(err);
            }
        };
        let mut handle = HandleGuard::new(handle, &self.target);

        self.status.set(WatchState::Watching);
        info!(
            target_key = %self.target,
            source = %self.source.name(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "watcher started"
        );

        let mut armed = false;
        let mut sequence = 0u64;
        loop {
            if token.is_cancelled() {
                info!(target_key = %self.target, events = sequence, "watcher stopped");
                self.status.set(WatchState::Stopped);
                return Ok(());
            }

            if !armed {
                if let Err(err) = handle.arm() {
                    sequence += 1;
                    return self.fail(&tx, &token, sequence, err);
                }
                armed = true;
                debug!(target_key = %self.target, "notification request armed");
            }

            match handle.wait(self.poll_interval) {
                Ok(WaitOutcome::Fired) => {
                    armed = false;
                    sequence += 1;
                    match self.deliver(&tx, ChangeEvent::changed(sequence), &token) {
                        Delivery::Sent => {}
                        Delivery::Closed => {
                            debug!(target_key = %self.target, "receiver dropped, stopping watcher");
                            self.status.set(WatchState::Stopped);
                            return Ok(());
                        }
                        Delivery::Cancelled => {
                            debug!(target_key = %self.target, sequence, "channel full at cancellation, event dropped");
                        }
                    }
                }
                Ok(WaitOutcome::TimedOut) => {}
                Err(err) => {
                    sequence += 1;
                    return self.fail(&tx, &token, sequence, err);
                }
            }
        }
    }

    /// Push `event` into the channel, backing off while it is full and giving
    /// up once `token` is cancelled.
    fn deliver(
        &self,
        tx: &mpsc::Sender<ChangeEvent>,
        mut event: ChangeEvent,
        token: &CancellationToken,
    ) -> Delivery {
        let backoff = self.poll_interval.clamp(Duration::from_millis(1), SEND_BACKOFF);
        loop {
            match tx.try_send(event) {
                Ok(()) => return Delivery::Sent,
                Err(TrySendError::Closed(_)) => return Delivery::Closed,
                Err(TrySendError::Full(returned)) => {
                    if token.is_cancelled() {
                        return Delivery::Cancelled;
                    }
                    event = returned;
                    thread::sleep(backoff);
                }
            }
        }
    }

    fn fail(
        &self,
        tx: &mpsc::Sender<ChangeEvent>,
        token: &CancellationToken,
        sequence: u64,
        err: WatchError,
    ) -> Result<()> {
        error!(target_key = %self.target, error = %err, "watcher failed");
        if !matches!(
            self.deliver(tx, ChangeEvent::failed(sequence, err.clone()), token),
            Delivery::Sent
        ) {
            debug!(target_key = %self.target, "failure event not delivered");
        }
        self.status.set(WatchState::Failed(err.clone()));
        Err(err)
    }
}

/// Owns an open handle and releases it exactly once, on whichever path the
/// watcher exits by.
struct HandleGuard {
    handle: Option<Box<dyn ChangeHandle>>,
    target: String,
}

impl HandleGuard {
    fn new(handle: Box<dyn ChangeHandle>, target: &WatchTarget) -> Self {
        Self {
            handle: Some(handle),
            target: target.to_string(),
        }
    }

    fn arm(&mut self) -> Result<()> {
        match self.handle.as_mut() {
            Some(handle) => handle.arm(),
            None => Err(WatchError::notify(&self.target, "handle already released")),
        }
    }

    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        match self.handle.as_mut() {
            Some(handle) => handle.wait(timeout),
            None => Err(WatchError::notify(&self.target, "handle already released")),
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.close() {
                Ok(()) => debug!(target_key = %self.target, "handle released"),
                Err(err) => error!(target_key = %self.target, error = %err, "handle release failed"),
            }
        }
    }
}
