//! Deterministic change source driven by a script.

use super::{ChangeHandle, ChangeSource, WaitOutcome};
use crate::core::WatchTarget;
use crate::error::{Result, WatchError};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

/// One scripted reaction of an armed handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Fire once `after` has elapsed since the request was armed.
    Fire {
        /// Delay measured from the arm call
        after: Duration,
    },
    /// Fail the wait with a `NotifyError` carrying this message.
    Fail(String),
}

/// Call counters shared between a [`ScriptedSource`] and its handles.
#[derive(Debug, Default)]
pub struct ScriptCounters {
    opens: AtomicUsize,
    arms: AtomicUsize,
    waits: AtomicUsize,
    closes: AtomicUsize,
}

impl ScriptCounters {
    /// Number of `open` calls.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of `arm` calls.
    pub fn arms(&self) -> usize {
        self.arms.load(Ordering::SeqCst)
    }

    /// Number of `wait` calls.
    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }

    /// Number of `close` calls.
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// A fake change source that plays back a fixed script.
///
/// Once the script is exhausted every wait times out, like a key nobody
/// touches. Waits really block (for the scripted delay or the timeout), so
/// cancellation latency behaves like it does against the OS.
///
/// # Examples
///
/// ```rust
/// use regwatch::sources::ScriptedSource;
/// use std::time::Duration;
///
/// let source = ScriptedSource::new()
///     .fire_after(Duration::from_millis(100))
///     .fire_after(Duration::from_millis(100));
/// let counters = source.counters();
/// assert_eq!(counters.opens(), 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    steps: Vec<Step>,
    open_error: Option<String>,
    close_error: Option<String>,
    counters: Arc<ScriptCounters>,
}

impl ScriptedSource {
    /// An empty script: opens successfully and never fires.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a notification that fires `after` the request is armed.
    pub fn fire_after(mut self, after: Duration) -> Self {
        self.steps.push(Step::Fire { after });
        self
    }

    /// Append a failing wait.
    pub fn fail(mut self, reason: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(reason.into()));
        self
    }

    /// Make `open` fail, as for a key that does not exist.
    pub fn missing(mut self, reason: impl Into<String>) -> Self {
        self.open_error = Some(reason.into());
        self
    }

    /// Make `close` fail.
    pub fn failing_close(mut self, reason: impl Into<String>) -> Self {
        self.close_error = Some(reason.into());
        self
    }

    /// Counters shared with every handle this source opens.
    pub fn counters(&self) -> Arc<ScriptCounters> {
        Arc::clone(&self.counters)
    }
}

impl ChangeSource for ScriptedSource {
    fn open(&self, target: &WatchTarget) -> Result<Box<dyn ChangeHandle>> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = &self.open_error {
            return Err(WatchError::open(target, reason));
        }

        Ok(Box::new(ScriptedHandle {
            target: target.to_string(),
            steps: self.steps.iter().cloned().collect(),
            armed: false,
            close_error: self.close_error.clone(),
            counters: Arc::clone(&self.counters),
        }))
    }

    fn name(&self) -> String {
        format!("scripted:{} steps", self.steps.len())
    }
}

struct ScriptedHandle {
    target: String,
    steps: VecDeque<Step>,
    armed: bool,
    close_error: Option<String>,
    counters: Arc<ScriptCounters>,
}

impl ChangeHandle for ScriptedHandle {
    fn arm(&mut self) -> Result<()> {
        self.counters.arms.fetch_add(1, Ordering::SeqCst);
        self.armed = true;
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        self.counters.waits.fetch_add(1, Ordering::SeqCst);
        if !self.armed {
            return Err(WatchError::notify(&self.target, "wait issued without an armed request"));
        }

        match self.steps.front_mut() {
            Some(Step::Fire { after }) if *after <= timeout => {
                thread::sleep(*after);
                self.steps.pop_front();
                self.armed = false;
                Ok(WaitOutcome::Fired)
            }
            Some(Step::Fire { after }) => {
                thread::sleep(timeout);
                *after -= timeout;
                Ok(WaitOutcome::TimedOut)
            }
            Some(Step::Fail(reason)) => {
                let reason = std::mem::take(reason);
                self.steps.pop_front();
                Err(WatchError::notify(&self.target, reason))
            }
            None => {
                thread::sleep(timeout);
                Ok(WaitOutcome::TimedOut)
            }
        }
    }

    fn close(self: Box<Self>) -> Result<()> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        match &self.close_error {
            Some(reason) => Err(WatchError::handle_close(&self.target, reason)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RegistryRoot;

    fn target() -> WatchTarget {
        WatchTarget::new(RegistryRoot::LocalMachine, r"SOFTWARE\Example")
    }

    #[test]
    fn test_fire_is_one_shot() {
        let source = ScriptedSource::new()
            .fire_after(Duration::from_millis(5))
            .fire_after(Duration::from_millis(5));
        let mut handle = source.open(&target()).unwrap();

        handle.arm().unwrap();
        assert_eq!(handle.wait(Duration::from_millis(50)).unwrap(), WaitOutcome::Fired);
        // Spent request: waiting again without re-arming is an error
        assert!(handle.wait(Duration::from_millis(1)).is_err());

        handle.arm().unwrap();
        assert_eq!(handle.wait(Duration::from_millis(50)).unwrap(), WaitOutcome::Fired);
    }

    #[test]
    fn test_long_delay_times_out_first() {
        let source = ScriptedSource::new().fire_after(Duration::from_millis(30));
        let mut handle = source.open(&target()).unwrap();
        handle.arm().unwrap();

        assert_eq!(handle.wait(Duration::from_millis(20)).unwrap(), WaitOutcome::TimedOut);
        assert_eq!(handle.wait(Duration::from_millis(20)).unwrap(), WaitOutcome::Fired);
    }

    #[test]
    fn test_exhausted_script_idles() {
        let source = ScriptedSource::new();
        let mut handle = source.open(&target()).unwrap();
        handle.arm().unwrap();
        assert_eq!(handle.wait(Duration::from_millis(1)).unwrap(), WaitOutcome::TimedOut);
    }

    #[test]
    fn test_fail_step() {
        let source = ScriptedSource::new().fail("invalid handle");
        let mut handle = source.open(&target()).unwrap();
        handle.arm().unwrap();
        let err = handle.wait(Duration::from_millis(1)).unwrap_err();
        assert!(matches!(err, WatchError::NotifyError { ref reason, .. } if reason == "invalid handle"));
    }

    #[test]
    fn test_missing_and_close_errors() {
        let source = ScriptedSource::new().missing("not found");
        assert!(matches!(source.open(&target()), Err(WatchError::OpenError { .. })));

        let source = ScriptedSource::new().failing_close("access denied");
        let counters = source.counters();
        let handle = source.open(&target()).unwrap();
        assert!(matches!(handle.close(), Err(WatchError::HandleCloseError { .. })));
        assert_eq!(counters.opens(), 1);
        assert_eq!(counters.closes(), 1);
    }
}
