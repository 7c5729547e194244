//! Filesystem-backed change source for platforms without a registry.
//!
//! A key maps to a directory: `HKLM\SOFTWARE\Example` becomes
//! `<base>/HKLM/SOFTWARE/Example`. Subdirectories play the part of subkeys
//! and files the part of values.

use super::{ChangeHandle, ChangeSource, WaitOutcome};
use crate::core::{NotifyFilter, WatchTarget};
use crate::error::{Result, WatchError};
use notify::event::{MetadataKind, ModifyKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

/// Change source that watches a directory tree with the `notify` crate.
///
/// # Examples
///
/// ```rust,no_run
/// use regwatch::core::{NotifyFilter, WatchTarget};
/// use regwatch::sources::FsSource;
///
/// let source = FsSource::new("/var/lib/regwatch", NotifyFilter::default(), true);
/// let target: WatchTarget = r"HKLM\SOFTWARE\Example".parse().unwrap();
/// assert!(source.resolve(&target).ends_with("HKLM/SOFTWARE/Example"));
/// ```
#[derive(Debug, Clone)]
pub struct FsSource {
    base: PathBuf,
    filter: NotifyFilter,
    recursive: bool,
}

impl FsSource {
    /// Create a source rooted at `base`.
    pub fn new(base: impl Into<PathBuf>, filter: NotifyFilter, recursive: bool) -> Self {
        Self {
            base: base.into(),
            filter,
            recursive,
        }
    }

    /// Directory standing in for `target`.
    pub fn resolve(&self, target: &WatchTarget) -> PathBuf {
        let mut dir = self.base.join(target.root().short_name());
        dir.extend(target.segments());
        dir
    }
}

impl ChangeSource for FsSource {
    fn open(&self, target: &WatchTarget) -> Result<Box<dyn ChangeHandle>> {
        let dir = self.resolve(target);
        if !dir.is_dir() {
            return Err(WatchError::open(
                target,
                format!("no such directory: {}", dir.display()),
            ));
        }

        let (tx, events) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        })
        .map_err(|e| WatchError::open(target, format!("Failed to create file watcher: {}", e)))?;

        let mode = if self.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&dir, mode)
            .map_err(|e| WatchError::open(target, format!("Failed to watch path: {}", e)))?;

        Ok(Box::new(FsHandle {
            target: target.to_string(),
            dir,
            watcher,
            events,
            filter: self.filter,
            armed: false,
        }))
    }

    fn name(&self) -> String {
        format!("fs:{}", self.base.display())
    }
}

struct FsHandle {
    target: String,
    dir: PathBuf,
    watcher: RecommendedWatcher,
    events: mpsc::Receiver<notify::Result<Event>>,
    filter: NotifyFilter,
    armed: bool,
}

impl ChangeHandle for FsHandle {
    fn arm(&mut self) -> Result<()> {
        self.armed = true;
        Ok(())
    }

    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        if !self.armed {
            return Err(WatchError::notify(&self.target, "wait issued without an armed request"));
        }

        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.events.recv_timeout(remaining) {
                Ok(Ok(event))
                    if aspect_of(&event.kind).is_some_and(|aspect| self.filter.contains(aspect)) =>
                {
                    self.armed = false;
                    return Ok(WaitOutcome::Fired);
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) => return Err(WatchError::notify(&self.target, e)),
                Err(RecvTimeoutError::Timeout) => return Ok(WaitOutcome::TimedOut),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(WatchError::notify(&self.target, "file watcher disconnected"));
                }
            }
        }
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        self.watcher
            .unwatch(&self.dir)
            .map_err(|e| WatchError::handle_close(&self.target, e))
    }
}

/// The registry change aspect a filesystem event corresponds to. Reads
/// change nothing.
fn aspect_of(kind: &EventKind) -> Option<NotifyFilter> {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => {
            Some(NotifyFilter::NAME)
        }
        EventKind::Modify(ModifyKind::Metadata(
            MetadataKind::Permissions | MetadataKind::Ownership,
        )) => Some(NotifyFilter::SECURITY),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(NotifyFilter::ATTRIBUTES),
        EventKind::Access(_) | EventKind::Other => None,
        EventKind::Modify(_) | EventKind::Any => Some(NotifyFilter::LAST_SET),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RegistryRoot;
    use notify::event::{AccessKind, CreateKind, DataChange};
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    fn target() -> WatchTarget {
        WatchTarget::new(RegistryRoot::LocalMachine, r"SOFTWARE\Example")
    }

    #[test]
    fn test_resolve() {
        let source = FsSource::new("/base", NotifyFilter::default(), true);
        assert_eq!(
            source.resolve(&target()),
            PathBuf::from("/base/HKLM/SOFTWARE/Example")
        );
    }

    #[test]
    fn test_aspect_mapping() {
        assert_eq!(
            aspect_of(&EventKind::Create(CreateKind::File)),
            Some(NotifyFilter::NAME)
        );
        assert_eq!(
            aspect_of(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(NotifyFilter::LAST_SET)
        );
        assert_eq!(
            aspect_of(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            Some(NotifyFilter::SECURITY)
        );
        assert_eq!(
            aspect_of(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime))),
            Some(NotifyFilter::ATTRIBUTES)
        );
        assert_eq!(aspect_of(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn test_open_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let source = FsSource::new(temp_dir.path(), NotifyFilter::default(), true);
        assert!(matches!(source.open(&target()), Err(WatchError::OpenError { .. })));
    }

    #[test]
    fn test_file_creation_fires() {
        let temp_dir = TempDir::new().unwrap();
        let source = FsSource::new(temp_dir.path(), NotifyFilter::default(), true);
        let dir = source.resolve(&target());
        fs::create_dir_all(&dir).unwrap();

        let mut handle = source.open(&target()).unwrap();
        handle.arm().unwrap();

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            fs::write(dir.join("Setting"), "1").unwrap();
        });

        assert_eq!(handle.wait(Duration::from_secs(5)).unwrap(), WaitOutcome::Fired);
        writer.join().unwrap();
        assert!(handle.close().is_ok());
    }

    #[test]
    fn test_quiet_directory_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let source = FsSource::new(temp_dir.path(), NotifyFilter::default(), false);
        fs::create_dir_all(source.resolve(&target())).unwrap();

        let mut handle = source.open(&target()).unwrap();
        handle.arm().unwrap();
        assert_eq!(
            handle.wait(Duration::from_millis(50)).unwrap(),
            WaitOutcome::TimedOut
        );
    }
}
