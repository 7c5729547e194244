//! Native registry change source.
//!
//! Each arm issues an asynchronous `RegNotifyChangeKeyValue` that signals a
//! manual-reset event; waits are `WaitForSingleObject` calls bounded by the
//! poll interval so a watcher can notice cancellation.

use super::{ChangeHandle, ChangeSource, WaitOutcome};
use crate::core::{NotifyFilter, RegistryRoot, WatchTarget};
use crate::error::{Result, WatchError};
use std::time::Duration;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::Registry::{
    HKEY, HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE,
    HKEY_USERS, KEY_NOTIFY, REG_NOTIFY_FILTER, RegCloseKey, RegNotifyChangeKeyValue,
    RegOpenKeyExW,
};
use windows::Win32::System::Threading::{CreateEventW, ResetEvent, WaitForSingleObject};
use windows::core::PCWSTR;

/// Keeps the registration alive independently of the thread that issued it.
const REG_NOTIFY_THREAD_AGNOSTIC: u32 = 0x1000_0000;

/// Change source backed by the Windows registry.
#[derive(Debug, Clone)]
pub struct RegistrySource {
    filter: NotifyFilter,
    watch_subtree: bool,
}

impl RegistrySource {
    /// Create a source requesting `filter` changes, optionally for the whole subtree.
    pub fn new(filter: NotifyFilter, watch_subtree: bool) -> Self {
        Self {
            filter,
            watch_subtree,
        }
    }
}

fn predefined_key(root: RegistryRoot) -> HKEY {
    match root {
        RegistryRoot::LocalMachine => HKEY_LOCAL_MACHINE,
        RegistryRoot::CurrentUser => HKEY_CURRENT_USER,
        RegistryRoot::ClassesRoot => HKEY_CLASSES_ROOT,
        RegistryRoot::Users => HKEY_USERS,
        RegistryRoot::CurrentConfig => HKEY_CURRENT_CONFIG,
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

impl ChangeSource for RegistrySource {
    fn open(&self, target: &WatchTarget) -> Result<Box<dyn ChangeHandle>> {
        let path = to_wide(target.path());
        let mut key = HKEY::default();

        // SAFETY: `path` is NUL-terminated and outlives the call; `key` is a valid out pointer.
        unsafe {
            RegOpenKeyExW(
                predefined_key(target.root()),
                PCWSTR(path.as_ptr()),
                0,
                KEY_NOTIFY,
                &mut key,
            )
        }
        .ok()
        .map_err(|e| WatchError::open(target, e.message()))?;

        // SAFETY: no security attributes and no name; the handle is owned by RegistryHandle.
        let event = match unsafe { CreateEventW(None, true, false, PCWSTR::null()) } {
            Ok(event) => event,
            Err(e) => {
                // SAFETY: `key` was opened above and is not used afterwards.
                let _ = unsafe { RegCloseKey(key) };
                return Err(WatchError::open(target, e.message()));
            }
        };

        Ok(Box::new(RegistryHandle {
            target: target.to_string(),
            key,
            event,
            filter: REG_NOTIFY_FILTER(self.filter.bits() | REG_NOTIFY_THREAD_AGNOSTIC),
            watch_subtree: self.watch_subtree,
        }))
    }

    fn name(&self) -> String {
        format!("registry:{}", self.filter.describe())
    }
}

struct RegistryHandle {
    target: String,
    key: HKEY,
    event: HANDLE,
    filter: REG_NOTIFY_FILTER,
    watch_subtree: bool,
}

// SAFETY: the key and event handles are process-wide kernel handles owned
// solely by this value; nothing else aliases them.
unsafe impl Send for RegistryHandle {}

impl ChangeHandle for RegistryHandle {
    fn arm(&mut self) -> Result<()> {
        // SAFETY: both handles stay open until `close`.
        unsafe {
            ResetEvent(self.event).map_err(|e| WatchError::notify(&self.target, e.message()))?;
            RegNotifyChangeKeyValue(self.key, self.watch_subtree, self.filter, self.event, true)
        }
        .ok()
        .map_err(|e| WatchError::notify(&self.target, e.message()))
    }

    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1);

        // SAFETY: the event handle stays open until `close`.
        let status = unsafe { WaitForSingleObject(self.event, millis) };
        if status == WAIT_OBJECT_0 {
            Ok(WaitOutcome::Fired)
        } else if status == WAIT_TIMEOUT {
            Ok(WaitOutcome::TimedOut)
        } else {
            let err = windows::core::Error::from_win32();
            Err(WatchError::notify(
                &self.target,
                format!("wait returned {:#x}: {}", status.0, err.message()),
            ))
        }
    }

    fn close(self: Box<Self>) -> Result<()> {
        // Closing the key also discards any pending notification request.
        // SAFETY: called once by the owning watcher; the handles are not used afterwards.
        let key = unsafe { RegCloseKey(self.key) }.ok();
        let event = unsafe { CloseHandle(self.event) };

        key.and(event)
            .map_err(|e| WatchError::handle_close(&self.target, e.message()))
    }
}
