//! Watch targets and notification filters.

use crate::error::WatchError;
use serde::Deserialize;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

/// A predefined registry root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum RegistryRoot {
    /// `HKEY_LOCAL_MACHINE`
    LocalMachine,
    /// `HKEY_CURRENT_USER`
    CurrentUser,
    /// `HKEY_CLASSES_ROOT`
    ClassesRoot,
    /// `HKEY_USERS`
    Users,
    /// `HKEY_CURRENT_CONFIG`
    CurrentConfig,
}

impl RegistryRoot {
    /// All roots, in display order.
    pub const ALL: [RegistryRoot; 5] = [
        Self::LocalMachine,
        Self::CurrentUser,
        Self::ClassesRoot,
        Self::Users,
        Self::CurrentConfig,
    ];

    /// Abbreviated name, e.g. `HKLM`.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::LocalMachine => "HKLM",
            Self::CurrentUser => "HKCU",
            Self::ClassesRoot => "HKCR",
            Self::Users => "HKU",
            Self::CurrentConfig => "HKCC",
        }
    }

    /// Full predefined key name, e.g. `HKEY_LOCAL_MACHINE`.
    pub fn long_name(self) -> &'static str {
        match self {
            Self::LocalMachine => "HKEY_LOCAL_MACHINE",
            Self::CurrentUser => "HKEY_CURRENT_USER",
            Self::ClassesRoot => "HKEY_CLASSES_ROOT",
            Self::Users => "HKEY_USERS",
            Self::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }
}

impl fmt::Display for RegistryRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

impl FromStr for RegistryRoot {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|root| {
                wanted.eq_ignore_ascii_case(root.short_name())
                    || wanted.eq_ignore_ascii_case(root.long_name())
            })
            .ok_or_else(|| WatchError::ConfigError(format!("Unknown registry root: '{}'", wanted)))
    }
}

impl TryFrom<String> for RegistryRoot {
    type Error = WatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The registry key to monitor: a root plus a backslash-separated subkey path.
///
/// Immutable once the watch starts.
///
/// # Examples
///
/// ```rust
/// use regwatch::core::{RegistryRoot, WatchTarget};
///
/// let target: WatchTarget = r"HKLM\SOFTWARE\Example".parse().unwrap();
/// assert_eq!(target.root(), RegistryRoot::LocalMachine);
/// assert_eq!(target.path(), r"SOFTWARE\Example");
/// assert_eq!(target.to_string(), r"HKLM\SOFTWARE\Example");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct WatchTarget {
    root: RegistryRoot,
    path: String,
}

impl WatchTarget {
    /// Create a target. Forward slashes become backslashes and surrounding
    /// separators are trimmed.
    pub fn new(root: RegistryRoot, path: impl AsRef<str>) -> Self {
        let path = path
            .as_ref()
            .replace('/', "\\")
            .trim_matches('\\')
            .to_string();
        Self { root, path }
    }

    /// The predefined root.
    pub fn root(&self) -> RegistryRoot {
        self.root
    }

    /// The subkey path below the root, without leading separator.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-empty path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('\\').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.root)
        } else {
            write!(f, "{}\\{}", self.root, self.path)
        }
    }
}

impl FromStr for WatchTarget {
    type Err = WatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace('/', "\\");
        let (root, path) = match normalized.split_once('\\') {
            Some((root, path)) => (root, path),
            None => (normalized.as_str(), ""),
        };
        Ok(Self::new(root.parse()?, path))
    }
}

impl TryFrom<String> for WatchTarget {
    type Error = WatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Which aspects of a key trigger a notification.
///
/// Mirrors the `REG_NOTIFY_CHANGE_*` bits of `RegNotifyChangeKeyValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifyFilter(u32);

impl NotifyFilter {
    /// A subkey was added or deleted.
    pub const NAME: NotifyFilter = NotifyFilter(0x0000_0001);
    /// Key attributes changed.
    pub const ATTRIBUTES: NotifyFilter = NotifyFilter(0x0000_0002);
    /// A value was added, deleted or modified.
    pub const LAST_SET: NotifyFilter = NotifyFilter(0x0000_0004);
    /// The key's security descriptor changed.
    pub const SECURITY: NotifyFilter = NotifyFilter(0x0000_0008);

    /// Every change bit.
    pub const ALL: NotifyFilter = NotifyFilter(0x0000_000F);

    const NAMED: [(NotifyFilter, &'static str); 4] = [
        (Self::NAME, "NAME"),
        (Self::ATTRIBUTES, "ATTRIBUTES"),
        (Self::LAST_SET, "LAST_SET"),
        (Self::SECURITY, "SECURITY"),
    ];

    /// Build a filter from raw bits, rejecting unknown or empty masks.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits == 0 || bits & !Self::ALL.0 != 0 {
            None
        } else {
            Some(Self(bits))
        }
    }

    /// Raw bit value.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub fn contains(self, other: NotifyFilter) -> bool {
        self.0 & other.0 == other.0
    }

    /// Human-readable flag list, e.g. `NAME | LAST_SET`.
    pub fn describe(self) -> String {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl Default for NotifyFilter {
    fn default() -> Self {
        Self::NAME | Self::LAST_SET
    }
}

impl BitOr for NotifyFilter {
    type Output = NotifyFilter;

    fn bitor(self, rhs: Self) -> Self::Output {
        NotifyFilter(self.0 | rhs.0)
    }
}

impl fmt::Display for NotifyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_short_and_long_roots() {
        assert_eq!("hklm".parse::<RegistryRoot>().unwrap(), RegistryRoot::LocalMachine);
        assert_eq!(
            "HKEY_CURRENT_USER".parse::<RegistryRoot>().unwrap(),
            RegistryRoot::CurrentUser
        );
        assert!("HKXX".parse::<RegistryRoot>().is_err());
    }

    #[test]
    fn test_target_normalizes_separators() {
        let target = WatchTarget::new(RegistryRoot::LocalMachine, "/SOFTWARE/Example/");
        assert_eq!(target.path(), r"SOFTWARE\Example");
        assert_eq!(target.segments().collect::<Vec<_>>(), vec!["SOFTWARE", "Example"]);
    }

    #[test]
    fn test_target_root_only() {
        let target: WatchTarget = "HKCU".parse().unwrap();
        assert_eq!(target.path(), "");
        assert_eq!(target.to_string(), "HKCU");
    }

    #[test]
    fn test_target_display_roundtrip() {
        let target: WatchTarget = r"HKEY_LOCAL_MACHINE\SOFTWARE\Wow6432Node\Vendor".parse().unwrap();
        assert_eq!(target.to_string(), r"HKLM\SOFTWARE\Wow6432Node\Vendor");
    }

    #[test]
    fn test_default_filter_is_name_and_last_set() {
        let filter = NotifyFilter::default();
        assert_eq!(filter.bits(), 0x5);
        assert_eq!(filter.to_string(), "0x00000005");
        assert_eq!(filter.describe(), "NAME | LAST_SET");
        assert!(!filter.contains(NotifyFilter::ATTRIBUTES));
    }

    #[test]
    fn test_from_bits_rejects_unknown() {
        assert!(NotifyFilter::from_bits(0).is_none());
        assert!(NotifyFilter::from_bits(0x10).is_none());
        assert_eq!(NotifyFilter::from_bits(0xF), Some(NotifyFilter::ALL));
        assert_eq!(
            NotifyFilter::ALL.describe(),
            "NAME | ATTRIBUTES | LAST_SET | SECURITY"
        );
    }
}
