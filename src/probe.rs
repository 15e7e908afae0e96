//! Host probing for backend usability checks.
//!
//! Backends decide whether they can run from two facts only: the OS family
//! and whether their control executable exists. Both go through
//! [`HostProbe`] so selection can be tested for any host layout.

use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;

/// Operating system family as far as backend selection cares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    Windows,
    Other,
}

impl OsFamily {
    /// Classify a `std::env::consts::OS` style name.
    pub fn from_os_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("linux") {
            OsFamily::Linux
        } else if lower.starts_with("win") {
            OsFamily::Windows
        } else {
            OsFamily::Other
        }
    }
}

/// Read-only view of the host used by usability probes.
#[cfg_attr(test, automock)]
pub trait HostProbe: Send + Sync {
    /// OS family of the running host.
    fn os_family(&self) -> OsFamily;

    /// Whether an executable exists at `path`.
    fn executable_exists(&self, path: &Path) -> bool;

    /// Windows system directory (`%SystemRoot%\System32`).
    fn system_dir(&self) -> PathBuf;
}

/// Probe backed by the real host.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealHostProbe;

impl HostProbe for RealHostProbe {
    fn os_family(&self) -> OsFamily {
        OsFamily::from_os_name(std::env::consts::OS)
    }

    fn executable_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn system_dir(&self) -> PathBuf {
        let root = std::env::var_os("SystemRoot").unwrap_or_else(|| r"C:\Windows".into());
        PathBuf::from(root).join("System32")
    }
}
