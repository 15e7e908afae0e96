//! File-based locking to prevent concurrent execution.
//!
//! Uses flock-style advisory locking so only one blocksync run touches
//! the firewall at a time.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Holds an exclusive lock on the lock file until dropped.
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock on `path`.
    /// Returns an error if another instance holds it.
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let lock_path = path.as_ref();
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).ok();
            }
        }

        // Open without truncating so creation and locking don't race
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(lock_path, fs::Permissions::from_mode(0o600))
                .context("Failed to set lock file permissions")?;
        }

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another instance of blocksync is already running.\n\
                 If you believe this is an error, remove the lock file: {}\n\
                 Or wait for the other instance to complete.",
                lock_path.display()
            )
        })?;

        Ok(Self {
            _file: file,
            path: lock_path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
