//! File-based locking to prevent concurrent execution.
//!
//! Two sync runs against the same zones would race on the remote rulesets,
//! so a run holds an exclusive advisory lock on a file next to its config
//! file for as long as it talks to Cloudflare.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE_NAME: &str = ".asnwall.lock";

/// Lock file path used for a given config file
pub fn lock_path_for(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(LOCK_FILE_NAME),
        _ => PathBuf::from(LOCK_FILE_NAME),
    }
}

/// A guard that holds an exclusive lock on the lock file.
/// The lock is automatically released when the guard is dropped.
#[derive(Debug)]
pub struct LockGuard {
    _file: File,
    path: PathBuf,
}

impl LockGuard {
    /// Attempt to acquire an exclusive lock.
    /// Returns an error if another instance already holds it.
    ///
    /// Uses OpenOptions with create+read+write to avoid TOCTOU race
    /// between file creation and lock acquisition.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {:?}", path))?;

        file.try_lock_exclusive().map_err(|_| {
            anyhow::anyhow!(
                "Another asnwall run is already in progress.\n\
                 If you believe this is an error, remove the lock file: {:?}\n\
                 Or wait for the other run to complete.",
                path
            )
        })?;

        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// Lock is automatically released when file is closed (on drop)
