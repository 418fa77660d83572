//! Lock file naming the primary instance
//!
//! The file is created with `create_new`, so exactly one process wins. It
//! records the owner's PID and the loopback port its IPC listener accepts
//! second-instance messages on.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use loopgate_domain::constants::LOCK_FILE_NAME;
use serde::{Deserialize, Serialize};

/// Contents of the lock file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub ipc_port: u16,
}

/// Held lock; the file is removed on drop
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    record: LockRecord,
}

impl InstanceLock {
    /// Create the lock file in `lock_dir`.
    ///
    /// Returns `Ok(None)` when the file already exists.
    ///
    /// # Errors
    /// Any other I/O failure creating or writing the file.
    pub fn try_create(lock_dir: &Path, record: LockRecord) -> io::Result<Option<Self>> {
        let path = lock_path(lock_dir);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
            Err(err) => return Err(err),
        };

        let written = serde_json::to_vec(&record)
            .map_err(io::Error::other)
            .and_then(|bytes| file.write_all(&bytes))
            .and_then(|()| file.sync_all());
        if let Err(err) = written {
            drop(file);
            let _ = fs::remove_file(&path);
            return Err(err);
        }

        tracing::info!(pid = record.pid, ipc_port = record.ipc_port, path = %path.display(), "instance_lock.acquired");
        Ok(Some(Self { path, record }))
    }

    /// Record stored in an existing lock file; `None` if missing or unreadable
    #[must_use]
    pub fn read(lock_dir: &Path) -> Option<LockRecord> {
        let content = fs::read(lock_path(lock_dir)).ok()?;
        serde_json::from_slice(&content).ok()
    }

    /// Delete a lock file left behind by a dead owner.
    pub fn remove_stale(lock_dir: &Path) {
        let path = lock_path(lock_dir);
        if let Err(err) = fs::remove_file(&path) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::warn!(error = %err, path = %path.display(), "instance_lock.remove_stale_failed");
            }
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn record(&self) -> LockRecord {
        self.record
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(error = %e, path = %self.path.display(), "instance_lock.remove_failed");
        } else {
            tracing::info!(path = %self.path.display(), "instance_lock.released");
        }
    }
}

#[must_use]
pub fn lock_path(lock_dir: &Path) -> PathBuf {
    lock_dir.join(LOCK_FILE_NAME)
}

/// Whether `pid` names a live process.
///
/// Platforms without a cheap check report `true`; the IPC connection
/// attempt then decides whether the lock is stale.
#[cfg(target_os = "macos")]
pub(crate) fn is_process_running(pid: u32) -> bool {
    use std::process::Command;

    Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(not(target_os = "macos"))]
pub(crate) fn is_process_running(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        Path::new("/proc").join(pid.to_string()).exists()
    }

    #[cfg(not(target_os = "linux"))]
    {
        tracing::debug!(pid, "instance_lock.process_check_unsupported");
        true
    }
}
