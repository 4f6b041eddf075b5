//! Process-level run lock.
//!
//! The ledgers assume a single writer. The in-process mutex in
//! [`crate::LedgerStore`] covers tasks inside one run; this lock keeps a
//! second driver process away from the same state directory.

use chrono::Utc;
use fs2::FileExt;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};

/// Holds the exclusive run lock until dropped.
pub struct RunLock {
    _file: File,
    lock_path: PathBuf,
    sidecar_path: Option<PathBuf>,
}

impl RunLock {
    /// Try to take the lock without waiting.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| LedgerError::io(lock_path, e))?;

        // Fully qualified: newer std has its own File::try_lock_exclusive.
        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {
                info!("Acquired run lock: {}", lock_path.display());
                let sidecar_path = write_lock_sidecar(lock_path);
                Ok(Self {
                    _file: file,
                    lock_path: lock_path.to_path_buf(),
                    sidecar_path,
                })
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                Err(LedgerError::Locked(lock_path.to_path_buf()))
            }
            Err(e) => Err(LedgerError::io(lock_path, e)),
        }
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        debug!("Releasing run lock: {}", self.lock_path.display());
        if let Some(path) = &self.sidecar_path {
            if let Err(e) = fs::remove_file(path) {
                debug!("Failed to remove lock sidecar {}: {}", path.display(), e);
            }
        }
    }
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

#[derive(Serialize)]
struct LockSidecar {
    pid: u32,
    exe: Option<String>,
    timestamp: String,
}

fn sidecar_path_for(lock_path: &Path) -> PathBuf {
    let ext = lock_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("lock");
    lock_path.with_extension(format!("{ext}.json"))
}

// Best effort: the sidecar only helps an operator find the holder.
fn write_lock_sidecar(lock_path: &Path) -> Option<PathBuf> {
    let sidecar = LockSidecar {
        pid: std::process::id(),
        exe: std::env::current_exe().ok().map(|p| p.display().to_string()),
        timestamp: Utc::now().to_rfc3339(),
    };
    let sidecar_path = sidecar_path_for(lock_path);
    match serde_json::to_vec_pretty(&sidecar)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        .and_then(|payload| fs::write(&sidecar_path, payload))
    {
        Ok(()) => Some(sidecar_path),
        Err(e) => {
            warn!(
                "Failed to write lock sidecar {}: {}",
                sidecar_path.display(),
                e
            );
            None
        }
    }
}
