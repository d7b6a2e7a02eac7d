// src/lock.rs

//! Administrative directory lock
//!
//! Every mutating command holds an exclusive `flock` on `<admindir>/lock`
//! for its whole run. Contention is an ordinary error the caller reports;
//! anything else going wrong while locking is fatal.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Exclusive lock on the administrative directory, released on drop
pub struct AdminLock {
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl AdminLock {
    /// Take the lock without waiting
    pub fn acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::LockFailed(format!("{}: {}", parent.display(), e)))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::LockFailed(format!("{}: {}", path.display(), e)))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                info!("Acquired lock at {:?}", path);
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                debug!("Lock already held at {:?}", path);
                Err(Error::Locked(path.display().to_string()))
            }
            Err(e) => Err(Error::LockFailed(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for AdminLock {
    fn drop(&mut self) {
        // Closing the file releases the lock
        debug!("Released lock at {:?}", self.path);
    }
}
