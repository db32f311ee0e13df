//! Per-pair run lock

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{Error, Result};

/// Who holds a lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub token: String,
    pub pid: u32,
    pub started: DateTime<Utc>,
}

/// Exclusive lock over one sync pair, released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
    info: LockInfo,
    held_flag: Option<Arc<AtomicBool>>,
}

impl RunLock {
    /// Take the lock without blocking.
    ///
    /// A lock held by any other run (in this process or another) fails with
    /// [`Error::ConcurrentRun`].
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            if let Some(holder) = Self::holder(path) {
                warn!(pid = holder.pid, started = %holder.started, "Lock is held by another run");
            }
            return Err(Error::ConcurrentRun {
                path: path.to_path_buf(),
            });
        }

        let info = LockInfo {
            token: Uuid::new_v4().to_string(),
            pid: std::process::id(),
            started: Utc::now(),
        };
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(toml::to_string(&info)?.as_bytes())?;
        file.sync_all()?;

        debug!(path = %path.display(), token = %info.token, "Lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
            info,
            held_flag: None,
        })
    }

    /// Read the holder record of a lock file, if it has one.
    pub fn holder(path: &Path) -> Option<LockInfo> {
        let mut content = String::new();
        File::open(path).ok()?.read_to_string(&mut content).ok()?;
        toml::from_str(&content).ok()
    }

    /// Whether some run currently holds the lock at `path`.
    pub(crate) fn is_held(path: &Path) -> bool {
        let Ok(file) = File::open(path) else {
            return false;
        };
        match file.try_lock_shared() {
            Ok(()) => {
                let _ = FileExt::unlock(&file);
                false
            }
            Err(_) => true,
        }
    }

    /// Clear `flag` when this lock is released.
    pub(crate) fn clearing_on_release(mut self, flag: Arc<AtomicBool>) -> Self {
        self.held_flag = Some(flag);
        self
    }

    pub fn token(&self) -> &str {
        &self.info.token
    }

    pub fn info(&self) -> &LockInfo {
        &self.info
    }

    /// Release explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Some(flag) = &self.held_flag {
            flag.store(false, Ordering::SeqCst);
        }
        let _ = self.file.set_len(0);
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release lock");
        } else {
            debug!(path = %self.path.display(), "Lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_fails_until_release() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pair.lck");

        let lock = RunLock::acquire(&path).unwrap();
        assert!(RunLock::is_held(&path));
        assert!(matches!(
            RunLock::acquire(&path),
            Err(Error::ConcurrentRun { .. })
        ));

        let holder = RunLock::holder(&path).unwrap();
        assert_eq!(holder.token, lock.token());
        assert_eq!(holder.pid, std::process::id());

        lock.release();
        assert!(!RunLock::is_held(&path));
        RunLock::acquire(&path).unwrap();
    }
}
