//! Atomic I/O operations with file locking

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use fs2::FileExt;

use crate::{Error, Result};

/// Suffix carried by in-flight temporary files. Listings skip these.
pub const PARTIAL_SUFFIX: &str = ".bisync-partial";

static PARTIAL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Temporary sibling used while `path` is being written.
///
/// Names are unique per call so concurrent writers in one process never
/// share a temp file.
pub fn partial_path(path: &Path) -> std::path::PathBuf {
    let temp_name = format!(
        ".{}.{}-{}{}",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id(),
        PARTIAL_COUNTER.fetch_add(1, Ordering::Relaxed),
        PARTIAL_SUFFIX
    );
    path.with_file_name(temp_name)
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so readers see either the old or the
/// new content, never a half-written file. When `modified` is given the
/// modification time is applied to the temp file before the rename.
pub fn write_atomic(path: &Path, content: &[u8], modified: Option<SystemTime>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let temp_path = partial_path(path);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .lock_exclusive()
        .map_err(|_| Error::LockFailed {
            path: path.to_path_buf(),
        })?;

    let written = temp_file
        .write_all(content)
        .and_then(|_| match modified {
            Some(time) => temp_file.set_modified(time),
            None => Ok(()),
        })
        .and_then(|_| temp_file.sync_all());

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&temp_path, e));
    }

    temp_file.unlock().map_err(|_| Error::LockFailed {
        path: path.to_path_buf(),
    })?;
    drop(temp_file);

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::io(path, e)
    })?;

    Ok(())
}

/// Read text content from a file.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}
