//! [`FlakyBackend`] wrapper that fails chosen operations.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bisync_fs::{Backend, DirEntry, Error, LocalBackend, RelPath, Result};
use chrono::{DateTime, Utc};

type Hook = Box<dyn FnOnce() + Send>;

/// Delegates to a [`LocalBackend`] but fails writes, deletes and renames
/// touching any path registered with [`FlakyBackend::fail_on`], and every
/// listing once [`FlakyBackend::fail_listing`] is set.
pub struct FlakyBackend {
    inner: LocalBackend,
    failing: Mutex<BTreeSet<String>>,
    listing_fails: AtomicBool,
    writes: AtomicUsize,
    on_write: Mutex<Option<Hook>>,
}

impl fmt::Debug for FlakyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlakyBackend")
            .field("inner", &self.inner)
            .field("failing", &self.failing)
            .field("writes", &self.writes)
            .finish_non_exhaustive()
    }
}

impl FlakyBackend {
    pub fn new(inner: LocalBackend) -> Self {
        Self {
            inner,
            failing: Mutex::new(BTreeSet::new()),
            listing_fails: AtomicBool::new(false),
            writes: AtomicUsize::new(0),
            on_write: Mutex::new(None),
        }
    }

    /// Run `hook` once, when the next write starts. The write itself still
    /// goes through.
    pub fn on_next_write(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_write.lock().unwrap() = Some(Box::new(hook));
    }

    /// Fail every mutation of `path`.
    pub fn fail_on(&self, path: &str) {
        self.failing.lock().unwrap().insert(path.to_string());
    }

    /// Stop failing `path`.
    pub fn heal(&self, path: &str) {
        self.failing.lock().unwrap().remove(path);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.listing_fails.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check(&self, path: &RelPath) -> Result<()> {
        if self.failing.lock().unwrap().contains(path.as_str()) {
            return Err(Error::io(
                path.as_str(),
                std::io::Error::other("injected failure"),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    fn location(&self) -> String {
        self.inner.location()
    }

    async fn list_dir(&self, dir: &RelPath) -> Result<Vec<DirEntry>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(Error::io(
                dir.as_str(),
                std::io::Error::other("injected listing failure"),
            ));
        }
        self.inner.list_dir(dir).await
    }

    async fn hash(&self, path: &RelPath) -> Result<String> {
        self.inner.hash(path).await
    }

    async fn read(&self, path: &RelPath) -> Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &RelPath, data: Vec<u8>, modified: DateTime<Utc>) -> Result<()> {
        self.check(path)?;
        let hook = self.on_write.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.inner.write(path, data, modified).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, path: &RelPath) -> Result<()> {
        self.check(path)?;
        self.inner.delete(path).await
    }

    async fn rename(&self, from: &RelPath, to: &RelPath) -> Result<()> {
        self.check(from)?;
        self.check(to)?;
        self.inner.rename(from, to).await
    }

    async fn mkdir(&self, path: &RelPath) -> Result<()> {
        self.check(path)?;
        self.inner.mkdir(path).await
    }

    async fn rmdir(&self, path: &RelPath) -> Result<bool> {
        self.check(path)?;
        self.inner.rmdir(path).await
    }
}
