//! Retrying file primitives
//!
//! Each attempt takes the path lock, performs exactly one file operation and
//! releases the lock. Backoff sleeps happen with the lock released.

use crate::config::RetryConfig;
use crate::driver::IoDriver;
use crate::error::{is_transient, PersistenceError, Result};
use crate::events::{EventSink, PersistenceEvent};
use crate::lock::{LockHandle, PathLockRegistry};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// File reads and writes with bounded retry-with-backoff
#[derive(Clone)]
pub struct AtomicFileIo {
    registry: Arc<PathLockRegistry>,
    retry: RetryConfig,
    events: Arc<dyn EventSink>,
}

impl AtomicFileIo {
    pub fn new(
        registry: Arc<PathLockRegistry>,
        retry: RetryConfig,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { registry, retry, events }
    }

    pub fn registry(&self) -> &Arc<PathLockRegistry> {
        &self.registry
    }

    /// Lock guarding every file that belongs to `primary`
    pub fn lock_for(&self, primary: &Path) -> LockHandle {
        self.registry.acquire(primary)
    }

    /// Overwrite `path` with `content`, flushing it to disk. The parent
    /// directory is created if missing.
    pub async fn write_with_retry<D: IoDriver>(
        &self,
        driver: &D,
        lock_key: &Path,
        path: &Path,
        content: &str,
    ) -> Result<()> {
        let target = path.to_path_buf();
        let bytes: Arc<[u8]> = Arc::from(content.as_bytes());
        self.with_retry(driver, "write", lock_key, path, move || {
            if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            write_file(&target, &bytes)
        })
        .await
    }

    /// Read the whole of `path` as text
    pub async fn read_with_retry<D: IoDriver>(
        &self,
        driver: &D,
        lock_key: &Path,
        path: &Path,
    ) -> Result<String> {
        let target = path.to_path_buf();
        self.with_retry(driver, "read", lock_key, path, move || fs::read_to_string(&target)).await
    }

    /// Run `op` inside the critical section of `lock_key`, retrying
    /// transient failures. `op` must be safe to repeat.
    pub async fn with_retry<D, R, F>(
        &self,
        driver: &D,
        operation: &'static str,
        lock_key: &Path,
        path: &Path,
        op: F,
    ) -> Result<R>
    where
        D: IoDriver,
        R: Send + 'static,
        F: Fn() -> io::Result<R> + Clone + Send + Sync + 'static,
    {
        let handle = self.lock_for(lock_key);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let attempt_op = op.clone();
            let attempt_lock = handle.clone();
            let outcome = driver
                .run(move || {
                    let _guard = attempt_lock.lock();
                    attempt_op()
                })
                .await?;

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_transient(&err) {
                return Err(PersistenceError::Io(err));
            }

            if attempt >= self.retry.max_attempts {
                return Err(PersistenceError::RetriesExhausted {
                    operation,
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.retry.delay_for(attempt);
            self.events.notify(&PersistenceEvent::RetryScheduled {
                operation,
                path: path.to_path_buf(),
                attempt,
                delay,
                error: err.to_string(),
            });
            driver.pause(delay).await;
        }
    }
}

pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

pub(crate) fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Atomically move `from` onto `to`, replacing it. A failed rename leaves
/// `to` untouched.
pub(crate) fn replace_file(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

/// Promote the verified temp file onto `primary`, first copying the current
/// primary to `backup`.
///
/// `backed_up` is shared across retries of one save: once the `.bak` copy has
/// completed it is not repeated, so a retried promote never copies over it.
pub(crate) fn promote_temp(
    temp: &Path,
    primary: &Path,
    backup: &Path,
    backed_up: &AtomicBool,
) -> io::Result<()> {
    if !backed_up.load(Ordering::SeqCst) {
        if primary.exists() {
            fs::copy(primary, backup)?;
        }
        backed_up.store(true, Ordering::SeqCst);
    }
    replace_file(temp, primary)
}
