//! Execution drivers for file operations
//!
//! The save/load protocols are written once as async code against
//! [`IoDriver`]. [`BlockingDriver`] runs every step on the calling thread and
//! backs the synchronous API; [`TokioDriver`] moves each file operation onto
//! the blocking pool and suspends between retries, so the async API never
//! stalls a runtime worker.

use crate::error::{PersistenceError, Result};
use async_trait::async_trait;
use std::io;
use std::time::Duration;

/// Runs single file operations and waits between retry attempts
#[async_trait]
pub trait IoDriver: Send + Sync {
    /// Perform one blocking file operation
    async fn run<R, F>(&self, op: F) -> Result<io::Result<R>>
    where
        R: Send + 'static,
        F: FnOnce() -> io::Result<R> + Send + 'static;

    /// Wait before the next retry attempt
    async fn pause(&self, delay: Duration);
}

/// Runs operations inline and sleeps the thread
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingDriver;

#[async_trait]
impl IoDriver for BlockingDriver {
    async fn run<R, F>(&self, op: F) -> Result<io::Result<R>>
    where
        R: Send + 'static,
        F: FnOnce() -> io::Result<R> + Send + 'static,
    {
        Ok(op())
    }

    async fn pause(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Runs operations on tokio's blocking pool and suspends with the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioDriver;

#[async_trait]
impl IoDriver for TokioDriver {
    async fn run<R, F>(&self, op: F) -> Result<io::Result<R>>
    where
        R: Send + 'static,
        F: FnOnce() -> io::Result<R> + Send + 'static,
    {
        tokio::task::spawn_blocking(op).await.map_err(|e| PersistenceError::task(e.to_string()))
    }

    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_blocking_driver_runs_inline() {
        let caller = std::thread::current().id();
        let result = futures::executor::block_on(
            BlockingDriver.run(move || Ok(std::thread::current().id() == caller)),
        );
        assert!(result.unwrap().unwrap());
    }

    #[test]
    fn test_blocking_driver_pause_sleeps() {
        let start = Instant::now();
        futures::executor::block_on(BlockingDriver.pause(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_tokio_driver_passes_io_errors_through() {
        let result: Result<io::Result<()>> =
            TokioDriver.run(|| Err(io::Error::from(io::ErrorKind::PermissionDenied))).await;
        let inner = result.unwrap();
        assert_eq!(inner.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_tokio_driver_reports_panicked_worker() {
        let result: Result<io::Result<()>> = TokioDriver.run(|| panic!("worker blew up")).await;
        assert!(matches!(result, Err(PersistenceError::Task(_))));
    }
}
