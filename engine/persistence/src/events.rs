//! Structured notifications emitted by the engine
//!
//! Failures that have a fallback (a rejected recovery candidate, a failed
//! rotation) never reach the caller as errors; they surface here instead.

use parking_lot::Mutex;
use std::path::PathBuf;
use std::time::Duration;

/// Where a loaded value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadSource {
    /// The primary file
    Primary,
    /// The `.bak` file
    Backup,
    /// A rolling backup
    Rolling(PathBuf),
    /// Nothing usable was found; the value was default-constructed
    Default,
}

/// Something noteworthy that happened inside the engine
#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceEvent {
    /// A value was written and promoted to the primary file
    Saved { path: PathBuf, bytes: usize },

    /// A save was aborted; the primary file is untouched
    SaveFailed { path: PathBuf, reason: String },

    /// A file operation hit contention and will be retried
    RetryScheduled {
        operation: &'static str,
        path: PathBuf,
        attempt: u32,
        delay: Duration,
        error: String,
    },

    /// A recovery candidate could not be used
    CandidateRejected { path: PathBuf, reason: String },

    /// A value was loaded from somewhere other than the primary file
    Recovered { source: LoadSource },

    /// Every candidate failed and a default value was returned
    FellBackToDefault { path: PathBuf },

    /// A rolling backup was written
    BackupCreated { path: PathBuf },

    /// An old rolling backup was removed
    BackupPruned { path: PathBuf },

    /// Rotation was skipped because the last one is too recent
    RotationSkipped { next_eligible_in: chrono::Duration },

    /// Rotation or pruning failed; the enclosing save still succeeded
    RotationFailed { reason: String },

    /// All files for a path were removed
    Deleted { path: PathBuf, removed: usize },
}

/// Receiver of engine notifications
pub trait EventSink: Send + Sync {
    fn notify(&self, event: &PersistenceEvent);
}

/// Forwards every event to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn notify(&self, event: &PersistenceEvent) {
        match event {
            PersistenceEvent::Saved { path, bytes } => {
                tracing::debug!("Saved {:?} ({} bytes)", path, bytes);
            }
            PersistenceEvent::SaveFailed { path, reason } => {
                tracing::error!("Save of {:?} failed: {}", path, reason);
            }
            PersistenceEvent::RetryScheduled { operation, path, attempt, delay, error } => {
                tracing::warn!(
                    "{} on {:?} failed (attempt {}): {}; retrying in {:?}",
                    operation,
                    path,
                    attempt,
                    error,
                    delay
                );
            }
            PersistenceEvent::CandidateRejected { path, reason } => {
                tracing::warn!("Skipping unusable save candidate {:?}: {}", path, reason);
            }
            PersistenceEvent::Recovered { source } => {
                tracing::warn!("Recovered save data from {:?}", source);
            }
            PersistenceEvent::FellBackToDefault { path } => {
                tracing::warn!("No usable save found for {:?}, starting from defaults", path);
            }
            PersistenceEvent::BackupCreated { path } => {
                tracing::info!("Created rolling backup {:?}", path);
            }
            PersistenceEvent::BackupPruned { path } => {
                tracing::info!("Removed old rolling backup {:?}", path);
            }
            PersistenceEvent::RotationSkipped { next_eligible_in } => {
                tracing::debug!(
                    "Rolling backup not due for another {}s",
                    next_eligible_in.num_seconds()
                );
            }
            PersistenceEvent::RotationFailed { reason } => {
                tracing::warn!("Rolling backup failed: {}", reason);
            }
            PersistenceEvent::Deleted { path, removed } => {
                tracing::info!("Deleted {} file(s) for {:?}", removed, path);
            }
        }
    }
}

/// Keeps every event in memory (for testing)
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<PersistenceEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far
    pub fn events(&self) -> Vec<PersistenceEvent> {
        self.events.lock().clone()
    }

    /// Count of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&PersistenceEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for MemoryEventSink {
    fn notify(&self, event: &PersistenceEvent) {
        tracing::trace!("Recorded event {:?}", event);
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_and_counts() {
        let sink = MemoryEventSink::new();
        sink.notify(&PersistenceEvent::BackupCreated { path: PathBuf::from("a") });
        sink.notify(&PersistenceEvent::BackupPruned { path: PathBuf::from("b") });
        sink.notify(&PersistenceEvent::BackupCreated { path: PathBuf::from("c") });

        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.count(|e| matches!(e, PersistenceEvent::BackupCreated { .. })), 2);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_tracing_sink_handles_every_event() {
        let sink = TracingEventSink;
        sink.notify(&PersistenceEvent::Recovered { source: LoadSource::Backup });
        sink.notify(&PersistenceEvent::RotationSkipped {
            next_eligible_in: chrono::Duration::minutes(5),
        });
    }
}
