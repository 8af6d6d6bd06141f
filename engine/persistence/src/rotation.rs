//! Rolling backup lifecycle
//!
//! Rolling backups live in `<base_dir>/Backups/` and are named
//! `<file_name>.backup_<yyyyMMdd_HHmmss>`. Because the timestamp sorts
//! lexicographically in chronological order, sorting file names is sorting
//! by age.

use crate::clock::Clock;
use crate::config::PersistenceConfig;
use crate::driver::IoDriver;
use crate::error::{PersistenceError, Result};
use crate::events::{EventSink, PersistenceEvent};
use crate::io::AtomicFileIo;
use crate::ROLLING_TIMESTAMP_FORMAT;
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One rolling backup file
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackupEntry {
    /// File name, which orders entries chronologically
    pub file_name: String,

    /// Full path of the backup
    pub path: PathBuf,

    /// Timestamp parsed from the file name
    pub created_at: DateTime<Utc>,
}

impl BackupEntry {
    /// Parse a directory entry name; `None` if it is not a backup of `prefix`
    pub fn parse(dir: &Path, file_name: &str, prefix: &str) -> Option<Self> {
        let stamp = file_name.strip_prefix(prefix)?;
        let naive = NaiveDateTime::parse_from_str(stamp, ROLLING_TIMESTAMP_FORMAT).ok()?;

        Some(Self {
            file_name: file_name.to_string(),
            path: dir.join(file_name),
            created_at: naive.and_utc(),
        })
    }
}

/// Outcome of a rotation attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rotation {
    /// A new rolling backup was written
    Created { path: PathBuf, pruned: Vec<PathBuf> },
    /// The previous backup is too recent
    NotDue,
}

/// Creates and prunes rolling backups for one primary file
pub struct BackupRotator {
    config: Arc<PersistenceConfig>,
    file_io: AtomicFileIo,
    clock: Arc<dyn Clock>,
    events: Arc<dyn EventSink>,
    last_rotation: Mutex<Option<DateTime<Utc>>>,
}

impl BackupRotator {
    pub fn new(
        config: Arc<PersistenceConfig>,
        file_io: AtomicFileIo,
        clock: Arc<dyn Clock>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { config, file_io, clock, events, last_rotation: Mutex::new(None) }
    }

    /// When this instance last wrote a rolling backup
    pub fn last_rotation(&self) -> Option<DateTime<Utc>> {
        *self.last_rotation.lock()
    }

    /// Write a rolling backup if the cadence allows, then prune.
    ///
    /// Failures are reported through the event sink and returned, but callers
    /// treat them as non-fatal.
    pub async fn maybe_rotate<D: IoDriver>(&self, driver: &D) -> Result<Rotation> {
        let now = self.clock.now();

        // Claim the slot up front so concurrent saves on this instance don't
        // both rotate; give it back if the copy fails.
        let previous = {
            let mut last = self.last_rotation.lock();
            if let Some(at) = *last {
                let elapsed = now.signed_duration_since(at);
                let interval = self.config.backup_interval();
                // A clock that went backwards makes the slot eligible again
                if elapsed >= chrono::Duration::zero() && elapsed < interval {
                    drop(last);
                    self.events.notify(&PersistenceEvent::RotationSkipped {
                        next_eligible_in: interval - elapsed,
                    });
                    return Ok(Rotation::NotDue);
                }
            }
            last.replace(now)
        };

        let path = match self.copy_primary(driver, now).await {
            Ok(path) => path,
            Err(err) => {
                *self.last_rotation.lock() = previous;
                self.events.notify(&PersistenceEvent::RotationFailed { reason: err.to_string() });
                return Err(err);
            }
        };

        // The backup exists now, so the slot stays claimed even if pruning fails
        match self.prune(driver).await {
            Ok(pruned) => Ok(Rotation::Created { path, pruned }),
            Err(err) => {
                self.events.notify(&PersistenceEvent::RotationFailed { reason: err.to_string() });
                Err(err)
            }
        }
    }

    async fn copy_primary<D: IoDriver>(&self, driver: &D, now: DateTime<Utc>) -> Result<PathBuf> {
        let primary = self.config.primary_path();
        let dir = self.config.backups_dir();
        let backup_name = format!(
            "{}{}",
            self.config.rolling_backup_prefix(),
            now.format(ROLLING_TIMESTAMP_FORMAT)
        );
        let target = dir.join(&backup_name);

        let (source, dest) = (primary.clone(), target.clone());
        self.file_io
            .with_retry(driver, "rolling backup", &primary, &target, move || {
                fs::create_dir_all(&dir)?;
                fs::copy(&source, &dest).map(|_| ())
            })
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    PersistenceError::backup(format!("{primary:?} missing at rotation"))
                } else {
                    PersistenceError::backup(e.to_string())
                }
            })?;

        self.events.notify(&PersistenceEvent::BackupCreated { path: target.clone() });
        Ok(target)
    }

    /// Delete the oldest rolling backups until at most `max_backups` remain
    pub async fn prune<D: IoDriver>(&self, driver: &D) -> Result<Vec<PathBuf>> {
        let primary = self.config.primary_path();
        let dir = self.config.backups_dir();
        let prefix = self.config.rolling_backup_prefix();
        let keep = self.config.max_backups;

        let removed = self
            .file_io
            .with_retry(driver, "prune backups", &primary, &dir, {
                let dir = dir.clone();
                move || {
                    let entries = scan_backups(&dir, &prefix)?;
                    let excess = entries.len().saturating_sub(keep);
                    let mut removed = Vec::with_capacity(excess);
                    for entry in entries.into_iter().take(excess) {
                        match fs::remove_file(&entry.path) {
                            Ok(()) => removed.push(entry.path),
                            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                            Err(err) => return Err(err),
                        }
                    }
                    Ok(removed)
                }
            })
            .await
            .map_err(|e| PersistenceError::backup(format!("pruning {dir:?} failed: {e}")))?;

        for path in &removed {
            self.events.notify(&PersistenceEvent::BackupPruned { path: path.clone() });
        }

        Ok(removed)
    }

    /// Rolling backups for this file, oldest first
    pub async fn list<D: IoDriver>(&self, driver: &D) -> Result<Vec<BackupEntry>> {
        let primary = self.config.primary_path();
        let dir = self.config.backups_dir();
        let prefix = self.config.rolling_backup_prefix();

        self.file_io
            .with_retry(driver, "list backups", &primary, &dir, {
                let dir = dir.clone();
                move || scan_backups(&dir, &prefix)
            })
            .await
    }
}

/// Backups of `prefix` inside `dir`, sorted by name (oldest first). A missing
/// directory holds no backups.
pub(crate) fn scan_backups(dir: &Path, prefix: &str) -> io::Result<Vec<BackupEntry>> {
    let read_dir = match fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if let Some(backup) = name.to_str().and_then(|n| BackupEntry::parse(dir, n, prefix)) {
            entries.push(backup);
        }
    }

    entries.sort();
    Ok(entries)
}
