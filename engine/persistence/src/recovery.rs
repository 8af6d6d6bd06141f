//! Recovery chain walked on load
//!
//! Candidates are tried in a fixed order: primary, `.bak`, then rolling
//! backups newest first. The first one that exists, reads and decodes wins.

use crate::config::PersistenceConfig;
use crate::driver::IoDriver;
use crate::error::{PersistenceError, Result};
use crate::events::{EventSink, LoadSource, PersistenceEvent};
use crate::io::AtomicFileIo;
use crate::rotation::scan_backups;
use crate::serializer::Serializer;
use std::path::PathBuf;
use std::sync::Arc;

/// One place a saved value might be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub source: LoadSource,
}

/// Walks the candidates for one primary file
pub struct RecoveryChain<T> {
    config: Arc<PersistenceConfig>,
    file_io: AtomicFileIo,
    serializer: Arc<dyn Serializer<T>>,
    events: Arc<dyn EventSink>,
}

impl<T> RecoveryChain<T> {
    pub fn new(
        config: Arc<PersistenceConfig>,
        file_io: AtomicFileIo,
        serializer: Arc<dyn Serializer<T>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self { config, file_io, serializer, events }
    }

    /// Primary and `.bak`, which need no directory listing
    pub fn fixed_candidates(&self) -> [Candidate; 2] {
        [
            Candidate { path: self.config.primary_path(), source: LoadSource::Primary },
            Candidate { path: self.config.backup_path(), source: LoadSource::Backup },
        ]
    }

    /// Rolling backups, newest first. A directory that cannot be listed is
    /// reported and contributes no candidates.
    pub async fn rolling_candidates<D: IoDriver>(&self, driver: &D) -> Vec<Candidate> {
        let primary = self.config.primary_path();
        let dir = self.config.backups_dir();
        let prefix = self.config.rolling_backup_prefix();
        let listing = self
            .file_io
            .with_retry(driver, "list backups", &primary, &dir, {
                let dir = dir.clone();
                move || scan_backups(&dir, &prefix)
            })
            .await;

        match listing {
            Ok(entries) => entries
                .into_iter()
                .rev()
                .map(|entry| Candidate {
                    source: LoadSource::Rolling(entry.path.clone()),
                    path: entry.path,
                })
                .collect(),
            Err(err) => {
                self.events.notify(&PersistenceEvent::CandidateRejected {
                    path: dir,
                    reason: err.to_string(),
                });
                Vec::new()
            }
        }
    }

    /// Every candidate in priority order
    pub async fn candidates<D: IoDriver>(&self, driver: &D) -> Vec<Candidate> {
        let mut candidates = self.fixed_candidates().to_vec();
        candidates.extend(self.rolling_candidates(driver).await);
        candidates
    }

    /// Try a single candidate
    pub async fn try_candidate<D: IoDriver>(&self, driver: &D, candidate: &Candidate) -> Result<T> {
        let primary = self.config.primary_path();
        let text = self.file_io.read_with_retry(driver, &primary, &candidate.path).await?;

        if text.trim().is_empty() {
            return Err(PersistenceError::corruption(format!("{:?} is empty", candidate.path)));
        }

        self.serializer.deserialize(&text)
    }

    /// First decodable candidate, or `None` once every candidate failed
    pub async fn recover<D: IoDriver>(&self, driver: &D) -> Option<(T, LoadSource)> {
        for candidate in self.fixed_candidates() {
            if let Some(value) = self.attempt(driver, &candidate).await {
                return Some((value, candidate.source));
            }
        }

        // The backup directory is only listed once primary and `.bak` failed
        for candidate in self.rolling_candidates(driver).await {
            if let Some(value) = self.attempt(driver, &candidate).await {
                return Some((value, candidate.source));
            }
        }

        None
    }

    async fn attempt<D: IoDriver>(&self, driver: &D, candidate: &Candidate) -> Option<T> {
        if !candidate.path.exists() {
            return None;
        }

        match self.try_candidate(driver, candidate).await {
            Ok(value) => {
                if candidate.source != LoadSource::Primary {
                    self.events
                        .notify(&PersistenceEvent::Recovered { source: candidate.source.clone() });
                }
                Some(value)
            }
            Err(err) => {
                self.events.notify(&PersistenceEvent::CandidateRejected {
                    path: candidate.path.clone(),
                    reason: err.to_string(),
                });
                None
            }
        }
    }
}
