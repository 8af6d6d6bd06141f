//! The persistence engine façade
//!
//! Save protocol:
//! 1. serialize the value (failure touches no files)
//! 2. write `<file>.tmp`
//! 3. read it back and make sure it decodes
//! 4. under the primary lock: copy primary to `.bak`, promote the temp file
//! 5. maybe write a rolling backup, then prune
//!
//! Load walks primary, `.bak` and the rolling backups newest first, and
//! falls back to a default value when nothing decodes.

use crate::clock::{Clock, SystemClock};
use crate::config::PersistenceConfig;
use crate::driver::{BlockingDriver, IoDriver, TokioDriver};
use crate::error::{PersistenceError, Result};
use crate::events::{EventSink, LoadSource, PersistenceEvent, TracingEventSink};
use crate::io::{promote_temp, remove_if_exists, write_file, AtomicFileIo};
use crate::lock::PathLockRegistry;
use crate::recovery::RecoveryChain;
use crate::rotation::{scan_backups, BackupEntry, BackupRotator};
use crate::serializer::{JsonSerializer, Serializer};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Produces the value returned when no save can be recovered
pub type DefaultFactory<T> = Arc<dyn Fn() -> T + Send + Sync>;

/// A loaded value and where it came from
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOutcome<T> {
    pub value: T,
    pub source: LoadSource,
}

/// Durable save/load of a single value of type `T`
pub struct PersistenceEngine<T> {
    config: Arc<PersistenceConfig>,
    serializer: Arc<dyn Serializer<T>>,
    default_factory: DefaultFactory<T>,
    file_io: AtomicFileIo,
    rotator: BackupRotator,
    recovery: RecoveryChain<T>,
    events: Arc<dyn EventSink>,
}

/// Builder for [`PersistenceEngine`]
pub struct EngineBuilder<T> {
    config: PersistenceConfig,
    serializer: Option<Arc<dyn Serializer<T>>>,
    default_factory: Option<DefaultFactory<T>>,
    registry: Option<Arc<PathLockRegistry>>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<Arc<dyn EventSink>>,
}

impl<T> EngineBuilder<T>
where
    T: Send + Sync + 'static,
{
    /// Serialization capability (required unless the JSON default applies)
    pub fn serializer(mut self, serializer: Arc<dyn Serializer<T>>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Factory for the value returned when nothing can be recovered
    pub fn default_with(mut self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.default_factory = Some(Arc::new(factory));
        self
    }

    /// Lock registry to share with other engines (defaults to the global one)
    pub fn registry(mut self, registry: Arc<PathLockRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Clock used for backup timestamps and cadence (defaults to system time)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Receiver for notifications (defaults to `tracing`)
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration and assemble the engine
    pub fn build(self) -> Result<PersistenceEngine<T>> {
        self.config.validate()?;

        let serializer = self
            .serializer
            .ok_or_else(|| PersistenceError::config("a serializer is required"))?;
        let default_factory = self
            .default_factory
            .ok_or_else(|| PersistenceError::config("a default value factory is required"))?;
        let registry = self.registry.unwrap_or_else(PathLockRegistry::global);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let events =
            self.events.unwrap_or_else(|| Arc::new(TracingEventSink) as Arc<dyn EventSink>);

        let config = Arc::new(self.config);
        let file_io = AtomicFileIo::new(registry, config.retry.clone(), Arc::clone(&events));
        let rotator = BackupRotator::new(
            Arc::clone(&config),
            file_io.clone(),
            clock,
            Arc::clone(&events),
        );
        let recovery = RecoveryChain::new(
            Arc::clone(&config),
            file_io.clone(),
            Arc::clone(&serializer),
            Arc::clone(&events),
        );

        tracing::debug!("Persistence engine ready for {:?}", config.primary_path());

        Ok(PersistenceEngine {
            config,
            serializer,
            default_factory,
            file_io,
            rotator,
            recovery,
            events,
        })
    }
}

impl<T> PersistenceEngine<T>
where
    T: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    /// JSON-backed engine using `T::default()` as the fallback value
    pub fn new(config: PersistenceConfig) -> Result<Self> {
        Self::builder(config)
            .serializer(Arc::new(JsonSerializer::<T>::pretty()))
            .default_with(T::default)
            .build()
    }
}

impl<T> PersistenceEngine<T>
where
    T: Send + Sync + 'static,
{
    /// Start building an engine; serializer and default factory must be set
    pub fn builder(config: PersistenceConfig) -> EngineBuilder<T> {
        EngineBuilder {
            config,
            serializer: None,
            default_factory: None,
            registry: None,
            clock: None,
            events: None,
        }
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PathLockRegistry> {
        self.file_io.registry()
    }

    /// Durably save `value`, blocking the calling thread
    pub fn save(&self, value: &T) -> Result<()> {
        futures::executor::block_on(self.save_with(&BlockingDriver, value))
    }

    /// Durably save `value` without blocking the runtime
    pub async fn save_async(&self, value: &T) -> Result<()> {
        self.save_with(&TokioDriver, value).await
    }

    /// Load the newest recoverable value, or the default
    pub fn load(&self) -> T {
        self.load_detailed().value
    }

    pub async fn load_async(&self) -> T {
        self.load_detailed_async().await.value
    }

    /// Like [`load`](Self::load), also reporting which file was used
    pub fn load_detailed(&self) -> LoadOutcome<T> {
        futures::executor::block_on(self.load_with(&BlockingDriver))
    }

    pub async fn load_detailed_async(&self) -> LoadOutcome<T> {
        self.load_with(&TokioDriver).await
    }

    /// Whether a primary or `.bak` file exists
    pub fn has_save(&self) -> bool {
        self.config.primary_path().exists() || self.config.backup_path().exists()
    }

    /// Remove the primary, `.bak`, temp and every rolling backup.
    /// Returns how many files were removed; nothing to remove is not an error.
    pub fn delete_all(&self) -> Result<usize> {
        futures::executor::block_on(self.delete_all_with(&BlockingDriver))
    }

    pub async fn delete_all_async(&self) -> Result<usize> {
        self.delete_all_with(&TokioDriver).await
    }

    /// Rolling backups for this file, oldest first
    pub fn list_backups(&self) -> Result<Vec<BackupEntry>> {
        futures::executor::block_on(self.rotator.list(&BlockingDriver))
    }

    /// Apply the retention limit now; returns the removed backups
    pub fn prune_backups(&self) -> Result<Vec<std::path::PathBuf>> {
        futures::executor::block_on(self.rotator.prune(&BlockingDriver))
    }

    pub(crate) async fn save_with<D: IoDriver>(&self, driver: &D, value: &T) -> Result<()> {
        let primary = self.config.primary_path();

        match self.write_and_swap(driver, value).await {
            Ok(bytes) => {
                self.events.notify(&PersistenceEvent::Saved { path: primary, bytes });
            }
            Err(err) => {
                self.events.notify(&PersistenceEvent::SaveFailed {
                    path: primary,
                    reason: err.to_string(),
                });
                return Err(err);
            }
        }

        // Already reported through the event sink; backups never fail a save
        let _ = self.rotator.maybe_rotate(driver).await;

        Ok(())
    }

    async fn write_and_swap<D: IoDriver>(&self, driver: &D, value: &T) -> Result<usize> {
        let text = self.serializer.serialize(value)?;

        let primary = self.config.primary_path();
        let temp = self.config.temp_path();

        self.file_io.write_with_retry(driver, &primary, &temp, &text).await?;

        if let Err(err) = self.verify_temp(driver, &text).await {
            self.discard_temp(driver).await;
            return Err(err);
        }

        let bytes: Arc<[u8]> = Arc::from(text.into_bytes());
        let len = bytes.len();
        let backup = self.config.backup_path();
        let swap_primary = primary.clone();
        let backed_up = Arc::new(AtomicBool::new(false));

        self.file_io
            .with_retry(driver, "swap", &primary, &primary, move || {
                // A concurrent save may have replaced or already promoted the
                // temp file since it was verified; restore this save's bytes.
                if fs::read(&temp).ok().as_deref() != Some(&bytes[..]) {
                    write_file(&temp, &bytes)?;
                    if fs::read(&temp)? != bytes[..] {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "temp file does not match the verified content",
                        ));
                    }
                }

                promote_temp(&temp, &swap_primary, &backup, &backed_up)
            })
            .await?;

        Ok(len)
    }

    async fn verify_temp<D: IoDriver>(&self, driver: &D, text: &str) -> Result<()> {
        let primary = self.config.primary_path();
        let temp = self.config.temp_path();

        match self.file_io.read_with_retry(driver, &primary, &temp).await {
            Ok(written) if written == text => {}
            // Replaced or already promoted by a concurrent save on this path;
            // the swap step rewrites and re-checks it under the lock
            Ok(_) => tracing::debug!("{:?} was replaced by a concurrent save", temp),
            Err(err) if err.is_not_found() => {
                tracing::debug!("{:?} was promoted by a concurrent save", temp)
            }
            Err(err) => return Err(err),
        }

        if text.trim().is_empty() {
            return Err(PersistenceError::verification(format!("{temp:?} is empty after write")));
        }

        self.serializer
            .deserialize(text)
            .map(|_| ())
            .map_err(|e| PersistenceError::verification(format!("{temp:?} does not decode: {e}")))
    }

    async fn discard_temp<D: IoDriver>(&self, driver: &D) {
        let primary = self.config.primary_path();
        let temp = self.config.temp_path();
        let target = temp.clone();

        if let Err(err) = self
            .file_io
            .with_retry(driver, "discard temp", &primary, &temp, move || remove_if_exists(&target))
            .await
        {
            tracing::warn!("Could not remove temp file {:?}: {}", temp, err);
        }
    }

    pub(crate) async fn load_with<D: IoDriver>(&self, driver: &D) -> LoadOutcome<T> {
        match self.recovery.recover(driver).await {
            Some((value, source)) => LoadOutcome { value, source },
            None => {
                self.events.notify(&PersistenceEvent::FellBackToDefault {
                    path: self.config.primary_path(),
                });
                LoadOutcome { value: (self.default_factory)(), source: LoadSource::Default }
            }
        }
    }

    pub(crate) async fn delete_all_with<D: IoDriver>(&self, driver: &D) -> Result<usize> {
        let primary = self.config.primary_path();
        let files = [primary.clone(), self.config.backup_path(), self.config.temp_path()];
        let dir = self.config.backups_dir();
        let prefix = self.config.rolling_backup_prefix();

        let removed = self
            .file_io
            .with_retry(driver, "delete", &primary, &primary, move || {
                let mut removed = 0;
                for path in &files {
                    if remove_if_exists(path)? {
                        removed += 1;
                    }
                }
                for entry in scan_backups(&dir, &prefix)? {
                    if remove_if_exists(&entry.path)? {
                        removed += 1;
                    }
                }
                Ok(removed)
            })
            .await?;

        self.events.notify(&PersistenceEvent::Deleted { path: primary, removed });
        Ok(removed)
    }
}
