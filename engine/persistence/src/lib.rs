//! # Resilient Persistence
//!
//! Crash-resilient save/load of a single structured value to a file.
//!
//! ## Architecture
//!
//! - **PathLockRegistry**: one lock per primary path, shared by every engine
//! - **AtomicFileIO**: file reads/writes with bounded retry-with-backoff
//! - **BackupRotator**: timestamped rolling backups with a retention limit
//! - **RecoveryChain**: primary, then `.bak`, then rolling backups newest first
//! - **PersistenceEngine**: the save/load façade, sync and async
//!
//! ## On-disk layout
//!
//! ```text
//! <base_dir>/<file_name>                                 primary
//! <base_dir>/<file_name>.bak                             previous generation
//! <base_dir>/<file_name>.tmp                             staging file during save
//! <base_dir>/Backups/<file_name>.backup_yyyyMMdd_HHmmss  rolling backups
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use resilient_persistence::{PersistenceConfig, PersistenceEngine};
//! use serde::{Deserialize, Serialize};
//! use tempfile::TempDir;
//!
//! #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
//! struct Progress {
//!     count: u32,
//! }
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let temp_dir = TempDir::new()?;
//!     let engine: PersistenceEngine<Progress> =
//!         PersistenceEngine::new(PersistenceConfig::new(temp_dir.path(), "progress.json"))?;
//!
//!     engine.save(&Progress { count: 1 })?;
//!     assert_eq!(engine.load(), Progress { count: 1 });
//!
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod io;
pub mod lock;
pub mod recovery;
pub mod rotation;
pub mod serializer;


pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PersistenceConfig, RetryConfig};
pub use driver::{BlockingDriver, IoDriver, TokioDriver};
pub use engine::{DefaultFactory, EngineBuilder, LoadOutcome, PersistenceEngine};
pub use error::{PersistenceError, Result};
pub use events::{EventSink, LoadSource, MemoryEventSink, PersistenceEvent, TracingEventSink};
pub use io::AtomicFileIo;
pub use lock::{LockHandle, PathLockRegistry};
pub use recovery::{Candidate, RecoveryChain};
pub use rotation::{BackupEntry, BackupRotator, Rotation};
pub use serializer::{JsonSerializer, Serializer};

/// Default number of rolling backups kept per file
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// Default minimum hours between rolling backups
pub const DEFAULT_BACKUP_INTERVAL_HOURS: u64 = 6;

/// Default attempts per file operation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default backoff unit between attempts
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 100;

/// Directory holding rolling backups, relative to the base directory
pub const BACKUPS_DIR_NAME: &str = "Backups";

/// Suffix of the previous-generation copy
pub const BACKUP_SUFFIX: &str = ".bak";

/// Suffix of the staging file written during save
pub const TEMP_SUFFIX: &str = ".tmp";

/// Marker between the file name and the timestamp of a rolling backup
pub const ROLLING_BACKUP_MARKER: &str = ".backup_";

/// `yyyyMMdd_HHmmss`; sorts lexicographically in time order
pub const ROLLING_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
