//! Path-keyed mutual exclusion
//!
//! Every critical section touching a primary file, its `.bak` or its rolling
//! backups goes through the lock registered for the primary path. Two engines
//! pointed at the same file therefore exclude each other as long as they share
//! a registry.

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

lazy_static::lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<PathLockRegistry> = Arc::new(PathLockRegistry::new());
}

/// Map from absolute file path to its lock. Entries are never removed.
#[derive(Debug, Default)]
pub struct PathLockRegistry {
    locks: DashMap<PathBuf, LockHandle>,
}

/// Borrowable lock for one path; clones guard the same critical section
#[derive(Debug, Clone, Default)]
pub struct LockHandle {
    inner: Arc<Mutex<()>>,
}

impl LockHandle {
    /// Block until the critical section is free
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.inner.lock()
    }

    /// Enter the critical section only if nobody holds it
    pub fn try_lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.inner.try_lock()
    }

    /// Whether two handles guard the same critical section
    pub fn same_as(&self, other: &LockHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PathLockRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    /// The process-wide registry engines use unless given their own
    pub fn global() -> Arc<PathLockRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    /// Get the lock for `path`, creating it on first use
    pub fn acquire(&self, path: &Path) -> LockHandle {
        let key = absolute_key(path);
        self.locks.entry(key).or_default().clone()
    }

    /// Number of paths that have been registered
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no path has been registered yet
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Absolute, lexically normalized form of `path`: `.` is dropped and `..`
/// removes the preceding component, so every spelling of a file shares a key.
fn absolute_key(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(_) => path.to_path_buf(),
        }
    };

    let mut key = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match key.components().next_back() {
                Some(Component::Normal(_)) => {
                    key.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => key.push(component),
            },
            other => key.push(other),
        }
    }
    key
}
