//! In-memory [`IndexPersistence`] for tests and ephemeral sessions.
//!
//! Holds the last saved snapshot behind `std::sync::RwLock`. Nothing
//! survives the process.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{Result, StudioError};

use super::{IndexPersistence, IndexSnapshot};

/// Snapshot holder that keeps state only in memory.
pub struct InMemoryPersistence {
    snapshot: RwLock<Option<IndexSnapshot>>,
    saves: AtomicUsize,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(None),
            saves: AtomicUsize::new(0),
        }
    }

    /// Start from an existing snapshot, as if it had been saved earlier.
    pub fn with_snapshot(snapshot: IndexSnapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> Option<IndexSnapshot> {
        self.snapshot.read().ok().and_then(|s| s.clone())
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexPersistence for InMemoryPersistence {
    async fn load(&self) -> Result<Option<IndexSnapshot>> {
        let guard = self
            .snapshot
            .read()
            .map_err(|_| StudioError::Storage("snapshot lock poisoned".into()))?;
        Ok(guard.clone())
    }

    async fn save(&self, snapshot: &IndexSnapshot) -> Result<()> {
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| StudioError::Storage("snapshot lock poisoned".into()))?;
        *guard = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
