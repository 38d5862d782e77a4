//! Durable backing for the pool record.

use super::{PoolError, PoolState};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

/// One keyed record per pool instance, replaced whole on every save.
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<Option<PoolState>, PoolError>;
    fn save(&self, state: &PoolState) -> Result<(), PoolError>;
}

/// Process-local store, used when no state directory is configured.
#[derive(Default)]
pub struct MemoryStore {
    record: Mutex<Option<PoolState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: PoolState) -> Self {
        Self {
            record: Mutex::new(Some(state)),
        }
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<PoolState>, PoolError> {
        Ok(self.record.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, state: &PoolState) -> Result<(), PoolError> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        Ok(())
    }
}

/// JSON file store. Writes go to a temp file which is then renamed over the
/// record, so a crash mid-write leaves the previous record intact.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl StateStore for FileStore {
    fn load(&self) -> Result<Option<PoolState>, PoolError> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "No nonce pool record, starting cold");
            return Ok(None);
        }

        let data = std::fs::read(&self.path)
            .map_err(|e| PoolError::Storage(format!("read {}: {e}", self.path.display())))?;
        let state: PoolState = serde_json::from_slice(&data)
            .map_err(|e| PoolError::Storage(format!("parse {}: {e}", self.path.display())))?;

        info!(
            path = %self.path.display(),
            sponsors = state.sponsor_count(),
            "Nonce pool record loaded"
        );
        Ok(Some(state))
    }

    fn save(&self, state: &PoolState) -> Result<(), PoolError> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| PoolError::Storage(format!("serialize pool state: {e}")))?;

        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = tmp.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PoolError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        std::fs::write(&tmp, &json)
            .map_err(|e| PoolError::Storage(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| PoolError::Storage(format!("rename {}: {e}", tmp.display())))?;
        Ok(())
    }
}
