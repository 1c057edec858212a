use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{merge_patch, ConfigStore};
use crate::errors::EngineError;
use crate::types::{EngineConfig, EngineConfigPatch, ExecutionStats};

/// Process-local store. Used by tests and by deployments that accept
/// losing the armed flag and ledger on restart.
pub struct MemoryConfigStore {
    inner: Mutex<Inner>,
}

struct Inner {
    config: EngineConfig,
    stats: ExecutionStats,
}

impl MemoryConfigStore {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_stats(config, ExecutionStats::empty(Utc::now().date_naive()))
    }

    pub fn with_stats(config: EngineConfig, stats: ExecutionStats) -> Self {
        Self {
            inner: Mutex::new(Inner { config, stats }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, EngineError> {
        self.inner.lock().map_err(|_| EngineError::Store {
            reason: "memory store lock poisoned".into(),
        })
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self) -> Result<EngineConfig, EngineError> {
        Ok(self.lock()?.config.clone())
    }

    async fn update(&self, patch: &EngineConfigPatch) -> Result<EngineConfig, EngineError> {
        let mut inner = self.lock()?;
        let next = merge_patch(&inner.config, patch)?;
        inner.config = next.clone();
        Ok(next)
    }

    async fn execution_stats(&self, now: DateTime<Utc>) -> Result<ExecutionStats, EngineError> {
        Ok(self.lock()?.stats.as_of(now.date_naive()))
    }

    async fn record_execution(&self, at: DateTime<Utc>) -> Result<ExecutionStats, EngineError> {
        let mut inner = self.lock()?;
        inner.stats = inner.stats.recorded(at);
        Ok(inner.stats.clone())
    }
}
