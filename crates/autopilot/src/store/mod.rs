//! Configuration Store: the single authoritative copy of [`EngineConfig`]
//! and the execution ledger.
//!
//! Every scan re-reads both from here. Nothing in the engine treats an
//! in-process copy as the truth.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryConfigStore;
pub use sqlite::SqliteConfigStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::validate::engine_config_errors;
use crate::errors::EngineError;
use crate::types::{EngineConfig, EngineConfigPatch, ExecutionStats};

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Current engine configuration.
    async fn get(&self) -> Result<EngineConfig, EngineError>;

    /// Apply a partial update. The merged result is validated first; on
    /// failure nothing is written and `EngineError::Config` is returned.
    /// Idempotent, last write wins.
    async fn update(&self, patch: &EngineConfigPatch) -> Result<EngineConfig, EngineError>;

    /// Ledger as of `now`. `executed_today` reads 0 once the UTC day has
    /// rolled over since the last execution.
    async fn execution_stats(&self, now: DateTime<Utc>) -> Result<ExecutionStats, EngineError>;

    /// Count one successful submission at `at` and start the cooldown.
    async fn record_execution(&self, at: DateTime<Utc>) -> Result<ExecutionStats, EngineError>;
}

/// Merge `patch` into `current` and validate the result.
pub(crate) fn merge_patch(
    current: &EngineConfig,
    patch: &EngineConfigPatch,
) -> Result<EngineConfig, EngineError> {
    let next = patch.apply(current);
    let errors = engine_config_errors(&next);
    if errors.is_empty() {
        Ok(next)
    } else {
        Err(EngineError::Config(errors.join("; ")))
    }
}
