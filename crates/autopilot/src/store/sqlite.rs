//! SQLite-backed Configuration Store.
//!
//! One row holds the engine config as JSON, one row holds the execution
//! ledger. Uses `sqlx::query()` runtime queries since the schema is created
//! via `sqlx::migrate!`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::{debug, info};

use super::{merge_patch, ConfigStore};
use crate::errors::EngineError;
use crate::types::{EngineConfig, EngineConfigPatch, ExecutionStats};

const DAY_FORMAT: &str = "%Y-%m-%d";

pub struct SqliteConfigStore {
    pool: SqlitePool,
}

impl SqliteConfigStore {
    /// Open (or create, `mode=rwc`) the database at `db_path`, run
    /// migrations, and seed the default config on first use.
    pub async fn new(db_path: &str) -> Result<Self, EngineError> {
        Self::connect(&format!("sqlite:{db_path}?mode=rwc")).await
    }

    /// Throwaway database, gone when the store is dropped.
    pub async fn in_memory() -> Result<Self, EngineError> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect(url: &str) -> Result<Self, EngineError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1) // SQLite is single-writer
            .connect(url)
            .await?;

        sqlx::migrate!("../../migrations").run(&pool).await?;

        let store = Self { pool };
        store.seed_defaults().await?;
        info!(url, "config store initialized");
        Ok(store)
    }

    async fn seed_defaults(&self) -> Result<(), EngineError> {
        let json = serde_json::to_string(&EngineConfig::default())?;
        let now = Utc::now();

        sqlx::query(
            "INSERT OR IGNORE INTO engine_config (id, config_json, updated_at) VALUES (1, ?, ?)",
        )
        .bind(&json)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO execution_ledger \
             (id, day, executed_today, total_executed, last_execution_at) \
             VALUES (1, ?, 0, 0, NULL)",
        )
        .bind(now.date_naive().format(DAY_FORMAT).to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of rows in the append-only executions table.
    pub async fn execution_count(&self) -> Result<i64, EngineError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM executions")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("n")?)
    }
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn get(&self) -> Result<EngineConfig, EngineError> {
        let mut conn = self.pool.acquire().await?;
        read_config(&mut conn).await
    }

    async fn update(&self, patch: &EngineConfigPatch) -> Result<EngineConfig, EngineError> {
        let mut tx = self.pool.begin().await?;

        let current = read_config(&mut tx).await?;
        let next = merge_patch(&current, patch)?;

        sqlx::query("UPDATE engine_config SET config_json = ?, updated_at = ? WHERE id = 1")
            .bind(serde_json::to_string(&next)?)
            .bind(Utc::now().timestamp_millis())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            enabled = next.enabled,
            environment = next.environment.as_str(),
            "engine config updated"
        );
        Ok(next)
    }

    async fn execution_stats(&self, now: DateTime<Utc>) -> Result<ExecutionStats, EngineError> {
        let mut conn = self.pool.acquire().await?;
        Ok(read_ledger(&mut conn).await?.as_of(now.date_naive()))
    }

    async fn record_execution(&self, at: DateTime<Utc>) -> Result<ExecutionStats, EngineError> {
        let mut tx = self.pool.begin().await?;

        let next = read_ledger(&mut tx).await?.recorded(at);

        sqlx::query(
            "UPDATE execution_ledger \
             SET day = ?, executed_today = ?, total_executed = ?, last_execution_at = ? \
             WHERE id = 1",
        )
        .bind(next.day.format(DAY_FORMAT).to_string())
        .bind(i64::from(next.executed_today))
        .bind(next.total_executed as i64)
        .bind(at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO executions (executed_at) VALUES (?)")
            .bind(at.timestamp_millis())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            executed_today = next.executed_today,
            total_executed = next.total_executed,
            "execution recorded"
        );
        Ok(next)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

async fn read_config(conn: &mut SqliteConnection) -> Result<EngineConfig, EngineError> {
    let row = sqlx::query("SELECT config_json FROM engine_config WHERE id = 1")
        .fetch_one(&mut *conn)
        .await?;
    let json: String = row.try_get("config_json")?;
    Ok(serde_json::from_str(&json)?)
}

async fn read_ledger(conn: &mut SqliteConnection) -> Result<ExecutionStats, EngineError> {
    let row = sqlx::query(
        "SELECT day, executed_today, total_executed, last_execution_at \
         FROM execution_ledger WHERE id = 1",
    )
    .fetch_one(&mut *conn)
    .await?;

    let day: String = row.try_get("day")?;
    let day = NaiveDate::parse_from_str(&day, DAY_FORMAT).map_err(|e| EngineError::Store {
        reason: format!("bad ledger day {day:?}: {e}"),
    })?;
    let executed_today: i64 = row.try_get("executed_today")?;
    let total_executed: i64 = row.try_get("total_executed")?;
    let last_ms: Option<i64> = row.try_get("last_execution_at")?;

    Ok(ExecutionStats {
        day,
        executed_today: u32::try_from(executed_today).unwrap_or(0),
        total_executed: u64::try_from(total_executed).unwrap_or(0),
        last_execution_at: last_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
    })
}
