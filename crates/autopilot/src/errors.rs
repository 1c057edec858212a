use thiserror::Error;

/// Typed error hierarchy for the execution engine.
///
/// Library-internal errors use specific variants; the binary wraps with
/// `anyhow::Context` for propagation. None of these are fatal once the
/// scheduler is running: every scan resolves back to idle.
#[derive(Error, Debug)]
pub enum EngineError {
    // -- Signal providers ---------------------------------------------------
    #[error("signal provider {provider} failed: {reason}")]
    Provider { provider: String, reason: String },

    #[error("signal provider {provider} timed out after {timeout_seconds}s")]
    ProviderTimeout {
        provider: String,
        timeout_seconds: u64,
    },

    // -- Sizing -------------------------------------------------------------
    #[error("sizing failed: {reason}")]
    Sizing { reason: String },

    // -- Execution ----------------------------------------------------------
    #[error("execution rejected for {symbol}: {reason}")]
    Execution { symbol: String, reason: String },

    // -- Collaborators ------------------------------------------------------
    #[error("position store error: {reason}")]
    PositionStore { reason: String },

    #[error("environment source error: {reason}")]
    Environment { reason: String },

    // -- Configuration store -------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {reason}")]
    Store { reason: String },

    // -- Forwarded errors ---------------------------------------------------
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
