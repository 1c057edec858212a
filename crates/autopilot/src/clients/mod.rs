//! External collaborators and their HTTP implementations.
//!
//! The engine only sees the traits; tests substitute in-process mocks.

pub mod environment_client;
pub mod execution_client;
pub mod normalize;
pub mod position_client;
pub mod signal_client;

pub use environment_client::{spawn_environment_poller, HttpEnvironmentSource};
pub use execution_client::HttpExecutionClient;
pub use position_client::HttpPositionClient;
pub use signal_client::HttpSignalProvider;

use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::errors::EngineError;
use crate::types::{
    ExecutionResult, OrderIntent, Signal, SignalScope, TradingEnvironment, TradingMode,
};

/// A source of ranked trade ideas.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Stable id, matched against `EngineConfig::providers`.
    fn id(&self) -> &str;

    /// Recommendations for `scope`. May be empty. Degraded data comes back
    /// with `is_fallback = true`.
    async fn get_signals(
        &self,
        scope: &SignalScope,
        mode: TradingMode,
    ) -> Result<Vec<Signal>, EngineError>;
}

#[async_trait]
pub trait ExecutionApi: Send + Sync {
    async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionResult, EngineError>;
}

#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Canonical symbols with an open position.
    async fn list_open_symbols(&self) -> Result<Vec<String>, EngineError>;

    /// Realized loss so far today (UTC), as a non-negative amount.
    async fn daily_loss(&self) -> Result<Decimal, EngineError>;
}

#[async_trait]
pub trait EnvironmentSource: Send + Sync {
    async fn current(&self) -> Result<TradingEnvironment, EngineError>;
}

/// Shared reqwest client builder for every HTTP collaborator.
pub(crate) fn build_http_client(timeout_seconds: u64) -> Result<reqwest::Client, EngineError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .user_agent(concat!("autopilot/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Attach a bearer token when one is configured.
pub(crate) fn with_auth(
    request: reqwest::RequestBuilder,
    api_key: Option<&str>,
) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) => request.bearer_auth(key),
        None => request,
    }
}
