use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::normalize::canonical_symbol;
use super::{build_http_client, with_auth, PositionStore};
use crate::config::{secret_from_env, ServiceEndpointConfig};
use crate::errors::EngineError;

#[derive(Debug, Deserialize)]
struct OpenPositionRow {
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct DailyPnl {
    /// Signed: negative means a loss.
    realized_pnl: Decimal,
}

/// Reads open positions and today's realized P&L over HTTP.
///
/// - `GET {base_url}/positions/open` → `[{"symbol": "BTCUSDT", ...}, ...]`
/// - `GET {base_url}/pnl/daily` → `{"realized_pnl": "-12.50"}`
pub struct HttpPositionClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPositionClient {
    pub fn new(config: &ServiceEndpointConfig) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_http_client(config.timeout_seconds)?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: secret_from_env(config.api_key_env.as_deref()),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, EngineError> {
        let url = format!("{}{path}", self.base_url);
        let response = with_auth(self.client.get(&url), self.api_key.as_deref())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::PositionStore {
                reason: format!("GET {path} returned HTTP {status}"),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PositionStore for HttpPositionClient {
    async fn list_open_symbols(&self) -> Result<Vec<String>, EngineError> {
        let rows: Vec<OpenPositionRow> = self.get("/positions/open").await?;
        Ok(rows.iter().map(|r| canonical_symbol(&r.symbol)).collect())
    }

    async fn daily_loss(&self) -> Result<Decimal, EngineError> {
        let pnl: DailyPnl = self.get("/pnl/daily").await?;
        Ok((-pnl.realized_pnl).max(Decimal::ZERO))
    }
}
