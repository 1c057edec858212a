use async_trait::async_trait;
use tracing::debug;

use super::{build_http_client, with_auth, ExecutionApi};
use crate::config::{secret_from_env, ServiceEndpointConfig};
use crate::errors::EngineError;
use crate::types::{ExecutionResult, OrderIntent};

/// `POST {base_url}/orders` with the [`OrderIntent`] as JSON.
///
/// A non-2xx response is an error. A 2xx response is parsed as an
/// [`ExecutionResult`], which may itself report `success = false`.
pub struct HttpExecutionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpExecutionClient {
    pub fn new(config: &ServiceEndpointConfig) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_http_client(config.timeout_seconds)?,
            endpoint: format!("{}/orders", config.base_url.trim_end_matches('/')),
            api_key: secret_from_env(config.api_key_env.as_deref()),
        })
    }
}

#[async_trait]
impl ExecutionApi for HttpExecutionClient {
    async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionResult, EngineError> {
        debug!(
            symbol = %intent.symbol,
            side = intent.side.as_str(),
            quantity = %intent.quantity,
            "submitting order"
        );

        let response = with_auth(self.client.post(&self.endpoint), self.api_key.as_deref())
            .json(intent)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Execution {
                symbol: intent.symbol.clone(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        Ok(response.json().await?)
    }
}
