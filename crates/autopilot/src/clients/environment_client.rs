use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{build_http_client, EnvironmentSource};
use crate::errors::EngineError;
use crate::types::TradingEnvironment;

#[derive(Debug, Deserialize)]
struct EnvironmentPayload {
    environment: String,
}

/// `GET {url}` → `{"environment": "live"}`.
pub struct HttpEnvironmentSource {
    client: reqwest::Client,
    url: String,
}

impl HttpEnvironmentSource {
    pub fn new(url: &str, timeout_seconds: u64) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_http_client(timeout_seconds)?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl EnvironmentSource for HttpEnvironmentSource {
    async fn current(&self) -> Result<TradingEnvironment, EngineError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Environment {
                reason: format!("HTTP {status}"),
            });
        }

        let payload: EnvironmentPayload = response.json().await?;
        payload
            .environment
            .parse()
            .map_err(|reason| EngineError::Environment { reason })
    }
}

/// Poll `source` and publish changes into `tx`. Only actual changes wake
/// receivers. Read failures are logged and the last value stands.
pub fn spawn_environment_poller(
    source: Arc<dyn EnvironmentSource>,
    tx: Arc<watch::Sender<TradingEnvironment>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_s = interval.as_secs(), "environment poller started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("environment poller shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    match source.current().await {
                        Ok(env) => {
                            tx.send_if_modified(|current| {
                                if *current == env {
                                    return false;
                                }
                                *current = env;
                                true
                            });
                        }
                        Err(e) => warn!("environment poll failed: {e:#}"),
                    }
                }
            }
        }
    })
}
