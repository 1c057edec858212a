//! HTTP signal provider with a per-provider circuit breaker.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::normalize::parse_recommendations;
use super::{build_http_client, with_auth, SignalProvider};
use crate::config::{secret_from_env, ProviderEndpointConfig};
use crate::constants::{CIRCUIT_BREAKER_COOLDOWN_SECONDS, CIRCUIT_BREAKER_THRESHOLD};
use crate::errors::EngineError;
use crate::types::{Signal, SignalRequest, SignalScope, TradingMode};

/// Consecutive-failure breaker. Once open, calls are skipped until the
/// cooldown elapses; the next call after that is a trial.
#[derive(Debug)]
struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            consecutive_failures: 0,
            open_until: None,
        }
    }

    fn is_open(&mut self, now: Instant) -> bool {
        match self.open_until {
            Some(until) if now < until => true,
            Some(_) => {
                self.open_until = None;
                false
            }
            None => false,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.open_until = None;
    }

    /// Returns true if this failure opened the circuit.
    fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.threshold {
            self.consecutive_failures = 0;
            self.open_until = Some(now + self.cooldown);
            return true;
        }
        false
    }
}

/// `POST {base_url}/signals` with `{symbols, asset_class, strategies, mode}`.
pub struct HttpSignalProvider {
    id: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    breaker: Mutex<CircuitBreaker>,
}

impl HttpSignalProvider {
    pub fn new(config: &ProviderEndpointConfig, default_timeout: u64) -> Result<Self, EngineError> {
        Ok(Self {
            id: config.id.clone(),
            client: build_http_client(config.effective_timeout(default_timeout))?,
            endpoint: format!("{}/signals", config.base_url.trim_end_matches('/')),
            api_key: secret_from_env(config.api_key_env.as_deref()),
            breaker: Mutex::new(CircuitBreaker::new(
                CIRCUIT_BREAKER_THRESHOLD,
                Duration::from_secs(CIRCUIT_BREAKER_COOLDOWN_SECONDS),
            )),
        })
    }

    /// Override the breaker settings.
    pub fn with_circuit_breaker(self, threshold: u32, cooldown: Duration) -> Self {
        Self {
            breaker: Mutex::new(CircuitBreaker::new(threshold, cooldown)),
            ..self
        }
    }

    fn circuit_open(&self) -> bool {
        self.breaker
            .lock()
            .map(|mut b| b.is_open(Instant::now()))
            .unwrap_or(false)
    }

    fn note_result<T>(&self, result: &Result<T, EngineError>) {
        let Ok(mut breaker) = self.breaker.lock() else {
            return;
        };
        match result {
            Ok(_) => breaker.record_success(),
            Err(e) => {
                if breaker.record_failure(Instant::now()) {
                    warn!(
                        provider = %self.id,
                        error = %e,
                        cooldown_s = breaker.cooldown.as_secs(),
                        "circuit opened after repeated failures"
                    );
                }
            }
        }
    }

    async fn fetch(
        &self,
        scope: &SignalScope,
        mode: TradingMode,
    ) -> Result<Vec<Signal>, EngineError> {
        let body = SignalRequest { scope, mode };
        let response = with_auth(self.client.post(&self.endpoint), self.api_key.as_deref())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::Provider {
                provider: self.id.clone(),
                reason: format!("HTTP {status}: {}", truncate(&text, 200)),
            });
        }

        let payload: Value = response.json().await?;
        Ok(parse_recommendations(&self.id, payload))
    }
}

#[async_trait]
impl SignalProvider for HttpSignalProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_signals(
        &self,
        scope: &SignalScope,
        mode: TradingMode,
    ) -> Result<Vec<Signal>, EngineError> {
        if self.circuit_open() {
            debug!(provider = %self.id, "circuit open, skipping provider");
            return Ok(Vec::new());
        }

        let result = self.fetch(scope, mode).await;
        self.note_result(&result);
        result
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
