//! Parallel fan-out to signal providers.
//!
//! Each provider runs under its own timeout. A provider that errors or
//! times out contributes nothing; the scan carries on with the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::clients::SignalProvider;
use crate::errors::EngineError;
use crate::types::{Signal, SignalDirection, SignalScope, TradingMode};

struct RegisteredProvider {
    provider: Arc<dyn SignalProvider>,
    timeout: Duration,
}

/// Outcome of one fan-out.
#[derive(Debug, Default)]
pub struct AggregatedSignals {
    /// Deduplicated per (provider, symbol, direction), ordered by provider
    /// registration then by each provider's own response order.
    pub signals: Vec<Signal>,
    /// Providers that errored or timed out this round.
    pub failed: Vec<String>,
}

pub struct SignalAggregator {
    providers: Vec<RegisteredProvider>,
}

impl SignalAggregator {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    /// Register a provider. Registration order is the tie-break rank.
    pub fn register(&mut self, provider: Arc<dyn SignalProvider>, timeout: Duration) {
        info!(
            provider = provider.id(),
            timeout_s = timeout.as_secs(),
            "signal provider registered"
        );
        self.providers.push(RegisteredProvider { provider, timeout });
    }

    pub fn with_provider(mut self, provider: Arc<dyn SignalProvider>, timeout: Duration) -> Self {
        self.register(provider, timeout);
        self
    }

    /// Provider id → registration rank (0 is first).
    pub fn provider_rank(&self) -> HashMap<String, usize> {
        self.providers
            .iter()
            .enumerate()
            .map(|(rank, p)| (p.provider.id().to_string(), rank))
            .collect()
    }

    /// Query every registered provider listed in `enabled`, concurrently.
    pub async fn collect(
        &self,
        enabled: &[String],
        scope: &SignalScope,
        mode: TradingMode,
    ) -> AggregatedSignals {
        for id in enabled {
            if !self.providers.iter().any(|p| p.provider.id() == id) {
                warn!(provider = %id, "configured provider is not registered, skipping");
            }
        }

        let active: Vec<&RegisteredProvider> = self
            .providers
            .iter()
            .filter(|p| enabled.iter().any(|id| id == p.provider.id()))
            .collect();

        if active.is_empty() {
            warn!("no active signal providers for this scan");
            return AggregatedSignals::default();
        }

        let mut futures = Vec::with_capacity(active.len());
        for entry in &active {
            futures.push(query_provider(entry, scope, mode));
        }

        let results = futures::future::join_all(futures).await;

        let mut out = AggregatedSignals::default();
        for (entry, result) in active.iter().zip(results) {
            let id = entry.provider.id();
            match result {
                Ok(signals) => {
                    debug!(provider = id, count = signals.len(), "provider responded");
                    out.signals.extend(dedup_provider_signals(id, signals));
                }
                Err(e) => {
                    warn!(provider = id, error = %e, "provider query failed");
                    out.failed.push(id.to_string());
                }
            }
        }

        info!(
            signals = out.signals.len(),
            providers = active.len(),
            failed = out.failed.len(),
            "signals aggregated"
        );
        out
    }
}

impl Default for SignalAggregator {
    fn default() -> Self {
        Self::new()
    }
}

async fn query_provider(
    entry: &RegisteredProvider,
    scope: &SignalScope,
    mode: TradingMode,
) -> Result<Vec<Signal>, EngineError> {
    match tokio::time::timeout(entry.timeout, entry.provider.get_signals(scope, mode)).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::ProviderTimeout {
            provider: entry.provider.id().to_string(),
            timeout_seconds: entry.timeout.as_secs(),
        }),
    }
}

/// Keep the highest-confidence signal per (symbol, direction) for one
/// provider. The survivor takes the slot of the first occurrence.
fn dedup_provider_signals(provider_id: &str, signals: Vec<Signal>) -> Vec<Signal> {
    let mut slots: HashMap<(String, SignalDirection), usize> = HashMap::new();
    let mut kept: Vec<Signal> = Vec::with_capacity(signals.len());

    for mut signal in signals {
        signal.provider_id = provider_id.to_string();
        let key = (signal.symbol.clone(), signal.direction);
        match slots.get(&key) {
            Some(&idx) => {
                if signal.confidence > kept[idx].confidence {
                    kept[idx] = signal;
                }
            }
            None => {
                slots.insert(key, kept.len());
                kept.push(signal);
            }
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssetClass;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    struct StaticProvider {
        id: &'static str,
        signals: Vec<Signal>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl SignalProvider for StaticProvider {
        fn id(&self) -> &str {
            self.id
        }

        async fn get_signals(
            &self,
            _scope: &SignalScope,
            _mode: TradingMode,
        ) -> Result<Vec<Signal>, EngineError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(EngineError::Provider {
                    provider: self.id.into(),
                    reason: "boom".into(),
                });
            }
            Ok(self.signals.clone())
        }
    }

    fn signal(symbol: &str, direction: SignalDirection, confidence: u8) -> Signal {
        Signal {
            provider_id: String::new(),
            symbol: symbol.into(),
            direction,
            confidence,
            entry_price: dec!(100),
            target_price: None,
            stop_price: None,
            is_fallback: false,
            reason: None,
        }
    }

    fn provider(id: &'static str, signals: Vec<Signal>) -> Arc<dyn SignalProvider> {
        Arc::new(StaticProvider {
            id,
            signals,
            delay: Duration::ZERO,
            fail: false,
        })
    }

    fn scope() -> SignalScope {
        SignalScope {
            symbols: vec![],
            asset_class: AssetClass::Crypto,
            strategies: vec![],
        }
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_collects_in_registration_order() {
        let agg = SignalAggregator::new()
            .with_provider(
                provider("b", vec![signal("ETHUSDT", SignalDirection::Sell, 70)]),
                Duration::from_secs(1),
            )
            .with_provider(
                provider("a", vec![signal("BTCUSDT", SignalDirection::Buy, 80)]),
                Duration::from_secs(1),
            );

        let out = agg.collect(&ids(&["a", "b"]), &scope(), TradingMode::Normal).await;
        assert_eq!(out.signals.len(), 2);
        assert_eq!(out.signals[0].provider_id, "b");
        assert_eq!(out.signals[1].provider_id, "a");
        assert!(out.failed.is_empty());
        assert_eq!(agg.provider_rank()["b"], 0);
    }

    #[tokio::test]
    async fn test_dedup_keeps_highest_confidence() {
        let agg = SignalAggregator::new().with_provider(
            provider(
                "a",
                vec![
                    signal("BTCUSDT", SignalDirection::Buy, 60),
                    signal("BTCUSDT", SignalDirection::Sell, 55),
                    signal("BTCUSDT", SignalDirection::Buy, 75),
                ],
            ),
            Duration::from_secs(1),
        );

        let out = agg.collect(&ids(&["a"]), &scope(), TradingMode::Normal).await;
        assert_eq!(out.signals.len(), 2);
        assert_eq!(out.signals[0].direction, SignalDirection::Buy);
        assert_eq!(out.signals[0].confidence, 75);
    }

    #[tokio::test]
    async fn test_disabled_and_unregistered_providers_skipped() {
        let agg = SignalAggregator::new()
            .with_provider(
                provider("a", vec![signal("BTCUSDT", SignalDirection::Buy, 80)]),
                Duration::from_secs(1),
            )
            .with_provider(
                provider("b", vec![signal("BTCUSDT", SignalDirection::Buy, 90)]),
                Duration::from_secs(1),
            );

        let out = agg.collect(&ids(&["a", "ghost"]), &scope(), TradingMode::Normal).await;
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].provider_id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_isolated_to_one_provider() {
        let slow: Arc<dyn SignalProvider> = Arc::new(StaticProvider {
            id: "slow",
            signals: vec![signal("BTCUSDT", SignalDirection::Buy, 90)],
            delay: Duration::from_secs(60),
            fail: false,
        });
        let agg = SignalAggregator::new()
            .with_provider(slow, Duration::from_secs(5))
            .with_provider(
                provider("fast", vec![signal("BTCUSDT", SignalDirection::Buy, 80)]),
                Duration::from_secs(5),
            );

        let out = agg
            .collect(&ids(&["slow", "fast"]), &scope(), TradingMode::Normal)
            .await;
        assert_eq!(out.failed, vec!["slow".to_string()]);
        assert_eq!(out.signals.len(), 1);
        assert_eq!(out.signals[0].provider_id, "fast");
    }

    #[tokio::test]
    async fn test_error_contributes_zero_signals() {
        let broken: Arc<dyn SignalProvider> = Arc::new(StaticProvider {
            id: "broken",
            signals: vec![],
            delay: Duration::ZERO,
            fail: true,
        });
        let agg = SignalAggregator::new()
            .with_provider(broken, Duration::from_secs(1))
            .with_provider(
                provider("ok", vec![signal("ETHUSDT", SignalDirection::Sell, 66)]),
                Duration::from_secs(1),
            );

        let out = agg.collect(&ids(&["broken", "ok"]), &scope(), TradingMode::Normal).await;
        assert_eq!(out.failed, vec!["broken".to_string()]);
        assert_eq!(out.signals.len(), 1);
    }
}
