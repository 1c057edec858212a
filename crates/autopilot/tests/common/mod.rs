//! In-process collaborators shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use autopilot::clients::{ExecutionApi, PositionStore, SignalProvider};
use autopilot::core::{ExecutionDispatcher, Scheduler, SignalAggregator};
use autopilot::errors::EngineError;
use autopilot::store::{ConfigStore, MemoryConfigStore};
use autopilot::types::{
    EngineConfig, ExecutionResult, OrderIntent, Signal, SignalDirection, SignalScope, TradingMode,
};

pub fn signal(
    provider: &str,
    symbol: &str,
    direction: SignalDirection,
    confidence: u8,
    entry: Decimal,
) -> Signal {
    Signal {
        provider_id: provider.to_string(),
        symbol: symbol.to_string(),
        direction,
        confidence,
        entry_price: entry,
        target_price: None,
        stop_price: None,
        is_fallback: false,
        reason: None,
    }
}

/// Armed config listing `providers` in order, with everything else at defaults.
pub fn armed_config(providers: &[&str]) -> EngineConfig {
    EngineConfig {
        enabled: true,
        providers: providers.iter().map(|p| p.to_string()).collect(),
        ..EngineConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Signal provider
// ---------------------------------------------------------------------------

pub struct MockProvider {
    id: String,
    signals: Vec<Signal>,
    delay: Duration,
    fail: bool,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: &str, signals: Vec<Signal>) -> Self {
        Self {
            id: id.to_string(),
            signals,
            delay: Duration::ZERO,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(id: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(id, Vec::new())
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_signals(
        &self,
        _scope: &SignalScope,
        _mode: TradingMode,
    ) -> Result<Vec<Signal>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(EngineError::Provider {
                provider: self.id.clone(),
                reason: "mock failure".into(),
            });
        }
        Ok(self.signals.clone())
    }
}

// ---------------------------------------------------------------------------
// Execution API
// ---------------------------------------------------------------------------

pub struct MockExecution {
    result: ExecutionResult,
    delay: Duration,
    submitted: Mutex<Vec<OrderIntent>>,
}

impl MockExecution {
    pub fn accepting() -> Self {
        Self {
            result: ExecutionResult {
                success: true,
                order_id: Some("ord-1".into()),
                message: None,
            },
            delay: Duration::ZERO,
            submitted: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting(message: &str) -> Self {
        Self {
            result: ExecutionResult {
                success: false,
                order_id: None,
                message: Some(message.to_string()),
            },
            ..Self::accepting()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn submitted(&self) -> Vec<OrderIntent> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionApi for MockExecution {
    async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionResult, EngineError> {
        self.submitted.lock().unwrap().push(intent.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.result.clone())
    }
}

// ---------------------------------------------------------------------------
// Position store
// ---------------------------------------------------------------------------

pub struct MockPositions {
    open: Vec<String>,
    daily_loss: Decimal,
    delay: Duration,
}

impl MockPositions {
    pub fn flat() -> Self {
        Self {
            open: Vec::new(),
            daily_loss: dec!(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_open(mut self, symbols: &[&str]) -> Self {
        self.open = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_daily_loss(mut self, loss: Decimal) -> Self {
        self.daily_loss = loss;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl PositionStore for MockPositions {
    async fn list_open_symbols(&self) -> Result<Vec<String>, EngineError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.open.clone())
    }

    async fn daily_loss(&self) -> Result<Decimal, EngineError> {
        Ok(self.daily_loss)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<MemoryConfigStore>,
    pub execution: Arc<MockExecution>,
    pub shutdown: CancellationToken,
}

pub struct HarnessBuilder {
    store: Arc<MemoryConfigStore>,
    providers: Vec<(Arc<MockProvider>, Duration)>,
    execution: Arc<MockExecution>,
    positions: Arc<MockPositions>,
}

impl HarnessBuilder {
    pub fn new(store: MemoryConfigStore) -> Self {
        Self {
            store: Arc::new(store),
            providers: Vec::new(),
            execution: Arc::new(MockExecution::accepting()),
            positions: Arc::new(MockPositions::flat()),
        }
    }

    pub fn provider(mut self, provider: Arc<MockProvider>) -> Self {
        self.providers.push((provider, Duration::from_secs(45)));
        self
    }

    pub fn provider_with_timeout(mut self, provider: Arc<MockProvider>, timeout: Duration) -> Self {
        self.providers.push((provider, timeout));
        self
    }

    pub fn execution(mut self, execution: MockExecution) -> Self {
        self.execution = Arc::new(execution);
        self
    }

    pub fn positions(mut self, positions: MockPositions) -> Self {
        self.positions = Arc::new(positions);
        self
    }

    pub fn build(self) -> Harness {
        let mut aggregator = SignalAggregator::new();
        for (provider, timeout) in self.providers {
            aggregator.register(provider, timeout);
        }

        let store: Arc<dyn ConfigStore> = self.store.clone();
        let dispatcher = ExecutionDispatcher::new(self.execution.clone(), store.clone());
        let shutdown = CancellationToken::new();
        let scheduler = Arc::new(Scheduler::new(
            store,
            aggregator,
            self.positions,
            dispatcher,
            shutdown.clone(),
        ));

        Harness {
            scheduler,
            store: self.store,
            execution: self.execution,
            shutdown,
        }
    }
}

/// Two providers agreeing on BTC BUY, the baseline executable scan.
pub fn btc_consensus() -> (Arc<MockProvider>, Arc<MockProvider>) {
    let qwen = MockProvider::new(
        "qwen",
        vec![signal("qwen", "BTCUSDT", SignalDirection::Buy, 80, dec!(50000))],
    );
    let deepseek = MockProvider::new(
        "deepseek",
        vec![signal("deepseek", "BTCUSDT", SignalDirection::Buy, 75, dec!(50100))],
    );
    (Arc::new(qwen), Arc::new(deepseek))
}
