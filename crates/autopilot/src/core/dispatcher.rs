use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::clients::ExecutionApi;
use crate::errors::EngineError;
use crate::store::ConfigStore;
use crate::types::{ExecutionResult, OrderIntent};

/// A submission the Execution API accepted.
#[derive(Debug, Clone)]
pub struct DispatchReceipt {
    pub result: ExecutionResult,
    /// Set when the ledger could not be updated after a successful
    /// submission. The order still counts as executed.
    pub ledger_error: Option<String>,
}

/// Submits an [`OrderIntent`] exactly once and records success in the
/// execution ledger. No retries: the next scan is the retry.
pub struct ExecutionDispatcher {
    api: Arc<dyn ExecutionApi>,
    store: Arc<dyn ConfigStore>,
}

impl ExecutionDispatcher {
    pub fn new(api: Arc<dyn ExecutionApi>, store: Arc<dyn ConfigStore>) -> Self {
        Self { api, store }
    }

    pub async fn dispatch(&self, intent: &OrderIntent) -> Result<DispatchReceipt, EngineError> {
        let result = match self.api.submit(intent).await {
            Ok(result) => result,
            Err(e) => {
                error!(symbol = %intent.symbol, error = %e, "order submission failed");
                return Err(e);
            }
        };

        if !result.success {
            let reason = result
                .message
                .clone()
                .unwrap_or_else(|| "execution API reported failure".into());
            warn!(symbol = %intent.symbol, %reason, "order rejected by execution API");
            return Err(EngineError::Execution {
                symbol: intent.symbol.clone(),
                reason,
            });
        }

        let ledger_error = match self.store.record_execution(Utc::now()).await {
            Ok(_) => None,
            Err(e) => {
                error!(
                    symbol = %intent.symbol,
                    error = %e,
                    "order executed but ledger update failed"
                );
                Some(e.to_string())
            }
        };

        info!(
            symbol = %intent.symbol,
            side = intent.side.as_str(),
            quantity = %intent.quantity,
            price = %intent.price,
            leverage = intent.leverage,
            order_id = result.order_id.as_deref().unwrap_or("-"),
            "order executed"
        );

        Ok(DispatchReceipt {
            result,
            ledger_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryConfigStore;
    use crate::types::OrderSide;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedApi {
        calls: AtomicU32,
        response: Result<ExecutionResult, String>,
    }

    #[async_trait]
    impl ExecutionApi for ScriptedApi {
        async fn submit(&self, intent: &OrderIntent) -> Result<ExecutionResult, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone().map_err(|reason| EngineError::Execution {
                symbol: intent.symbol.clone(),
                reason,
            })
        }
    }

    fn intent() -> OrderIntent {
        OrderIntent {
            symbol: "BTCUSDT".into(),
            side: OrderSide::Buy,
            quantity: dec!(0.0001),
            price: dec!(50000),
            stop_loss: None,
            take_profit: None,
            leverage: 25,
        }
    }

    fn setup(response: Result<ExecutionResult, String>) -> (Arc<ScriptedApi>, Arc<MemoryConfigStore>, ExecutionDispatcher) {
        let api = Arc::new(ScriptedApi {
            calls: AtomicU32::new(0),
            response,
        });
        let store = Arc::new(MemoryConfigStore::default());
        let dispatcher = ExecutionDispatcher::new(api.clone(), store.clone());
        (api, store, dispatcher)
    }

    #[tokio::test]
    async fn test_success_records_execution() {
        let (api, store, dispatcher) = setup(Ok(ExecutionResult {
            success: true,
            order_id: Some("42".into()),
            message: None,
        }));

        let receipt = dispatcher.dispatch(&intent()).await.unwrap();
        assert_eq!(receipt.result.order_id.as_deref(), Some("42"));
        assert!(receipt.ledger_error.is_none());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        let stats = store.execution_stats(Utc::now()).await.unwrap();
        assert_eq!(stats.executed_today, 1);
        assert!(stats.last_execution_at.is_some());
    }

    #[tokio::test]
    async fn test_reported_failure_leaves_counters() {
        let (api, store, dispatcher) = setup(Ok(ExecutionResult {
            success: false,
            order_id: None,
            message: Some("insufficient margin".into()),
        }));

        let err = dispatcher.dispatch(&intent()).await.unwrap_err();
        assert!(err.to_string().contains("insufficient margin"));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.execution_stats(Utc::now()).await.unwrap().executed_today, 0);
    }

    #[tokio::test]
    async fn test_transport_error_not_retried() {
        let (api, store, dispatcher) = setup(Err("connection reset".into()));

        assert!(dispatcher.dispatch(&intent()).await.is_err());
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.execution_stats(Utc::now()).await.unwrap().total_executed, 0);
    }
}
