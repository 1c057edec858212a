//! Forces the engine off whenever the trading environment changes.
//!
//! Switching between paper and live must never carry an armed engine
//! across. The guard persists `enabled = false` together with the new
//! environment and halts the scan loop. It never re-arms; an operator has
//! to start the engine again.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::scheduler::Scheduler;
use crate::errors::EngineError;
use crate::store::ConfigStore;
use crate::types::{EngineConfigPatch, TradingEnvironment};

pub struct EnvironmentGuard {
    store: Arc<dyn ConfigStore>,
    scheduler: Arc<Scheduler>,
    rx: watch::Receiver<TradingEnvironment>,
    shutdown: CancellationToken,
}

impl EnvironmentGuard {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        scheduler: Arc<Scheduler>,
        rx: watch::Receiver<TradingEnvironment>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            scheduler,
            rx,
            shutdown,
        }
    }

    /// Startup check: if the environment differs from the one the stored
    /// config was armed in, disarm before anything can scan. Returns true
    /// when a disarm was written.
    pub async fn reconcile(&self) -> Result<bool, EngineError> {
        let current = *self.rx.borrow();
        let stored = self.store.get().await?;
        if stored.environment == current {
            return Ok(false);
        }

        warn!(
            stored = stored.environment.as_str(),
            current = current.as_str(),
            "environment changed since last run, disarming"
        );
        self.disarm(current).await?;
        Ok(true)
    }

    /// Halt the loop and persist the disarm for `environment`.
    pub async fn on_change(&self, environment: TradingEnvironment) -> Result<(), EngineError> {
        warn!(
            environment = environment.as_str(),
            "trading environment switched, disarming engine"
        );
        self.disarm(environment).await
    }

    async fn disarm(&self, environment: TradingEnvironment) -> Result<(), EngineError> {
        self.scheduler
            .halt(&format!("environment switched to {environment}"));

        match self
            .store
            .update(&EngineConfigPatch::disarm_for(environment))
            .await
        {
            Ok(config) => {
                self.scheduler.remember_config(&config);
                info!(
                    environment = environment.as_str(),
                    "engine disarmed for new environment"
                );
                Ok(())
            }
            Err(e) => {
                self.scheduler
                    .record_error(&format!("failed to persist environment disarm: {e}"));
                Err(e)
            }
        }
    }

    /// Watch for environment changes until shutdown.
    pub async fn run(mut self) -> Result<()> {
        info!(environment = self.rx.borrow().as_str(), "environment guard started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("environment guard shutting down");
                    break;
                }
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        warn!("environment channel closed, guard exiting");
                        break;
                    }
                    let environment = *self.rx.borrow_and_update();
                    if let Err(e) = self.on_change(environment).await {
                        error!(error = %e, "environment disarm failed");
                    }
                }
            }
        }

        Ok(())
    }
}
