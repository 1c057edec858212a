//! Timer-driven scan loop and the `Idle → Scanning → Executing` state
//! machine.
//!
//! One scan runs at a time. Stop requests are cooperative: a cancellation
//! token is checked before the signal fetch, before the position query,
//! and before execution. An Execution API call already in flight is never
//! interrupted. Every downstream error resolves the scan back to idle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::admission::{AdmissionContext, AdmissionController};
use super::aggregator::SignalAggregator;
use super::dispatcher::ExecutionDispatcher;
use super::risk::size_order;
use crate::clients::PositionStore;
use crate::errors::EngineError;
use crate::store::ConfigStore;
use crate::types::{
    EngineConfig, EngineConfigPatch, EngineRunState, EngineStatus, ExecutionStats, ScanOutcome,
    Signal, SignalScope,
};

#[derive(Debug, Default)]
struct StatusInner {
    last_scan_at: Option<DateTime<Utc>>,
    last_outcome: Option<ScanOutcome>,
    last_signal: Option<Signal>,
    last_error: Option<String>,
    cached_config: Option<EngineConfig>,
    cached_stats: Option<ExecutionStats>,
}

/// Whether a scan honours the armed flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanKind {
    Timer,
    Manual,
}

/// Puts the state back to `Idle` however the scan ends.
struct ScanGuard<'a> {
    state: &'a Mutex<EngineRunState>,
}

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            *state = EngineRunState::Idle;
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn ConfigStore>,
    aggregator: SignalAggregator,
    admission: AdmissionController,
    positions: Arc<dyn PositionStore>,
    dispatcher: ExecutionDispatcher,

    state: Mutex<EngineRunState>,
    status: RwLock<StatusInner>,

    /// Process-wide shutdown; every loop token is a child of this.
    shutdown: CancellationToken,
    /// Token for the current run. Cancelled and replaced by stop/halt.
    epoch: Mutex<CancellationToken>,
    loop_active: AtomicBool,
    /// Running loop and the token it watches.
    handle: tokio::sync::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        aggregator: SignalAggregator,
        positions: Arc<dyn PositionStore>,
        dispatcher: ExecutionDispatcher,
        shutdown: CancellationToken,
    ) -> Self {
        let admission = AdmissionController::new(aggregator.provider_rank());
        Self {
            store,
            aggregator,
            admission,
            positions,
            dispatcher,
            state: Mutex::new(EngineRunState::Idle),
            status: RwLock::new(StatusInner::default()),
            epoch: Mutex::new(shutdown.child_token()),
            shutdown,
            loop_active: AtomicBool::new(false),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Arm the engine: persist `enabled = true` and start the timer loop.
    pub async fn start(self: &Arc<Self>) -> Result<EngineConfig, EngineError> {
        let config = self.store.update(&EngineConfigPatch::enabled(true)).await?;
        self.remember_config(&config);
        self.spawn_loop().await;
        info!(
            environment = config.environment.as_str(),
            interval_s = config.scan_interval_seconds,
            "engine started"
        );
        Ok(config)
    }

    /// Disarm: cancel the loop, persist `enabled = false`, and wait for the
    /// loop (including any in-flight submission) to finish.
    pub async fn stop(&self) -> Result<EngineConfig, EngineError> {
        self.cancel_epoch();
        let persisted = self.store.update(&EngineConfigPatch::enabled(false)).await;

        let running = self.handle.lock().await.take();
        if let Some((_, handle)) = running {
            if let Err(e) = handle.await {
                error!(error = %e, "scan loop task failed");
            }
        }

        match persisted {
            Ok(config) => {
                self.remember_config(&config);
                info!("engine stopped");
                Ok(config)
            }
            Err(e) => {
                error!(error = %e, "engine stopped locally but disarm was not persisted");
                self.record_error(&e.to_string());
                Err(e)
            }
        }
    }

    /// Cancel the loop without touching stored config. Used when something
    /// else (the environment guard) owns the disarm write.
    pub fn halt(&self, reason: &str) {
        warn!(reason, "scan loop halted");
        self.cancel_epoch();
    }

    /// Wait for the loop to exit after the shutdown token fires. Stored
    /// config is left alone so an armed engine resumes on restart.
    pub async fn wait_stopped(&self) {
        let running = self.handle.lock().await.take();
        if let Some((_, handle)) = running {
            if let Err(e) = handle.await {
                error!(error = %e, "scan loop task failed");
            }
        }
    }

    /// Resume the loop after a restart if the stored config is armed.
    pub async fn resume_if_armed(self: &Arc<Self>) -> Result<bool, EngineError> {
        let config = self.store.get().await?;
        self.remember_config(&config);
        if config.enabled {
            info!("stored config is armed, resuming scan loop");
            self.spawn_loop().await;
        }
        Ok(config.enabled)
    }

    async fn spawn_loop(self: &Arc<Self>) {
        let mut slot = self.handle.lock().await;
        if let Some((token, handle)) = slot.as_ref() {
            if !token.is_cancelled() && !handle.is_finished() {
                debug!("scan loop already running");
                return;
            }
        }
        // A halted loop may still be finishing its last scan.
        if let Some((_, old)) = slot.take() {
            if let Err(e) = old.await {
                error!(error = %e, "previous scan loop task failed");
            }
        }

        let token = self.current_epoch();
        let this = Arc::clone(self);
        self.loop_active.store(true, Ordering::SeqCst);
        let handle = tokio::spawn({
            let token = token.clone();
            async move { this.run_loop(token).await }
        });
        *slot = Some((token, handle));
    }

    /// Timer loop. The interval is re-read from the store every cycle.
    pub async fn run_loop(&self, token: CancellationToken) {
        self.loop_active.store(true, Ordering::SeqCst);
        info!("scan loop started");

        loop {
            let interval = Duration::from_secs(self.current_interval().await);
            tokio::select! {
                _ = token.cancelled() => {
                    info!("scan loop shutting down");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    let outcome = self.scan(&token, ScanKind::Timer).await;
                    if matches!(outcome, ScanOutcome::Disabled | ScanOutcome::Disarmed { .. }) {
                        info!(outcome = outcome.label(), "engine disarmed, scan loop exiting");
                        break;
                    }
                }
            }
        }

        self.loop_active.store(false, Ordering::SeqCst);
    }

    // -----------------------------------------------------------------------
    // Scans
    // -----------------------------------------------------------------------

    /// One timer-style scan: dropped if busy, skipped if disarmed.
    pub async fn tick(&self) -> ScanOutcome {
        let token = self.current_epoch();
        self.scan(&token, ScanKind::Timer).await
    }

    /// One scan that ignores the armed flag. Still dropped if busy, and
    /// still subject to every admission rule.
    pub async fn manual_scan(&self) -> ScanOutcome {
        let token = self.current_epoch();
        self.scan(&token, ScanKind::Manual).await
    }

    async fn scan(&self, token: &CancellationToken, kind: ScanKind) -> ScanOutcome {
        let Some(_guard) = self.try_begin_scan() else {
            debug!("scan already in flight, tick dropped");
            return ScanOutcome::Busy;
        };

        let outcome = match self.scan_inner(token, kind).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "scan failed");
                ScanOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        self.record_outcome(&outcome);
        outcome
    }

    async fn scan_inner(
        &self,
        token: &CancellationToken,
        kind: ScanKind,
    ) -> Result<ScanOutcome, EngineError> {
        // Fresh config and ledger every scan.
        let config = self.store.get().await?;
        self.remember_config(&config);
        if kind == ScanKind::Timer && !config.enabled {
            return Ok(ScanOutcome::Disabled);
        }

        let now = Utc::now();
        let stats = self.store.execution_stats(now).await?;
        self.remember_stats(&stats);
        if let Err(rejection) = AdmissionController::precheck(&config, &stats, now) {
            info!(%rejection, "scan skipped by precheck");
            return Ok(ScanOutcome::Rejected {
                symbol: None,
                rejection,
            });
        }

        // -- Fetch -----------------------------------------------------------
        if token.is_cancelled() {
            return Ok(ScanOutcome::Cancelled);
        }
        let scope = SignalScope {
            symbols: config.watchlist.clone(),
            asset_class: config.asset_class,
            strategies: config.strategies.iter().cloned().collect(),
        };
        let aggregated = tokio::select! {
            _ = token.cancelled() => return Ok(ScanOutcome::Cancelled),
            out = self.aggregator.collect(&config.providers, &scope, config.trading_mode) => out,
        };

        let Some(candidate) = self.admission.select(&aggregated.signals, &config) else {
            debug!(signals = aggregated.signals.len(), "no candidate this scan");
            return Ok(ScanOutcome::NoCandidate);
        };
        self.remember_signal(&candidate.signal);

        // -- Positions -------------------------------------------------------
        if token.is_cancelled() {
            return Ok(ScanOutcome::Cancelled);
        }
        let (open, daily_loss) = tokio::select! {
            _ = token.cancelled() => return Ok(ScanOutcome::Cancelled),
            r = async {
                tokio::try_join!(self.positions.list_open_symbols(), self.positions.daily_loss())
            } => r?,
        };

        let ctx = AdmissionContext {
            open_symbols: open.into_iter().collect::<HashSet<_>>(),
            executed_today: stats.executed_today,
            last_execution_at: stats.last_execution_at,
            daily_loss,
            now: Utc::now(),
        };
        let symbol = candidate.signal.symbol.clone();
        if let Err(rejection) = AdmissionController::admit(&candidate, &config, &ctx) {
            info!(%symbol, %rejection, "candidate rejected");
            return Ok(ScanOutcome::Rejected {
                symbol: Some(symbol),
                rejection,
            });
        }

        // -- Sizing ----------------------------------------------------------
        let intent = match size_order(&candidate.signal, &config) {
            Ok(intent) => intent,
            Err(e) => {
                warn!(%symbol, error = %e, "sizing failed");
                return Ok(ScanOutcome::SizingFailed {
                    symbol,
                    reason: e.to_string(),
                });
            }
        };

        // -- Re-check before dispatch ----------------------------------------
        let latest = self.store.get().await?;
        self.remember_config(&latest);
        if kind == ScanKind::Timer && !latest.enabled {
            info!(%symbol, "engine disarmed mid-scan, order not dispatched");
            self.halt("disarmed mid-scan");
            return Ok(ScanOutcome::Disarmed { symbol });
        }
        let now = Utc::now();
        let stats = self.store.execution_stats(now).await?;
        self.remember_stats(&stats);
        if let Err(rejection) = AdmissionController::precheck(&latest, &stats, now) {
            info!(%symbol, %rejection, "ledger changed mid-scan, candidate rejected");
            return Ok(ScanOutcome::Rejected {
                symbol: Some(symbol),
                rejection,
            });
        }

        if token.is_cancelled() {
            return Ok(ScanOutcome::Cancelled);
        }

        // -- Execute (never interrupted) -------------------------------------
        self.set_state(EngineRunState::Executing);
        match self.dispatcher.dispatch(&intent).await {
            Ok(receipt) => {
                if let Some(ledger_error) = &receipt.ledger_error {
                    self.record_error(ledger_error);
                }
                if let Ok(stats) = self.store.execution_stats(Utc::now()).await {
                    self.remember_stats(&stats);
                }
                Ok(ScanOutcome::Executed {
                    symbol,
                    side: intent.side,
                    quantity: intent.quantity,
                    order_id: receipt.result.order_id,
                })
            }
            Err(e) => Ok(ScanOutcome::ExecutionFailed {
                symbol,
                reason: e.to_string(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn run_state(&self) -> EngineRunState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(EngineRunState::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.loop_active.load(Ordering::SeqCst)
    }

    /// Snapshot for the status query. Config and ledger come from the
    /// store when it answers, otherwise from the last values seen.
    pub async fn status(&self) -> EngineStatus {
        let config = match self.store.get().await {
            Ok(config) => {
                self.remember_config(&config);
                Some(config)
            }
            Err(e) => {
                warn!(error = %e, "status: config store unavailable, using cached config");
                None
            }
        };
        let stats = self.store.execution_stats(Utc::now()).await.ok();
        if let Some(stats) = &stats {
            self.remember_stats(stats);
        }

        let inner = self.status.read().unwrap_or_else(|p| p.into_inner());
        let config = config
            .or_else(|| inner.cached_config.clone())
            .unwrap_or_default();
        let stats = stats.or_else(|| inner.cached_stats.clone());

        EngineStatus {
            state: self.run_state(),
            running: self.is_running(),
            enabled: config.enabled,
            environment: config.environment,
            last_scan_at: inner.last_scan_at,
            last_outcome: inner.last_outcome.clone(),
            last_signal: inner.last_signal.clone(),
            last_error: inner.last_error.clone(),
            executed_today: stats.as_ref().map_or(0, |s| s.executed_today),
            total_executed: stats.as_ref().map_or(0, |s| s.total_executed),
            last_execution_at: stats.and_then(|s| s.last_execution_at),
        }
    }

    /// Last config read from or written to the store. Never authoritative.
    pub fn cached_config(&self) -> Option<EngineConfig> {
        self.status
            .read()
            .ok()
            .and_then(|s| s.cached_config.clone())
    }

    /// Refresh the cached copy after a write made elsewhere.
    pub fn remember_config(&self, config: &EngineConfig) {
        if let Ok(mut s) = self.status.write() {
            s.cached_config = Some(config.clone());
        }
    }

    pub fn record_error(&self, message: &str) {
        if let Ok(mut s) = self.status.write() {
            s.last_error = Some(message.to_string());
        }
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn try_begin_scan(&self) -> Option<ScanGuard<'_>> {
        let mut state = self.state.lock().ok()?;
        if *state != EngineRunState::Idle {
            return None;
        }
        *state = EngineRunState::Scanning;
        Some(ScanGuard { state: &self.state })
    }

    fn set_state(&self, next: EngineRunState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
        }
    }

    fn current_epoch(&self) -> CancellationToken {
        match self.epoch.lock() {
            Ok(epoch) => epoch.clone(),
            // Poisoned: hand out a token that is already cancelled so
            // nothing proceeds on a broken scheduler.
            Err(_) => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }

    fn cancel_epoch(&self) {
        let mut epoch = self.epoch.lock().unwrap_or_else(|p| p.into_inner());
        epoch.cancel();
        *epoch = self.shutdown.child_token();
    }

    async fn current_interval(&self) -> u64 {
        match self.store.get().await {
            Ok(config) => {
                self.remember_config(&config);
                config.scan_interval_seconds.max(1)
            }
            Err(e) => {
                warn!(error = %e, "config read failed, keeping previous interval");
                self.cached_config()
                    .map(|c| c.scan_interval_seconds.max(1))
                    .unwrap_or_else(|| EngineConfig::default().scan_interval_seconds)
            }
        }
    }

    fn remember_stats(&self, stats: &ExecutionStats) {
        if let Ok(mut s) = self.status.write() {
            s.cached_stats = Some(stats.clone());
        }
    }

    fn remember_signal(&self, signal: &Signal) {
        if let Ok(mut s) = self.status.write() {
            s.last_signal = Some(signal.clone());
        }
    }

    fn record_outcome(&self, outcome: &ScanOutcome) {
        match outcome {
            ScanOutcome::Busy => return,
            ScanOutcome::Executed { symbol, order_id, .. } => {
                info!(%symbol, order_id = order_id.as_deref().unwrap_or("-"), "scan executed");
            }
            other => debug!(outcome = other.label(), "scan finished"),
        }

        let error = match outcome {
            ScanOutcome::Failed { reason }
            | ScanOutcome::ExecutionFailed { reason, .. }
            | ScanOutcome::SizingFailed { reason, .. } => Some(reason.clone()),
            _ => None,
        };

        if let Ok(mut s) = self.status.write() {
            s.last_scan_at = Some(Utc::now());
            s.last_outcome = Some(outcome.clone());
            if error.is_some() {
                s.last_error = error;
            }
        }
    }
}
