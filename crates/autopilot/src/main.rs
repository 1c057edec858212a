use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use autopilot::api::{self, AppState};
use autopilot::clients::{
    spawn_environment_poller, EnvironmentSource, HttpEnvironmentSource, HttpExecutionClient,
    HttpPositionClient, HttpSignalProvider,
};
use autopilot::config;
use autopilot::core::{EnvironmentGuard, ExecutionDispatcher, Scheduler, SignalAggregator};
use autopilot::logging;
use autopilot::store::{ConfigStore, SqliteConfigStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignore if missing).
    let _ = dotenvy::dotenv();

    // Config directory, `./config` unless overridden.
    let config_dir = std::env::var("AUTOPILOT_CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config"));

    let config = config::load_config(&config_dir)?;

    // Hold the guard for the process lifetime.
    let _guard = logging::init_tracing(&config.app.logging)?;

    info!(
        providers = config.providers.providers.len(),
        api_enabled = config.app.api.enabled,
        "autopilot starting"
    );

    // -----------------------------------------------------------------------
    // Component construction
    // -----------------------------------------------------------------------

    // 1. Configuration store (creates SQLite DB + runs migrations)
    if let Some(parent) = Path::new(&config.app.db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("failed to create data directory")?;
        }
    }
    let store: Arc<dyn ConfigStore> = Arc::new(
        SqliteConfigStore::new(&config.app.db_path)
            .await
            .context("failed to initialize config store")?,
    );
    let engine_config = store.get().await.context("failed to read engine config")?;

    // 2. Signal providers, in registration order
    let mut aggregator = SignalAggregator::new();
    for endpoint in &config.providers.providers {
        let provider = HttpSignalProvider::new(endpoint, config.providers.timeout_seconds)
            .with_context(|| format!("failed to build provider {}", endpoint.id))?;
        let timeout = endpoint.effective_timeout(config.providers.timeout_seconds);
        aggregator.register(Arc::new(provider), Duration::from_secs(timeout));
    }

    // 3. Execution API and position store
    let execution = Arc::new(
        HttpExecutionClient::new(&config.endpoints.execution)
            .context("failed to build execution client")?,
    );
    let positions = Arc::new(
        HttpPositionClient::new(&config.endpoints.positions)
            .context("failed to build position client")?,
    );

    // 4. Dispatcher + scheduler
    let shutdown = CancellationToken::new();
    let dispatcher = ExecutionDispatcher::new(execution, store.clone());
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        aggregator,
        positions,
        dispatcher,
        shutdown.clone(),
    ));

    // 5. Environment signal: polled source if configured, else the API only
    let env_source: Option<Arc<dyn EnvironmentSource>> =
        if config.endpoints.environment.url.is_empty() {
            None
        } else {
            Some(Arc::new(
                HttpEnvironmentSource::new(
                    &config.endpoints.environment.url,
                    config.endpoints.environment.timeout_seconds,
                )
                .context("failed to build environment source")?,
            ))
        };

    let initial_env = match &env_source {
        Some(source) => match source.current().await {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, "environment source unavailable, assuming stored environment");
                engine_config.environment
            }
        },
        None => engine_config.environment,
    };
    let (env_tx, env_rx) = watch::channel(initial_env);
    let env_tx = Arc::new(env_tx);

    // 6. Environment guard: reconcile before the loop can resume
    let guard = EnvironmentGuard::new(store.clone(), scheduler.clone(), env_rx, shutdown.clone());
    if guard.reconcile().await.context("environment reconcile failed")? {
        warn!(environment = initial_env.as_str(), "engine disarmed at startup");
    }

    info!(
        environment = initial_env.as_str(),
        "all components initialized"
    );

    // -----------------------------------------------------------------------
    // Launch concurrent tasks
    // -----------------------------------------------------------------------

    let guard_handle = tokio::spawn(async move {
        if let Err(e) = guard.run().await {
            error!(error = %e, "environment guard exited with error");
        }
    });

    let poller_handle = env_source.map(|source| {
        spawn_environment_poller(
            source,
            env_tx.clone(),
            Duration::from_secs(config.endpoints.environment.poll_interval_seconds),
            shutdown.clone(),
        )
    });

    if scheduler.resume_if_armed().await? {
        info!("engine resumed in armed state");
    } else {
        info!("engine idle: start it via the control API");
    }

    let api_handle = if config.app.api.enabled {
        let state = AppState {
            scheduler: scheduler.clone(),
            store: store.clone(),
            environment: env_tx.clone(),
        };
        let listener = tokio::net::TcpListener::bind(&config.app.api.bind)
            .await
            .with_context(|| format!("failed to bind control API on {}", config.app.api.bind))?;
        info!(bind = %config.app.api.bind, "control API listening");

        let token = shutdown.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, api::router(state))
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %e, "control API exited with error");
            }
        }))
    } else {
        None
    };

    info!("all tasks running, press Ctrl+C to shut down");

    // -----------------------------------------------------------------------
    // Wait for shutdown signal
    // -----------------------------------------------------------------------

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("shutdown signal received, stopping gracefully...");
    shutdown.cancel();

    scheduler.wait_stopped().await;
    let _ = guard_handle.await;
    if let Some(handle) = poller_handle {
        let _ = handle.await;
    }
    if let Some(handle) = api_handle {
        let _ = handle.await;
    }

    info!("autopilot stopped");
    Ok(())
}
