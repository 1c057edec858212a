//! Control API routes against an in-process engine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use tokio::sync::watch;

use autopilot::api::{router, AppState};
use autopilot::core::EnvironmentGuard;
use autopilot::store::{ConfigStore, MemoryConfigStore};
use autopilot::types::{EngineConfig, TradingEnvironment};

use common::{armed_config, btc_consensus, Harness, HarnessBuilder};

struct TestApi {
    server: TestServer,
    harness: Harness,
    environment: Arc<watch::Sender<TradingEnvironment>>,
}

impl TestApi {
    fn new() -> Self {
        let (qwen, deepseek) = btc_consensus();
        let config = EngineConfig {
            enabled: false,
            ..armed_config(&["qwen", "deepseek"])
        };
        let harness = HarnessBuilder::new(MemoryConfigStore::new(config))
            .provider(qwen)
            .provider(deepseek)
            .build();

        let (tx, _rx) = watch::channel(TradingEnvironment::Paper);
        let environment = Arc::new(tx);
        let state = AppState {
            scheduler: harness.scheduler.clone(),
            store: harness.store.clone(),
            environment: environment.clone(),
        };
        let server = TestServer::new(router(state)).expect("start test server");

        Self {
            server,
            harness,
            environment,
        }
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let api = TestApi::new();
    let response = api.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_status_reports_idle_engine() {
    let api = TestApi::new();
    let body: Value = api.server.get("/status").await.json();

    assert_eq!(body["state"], "idle");
    assert_eq!(body["running"], false);
    assert_eq!(body["enabled"], false);
    assert_eq!(body["environment"], "paper");
    assert_eq!(body["executed_today"], 0);
    assert!(body["last_outcome"].is_null());
}

#[tokio::test]
async fn test_config_round_trip() {
    let api = TestApi::new();

    let response = api
        .server
        .put("/config")
        .json(&json!({ "min_confidence": 80, "capital_per_trade": "12.5" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);

    let body: Value = api.server.get("/config").await.json();
    assert_eq!(body["min_confidence"], 80);
    assert_eq!(body["capital_per_trade"], "12.5");
    assert_eq!(body["leverage"], 25);
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let api = TestApi::new();

    let response = api
        .server
        .put("/config")
        .json(&json!({ "leverage": 7, "min_confidence": 99 }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json();
    assert!(body["error"].as_str().is_some_and(|e| e.contains("leverage")));

    let stored = api.harness.store.get().await.unwrap();
    assert_eq!(stored.leverage, 25);
    assert_eq!(stored.min_confidence, 65);
}

#[tokio::test]
async fn test_config_cannot_switch_environment() {
    let api = TestApi::new();

    let response = api
        .server
        .put("/config")
        .json(&json!({ "environment": "live" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        api.harness.store.get().await.unwrap().environment,
        TradingEnvironment::Paper
    );
}

#[tokio::test]
async fn test_enabled_flag_drives_scan_loop() {
    let api = TestApi::new();

    let response = api
        .server
        .put("/config")
        .json(&json!({ "enabled": true }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(api.harness.scheduler.is_running());

    let response = api
        .server
        .put("/config")
        .json(&json!({ "enabled": false }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(!api.harness.scheduler.is_running());
    assert!(!api.harness.store.get().await.unwrap().enabled);
}

#[tokio::test]
async fn test_start_and_stop_routes() {
    let api = TestApi::new();

    let body: Value = api.server.post("/start").await.json();
    assert_eq!(body["enabled"], true);
    assert_eq!(body["running"], true);

    let body: Value = api.server.post("/stop-all").await.json();
    assert_eq!(body["enabled"], false);
    assert_eq!(body["running"], false);
    assert!(!api.harness.store.get().await.unwrap().enabled);
}

#[tokio::test]
async fn test_manual_scan_route() {
    let api = TestApi::new();

    let body: Value = api.server.post("/scan").await.json();
    assert_eq!(body["outcome"], "executed");
    assert_eq!(body["symbol"], "BTCUSDT");
    assert_eq!(body["side"], "BUY");
    assert_eq!(api.harness.execution.submitted().len(), 1);

    let status: Value = api.server.get("/status").await.json();
    assert_eq!(status["last_outcome"]["outcome"], "executed");
    assert_eq!(status["executed_today"], 1);
}

#[tokio::test]
async fn test_environment_switch_disarms_engine() {
    let api = TestApi::new();
    let store: Arc<dyn ConfigStore> = api.harness.store.clone();
    let guard = EnvironmentGuard::new(
        store,
        api.harness.scheduler.clone(),
        api.environment.subscribe(),
        api.harness.shutdown.clone(),
    );
    let guard_task = tokio::spawn(guard.run());

    assert_eq!(api.server.post("/start").await.status_code(), StatusCode::OK);
    assert!(api.harness.store.get().await.unwrap().enabled);

    let body: Value = api
        .server
        .put("/environment")
        .json(&json!({ "environment": "live" }))
        .await
        .json();
    assert_eq!(body["changed"], true);

    let mut disarmed = false;
    for _ in 0..100 {
        let config = api.harness.store.get().await.unwrap();
        if !config.enabled && config.environment == TradingEnvironment::Live {
            disarmed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(disarmed, "guard should disarm after the switch");

    let body: Value = api.server.get("/environment").await.json();
    assert_eq!(body["environment"], "live");

    let body: Value = api
        .server
        .put("/environment")
        .json(&json!({ "environment": "real" }))
        .await
        .json();
    assert_eq!(body["changed"], false);

    api.harness.shutdown.cancel();
    guard_task.await.unwrap().unwrap();
}
