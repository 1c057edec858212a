pub mod types;
pub mod validate;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Load and merge the bootstrap JSON files into a single
/// [`AutopilotConfig`], then apply environment variable overrides and
/// validate.
///
/// Expected directory layout:
/// ```text
/// config/
///   app.json
///   providers.json
///   endpoints.json
/// ```
///
/// # Environment variable overrides
///
/// | Env Var                      | Config Field                        |
/// |------------------------------|-------------------------------------|
/// | `AUTOPILOT_DB_PATH`          | `app.db_path`                       |
/// | `AUTOPILOT_LOG_DIR`          | `app.logging.log_dir`               |
/// | `AUTOPILOT_API_ENABLED`      | `app.api.enabled`                   |
/// | `AUTOPILOT_API_BIND`         | `app.api.bind`                      |
/// | `PROVIDER_TIMEOUT_SECONDS`   | `providers.timeout_seconds`         |
/// | `EXECUTION_API_URL`          | `endpoints.execution.base_url`      |
/// | `POSITION_STORE_URL`         | `endpoints.positions.base_url`      |
/// | `ENVIRONMENT_SOURCE_URL`     | `endpoints.environment.url`         |
pub fn load_config(config_dir: &Path) -> Result<AutopilotConfig> {
    let read = |name: &str| -> Result<String> {
        let path = config_dir.join(name);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))
    };

    let app: AppConfig = serde_json::from_str(&read("app.json")?).context("parsing app.json")?;

    let providers: ProvidersConfig =
        serde_json::from_str(&read("providers.json")?).context("parsing providers.json")?;

    let endpoints: EndpointsConfig =
        serde_json::from_str(&read("endpoints.json")?).context("parsing endpoints.json")?;

    let mut config = AutopilotConfig {
        app,
        providers,
        endpoints,
    };

    apply_env_overrides(&mut config);
    validate::validate_config(&config)?;

    Ok(config)
}

/// Resolve a secret whose env var name is given in config.
pub fn secret_from_env(key: Option<&str>) -> Option<String> {
    key.and_then(env_string)
}

// ---------------------------------------------------------------------------
// Environment variable overrides
// ---------------------------------------------------------------------------

/// Only non-empty env vars take effect. Parse failures are skipped (the
/// JSON value remains).
fn apply_env_overrides(config: &mut AutopilotConfig) {
    // -- App -----------------------------------------------------------------
    if let Some(val) = env_string("AUTOPILOT_DB_PATH") {
        info!(db_path = %val, "env override: AUTOPILOT_DB_PATH");
        config.app.db_path = val;
    }

    if let Some(val) = env_string("AUTOPILOT_LOG_DIR") {
        info!(log_dir = %val, "env override: AUTOPILOT_LOG_DIR");
        config.app.logging.log_dir = val;
    }

    if let Some(val) = env_bool("AUTOPILOT_API_ENABLED") {
        info!(enabled = val, "env override: AUTOPILOT_API_ENABLED");
        config.app.api.enabled = val;
    }

    if let Some(val) = env_string("AUTOPILOT_API_BIND") {
        info!(bind = %val, "env override: AUTOPILOT_API_BIND");
        config.app.api.bind = val;
    }

    // -- Providers -----------------------------------------------------------
    if let Some(val) = env_parse::<u64>("PROVIDER_TIMEOUT_SECONDS") {
        info!(val, "env override: PROVIDER_TIMEOUT_SECONDS");
        config.providers.timeout_seconds = val;
    }

    // -- Endpoints -----------------------------------------------------------
    if let Some(val) = env_string("EXECUTION_API_URL") {
        info!("env override: EXECUTION_API_URL");
        config.endpoints.execution.base_url = val;
    }

    if let Some(val) = env_string("POSITION_STORE_URL") {
        info!("env override: POSITION_STORE_URL");
        config.endpoints.positions.base_url = val;
    }

    if let Some(val) = env_string("ENVIRONMENT_SOURCE_URL") {
        info!("env override: ENVIRONMENT_SOURCE_URL");
        config.endpoints.environment.url = val;
    }
}

/// Read a non-empty env var as a `String`.
fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Read a non-empty env var as a bool (`true`, `1`, `yes` → true).
fn env_bool(key: &str) -> Option<bool> {
    env_string(key).map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
}

/// Read a non-empty env var and parse it as `T`.
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}
