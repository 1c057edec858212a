use serde::Deserialize;

use crate::constants::DEFAULT_PROVIDER_TIMEOUT_SECONDS;

// ---------------------------------------------------------------------------
// Top-level aggregate
// ---------------------------------------------------------------------------

/// Process bootstrap configuration. Engine settings (thresholds, leverage,
/// armed flag) live in the Configuration Store, not here.
#[derive(Debug, Clone, Deserialize)]
pub struct AutopilotConfig {
    pub app: AppConfig,
    pub providers: ProvidersConfig,
    pub endpoints: EndpointsConfig,
}

// ---------------------------------------------------------------------------
// app.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub db_path: String,
    pub logging: LoggingConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    #[serde(default = "default_log_prefix")]
    pub file_prefix: String,
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub default_filter: String,
    /// Mirror events to stderr. Off for service managers that capture it.
    #[serde(default = "default_true")]
    pub stderr: bool,
}

fn default_log_prefix() -> String {
    "autopilot.log".into()
}

fn default_log_filter() -> String {
    "autopilot=info,tower_http=info,warn".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
}

// ---------------------------------------------------------------------------
// providers.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    /// Fallback per-call timeout for providers that don't set their own.
    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,
    /// Registration order. Earlier providers win confidence ties.
    pub providers: Vec<ProviderEndpointConfig>,
}

fn default_provider_timeout() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_SECONDS
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEndpointConfig {
    pub id: String,
    pub base_url: String,
    /// Name of the env var holding the bearer token, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

impl ProviderEndpointConfig {
    pub fn effective_timeout(&self, fallback: u64) -> u64 {
        self.timeout_seconds.unwrap_or(fallback)
    }
}

// ---------------------------------------------------------------------------
// endpoints.json
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
    pub execution: ServiceEndpointConfig,
    pub positions: ServiceEndpointConfig,
    #[serde(default)]
    pub environment: EnvironmentSourceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEndpointConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub timeout_seconds: u64,
}

/// Optional HTTP source for the trading environment. An empty `url`
/// leaves the control API as the only source.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentSourceConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_env_poll")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_env_timeout")]
    pub timeout_seconds: u64,
}

impl Default for EnvironmentSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            poll_interval_seconds: default_env_poll(),
            timeout_seconds: default_env_timeout(),
        }
    }
}

fn default_env_poll() -> u64 {
    15
}

fn default_env_timeout() -> u64 {
    10
}
