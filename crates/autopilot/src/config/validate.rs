use std::collections::HashSet;

use anyhow::{bail, Result};
use rust_decimal::Decimal;

use super::types::AutopilotConfig;
use crate::constants::{
    CAPITAL_PER_TRADE_MAX, CAPITAL_PER_TRADE_MIN, LEVERAGE_ALLOW_LIST, MIN_CONFIDENCE_CEILING,
    MIN_CONFIDENCE_FLOOR,
};
use crate::types::EngineConfig;

/// Validate the merged bootstrap config. Called automatically by
/// [`super::load_config`].
pub fn validate_config(config: &AutopilotConfig) -> Result<()> {
    let mut errors: Vec<String> = Vec::new();

    validate_app_config(config, &mut errors);
    validate_providers_config(config, &mut errors);
    validate_endpoints_config(config, &mut errors);

    into_result(errors)
}

/// Check every invariant an [`EngineConfig`] must hold before the store
/// accepts it. Returns the individual violations; empty means valid.
pub fn engine_config_errors(config: &EngineConfig) -> Vec<String> {
    let mut errors: Vec<String> = Vec::new();

    if !(MIN_CONFIDENCE_FLOOR..=MIN_CONFIDENCE_CEILING).contains(&config.min_confidence) {
        errors.push(format!(
            "min_confidence must be in [{MIN_CONFIDENCE_FLOOR}, {MIN_CONFIDENCE_CEILING}], got {}",
            config.min_confidence
        ));
    }

    if config.max_positions == 0 {
        errors.push("max_positions must be > 0".into());
    }

    if !LEVERAGE_ALLOW_LIST.contains(&config.leverage) {
        errors.push(format!(
            "leverage {} is not one of {:?}",
            config.leverage, LEVERAGE_ALLOW_LIST
        ));
    }

    if config.capital_per_trade < CAPITAL_PER_TRADE_MIN
        || config.capital_per_trade > CAPITAL_PER_TRADE_MAX
    {
        errors.push(format!(
            "capital_per_trade must be in [{CAPITAL_PER_TRADE_MIN}, {CAPITAL_PER_TRADE_MAX}], got {}",
            config.capital_per_trade
        ));
    }

    if config.scan_interval_seconds == 0 {
        errors.push("scan_interval_seconds must be > 0".into());
    }

    if config.max_daily_loss < Decimal::ZERO {
        errors.push(format!(
            "max_daily_loss must be >= 0, got {}",
            config.max_daily_loss
        ));
    }

    if config.providers.is_empty() {
        errors.push("providers must list at least one provider".into());
    }
    let mut seen = HashSet::new();
    for id in &config.providers {
        if id.trim().is_empty() {
            errors.push("providers: empty provider id".into());
        } else if !seen.insert(id.as_str()) {
            errors.push(format!("providers: duplicate provider id {id}"));
        }
    }

    for symbol in &config.watchlist {
        if symbol.trim().is_empty() {
            errors.push("watchlist: empty symbol".into());
        }
    }

    errors
}

/// Join accumulated messages into a single error.
fn into_result(errors: Vec<String>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        let msg = format!(
            "Configuration validation failed ({} error{}):\n  - {}",
            errors.len(),
            if errors.len() == 1 { "" } else { "s" },
            errors.join("\n  - ")
        );
        bail!("{msg}");
    }
}

// ---------------------------------------------------------------------------
// App config
// ---------------------------------------------------------------------------

fn validate_app_config(config: &AutopilotConfig, errors: &mut Vec<String>) {
    let app = &config.app;

    if app.db_path.trim().is_empty() {
        errors.push("app: db_path is empty".into());
    }

    if app.logging.log_dir.trim().is_empty() {
        errors.push("app.logging: log_dir is empty".into());
    }

    if tracing_subscriber::EnvFilter::try_new(&app.logging.default_filter).is_err() {
        errors.push(format!(
            "app.logging: default_filter {:?} is not a valid filter",
            app.logging.default_filter
        ));
    }

    if app.api.enabled && app.api.bind.parse::<std::net::SocketAddr>().is_err() {
        errors.push(format!(
            "app.api: bind address {:?} is not a socket address",
            app.api.bind
        ));
    }
}

// ---------------------------------------------------------------------------
// Providers config
// ---------------------------------------------------------------------------

fn validate_providers_config(config: &AutopilotConfig, errors: &mut Vec<String>) {
    let providers = &config.providers;

    if providers.providers.is_empty() {
        errors.push("providers: must register at least one signal provider".into());
    }

    if providers.timeout_seconds == 0 {
        errors.push("providers: timeout_seconds must be > 0".into());
    }

    let mut seen = HashSet::new();
    for p in &providers.providers {
        if p.id.trim().is_empty() {
            errors.push("providers: provider with empty id".into());
        } else if !seen.insert(p.id.as_str()) {
            errors.push(format!("providers.{}: duplicate id", p.id));
        }

        if let Err(e) = validate_url(&p.base_url) {
            errors.push(format!("providers.{}.base_url: {e}", p.id));
        }

        if p.timeout_seconds == Some(0) {
            errors.push(format!("providers.{}: timeout_seconds must be > 0", p.id));
        }
    }
}

// ---------------------------------------------------------------------------
// Endpoints config
// ---------------------------------------------------------------------------

fn validate_endpoints_config(config: &AutopilotConfig, errors: &mut Vec<String>) {
    let endpoints = &config.endpoints;

    for (name, ep) in [
        ("execution", &endpoints.execution),
        ("positions", &endpoints.positions),
    ] {
        if let Err(e) = validate_url(&ep.base_url) {
            errors.push(format!("endpoints.{name}.base_url: {e}"));
        }
        if ep.timeout_seconds == 0 {
            errors.push(format!("endpoints.{name}: timeout_seconds must be > 0"));
        }
    }

    // Environment source is optional, but if set must be a URL.
    if !endpoints.environment.url.is_empty() {
        if let Err(e) = validate_url(&endpoints.environment.url) {
            errors.push(format!("endpoints.environment.url: {e}"));
        }
        if endpoints.environment.poll_interval_seconds == 0 {
            errors.push("endpoints.environment: poll_interval_seconds must be > 0".into());
        }
        if endpoints.environment.timeout_seconds == 0 {
            errors.push("endpoints.environment: timeout_seconds must be > 0".into());
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn validate_url(url: &str) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("empty URL".into());
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(format!("expected http(s) URL, got {url:?}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_engine_config_is_valid() {
        assert!(engine_config_errors(&EngineConfig::default()).is_empty());
    }

    #[test]
    fn test_confidence_bounds() {
        let mut cfg = EngineConfig::default();
        cfg.min_confidence = 49;
        assert_eq!(engine_config_errors(&cfg).len(), 1);
        cfg.min_confidence = 95;
        assert!(engine_config_errors(&cfg).is_empty());
        cfg.min_confidence = 96;
        assert!(engine_config_errors(&cfg)[0].contains("min_confidence"));
    }

    #[test]
    fn test_leverage_allow_list() {
        let mut cfg = EngineConfig::default();
        cfg.leverage = 4;
        assert!(engine_config_errors(&cfg)[0].contains("leverage 4"));
        cfg.leverage = 125;
        assert!(engine_config_errors(&cfg).is_empty());
    }

    #[test]
    fn test_capital_bounds() {
        let mut cfg = EngineConfig::default();
        cfg.capital_per_trade = dec!(0.5);
        assert!(engine_config_errors(&cfg)[0].contains("capital_per_trade"));
        cfg.capital_per_trade = dec!(100);
        assert!(engine_config_errors(&cfg).is_empty());
        cfg.capital_per_trade = dec!(100.01);
        assert!(!engine_config_errors(&cfg).is_empty());
    }

    #[test]
    fn test_errors_accumulate() {
        let mut cfg = EngineConfig::default();
        cfg.max_positions = 0;
        cfg.scan_interval_seconds = 0;
        cfg.max_daily_loss = dec!(-1);
        cfg.providers = vec!["qwen".into(), "qwen".into()];
        let errors = engine_config_errors(&cfg);
        assert_eq!(errors.len(), 4, "{errors:?}");
    }

    #[test]
    fn test_empty_providers_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.providers.clear();
        assert!(engine_config_errors(&cfg)[0].contains("at least one"));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://example.com").is_ok());
        assert!(validate_url("").is_err());
        assert!(validate_url("ftp://example.com").is_err());
    }

    #[test]
    fn test_into_result_pluralizes() {
        let err = into_result(vec!["a".into(), "b".into()]).unwrap_err();
        assert!(err.to_string().contains("(2 errors)"));
        let err = into_result(vec!["a".into()]).unwrap_err();
        assert!(err.to_string().contains("(1 error)"));
    }
}
