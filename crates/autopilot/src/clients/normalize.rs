//! Normalization of loosely-typed provider payloads.
//!
//! Providers emit prices as strings with currency symbols, prefixes and
//! ranges, labels like `STRONG BUY`, and symbols in several spellings. All
//! of that is resolved here so nothing downstream sees raw payloads.

use std::str::FromStr;

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::QUOTE_ASSET;
use crate::types::{Signal, SignalDirection};

const PRICE_PREFIXES: [&str; 9] = [
    "Take Profit:",
    "Stop Loss:",
    "Target:",
    "Entry:",
    "entry:",
    "Stop:",
    "TP:",
    "SL:",
    "E:",
];

const QUOTE_SUFFIXES: [&str; 4] = ["/USDT", "-USDT", "/USD", "USDT"];

/// A provider recommendation before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecommendation {
    pub symbol: String,
    #[serde(alias = "direction", alias = "action")]
    pub signal: String,
    #[serde(default)]
    pub confidence: Value,
    #[serde(default, alias = "entry")]
    pub entry_price: Value,
    #[serde(default)]
    pub target_price: Value,
    #[serde(default)]
    pub take_profit: Value,
    #[serde(default, alias = "stop_price")]
    pub stop_loss: Value,
    #[serde(default)]
    pub is_fallback: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `btc/usd`, `BTC`, `BTC-USDT` and `BTCUSDT` all become `BTCUSDT`.
pub fn canonical_symbol(raw: &str) -> String {
    let mut base = raw.trim().to_uppercase();
    for suffix in QUOTE_SUFFIXES {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped.to_string();
            break;
        }
    }
    format!("{base}{QUOTE_ASSET}")
}

/// `STRONG BUY` counts as BUY, `STRONG SELL` as SELL, anything else is HOLD.
pub fn parse_direction(label: &str) -> SignalDirection {
    let label = label.trim().to_uppercase().replace(['_', '-'], " ");
    match label.as_str() {
        "BUY" | "STRONG BUY" => SignalDirection::Buy,
        "SELL" | "STRONG SELL" => SignalDirection::Sell,
        _ => SignalDirection::Hold,
    }
}

/// Parse a price that may arrive as a number or as text such as
/// `"E: $95,000 - $95,500"`. Ranges resolve to their lower bound.
pub fn parse_price(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Value::String(s) => parse_price_text(s),
        _ => None,
    }
}

fn parse_price_text(text: &str) -> Option<Decimal> {
    let mut s = text.trim().to_string();
    for prefix in PRICE_PREFIXES {
        s = s.replace(prefix, "");
    }
    let s = s.replace(['$', ','], "");
    let first = s.split('-').next().unwrap_or_default();
    let digits: String = first
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() {
        return None;
    }
    Decimal::from_str(&digits).ok()
}

/// Confidence as an integer percentage, clamped to 0–100. Accepts `85`,
/// `85.4`, `"85"` and `"85%"`.
pub fn parse_confidence(value: &Value) -> Option<u8> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, 100.0) as u8)
}

/// Turn one raw recommendation into a [`Signal`]. Returns `None` when the
/// payload lacks a usable confidence or entry price.
pub fn normalize_recommendation(provider_id: &str, raw: RawRecommendation) -> Option<Signal> {
    let symbol = canonical_symbol(&raw.symbol);
    let direction = parse_direction(&raw.signal);

    let Some(confidence) = parse_confidence(&raw.confidence) else {
        warn!(provider = provider_id, %symbol, "dropping recommendation: unreadable confidence");
        return None;
    };

    let Some(entry_price) = parse_price(&raw.entry_price).filter(|p| *p > Decimal::ZERO) else {
        warn!(provider = provider_id, %symbol, "dropping recommendation: no usable entry price");
        return None;
    };

    let target_price = parse_price(&raw.target_price).or_else(|| parse_price(&raw.take_profit));
    let stop_price = parse_price(&raw.stop_loss);

    Some(Signal {
        provider_id: provider_id.to_string(),
        symbol,
        direction,
        confidence,
        entry_price,
        target_price: target_price.filter(|p| *p > Decimal::ZERO),
        stop_price: stop_price.filter(|p| *p > Decimal::ZERO),
        is_fallback: raw.is_fallback,
        reason: raw.reason,
    })
}

/// Parse a whole provider response body. Accepts a bare array or an object
/// wrapping it under `recommendations` or `signals`. Malformed entries are
/// skipped.
pub fn parse_recommendations(provider_id: &str, body: Value) -> Vec<Signal> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map
            .remove("recommendations")
            .or_else(|| map.remove("signals"))
        {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };

    let total = items.len();
    let signals: Vec<Signal> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<RawRecommendation>(item) {
            Ok(raw) => normalize_recommendation(provider_id, raw),
            Err(e) => {
                warn!(provider = provider_id, error = %e, "malformed recommendation skipped");
                None
            }
        })
        .collect();

    debug!(
        provider = provider_id,
        total,
        kept = signals.len(),
        "recommendations normalized"
    );
    signals
}
