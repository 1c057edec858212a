use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::engine::{AssetClass, TradingMode};
use super::order::OrderSide;

/// Normalized recommendation direction. Anything a provider sends that is
/// not a buy or sell (HOLD, WAIT, NEUTRAL) collapses to `Hold`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

impl SignalDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
        }
    }

    /// Order side for actionable directions.
    pub fn side(&self) -> Option<OrderSide> {
        match self {
            Self::Buy => Some(OrderSide::Buy),
            Self::Sell => Some(OrderSide::Sell),
            Self::Hold => None,
        }
    }
}

/// One provider's trade idea for one symbol, valid for a single scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub provider_id: String,
    /// Canonical form, e.g. `BTCUSDT`.
    pub symbol: String,
    pub direction: SignalDirection,
    /// 0–100.
    pub confidence: u8,
    #[serde(with = "rust_decimal::serde::str")]
    pub entry_price: Decimal,
    #[serde(with = "rust_decimal::serde::str_option", default)]
    pub target_price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option", default)]
    pub stop_price: Option<Decimal>,
    /// Provider served degraded data; never actionable.
    #[serde(default)]
    pub is_fallback: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// The representative signal for a symbol/direction plus every provider
/// that agreed with it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusCandidate {
    pub signal: Signal,
    pub supporting_providers: Vec<String>,
}

/// What a provider is asked to analyse on one scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalScope {
    /// Empty lets the provider choose.
    pub symbols: Vec<String>,
    pub asset_class: AssetClass,
    pub strategies: Vec<String>,
}

/// Provider request body. `mode` travels alongside the scope.
#[derive(Debug, Clone, Serialize)]
pub struct SignalRequest<'a> {
    #[serde(flatten)]
    pub scope: &'a SignalScope,
    pub mode: TradingMode,
}
