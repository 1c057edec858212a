use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// How aggressively providers should look for setups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Scalper,
    Normal,
    Aggressive,
    Longhold,
}

impl TradingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalper => "scalper",
            Self::Normal => "normal",
            Self::Aggressive => "aggressive",
            Self::Longhold => "longhold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Crypto,
    Forex,
    Stocks,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crypto => "crypto",
            Self::Forex => "forex",
            Self::Stocks => "stocks",
        }
    }
}

/// Which account orders land in. Switching between them always disarms
/// the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingEnvironment {
    #[serde(alias = "demo", alias = "testnet")]
    Paper,
    #[serde(alias = "real", alias = "production")]
    Live,
}

impl TradingEnvironment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paper => "paper",
            Self::Live => "live",
        }
    }
}

impl fmt::Display for TradingEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradingEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" | "demo" | "testnet" => Ok(Self::Paper),
            "live" | "real" | "production" => Ok(Self::Live),
            other => Err(format!("unknown trading environment: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

/// Durable engine settings. The Configuration Store holds the single
/// authoritative copy; everything else works from a fresh read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub enabled: bool,
    pub min_confidence: u8,
    pub max_positions: u32,
    pub leverage: u32,
    #[serde(with = "rust_decimal::serde::str")]
    pub capital_per_trade: Decimal,
    pub strategies: BTreeSet<String>,
    pub trading_mode: TradingMode,
    pub asset_class: AssetClass,
    pub scan_interval_seconds: u64,
    pub cooldown_seconds: u64,
    #[serde(with = "rust_decimal::serde::str")]
    pub max_daily_loss: Decimal,
    pub require_consensus: bool,
    /// Ordered; earlier entries win confidence ties.
    pub providers: Vec<String>,
    pub environment: TradingEnvironment,
    /// Canonical symbols to scan. Empty lets providers pick.
    #[serde(default)]
    pub watchlist: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_confidence: 65,
            max_positions: 3,
            leverage: 25,
            capital_per_trade: dec!(5),
            strategies: ["Breakout", "Trend Fusion"]
                .into_iter()
                .map(String::from)
                .collect(),
            trading_mode: TradingMode::Normal,
            asset_class: AssetClass::Crypto,
            scan_interval_seconds: 30,
            cooldown_seconds: 30,
            max_daily_loss: dec!(50),
            require_consensus: true,
            providers: vec!["qwen".into(), "deepseek".into()],
            environment: TradingEnvironment::Paper,
            watchlist: Vec::new(),
        }
    }
}

/// Partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfigPatch {
    pub enabled: Option<bool>,
    pub min_confidence: Option<u8>,
    pub max_positions: Option<u32>,
    pub leverage: Option<u32>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub capital_per_trade: Option<Decimal>,
    pub strategies: Option<BTreeSet<String>>,
    pub trading_mode: Option<TradingMode>,
    pub asset_class: Option<AssetClass>,
    pub scan_interval_seconds: Option<u64>,
    pub cooldown_seconds: Option<u64>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub max_daily_loss: Option<Decimal>,
    pub require_consensus: Option<bool>,
    pub providers: Option<Vec<String>>,
    pub environment: Option<TradingEnvironment>,
    pub watchlist: Option<Vec<String>>,
}

impl EngineConfigPatch {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    /// Disarm and record the environment in one write.
    pub fn disarm_for(environment: TradingEnvironment) -> Self {
        Self {
            enabled: Some(false),
            environment: Some(environment),
            ..Self::default()
        }
    }

    /// Produce the config that results from applying this patch to `base`.
    pub fn apply(&self, base: &EngineConfig) -> EngineConfig {
        let mut next = base.clone();
        if let Some(v) = self.enabled {
            next.enabled = v;
        }
        if let Some(v) = self.min_confidence {
            next.min_confidence = v;
        }
        if let Some(v) = self.max_positions {
            next.max_positions = v;
        }
        if let Some(v) = self.leverage {
            next.leverage = v;
        }
        if let Some(v) = self.capital_per_trade {
            next.capital_per_trade = v;
        }
        if let Some(v) = &self.strategies {
            next.strategies = v.clone();
        }
        if let Some(v) = self.trading_mode {
            next.trading_mode = v;
        }
        if let Some(v) = self.asset_class {
            next.asset_class = v;
        }
        if let Some(v) = self.scan_interval_seconds {
            next.scan_interval_seconds = v;
        }
        if let Some(v) = self.cooldown_seconds {
            next.cooldown_seconds = v;
        }
        if let Some(v) = self.max_daily_loss {
            next.max_daily_loss = v;
        }
        if let Some(v) = self.require_consensus {
            next.require_consensus = v;
        }
        if let Some(v) = &self.providers {
            next.providers = v.clone();
        }
        if let Some(v) = self.environment {
            next.environment = v;
        }
        if let Some(v) = &self.watchlist {
            next.watchlist = v.clone();
        }
        next
    }
}

// ---------------------------------------------------------------------------
// Execution ledger
// ---------------------------------------------------------------------------

/// Durable execution counters. `executed_today` belongs to `day` (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStats {
    pub day: NaiveDate,
    pub executed_today: u32,
    pub total_executed: u64,
    pub last_execution_at: Option<DateTime<Utc>>,
}

impl ExecutionStats {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            executed_today: 0,
            total_executed: 0,
            last_execution_at: None,
        }
    }

    /// View of these counters as of `today`: a stale day reads as zero
    /// executions, the lifetime total and cooldown timestamp carry over.
    pub fn as_of(&self, today: NaiveDate) -> Self {
        if self.day == today {
            return self.clone();
        }
        Self {
            day: today,
            executed_today: 0,
            total_executed: self.total_executed,
            last_execution_at: self.last_execution_at,
        }
    }

    /// Counters after one more execution at `at`.
    pub fn recorded(&self, at: DateTime<Utc>) -> Self {
        let mut next = self.as_of(at.date_naive());
        next.executed_today += 1;
        next.total_executed += 1;
        next.last_execution_at = Some(at);
        next
    }
}
