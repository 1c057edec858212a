use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use super::engine::TradingEnvironment;
use super::order::OrderSide;
use super::signal::Signal;

/// Process-local scan state. Only one scan may be in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineRunState {
    Idle,
    Scanning,
    Executing,
}

/// Why an otherwise valid candidate was not traded. Not an error: the
/// engine is doing its job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum AdmissionRejection {
    OpenPosition {
        symbol: String,
    },
    DailyCapReached {
        executed_today: u32,
        max_positions: u32,
    },
    Cooldown {
        remaining_seconds: u64,
    },
    DailyLossLimit {
        #[serde(with = "rust_decimal::serde::str")]
        daily_loss: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        max_daily_loss: Decimal,
    },
}

impl fmt::Display for AdmissionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenPosition { symbol } => write!(f, "position already open on {symbol}"),
            Self::DailyCapReached {
                executed_today,
                max_positions,
            } => write!(
                f,
                "daily cap reached: {executed_today} of {max_positions} executions used"
            ),
            Self::Cooldown { remaining_seconds } => {
                write!(f, "cooldown active: {remaining_seconds}s remaining")
            }
            Self::DailyLossLimit {
                daily_loss,
                max_daily_loss,
            } => write!(
                f,
                "daily loss ${daily_loss} has reached the ${max_daily_loss} limit"
            ),
        }
    }
}

/// Result of one scan cycle, as reported by `status()` and the manual scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// Another scan was in flight; this tick was dropped.
    Busy,
    /// Engine is not armed.
    Disabled,
    /// Stop requested before the scan could finish.
    Cancelled,
    NoCandidate,
    Rejected {
        symbol: Option<String>,
        rejection: AdmissionRejection,
    },
    SizingFailed {
        symbol: String,
        reason: String,
    },
    /// Engine was disarmed between admission and dispatch.
    Disarmed {
        symbol: String,
    },
    Executed {
        symbol: String,
        side: OrderSide,
        #[serde(with = "rust_decimal::serde::str")]
        quantity: Decimal,
        order_id: Option<String>,
    },
    ExecutionFailed {
        symbol: String,
        reason: String,
    },
    Failed {
        reason: String,
    },
}

impl ScanOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Busy => "busy",
            Self::Disabled => "disabled",
            Self::Cancelled => "cancelled",
            Self::NoCandidate => "no_candidate",
            Self::Rejected { .. } => "rejected",
            Self::SizingFailed { .. } => "sizing_failed",
            Self::Disarmed { .. } => "disarmed",
            Self::Executed { .. } => "executed",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Snapshot served by the status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub state: EngineRunState,
    /// The timer loop is armed in this process.
    pub running: bool,
    pub enabled: bool,
    pub environment: TradingEnvironment,
    pub last_scan_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<ScanOutcome>,
    pub last_signal: Option<Signal>,
    pub last_error: Option<String>,
    pub executed_today: u32,
    pub total_executed: u64,
    pub last_execution_at: Option<DateTime<Utc>>,
}
