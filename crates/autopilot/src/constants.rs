use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ---------------------------------------------------------------------------
// Engine config bounds
// ---------------------------------------------------------------------------

/// Leverage values the execution venue accepts.
pub const LEVERAGE_ALLOW_LIST: [u32; 11] = [1, 2, 3, 5, 10, 20, 25, 50, 75, 100, 125];

pub const MIN_CONFIDENCE_FLOOR: u8 = 50;
pub const MIN_CONFIDENCE_CEILING: u8 = 95;

pub const CAPITAL_PER_TRADE_MIN: Decimal = dec!(1);
pub const CAPITAL_PER_TRADE_MAX: Decimal = dec!(100);

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Distinct providers that must agree on symbol and direction when
/// consensus is required.
pub const CONSENSUS_MIN_PROVIDERS: usize = 2;

// ---------------------------------------------------------------------------
// Risk sizing
// ---------------------------------------------------------------------------

/// Quantity is truncated to this many decimal places.
pub const QUANTITY_SCALE: u32 = 8;

/// Protective levels closer than 0.5% of entry are replaced.
pub const MIN_LEVEL_DISTANCE_PCT: Decimal = dec!(0.005);

/// Replacement take-profit: +2% (BUY) / -2% (SELL).
pub const REPAIR_TP_BUY: Decimal = dec!(1.02);
pub const REPAIR_TP_SELL: Decimal = dec!(0.98);

/// Replacement stop-loss: -1% (BUY) / +1% (SELL).
pub const REPAIR_SL_BUY: Decimal = dec!(0.99);
pub const REPAIR_SL_SELL: Decimal = dec!(1.01);

// ---------------------------------------------------------------------------
// Provider client
// ---------------------------------------------------------------------------

pub const DEFAULT_PROVIDER_TIMEOUT_SECONDS: u64 = 45;

/// Consecutive failures before a provider's circuit opens.
pub const CIRCUIT_BREAKER_THRESHOLD: u32 = 3;

/// How long an open circuit short-circuits calls.
pub const CIRCUIT_BREAKER_COOLDOWN_SECONDS: u64 = 300;

/// Quote currency appended to every canonical symbol.
pub const QUOTE_ASSET: &str = "USDT";
