//! Position sizing and protective-level repair.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::constants::{
    MIN_LEVEL_DISTANCE_PCT, QUANTITY_SCALE, REPAIR_SL_BUY, REPAIR_SL_SELL, REPAIR_TP_BUY,
    REPAIR_TP_SELL,
};
use crate::errors::EngineError;
use crate::types::{EngineConfig, OrderIntent, OrderSide, Signal};

/// Size `signal` into an [`OrderIntent`].
///
/// - quantity = `capital_per_trade / entry_price`, truncated to 8 dp
/// - a take-profit or stop-loss within 0.5% of entry is replaced with a
///   fixed offset (TP ±2%, SL ∓1%)
/// - a level left on the wrong side of entry is dropped
pub fn size_order(signal: &Signal, config: &EngineConfig) -> Result<OrderIntent, EngineError> {
    let side = signal.direction.side().ok_or_else(|| EngineError::Sizing {
        reason: format!("{} is not an actionable direction", signal.direction.as_str()),
    })?;

    let entry = signal.entry_price;
    if entry <= Decimal::ZERO {
        return Err(EngineError::Sizing {
            reason: format!("entry price must be positive, got {entry}"),
        });
    }

    let capital = config.capital_per_trade;
    if capital <= Decimal::ZERO {
        return Err(EngineError::Sizing {
            reason: format!("capital per trade must be positive, got {capital}"),
        });
    }

    let quantity = capital
        .checked_div(entry)
        .ok_or_else(|| EngineError::Sizing {
            reason: format!("quantity overflow for capital {capital} at {entry}"),
        })?
        .round_dp_with_strategy(QUANTITY_SCALE, RoundingStrategy::ToZero);

    if quantity.is_zero() {
        return Err(EngineError::Sizing {
            reason: format!("capital {capital} buys nothing at {entry}"),
        });
    }

    let (stop_loss, take_profit) =
        protective_levels(side, entry, signal.stop_price, signal.target_price);

    debug!(
        symbol = %signal.symbol,
        side = side.as_str(),
        %quantity,
        %entry,
        stop_loss = ?stop_loss,
        take_profit = ?take_profit,
        "order sized"
    );

    Ok(OrderIntent {
        symbol: signal.symbol.clone(),
        side,
        quantity,
        price: entry,
        stop_loss,
        take_profit,
        leverage: config.leverage,
    })
}

/// Repair levels that sit too close to entry, then drop any that end up on
/// the wrong side. Absent levels stay absent. Returns `(stop, target)`.
pub fn protective_levels(
    side: OrderSide,
    entry: Decimal,
    stop: Option<Decimal>,
    target: Option<Decimal>,
) -> (Option<Decimal>, Option<Decimal>) {
    let min_distance = entry * MIN_LEVEL_DISTANCE_PCT;
    let too_close = |level: Decimal| (level - entry).abs() < min_distance;

    let target = target.map(|tp| {
        if too_close(tp) {
            let repaired = match side {
                OrderSide::Buy => entry * REPAIR_TP_BUY,
                OrderSide::Sell => entry * REPAIR_TP_SELL,
            };
            debug!(%tp, %repaired, "take-profit too close to entry, replaced");
            repaired
        } else {
            tp
        }
    });

    let stop = stop.map(|sl| {
        if too_close(sl) {
            let repaired = match side {
                OrderSide::Buy => entry * REPAIR_SL_BUY,
                OrderSide::Sell => entry * REPAIR_SL_SELL,
            };
            debug!(%sl, %repaired, "stop-loss too close to entry, replaced");
            repaired
        } else {
            sl
        }
    });

    let stop = stop.filter(|sl| {
        let ok = match side {
            OrderSide::Buy => *sl < entry,
            OrderSide::Sell => *sl > entry,
        };
        if !ok {
            warn!(%sl, %entry, side = side.as_str(), "stop-loss on wrong side of entry, dropped");
        }
        ok
    });

    let target = target.filter(|tp| {
        let ok = match side {
            OrderSide::Buy => *tp > entry,
            OrderSide::Sell => *tp < entry,
        };
        if !ok {
            warn!(%tp, %entry, side = side.as_str(), "take-profit on wrong side of entry, dropped");
        }
        ok
    });

    (stop, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SignalDirection;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn signal(direction: SignalDirection, entry: Decimal) -> Signal {
        Signal {
            provider_id: "qwen".into(),
            symbol: "BTCUSDT".into(),
            direction,
            confidence: 80,
            entry_price: entry,
            target_price: None,
            stop_price: None,
            is_fallback: false,
            reason: None,
        }
    }

    #[test]
    fn test_quantity_truncated_to_eight_places() {
        let cfg = EngineConfig::default(); // capital 5
        let intent = size_order(&signal(SignalDirection::Buy, dec!(3)), &cfg).unwrap();
        assert_eq!(intent.quantity, dec!(1.66666666));
        assert_eq!(intent.side, OrderSide::Buy);
        assert_eq!(intent.leverage, 25);
        assert_eq!(intent.price, dec!(3));
    }

    #[test]
    fn test_zero_entry_is_sizing_error() {
        let err = size_order(&signal(SignalDirection::Buy, Decimal::ZERO), &EngineConfig::default())
            .unwrap_err();
        assert!(matches!(err, EngineError::Sizing { .. }));
    }

    #[test]
    fn test_zero_capital_is_sizing_error() {
        let cfg = EngineConfig {
            capital_per_trade: Decimal::ZERO,
            ..EngineConfig::default()
        };
        assert!(size_order(&signal(SignalDirection::Buy, dec!(100)), &cfg).is_err());
    }

    #[test]
    fn test_dust_quantity_is_sizing_error() {
        let cfg = EngineConfig {
            capital_per_trade: dec!(1),
            ..EngineConfig::default()
        };
        let err = size_order(&signal(SignalDirection::Buy, dec!(1_000_000_000_000)), &cfg)
            .unwrap_err();
        assert!(err.to_string().contains("buys nothing"));
    }

    #[test]
    fn test_hold_is_not_sizeable() {
        assert!(size_order(&signal(SignalDirection::Hold, dec!(100)), &EngineConfig::default())
            .is_err());
    }

    #[test]
    fn test_buy_tight_levels_repaired() {
        let (sl, tp) =
            protective_levels(OrderSide::Buy, dec!(100), Some(dec!(99.8)), Some(dec!(100.3)));
        assert_eq!(tp, Some(dec!(102)));
        assert_eq!(sl, Some(dec!(99)));
    }

    #[test]
    fn test_sell_tight_levels_repaired() {
        let (sl, tp) =
            protective_levels(OrderSide::Sell, dec!(100), Some(dec!(100.2)), Some(dec!(99.9)));
        assert_eq!(tp, Some(dec!(98)));
        assert_eq!(sl, Some(dec!(101)));
    }

    #[test]
    fn test_distance_exactly_at_threshold_kept() {
        // 0.5% of 100 is 0.5: not "closer than", so untouched.
        let (sl, tp) =
            protective_levels(OrderSide::Buy, dec!(100), Some(dec!(99.5)), Some(dec!(100.5)));
        assert_eq!(sl, Some(dec!(99.5)));
        assert_eq!(tp, Some(dec!(100.5)));
    }

    #[test]
    fn test_wrong_side_levels_dropped() {
        let (sl, tp) =
            protective_levels(OrderSide::Buy, dec!(100), Some(dec!(105)), Some(dec!(90)));
        assert_eq!(sl, None);
        assert_eq!(tp, None);

        let (sl, tp) =
            protective_levels(OrderSide::Sell, dec!(100), Some(dec!(95)), Some(dec!(110)));
        assert_eq!(sl, None);
        assert_eq!(tp, None);
    }

    #[test]
    fn test_absent_levels_stay_absent() {
        let (sl, tp) = protective_levels(OrderSide::Buy, dec!(100), None, None);
        assert_eq!((sl, tp), (None, None));
    }

    #[test]
    fn test_size_order_carries_repaired_levels() {
        let mut s = signal(SignalDirection::Buy, dec!(100));
        s.target_price = Some(dec!(100.3));
        let intent = size_order(&s, &EngineConfig::default()).unwrap();
        assert_eq!(intent.take_profit, Some(dec!(102)));
        assert_eq!(intent.stop_loss, None);
    }

    proptest! {
        #[test]
        fn quantity_never_exceeds_capital(
            entry_cents in 1u64..1_000_000_000u64,
            capital in 1u32..=100u32,
        ) {
            let cfg = EngineConfig {
                capital_per_trade: Decimal::from(capital),
                ..EngineConfig::default()
            };
            let entry = Decimal::from(entry_cents) / dec!(100);
            if let Ok(intent) = size_order(&signal(SignalDirection::Buy, entry), &cfg) {
                prop_assert!(intent.quantity > Decimal::ZERO);
                prop_assert!(intent.quantity * entry <= cfg.capital_per_trade);
                prop_assert!(intent.quantity.scale() <= QUANTITY_SCALE);
            }
        }

        #[test]
        fn surviving_levels_are_on_the_correct_side(
            entry in 1u32..100_000u32,
            stop_bp in 0u32..20_000u32,
            target_bp in 0u32..20_000u32,
            buy in any::<bool>(),
        ) {
            let entry = Decimal::from(entry);
            let stop = entry * Decimal::from(stop_bp) / dec!(10000);
            let target = entry * Decimal::from(target_bp) / dec!(10000);
            let side = if buy { OrderSide::Buy } else { OrderSide::Sell };
            let (sl, tp) = protective_levels(side, entry, Some(stop), Some(target));
            for level in sl.iter().chain(tp.iter()) {
                prop_assert!((*level - entry).abs() >= entry * MIN_LEVEL_DISTANCE_PCT);
            }
            match side {
                OrderSide::Buy => {
                    prop_assert!(sl.map_or(true, |v| v < entry));
                    prop_assert!(tp.map_or(true, |v| v > entry));
                }
                OrderSide::Sell => {
                    prop_assert!(sl.map_or(true, |v| v > entry));
                    prop_assert!(tp.map_or(true, |v| v < entry));
                }
            }
        }
    }
}
