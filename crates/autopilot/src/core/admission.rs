//! Admission rules: which signal, if any, becomes this scan's candidate.
//!
//! Everything here is pure. Inputs that come from collaborators (open
//! positions, realized loss, the execution ledger) are passed in.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use crate::constants::CONSENSUS_MIN_PROVIDERS;
use crate::types::{
    AdmissionRejection, ConsensusCandidate, EngineConfig, ExecutionStats, Signal, SignalDirection,
};

/// Live facts the final admission step checks a candidate against.
#[derive(Debug, Clone)]
pub struct AdmissionContext {
    pub open_symbols: HashSet<String>,
    pub executed_today: u32,
    pub last_execution_at: Option<DateTime<Utc>>,
    /// Realized loss today, non-negative.
    pub daily_loss: Decimal,
    pub now: DateTime<Utc>,
}

pub struct AdmissionController {
    /// Provider id → registration rank, for confidence ties.
    rank: HashMap<String, usize>,
}

impl AdmissionController {
    pub fn new(rank: HashMap<String, usize>) -> Self {
        Self { rank }
    }

    fn rank_of(&self, provider: &str) -> usize {
        self.rank.get(provider).copied().unwrap_or(usize::MAX)
    }

    /// Rules that don't depend on a symbol, checked before any provider is
    /// called: daily capacity, then cooldown.
    pub fn precheck(
        config: &EngineConfig,
        stats: &ExecutionStats,
        now: DateTime<Utc>,
    ) -> Result<(), AdmissionRejection> {
        check_capacity(config, stats.executed_today)?;
        check_cooldown(config, stats.last_execution_at, now)?;
        Ok(())
    }

    /// Filter, group, apply consensus, and pick the single best signal.
    ///
    /// `signals` is expected in provider-registration order with each
    /// provider's own response order preserved; that order is the final
    /// tie-break.
    pub fn select(&self, signals: &[Signal], config: &EngineConfig) -> Option<ConsensusCandidate> {
        // 1. Actionable, non-degraded, confident enough.
        let eligible: Vec<(usize, &Signal)> = signals
            .iter()
            .enumerate()
            .filter(|(_, s)| {
                s.direction != SignalDirection::Hold
                    && !s.is_fallback
                    && s.confidence >= config.min_confidence
            })
            .collect();

        // 2. Group by symbol, then by direction within the symbol.
        let mut groups: HashMap<(&str, SignalDirection), Vec<(usize, &Signal)>> = HashMap::new();
        for (idx, s) in &eligible {
            groups
                .entry((s.symbol.as_str(), s.direction))
                .or_default()
                .push((*idx, *s));
        }

        // 3. Consensus: distinct providers agreeing on symbol and direction.
        let mut best: Option<(usize, &Signal, &Vec<(usize, &Signal)>)> = None;
        for members in groups.values() {
            let providers: HashSet<&str> =
                members.iter().map(|(_, s)| s.provider_id.as_str()).collect();
            if config.require_consensus && providers.len() < CONSENSUS_MIN_PROVIDERS {
                continue;
            }

            // 4. Highest confidence, then provider rank, then response order.
            for &(idx, s) in members {
                let better = match best {
                    None => true,
                    Some((best_idx, best_signal, _)) => {
                        self.beats((idx, s), (best_idx, best_signal))
                    }
                };
                if better {
                    best = Some((idx, s, members));
                }
            }
        }

        let (_, signal, members) = best?;
        let supporting: BTreeSet<(usize, &str)> = members
            .iter()
            .map(|(_, s)| (self.rank_of(&s.provider_id), s.provider_id.as_str()))
            .collect();

        debug!(
            symbol = %signal.symbol,
            direction = signal.direction.as_str(),
            confidence = signal.confidence,
            supporters = supporting.len(),
            "candidate selected"
        );

        Some(ConsensusCandidate {
            signal: signal.clone(),
            supporting_providers: supporting.into_iter().map(|(_, p)| p.to_string()).collect(),
        })
    }

    fn beats(&self, a: (usize, &Signal), b: (usize, &Signal)) -> bool {
        let key = |(idx, s): (usize, &Signal)| {
            (
                std::cmp::Reverse(s.confidence),
                self.rank_of(&s.provider_id),
                idx,
            )
        };
        key(a) < key(b)
    }

    /// Final gate for a selected candidate: open position, capacity,
    /// cooldown, daily loss.
    pub fn admit(
        candidate: &ConsensusCandidate,
        config: &EngineConfig,
        ctx: &AdmissionContext,
    ) -> Result<(), AdmissionRejection> {
        let symbol = &candidate.signal.symbol;
        if ctx.open_symbols.contains(symbol) {
            return Err(AdmissionRejection::OpenPosition {
                symbol: symbol.clone(),
            });
        }

        check_capacity(config, ctx.executed_today)?;
        check_cooldown(config, ctx.last_execution_at, ctx.now)?;

        if ctx.daily_loss > Decimal::ZERO && ctx.daily_loss >= config.max_daily_loss {
            return Err(AdmissionRejection::DailyLossLimit {
                daily_loss: ctx.daily_loss,
                max_daily_loss: config.max_daily_loss,
            });
        }

        Ok(())
    }
}

fn check_capacity(config: &EngineConfig, executed_today: u32) -> Result<(), AdmissionRejection> {
    if executed_today >= config.max_positions {
        return Err(AdmissionRejection::DailyCapReached {
            executed_today,
            max_positions: config.max_positions,
        });
    }
    Ok(())
}

fn check_cooldown(
    config: &EngineConfig,
    last_execution_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), AdmissionRejection> {
    let Some(last) = last_execution_at else {
        return Ok(());
    };
    let cooldown_ms = i64::try_from(config.cooldown_seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    let elapsed_ms = (now - last).num_milliseconds();
    if elapsed_ms < cooldown_ms {
        let remaining_ms = cooldown_ms - elapsed_ms;
        // Round up so "0s remaining" never shows while still blocked.
        let remaining_seconds = u64::try_from((remaining_ms + 999) / 1000).unwrap_or(u64::MAX);
        return Err(AdmissionRejection::Cooldown { remaining_seconds });
    }
    Ok(())
}
