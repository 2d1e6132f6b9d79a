//! Confidence scorer.
//!
//! Rates a candidate cycle on five factors, each clamped to [0, 1]:
//!
//! - profit: saturating at `profit_ceiling`
//! - volume: weakest leg's recent volume, valued in the valuation asset,
//!   against `volume_reference`
//! - momentum: whether recent price moves favour each leg's direction
//! - volatility penalty: the most volatile leg (subtracted)
//! - spread consistency: how stable each leg's spread has been
//!
//! composite = Σ wᵢ·sᵢ − w_vol·penalty, clamped to [0, 1].

use std::fmt;

use crate::config::{ScoreWeights, ScoringConfig};
use crate::market::{MarketSnapshotStore, PairState};
use crate::types::{ArbitrageCycle, Asset, ConfidenceScore, Side, SubScore};

/// Neutral value for factors without enough history.
const NEUTRAL: f64 = 0.5;

// ---------------------------------------------------------------------------
// Regime label
// ---------------------------------------------------------------------------

/// Coarse market regime derived from a momentum score in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Bull,
    Bear,
    Neutral,
    Transition,
}

impl Regime {
    pub fn classify(momentum_score: f64) -> Self {
        if momentum_score > 0.7 {
            Regime::Bull
        } else if momentum_score < 0.3 {
            Regime::Bear
        } else if (0.45..=0.55).contains(&momentum_score) {
            Regime::Neutral
        } else {
            Regime::Transition
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Regime::Bull => "BULL",
            Regime::Bear => "BEAR",
            Regime::Neutral => "NEUTRAL",
            Regime::Transition => "TRANSITION",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Scorer
// ---------------------------------------------------------------------------

pub struct ConfidenceScorer {
    config: ScoringConfig,
    /// Samples considered for volatility and spread statistics.
    history_window: usize,
    /// Leg volumes are compared in this asset.
    valuation: Asset,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig, history_window: usize, valuation: Asset) -> Self {
        Self {
            config,
            history_window,
            valuation,
        }
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.config.weights
    }

    pub fn score(&self, cycle: &ArbitrageCycle, store: &MarketSnapshotStore) -> ConfidenceScore {
        let legs: Vec<(Side, Option<&PairState>)> = cycle
            .hops
            .iter()
            .map(|h| (h.side, store.get(&h.pair.symbol)))
            .collect();

        let profit = clamp01(cycle.profit / self.config.profit_ceiling);
        let volume = self.volume_score(cycle, store);
        let momentum = self.momentum_score(&legs);
        let volatility = self.volatility_penalty(&legs);
        let spread = self.spread_score(&legs);

        let w = &self.config.weights;
        let profit = sub(profit, w.profit);
        let volume = sub(volume, w.volume);
        let momentum = sub(momentum, w.momentum);
        let volatility_penalty = sub(volatility, w.volatility);
        let spread_consistency = sub(spread, w.spread);

        let composite = clamp01(
            profit.weighted + volume.weighted + momentum.weighted + spread_consistency.weighted
                - volatility_penalty.weighted,
        );

        ConfidenceScore {
            composite,
            profit,
            volume,
            momentum,
            volatility_penalty,
            spread_consistency,
        }
    }

    /// Regime of every leg's pair, in cycle order.
    pub fn regimes(&self, cycle: &ArbitrageCycle, store: &MarketSnapshotStore) -> Vec<(String, Regime)> {
        cycle
            .hops
            .iter()
            .map(|h| {
                let trend = store
                    .get(&h.pair.symbol)
                    .and_then(|s| s.momentum(self.config.momentum_window));
                let score = trend.map_or(NEUTRAL, |t| self.trend_to_score(t));
                (h.pair.symbol.clone(), Regime::classify(score))
            })
            .collect()
    }

    /// Each leg's volume is in its own base asset; value it before comparing.
    /// Legs without a price path count as zero.
    fn volume_score(&self, cycle: &ArbitrageCycle, store: &MarketSnapshotStore) -> f64 {
        let weakest = cycle
            .hops
            .iter()
            .map(|h| {
                let Some(state) = store.get(&h.pair.symbol) else {
                    return 0.0;
                };
                store
                    .conversion_rate(&h.pair.base, &self.valuation)
                    .map_or(0.0, |rate| state.volume * rate)
            })
            .fold(f64::INFINITY, f64::min);
        if !weakest.is_finite() {
            return 0.0;
        }
        clamp01(weakest / self.config.volume_reference)
    }

    /// Selling base favours a falling base price, buying base a rising one.
    fn momentum_score(&self, legs: &[(Side, Option<&PairState>)]) -> f64 {
        let trends: Vec<f64> = legs
            .iter()
            .filter_map(|&(side, s)| {
                let t = s?.momentum(self.config.momentum_window)?;
                Some(match side {
                    Side::Buy => t,
                    Side::Sell => -t,
                })
            })
            .collect();
        if trends.is_empty() {
            return NEUTRAL;
        }
        let mean = trends.iter().sum::<f64>() / trends.len() as f64;
        self.trend_to_score(mean)
    }

    fn trend_to_score(&self, trend: f64) -> f64 {
        clamp01(0.5 + 0.5 * (trend * self.config.momentum_scale).tanh())
    }

    fn volatility_penalty(&self, legs: &[(Side, Option<&PairState>)]) -> f64 {
        let worst = legs
            .iter()
            .filter_map(|&(_, s)| s?.volatility(self.history_window))
            .fold(0.0, f64::max);
        clamp01(worst / self.config.volatility_ceiling)
    }

    fn spread_score(&self, legs: &[(Side, Option<&PairState>)]) -> f64 {
        let scores: Vec<f64> = legs
            .iter()
            .filter_map(|&(_, s)| s?.spread_variation(self.history_window))
            .map(|cv| 1.0 - cv.min(1.0))
            .collect();
        if scores.is_empty() {
            return NEUTRAL;
        }
        clamp01(scores.iter().sum::<f64>() / scores.len() as f64)
    }
}

fn sub(raw: f64, weight: f64) -> SubScore {
    SubScore {
        raw,
        weighted: raw * weight,
    }
}

/// NaN maps to 0.
fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
