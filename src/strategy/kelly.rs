//! Kelly criterion position sizing.
//!
//! The "win probability" of an arbitrage cycle is the engine's own execution
//! track record: a decay-weighted Beta posterior over SETTLED (success) and
//! ROLLED_BACK (failure) outcomes. The payout ratio is the cycle's profit
//! relative to the loss assumed when a trade goes wrong (`STOP_LOSS_PCT`).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RiskConfig;

// ---------------------------------------------------------------------------
// Track record
// ---------------------------------------------------------------------------

/// Beta(alpha, beta) posterior over execution success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub alpha: f64,
    pub beta: f64,
    /// Weight kept by older observations each time a new one arrives.
    pub decay: f64,
}

impl Default for TrackRecord {
    fn default() -> Self {
        Self {
            alpha: 19.0, // Prior: 95% of submitted cycles settle
            beta: 1.0,
            decay: 0.95,
        }
    }
}

impl TrackRecord {
    pub fn with_prior(successes: f64, failures: f64, decay: f64) -> Self {
        Self {
            alpha: successes,
            beta: failures,
            decay,
        }
    }

    pub fn from_config(config: &RiskConfig) -> Self {
        Self::with_prior(
            config.prior_successes,
            config.prior_failures,
            config.track_record_decay,
        )
    }

    /// Record one execution outcome.
    pub fn record(&mut self, success: bool) {
        self.alpha *= self.decay;
        self.beta *= self.decay;
        if success {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
    }

    /// Posterior mean success probability.
    pub fn success_rate(&self) -> f64 {
        let total = self.alpha + self.beta;
        if total <= 0.0 {
            0.5
        } else {
            self.alpha / total
        }
    }

    /// Effective number of observations behind the estimate.
    pub fn weight(&self) -> f64 {
        self.alpha + self.beta
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct KellyConfig {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly). Lower = more conservative.
    pub multiplier: f64,
    /// Upper clamp on the raw Kelly fraction.
    pub cap: f64,
}

impl Default for KellyConfig {
    fn default() -> Self {
        Self {
            multiplier: 0.25, // Quarter-Kelly
            cap: 0.25,
        }
    }
}

impl From<&RiskConfig> for KellyConfig {
    fn from(config: &RiskConfig) -> Self {
        Self {
            multiplier: config.kelly_multiplier,
            cap: config.kelly_cap,
        }
    }
}

// ---------------------------------------------------------------------------
// Kelly calculator
// ---------------------------------------------------------------------------

pub struct KellyCalculator {
    config: KellyConfig,
}

impl KellyCalculator {
    pub fn new(config: KellyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &KellyConfig {
        &self.config
    }

    /// Nominal bankroll fraction for a trade.
    ///
    /// Kelly formula: f* = p - q / b
    /// where:
    ///   p = success probability
    ///   q = 1 - p
    ///   b = profit / stop_loss (gain per unit of assumed loss)
    ///
    /// Returns 0 when the edge doesn't justify a trade.
    pub fn nominal_fraction(&self, success_prob: f64, profit: f64, stop_loss: f64) -> f64 {
        if !(profit > 0.0 && stop_loss > 0.0) || !success_prob.is_finite() {
            return 0.0;
        }
        let p = success_prob.clamp(0.0, 1.0);
        let b = profit / stop_loss;
        let kelly = p - (1.0 - p) / b;

        if kelly <= 0.0 {
            debug!(
                p = format!("{:.3}", p),
                b = format!("{:.3}", b),
                "Negative Kelly — no trade"
            );
            return 0.0;
        }

        let fraction = kelly.min(self.config.cap) * self.config.multiplier;
        debug!(
            raw_kelly = format!("{:.2}%", kelly * 100.0),
            fraction = format!("{:.2}%", fraction * 100.0),
            "Kelly sized"
        );
        fraction
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prior_rate() {
        let record = TrackRecord::default();
        assert!((record.success_rate() - 0.95).abs() < 1e-12);
    }

    #[test]
    fn test_failures_lower_rate() {
        let mut record = TrackRecord::default();
        let before = record.success_rate();
        record.record(false);
        record.record(false);
        assert!(record.success_rate() < before);
    }

    #[test]
    fn test_decay_favours_recent_outcomes() {
        let mut record = TrackRecord::with_prior(1.0, 1.0, 0.5);
        for _ in 0..10 {
            record.record(false);
        }
        for _ in 0..3 {
            record.record(true);
        }
        // Three recent successes outweigh ten older failures at heavy decay.
        assert!(record.success_rate() > 0.5);
        assert!(record.weight() < 13.0);
    }

    #[test]
    fn test_positive_edge_sizes() {
        let calc = KellyCalculator::new(KellyConfig::default());
        // b = 0.01 / 0.02 = 0.5; f* = 0.95 - 0.05 / 0.5 = 0.85 → cap 0.25 → ×0.25
        let f = calc.nominal_fraction(0.95, 0.01, 0.02);
        assert!((f - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn test_uncapped_fraction() {
        let calc = KellyCalculator::new(KellyConfig {
            multiplier: 1.0,
            cap: 1.0,
        });
        // b = 1; f* = 0.6 - 0.4 = 0.2
        let f = calc.nominal_fraction(0.6, 0.02, 0.02);
        assert!((f - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_negative_kelly_no_trade() {
        let calc = KellyCalculator::new(KellyConfig::default());
        // b = 0.1; f* = 0.5 - 0.5 / 0.1 < 0
        assert_eq!(calc.nominal_fraction(0.5, 0.002, 0.02), 0.0);
    }

    #[test]
    fn test_degenerate_inputs() {
        let calc = KellyCalculator::new(KellyConfig::default());
        assert_eq!(calc.nominal_fraction(0.9, 0.0, 0.02), 0.0);
        assert_eq!(calc.nominal_fraction(0.9, 0.01, 0.0), 0.0);
        assert_eq!(calc.nominal_fraction(f64::NAN, 0.01, 0.02), 0.0);
    }

    #[test]
    fn test_quarter_kelly_is_conservative() {
        let quarter = KellyCalculator::new(KellyConfig {
            multiplier: 0.25,
            cap: 1.0,
        });
        let half = KellyCalculator::new(KellyConfig {
            multiplier: 0.50,
            cap: 1.0,
        });
        let q = quarter.nominal_fraction(0.9, 0.01, 0.02);
        let h = half.nominal_fraction(0.9, 0.01, 0.02);
        assert!(q > 0.0);
        assert!(q < h, "quarter {q} should be less than half {h}");
    }
}
