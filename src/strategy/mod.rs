//! Strategy engine — cycle detection, confidence scoring, Kelly sizing, and
//! risk gating.

pub mod confidence;
pub mod cycles;
pub mod kelly;
pub mod risk;

use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::market::graph::MarketGraph;
use crate::market::MarketSnapshotStore;
use crate::types::{ArbitrageCycle, ConfidenceScore, PortfolioState, RiskState};
use confidence::ConfidenceScorer;
use cycles::{passes_profit_gate, CycleDetector};
use risk::{RejectionReason, RiskController, TradeApproval};

// ---------------------------------------------------------------------------
// Decision log
// ---------------------------------------------------------------------------

/// Record of every decision made (or skipped) during a strategy pass,
/// including the candidates that were passed on and the reason why.
#[derive(Debug, Clone)]
pub enum DecisionRecord {
    /// Profit net of double the fee estimate did not clear the threshold.
    BelowProfitGate { cycle: String, profit: f64 },
    /// Composite confidence below the threshold.
    BelowConfidence { cycle: String, score: ConfidenceScore },
    /// Blocked by the risk controller.
    RiskRejected {
        cycle: String,
        score: ConfidenceScore,
        reason: RejectionReason,
    },
    /// Sized and approved for execution.
    Approved {
        approval: TradeApproval,
        score: ConfidenceScore,
    },
}

/// A cycle with its confidence.
#[derive(Debug, Clone)]
pub struct ScoredCycle {
    pub cycle: ArbitrageCycle,
    pub score: ConfidenceScore,
}

/// Result of one strategy pass.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutcome {
    /// Negative cycles found before any filtering.
    pub candidates: usize,
    /// Best approved trade, if any. At most one trade per scan.
    pub approved: Option<(TradeApproval, ConfidenceScore)>,
    pub decisions: Vec<DecisionRecord>,
}

impl StrategyOutcome {
    pub fn rejections(&self) -> impl Iterator<Item = &RejectionReason> {
        self.decisions.iter().filter_map(|d| match d {
            DecisionRecord::RiskRejected { reason, .. } => Some(reason),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Pipelines cycle detection → profit gate → confidence scoring → ranking →
/// risk approval.
pub struct StrategyOrchestrator {
    detector: CycleDetector,
    scorer: ConfidenceScorer,
    risk: RiskController,
    fee_estimate: f64,
    min_profit_threshold: f64,
    confidence_threshold: f64,
}

impl StrategyOrchestrator {
    pub fn new(
        detector: CycleDetector,
        scorer: ConfidenceScorer,
        risk: RiskController,
        fee_estimate: f64,
        min_profit_threshold: f64,
        confidence_threshold: f64,
    ) -> Self {
        Self {
            detector,
            scorer,
            risk,
            fee_estimate,
            min_profit_threshold,
            confidence_threshold,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let s = &config.strategy;
        Self::new(
            CycleDetector::new(s.max_cycle_hops),
            ConfidenceScorer::new(config.scoring.clone(), s.wavelet_window, config.valuation_asset()),
            RiskController::new(config.risk.clone(), config.valuation_asset()),
            s.fee_estimate,
            s.min_profit_threshold,
            s.confidence_threshold,
        )
    }

    pub fn risk(&self) -> &RiskController {
        &self.risk
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    /// Run the full pipeline over one graph snapshot.
    ///
    /// Steps:
    /// 1. Detect negative cycles.
    /// 2. Drop cycles failing the profit gate.
    /// 3. Score survivors; drop those below the confidence threshold.
    /// 4. Rank by confidence, then profit.
    /// 5. Offer candidates to the risk controller in rank order; the first
    ///    approval wins.
    pub fn evaluate(
        &self,
        graph: &MarketGraph,
        store: &MarketSnapshotStore,
        state: &RiskState,
        portfolio: &PortfolioState,
    ) -> StrategyOutcome {
        let mut decisions = Vec::new();

        // Step 1 – detection
        let cycles = self.detector.detect(graph);
        let candidates = cycles.len();
        if candidates == 0 {
            return StrategyOutcome::default();
        }
        info!(
            candidates,
            best = %cycles[0],
            "Arbitrage candidates found"
        );

        // Step 2 – profit gate
        // Step 3 – scoring
        let mut scored: Vec<ScoredCycle> = Vec::new();
        for cycle in cycles {
            if !passes_profit_gate(&cycle, self.fee_estimate, self.min_profit_threshold) {
                debug!(
                    cycle = %cycle.path(),
                    profit = format!("{:.3}%", cycle.profit * 100.0),
                    "Below profit gate"
                );
                decisions.push(DecisionRecord::BelowProfitGate {
                    cycle: cycle.path(),
                    profit: cycle.profit,
                });
                continue;
            }

            let score = self.scorer.score(&cycle, store);
            let regimes: Vec<String> = self
                .scorer
                .regimes(&cycle, store)
                .into_iter()
                .map(|(symbol, regime)| format!("{symbol}:{regime}"))
                .collect();
            debug!(
                cycle = %cycle.path(),
                profit = format!("{:.3}%", cycle.profit * 100.0),
                score = %score,
                regimes = %regimes.join(","),
                "Candidate scored"
            );

            if score.composite < self.confidence_threshold {
                decisions.push(DecisionRecord::BelowConfidence {
                    cycle: cycle.path(),
                    score,
                });
                continue;
            }
            scored.push(ScoredCycle { cycle, score });
        }

        // Step 4 – rank
        scored.sort_by(|a, b| {
            b.score
                .composite
                .total_cmp(&a.score.composite)
                .then(b.cycle.profit.total_cmp(&a.cycle.profit))
        });

        // Step 5 – risk approval in rank order
        let mut approved = None;
        for ScoredCycle { cycle, score } in scored {
            match self
                .risk
                .evaluate(&cycle, score.composite, state, portfolio, store)
            {
                Ok(approval) => {
                    info!(
                        cycle = %approval.cycle.path(),
                        profit = format!("{:.3}%", approval.cycle.profit * 100.0),
                        confidence = format!("{:.3}", score.composite),
                        notional = format!("${:.2}", approval.notional),
                        start = %approval.start_asset,
                        "Trade approved"
                    );
                    decisions.push(DecisionRecord::Approved {
                        approval: approval.clone(),
                        score,
                    });
                    approved = Some((approval, score));
                    break;
                }
                Err(reason) => {
                    warn!(
                        cycle = %cycle.path(),
                        code = reason.code(),
                        reason = %reason,
                        "Trade rejected by risk controller"
                    );
                    decisions.push(DecisionRecord::RiskRejected {
                        cycle: cycle.path(),
                        score,
                        reason,
                    });
                }
            }
        }

        StrategyOutcome {
            candidates,
            approved,
            decisions,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
