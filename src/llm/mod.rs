//! LLM advisory council.
//!
//! Defines the `Advisor` trait and the `Council` that polls several advisors
//! about an approved cycle. The council can veto a trade the risk controller
//! approved but can never approve one it rejected. Advisors that fail or
//! time out simply do not vote; with no votes at all there is no veto.

pub mod openrouter;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AdvisoryConfig;
use crate::strategy::confidence::Regime;
use crate::strategy::risk::TradeApproval;
use crate::types::ConfidenceScore;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// What an advisor gets to see about a candidate trade.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub path: String,
    pub hops: usize,
    pub profit: f64,
    pub confidence: f64,
    pub start_asset: String,
    pub notional: Decimal,
    /// (pair symbol, regime label) for each hop.
    pub regimes: Vec<(String, String)>,
}

impl CycleSummary {
    pub fn new(approval: &TradeApproval, score: &ConfidenceScore, regimes: &[(String, Regime)]) -> Self {
        Self {
            path: approval.cycle.path(),
            hops: approval.cycle.len(),
            profit: approval.cycle.profit,
            confidence: score.composite,
            start_asset: approval.start_asset.to_string(),
            notional: approval.notional,
            regimes: regimes.iter().map(|(s, r)| (s.clone(), r.to_string())).collect(),
        }
    }

    /// User prompt for chat-style advisors.
    pub fn to_prompt(&self) -> String {
        let regimes: Vec<String> = self.regimes.iter().map(|(s, r)| format!("{s}: {r}")).collect();
        format!(
            "Proposed arbitrage cycle: {}\n\
             Hops: {}\n\
             Expected profit after fees: {:.4}%\n\
             Engine confidence: {:.3}\n\
             Trade size: ${:.2} starting from {}\n\
             Market regimes: {}\n\n\
             Should this trade be executed now?",
            self.path,
            self.hops,
            self.profit * 100.0,
            self.confidence,
            self.notional,
            self.start_asset,
            if regimes.is_empty() { "unknown".to_string() } else { regimes.join(", ") },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Execute,
    Hold,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Execute => write!(f, "EXECUTE"),
            Decision::Hold => write!(f, "HOLD"),
        }
    }
}

/// One advisor's answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    pub decision: Decision,
    /// In [0, 1].
    pub confidence: f64,
    pub rationale: String,
}

impl Recommendation {
    /// Parse a free-text answer containing `DECISION: EXECUTE|HOLD` and
    /// `CONFIDENCE: <0..1 or percent>` lines. Anything else is rationale.
    pub fn parse(text: &str) -> Result<Self> {
        let mut decision = None;
        let mut confidence = None;
        let mut rationale = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim().trim_start_matches(['*', '#', '-', ' ']);
            let upper = trimmed.to_uppercase();
            if let Some(rest) = upper.strip_prefix("DECISION:") {
                decision = match rest.trim().trim_matches('*').trim() {
                    s if s.starts_with("EXECUTE") => Some(Decision::Execute),
                    s if s.starts_with("HOLD") => Some(Decision::Hold),
                    _ => decision,
                };
            } else if let Some(rest) = upper.strip_prefix("CONFIDENCE:") {
                let raw = rest.trim().trim_matches('*').trim_end_matches('%').trim();
                let value: f64 = raw
                    .parse()
                    .with_context(|| format!("Unparseable confidence: {raw}"))?;
                confidence = Some(if value > 1.0 { value / 100.0 } else { value }.clamp(0.0, 1.0));
            } else if !trimmed.is_empty() {
                rationale.push(trimmed.to_string());
            }
        }

        Ok(Self {
            decision: decision.context("Response has no DECISION line")?,
            confidence: confidence.context("Response has no CONFIDENCE line")?,
            rationale: rationale.join(" "),
        })
    }
}

// ---------------------------------------------------------------------------
// Advisor trait
// ---------------------------------------------------------------------------

/// A second opinion on an approved cycle.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn review(&self, summary: &CycleSummary) -> Result<Recommendation>;

    /// Model identifier string.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Council
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct CouncilVerdict {
    pub responses: usize,
    pub execute_votes: usize,
    pub mean_confidence: f64,
    pub approved: bool,
}

impl CouncilVerdict {
    pub fn vote_ratio(&self) -> String {
        format!("{}/{}", self.execute_votes, self.responses)
    }
}

pub struct Council {
    advisors: Vec<Arc<dyn Advisor>>,
    timeout: Duration,
    min_vote_ratio: f64,
    min_confidence: f64,
}

impl Council {
    pub fn new(advisors: Vec<Arc<dyn Advisor>>, config: &AdvisoryConfig) -> Self {
        Self {
            advisors,
            timeout: Duration::from_secs(config.timeout_secs),
            min_vote_ratio: config.min_vote_ratio,
            min_confidence: config.min_confidence,
        }
    }

    pub fn len(&self) -> usize {
        self.advisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advisors.is_empty()
    }

    /// Ask every advisor concurrently and tally the answers.
    pub async fn review(&self, summary: &CycleSummary) -> CouncilVerdict {
        let answers = join_all(self.advisors.iter().map(|advisor| async move {
            let result = tokio::time::timeout(self.timeout, advisor.review(summary)).await;
            (advisor.name().to_string(), result)
        }))
        .await;

        let mut votes = Vec::new();
        for (name, result) in answers {
            match result {
                Ok(Ok(rec)) => {
                    debug!(
                        advisor = %name,
                        decision = %rec.decision,
                        confidence = format!("{:.2}", rec.confidence),
                        rationale = %rec.rationale,
                        "Advisor vote"
                    );
                    votes.push(rec);
                }
                Ok(Err(e)) => warn!(advisor = %name, error = %format!("{e:#}"), "Advisor failed, no vote"),
                Err(_) => warn!(advisor = %name, timeout_secs = self.timeout.as_secs(), "Advisor timed out, no vote"),
            }
        }

        let verdict = self.tally(&votes);
        info!(
            cycle = %summary.path,
            votes = %verdict.vote_ratio(),
            mean_confidence = format!("{:.2}", verdict.mean_confidence),
            approved = verdict.approved,
            "Council verdict"
        );
        verdict
    }

    fn tally(&self, votes: &[Recommendation]) -> CouncilVerdict {
        if votes.is_empty() {
            return CouncilVerdict {
                responses: 0,
                execute_votes: 0,
                mean_confidence: 0.0,
                approved: true,
            };
        }
        let responses = votes.len();
        let execute_votes = votes.iter().filter(|v| v.decision == Decision::Execute).count();
        let mean_confidence = votes.iter().map(|v| v.confidence).sum::<f64>() / responses as f64;
        let approved = execute_votes as f64 / responses as f64 >= self.min_vote_ratio
            && mean_confidence >= self.min_confidence;

        CouncilVerdict {
            responses,
            execute_votes,
            mean_confidence,
            approved,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
