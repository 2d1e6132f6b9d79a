//! Core engine — the scan → detect → score → risk → execute loop.
//!
//! Each tick runs one decision cycle through the phases
//!
//! ```text
//! SCANNING → CANDIDATES_FOUND | IDLE → SCORING → RISK_CHECK
//!          → EXECUTING → SETTLED | ROLLED_BACK | EXPOSURE_ALERT
//! ```
//!
//! and ends in exactly one terminal phase. Provider failures and pauses end
//! the cycle early. An exposure alert or an idle timeout halts the loop;
//! cancellation is honoured between cycles and never abandons open legs.

pub mod accountant;
pub mod executor;
pub mod scanner;
pub mod watchdog;

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::llm::{Council, CycleSummary};
use crate::market::graph::MarketGraph;
use crate::market::MarketSnapshotStore;
use crate::platforms::Exchange;
use crate::storage::{self, PersistedState};
use crate::strategy::{DecisionRecord, StrategyOrchestrator};
use crate::types::{Asset, PortfolioState, RiskState};
use accountant::{Accountant, CycleReport};
use executor::{ExecutionController, ExecutionOutcome};
use scanner::{QuoteScanner, ScanStatus};
use watchdog::IdleWatchdog;

// ---------------------------------------------------------------------------
// Phases and exits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    Scanning,
    CandidatesFound,
    Scoring,
    RiskCheck,
    Executing,
    /// No candidate survived detection, the profit gate, or scoring.
    Idle,
    /// Every scored candidate was rejected by the risk controller.
    Rejected,
    /// The advisory council vetoed the approved trade.
    Vetoed,
    Settled,
    RolledBack,
    ExposureAlert,
    /// Every quote batch failed.
    ScanFailed,
    /// Provider paused after repeated failures.
    Paused,
}

impl CyclePhase {
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            CyclePhase::Scanning
                | CyclePhase::CandidatesFound
                | CyclePhase::Scoring
                | CyclePhase::RiskCheck
                | CyclePhase::Executing
        )
    }
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CyclePhase::Scanning => "SCANNING",
            CyclePhase::CandidatesFound => "CANDIDATES_FOUND",
            CyclePhase::Scoring => "SCORING",
            CyclePhase::RiskCheck => "RISK_CHECK",
            CyclePhase::Executing => "EXECUTING",
            CyclePhase::Idle => "IDLE",
            CyclePhase::Rejected => "REJECTED",
            CyclePhase::Vetoed => "VETOED",
            CyclePhase::Settled => "SETTLED",
            CyclePhase::RolledBack => "ROLLED_BACK",
            CyclePhase::ExposureAlert => "EXPOSURE_ALERT",
            CyclePhase::ScanFailed => "SCAN_FAILED",
            CyclePhase::Paused => "PAUSED",
        };
        f.write_str(s)
    }
}

impl From<ExecutionOutcome> for CyclePhase {
    fn from(outcome: ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Settled => CyclePhase::Settled,
            ExecutionOutcome::RolledBack => CyclePhase::RolledBack,
            ExecutionOutcome::ExposureAlert => CyclePhase::ExposureAlert,
        }
    }
}

/// Why the decision loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineExit {
    /// Shutdown requested.
    Clean,
    /// A rollback failed and left an unhedged position.
    ExposureHalt,
    /// No justified outcome within the idle limit.
    IdleHalt,
}

impl EngineExit {
    /// Process exit code.
    pub fn code(&self) -> i32 {
        match self {
            EngineExit::Clean => 0,
            EngineExit::ExposureHalt => 3,
            EngineExit::IdleHalt => 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    scanner: QuoteScanner,
    store: MarketSnapshotStore,
    strategy: StrategyOrchestrator,
    council: Option<Council>,
    executor: ExecutionController,
    watchdog: IdleWatchdog,
    risk: RiskState,
    portfolio: PortfolioState,
    valuation: Asset,
    fee_estimate: f64,
    max_quote_age: chrono::Duration,
    scan_interval: Duration,
    cycle_count: u64,
    state_file: Option<String>,
}

impl Engine {
    pub fn new(config: &AppConfig, exchange: Arc<dyn Exchange>, risk: RiskState, portfolio: PortfolioState) -> Self {
        let pairs = config.trading_pairs();
        let valuation = config.valuation_asset();
        let max_quote_age = i64::try_from(config.engine.max_quote_age_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX);

        Self {
            scanner: QuoteScanner::new(exchange.clone(), pairs.clone(), &config.engine),
            store: MarketSnapshotStore::new(pairs, config.strategy.wavelet_window),
            strategy: StrategyOrchestrator::from_config(config),
            council: None,
            executor: ExecutionController::new(exchange, config.execution.clone(), valuation.clone()),
            watchdog: IdleWatchdog::from_minutes(
                config.engine.max_idle_minutes,
                config.engine.idle_counts_as_justified,
                Utc::now(),
            ),
            risk,
            portfolio,
            valuation,
            fee_estimate: config.strategy.fee_estimate,
            max_quote_age,
            scan_interval: Duration::from_millis(config.engine.scan_interval_ms.max(1)),
            cycle_count: 0,
            state_file: None,
        }
    }

    /// Consult `council` before every execution.
    pub fn with_council(mut self, council: Council) -> Self {
        self.council = (!council.is_empty()).then_some(council);
        self
    }

    /// Persist state to `path` after every cycle.
    pub fn with_state_file(mut self, path: impl Into<String>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Continue numbering from a restored state.
    pub fn with_cycle_count(mut self, cycle_count: u64) -> Self {
        self.cycle_count = cycle_count;
        self
    }

    pub fn risk_state(&self) -> &RiskState {
        &self.risk
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn store(&self) -> &MarketSnapshotStore {
        &self.store
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Run one decision cycle and return its report.
    pub async fn run_cycle(&mut self, cancel: &watch::Receiver<bool>) -> CycleReport {
        self.cycle_count += 1;
        let mut report = CycleReport::new(self.cycle_count, CyclePhase::Scanning);
        let now = Utc::now();
        self.strategy.risk().roll_day(&mut self.risk, now.date_naive());

        match self.scanner.scan(&mut self.store).await {
            ScanStatus::Refreshed { quotes, .. } => report.quotes_applied = quotes,
            ScanStatus::Failed { .. } => return self.finish(report, CyclePhase::ScanFailed),
            ScanStatus::Paused { .. } => return self.finish(report, CyclePhase::Paused),
        }

        let graph = MarketGraph::build(&self.store, now, self.fee_estimate, self.max_quote_age);
        debug!(
            assets = graph.asset_count(),
            edges = graph.edge_count(),
            "Market graph built"
        );

        let outcome = self.strategy.evaluate(&graph, &self.store, &self.risk, &self.portfolio);
        report.candidates = outcome.candidates;
        for decision in &outcome.decisions {
            match decision {
                DecisionRecord::BelowProfitGate { .. } => report.below_profit_gate += 1,
                DecisionRecord::BelowConfidence { .. } => report.below_confidence += 1,
                DecisionRecord::RiskRejected { .. } => report.risk_rejected += 1,
                DecisionRecord::Approved { .. } => {}
            }
        }

        if report.candidates > 0 {
            advance(&mut report, CyclePhase::CandidatesFound);
        }
        if report.candidates > report.below_profit_gate {
            advance(&mut report, CyclePhase::Scoring);
        }
        if report.risk_rejected > 0 || outcome.approved.is_some() {
            advance(&mut report, CyclePhase::RiskCheck);
        }

        let Some((approval, score)) = outcome.approved else {
            let phase = if report.risk_rejected > 0 {
                CyclePhase::Rejected
            } else {
                CyclePhase::Idle
            };
            return self.finish(report, phase);
        };

        if let Some(council) = &self.council {
            let regimes = self.strategy.scorer().regimes(&approval.cycle, &self.store);
            let verdict = council.review(&CycleSummary::new(&approval, &score, &regimes)).await;
            if !verdict.approved {
                info!(
                    cycle = %approval.cycle.path(),
                    votes = %verdict.vote_ratio(),
                    "Trade vetoed by advisory council"
                );
                return self.finish(report, CyclePhase::Vetoed);
            }
        }

        advance(&mut report, CyclePhase::Executing);
        let execution = self
            .executor
            .execute(&approval, &self.store, &mut self.risk, &mut self.portfolio, cancel)
            .await;
        report.outcome = Some(execution.outcome);
        report.trade_pnl = execution.pnl;
        self.finish(report, execution.outcome.into())
    }

    fn finish(&mut self, mut report: CycleReport, phase: CyclePhase) -> CycleReport {
        report.phase = phase;
        self.watchdog.record(phase, Utc::now());
        self.persist();
        Accountant::reconcile(report, &self.risk, &self.portfolio, &self.store, &self.valuation)
    }

    fn persist(&self) {
        let Some(path) = self.state_file.as_deref() else {
            return;
        };
        let state = PersistedState::new(self.cycle_count, self.risk.clone(), self.portfolio.clone());
        if let Err(e) = storage::save_state(&state, Some(path)) {
            error!(error = %format!("{e:#}"), "Failed to save state");
        }
    }

    /// Run cycles on the scan interval until shutdown, an exposure alert,
    /// or an idle timeout.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> EngineExit {
        let mut interval = tokio::time::interval(self.scan_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.scan_interval.as_millis() as u64,
            pairs = self.store.len(),
            portfolio = %self.portfolio,
            "Entering main loop. Press Ctrl+C to stop."
        );

        loop {
            if *shutdown.borrow() {
                info!("Shutdown signal received.");
                return EngineExit::Clean;
            }

            let signalled = tokio::select! {
                _ = interval.tick() => None,
                changed = shutdown.changed() => Some(changed.is_ok()),
            };
            match signalled {
                // sender dropped
                Some(false) => {
                    info!("Shutdown channel closed.");
                    return EngineExit::Clean;
                }
                Some(true) => continue,
                None => {}
            }

            let report = self.run_cycle(&shutdown).await;

            if report.phase == CyclePhase::ExposureAlert {
                error!(
                    cycle = report.cycle_number,
                    exposure = %self.risk.open_exposure.round_dp(2),
                    "Halting: unhedged exposure requires operator attention"
                );
                return EngineExit::ExposureHalt;
            }

            if let Some(idle) = self.watchdog.check(Utc::now()) {
                error!(
                    idle_secs = idle.num_seconds(),
                    last_justified = %self.watchdog.last_justified(),
                    "Idle timeout: no justified outcome within the limit, halting"
                );
                return EngineExit::IdleHalt;
            }
        }
    }
}

fn advance(report: &mut CycleReport, phase: CyclePhase) {
    debug!(cycle = report.cycle_number, from = %report.phase, to = %phase, "Phase");
    report.phase = phase;
}
