//! Accountant — fill bookkeeping, settlement, and cycle reports.
//!
//! Applies confirmed fills to the portfolio, records execution outcomes in
//! the risk state, and summarises each decision cycle.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use tracing::info;

use super::executor::ExecutionOutcome;
use super::CyclePhase;
use crate::market::MarketSnapshotStore;
use crate::types::{Asset, Leg, Pair, PortfolioState, RiskState, Side};

// ---------------------------------------------------------------------------
// Cycle report
// ---------------------------------------------------------------------------

/// Summary of one scan → detect → score → risk → execute cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_number: u64,
    /// Terminal phase the cycle reached.
    pub phase: CyclePhase,
    pub quotes_applied: usize,
    pub candidates: usize,
    pub below_profit_gate: usize,
    pub below_confidence: usize,
    pub risk_rejected: usize,
    pub outcome: Option<ExecutionOutcome>,
    pub trade_pnl: Decimal,
    pub portfolio_value: Decimal,
    pub daily_pnl: Decimal,
    pub daily_trades: u32,
    pub timestamp: DateTime<Utc>,
}

impl CycleReport {
    pub fn new(cycle_number: u64, phase: CyclePhase) -> Self {
        Self {
            cycle_number,
            phase,
            quotes_applied: 0,
            candidates: 0,
            below_profit_gate: 0,
            below_confidence: 0,
            risk_rejected: 0,
            outcome: None,
            trade_pnl: Decimal::ZERO,
            portfolio_value: Decimal::ZERO,
            daily_pnl: Decimal::ZERO,
            daily_trades: 0,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} candidates={} gated={} low_conf={} rejected={} value={} daily_pnl={}",
            self.cycle_number,
            self.phase,
            self.candidates,
            self.below_profit_gate,
            self.below_confidence,
            self.risk_rejected,
            self.portfolio_value.round_dp(2),
            self.daily_pnl.round_dp(2),
        )
    }
}

// ---------------------------------------------------------------------------
// Accountant
// ---------------------------------------------------------------------------

pub struct Accountant;

impl Accountant {
    /// Apply one fill. Buys add base and spend quote plus fee; sells remove
    /// base and receive quote minus fee. Fees are in quote units.
    pub fn apply_fill(
        portfolio: &mut PortfolioState,
        pair: &Pair,
        side: Side,
        qty: Decimal,
        price: Decimal,
        fee: Decimal,
    ) {
        if qty.is_zero() {
            return;
        }
        let notional = qty * price;
        match side {
            Side::Buy => {
                portfolio.adjust(&pair.base, qty);
                portfolio.adjust(&pair.quote, -(notional + fee));
            }
            Side::Sell => {
                portfolio.adjust(&pair.base, -qty);
                portfolio.adjust(&pair.quote, notional - fee);
            }
        }
    }

    /// Apply whatever a leg actually filled.
    pub fn apply_leg(portfolio: &mut PortfolioState, leg: &Leg) {
        Self::apply_fill(
            portfolio,
            &leg.pair,
            leg.side(),
            leg.filled_qty,
            leg.avg_price,
            leg.fee,
        );
    }

    /// Record a finished execution in the risk state. Every submitted cycle
    /// counts toward the daily trade limit.
    pub fn record_execution(
        risk: &mut RiskState,
        outcome: ExecutionOutcome,
        pnl: Decimal,
        now: DateTime<Utc>,
    ) {
        risk.daily_trades += 1;
        risk.daily_pnl += pnl;
        risk.last_trade_at = Some(now);
        match outcome {
            ExecutionOutcome::Settled => risk.track_record.record(true),
            ExecutionOutcome::RolledBack | ExecutionOutcome::ExposureAlert => {
                risk.track_record.record(false)
            }
        }
    }

    /// Fill in the end-of-cycle figures and log the report.
    pub fn reconcile(
        mut report: CycleReport,
        risk: &RiskState,
        portfolio: &PortfolioState,
        store: &MarketSnapshotStore,
        valuation: &Asset,
    ) -> CycleReport {
        report.portfolio_value = store.portfolio_value(portfolio, valuation);
        report.daily_pnl = risk.daily_pnl;
        report.daily_trades = risk.daily_trades;
        report.timestamp = Utc::now();

        info!(
            cycle = report.cycle_number,
            phase = %report.phase,
            candidates = report.candidates,
            outcome = ?report.outcome,
            trade_pnl = format!("{:.2}", report.trade_pnl),
            value = format!("{:.2}", report.portfolio_value),
            daily_pnl = format!("{:.2}", report.daily_pnl),
            daily_trades = report.daily_trades,
            "Cycle reconciled"
        );

        report
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
