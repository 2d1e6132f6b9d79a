//! Execution controller.
//!
//! Turns an approved cycle into one order per hop, submits the legs
//! concurrently, and reconciles them against the exchange until every leg
//! is terminal or the execution timeout passes. Legs still open at the
//! timeout are cancelled.
//!
//! If any leg does not fill completely, every filled quantity is reversed
//! with an opposite-side market order. A cycle whose reversals all fill is
//! rolled back; anything else is an exposure alert that halts the engine.
//!
//! Cancellation requested mid-trade is logged and honoured only after
//! reconciliation completes; legs are never abandoned.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::accountant::Accountant;
use crate::config::ExecutionConfig;
use crate::market::MarketSnapshotStore;
use crate::platforms::Exchange;
use crate::strategy::risk::TradeApproval;
use crate::types::{to_decimal, Asset, Leg, OrderRequest, OrderStatus, PortfolioState, RiskState, Side};

/// Order quantities are truncated to this many decimal places.
const QTY_DP: u32 = 8;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExecutionOutcome {
    /// Every leg filled.
    Settled,
    /// A leg failed and every filled leg was reversed.
    RolledBack,
    /// A leg failed and at least one reversal did not fill.
    ExposureAlert,
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionOutcome::Settled => "SETTLED",
            ExecutionOutcome::RolledBack => "ROLLED_BACK",
            ExecutionOutcome::ExposureAlert => "EXPOSURE_ALERT",
        };
        f.write_str(s)
    }
}

/// Full record of one executed cycle.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub path: String,
    pub outcome: ExecutionOutcome,
    pub legs: Vec<Leg>,
    pub reversals: Vec<Leg>,
    pub notional: Decimal,
    /// Change in portfolio value (valuation currency) across the trade.
    pub pnl: Decimal,
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionReport {
    /// Reversal legs that did not fill; non-empty only on exposure alerts.
    pub fn stranded(&self) -> impl Iterator<Item = &Leg> {
        self.reversals.iter().filter(|l| l.status != OrderStatus::Filled)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct ExecutionController {
    exchange: Arc<dyn Exchange>,
    config: ExecutionConfig,
    valuation: Asset,
}

impl ExecutionController {
    pub fn new(exchange: Arc<dyn Exchange>, config: ExecutionConfig, valuation: Asset) -> Self {
        Self {
            exchange,
            config,
            valuation,
        }
    }

    /// One order per hop. Quantities chain through the expected hop rates
    /// starting from the approved amount of the start asset; limits allow
    /// the configured slippage off the quoted price.
    pub fn build_legs(&self, approval: &TradeApproval) -> Vec<Leg> {
        let slip = self.config.slippage_tolerance;
        let mut amount = approval.start_qty;

        approval
            .cycle
            .hops
            .iter()
            .enumerate()
            .map(|(i, hop)| {
                let rate = to_decimal(hop.rate);
                let (qty, limit) = match hop.side {
                    // base → quote: sell what we hold
                    Side::Sell => {
                        let qty = truncate(amount);
                        amount = qty * rate;
                        (qty, to_decimal(hop.price * (1.0 - slip)))
                    }
                    // quote → base: buy what the rate affords
                    Side::Buy => {
                        let qty = truncate(amount * rate);
                        amount = qty;
                        (qty, to_decimal(hop.price * (1.0 + slip)))
                    }
                };
                let request = OrderRequest::new(&hop.pair.symbol, hop.side, qty, Some(limit.round_dp(QTY_DP)));
                Leg::new(i, hop.pair.clone(), hop.from.clone(), hop.to.clone(), request)
            })
            .collect()
    }

    /// Execute an approved cycle, updating portfolio and risk state with
    /// whatever actually filled.
    pub async fn execute(
        &self,
        approval: &TradeApproval,
        store: &MarketSnapshotStore,
        risk: &mut RiskState,
        portfolio: &mut PortfolioState,
        cancel: &watch::Receiver<bool>,
    ) -> ExecutionReport {
        let started_at = Utc::now();
        let value_before = store.portfolio_value(portfolio, &self.valuation);
        risk.open_exposure += approval.notional;

        let mut legs = self.build_legs(approval);
        info!(
            cycle = %approval.cycle,
            legs = legs.len(),
            start = %format!("{} {}", approval.start_qty, approval.start_asset),
            notional = format!("${:.2}", approval.notional),
            venue = self.exchange.name(),
            "Executing cycle"
        );

        self.submit(&mut legs).await;
        let mut cancel_requested = self.reconcile(&mut legs, cancel).await;
        for leg in &legs {
            Accountant::apply_leg(portfolio, leg);
        }

        let mut reversals = Vec::new();
        let outcome = if legs.iter().all(|l| l.status == OrderStatus::Filled) {
            ExecutionOutcome::Settled
        } else {
            for leg in legs.iter().filter(|l| l.status != OrderStatus::Filled) {
                warn!(
                    leg = leg.index,
                    symbol = %leg.pair.symbol,
                    status = %leg.status,
                    filled = %leg.filled_qty,
                    "Leg did not fill, rolling back"
                );
            }
            reversals = reversal_legs(&legs);
            self.submit(&mut reversals).await;
            cancel_requested |= self.reconcile(&mut reversals, cancel).await;
            for leg in &reversals {
                Accountant::apply_leg(portfolio, leg);
            }

            if reversals.iter().all(|l| l.status == OrderStatus::Filled) {
                ExecutionOutcome::RolledBack
            } else {
                ExecutionOutcome::ExposureAlert
            }
        };

        // Stranded exposure stays on the books until an operator clears it.
        if outcome != ExecutionOutcome::ExposureAlert {
            risk.open_exposure = (risk.open_exposure - approval.notional).max(Decimal::ZERO);
        }

        let pnl = store.portfolio_value(portfolio, &self.valuation) - value_before;
        Accountant::record_execution(risk, outcome, pnl, Utc::now());

        let report = ExecutionReport {
            path: approval.cycle.path(),
            outcome,
            legs,
            reversals,
            notional: approval.notional,
            pnl,
            cancel_requested,
            started_at,
            finished_at: Utc::now(),
        };

        match outcome {
            ExecutionOutcome::Settled => info!(
                cycle = %report.path,
                pnl = format!("${:.2}", pnl),
                "Cycle settled"
            ),
            ExecutionOutcome::RolledBack => warn!(
                cycle = %report.path,
                reversals = report.reversals.len(),
                pnl = format!("${:.2}", pnl),
                "Cycle rolled back"
            ),
            ExecutionOutcome::ExposureAlert => {
                for leg in report.stranded() {
                    error!(
                        symbol = %leg.pair.symbol,
                        side = %leg.side(),
                        qty = %leg.request.quantity,
                        filled = %leg.filled_qty,
                        status = %leg.status,
                        "Reversal did not fill"
                    );
                }
                error!(
                    cycle = %report.path,
                    exposure = format!("${:.2}", risk.open_exposure),
                    portfolio = %portfolio,
                    "EXPOSURE ALERT: unhedged position after failed rollback"
                );
            }
        }

        report
    }

    /// Place every leg concurrently. A placement error fails the leg.
    async fn submit(&self, legs: &mut [Leg]) {
        let results = join_all(legs.iter().map(|leg| self.exchange.place_order(&leg.request))).await;
        for (leg, result) in legs.iter_mut().zip(results) {
            match result {
                Ok(r) => {
                    debug!(leg = leg.index, order = %r, "Order placed");
                    leg.observe(&r);
                }
                Err(e) => {
                    warn!(leg = leg.index, symbol = %leg.pair.symbol, error = %format!("{e:#}"), "Order placement failed");
                    leg.fail();
                }
            }
        }
    }

    /// Poll open legs until all are terminal or the timeout passes, then
    /// cancel whatever is still open. Returns whether cancellation was
    /// requested along the way.
    async fn reconcile(&self, legs: &mut [Leg], cancel: &watch::Receiver<bool>) -> bool {
        let deadline = Instant::now() + Duration::from_millis(self.config.execution_timeout_ms);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let mut cancel_requested = false;

        while legs.iter().any(|l| !l.is_terminal()) && Instant::now() < deadline {
            if !cancel_requested && *cancel.borrow() {
                info!("Shutdown requested, finishing reconciliation of open legs");
                cancel_requested = true;
            }
            tokio::time::sleep(poll.min(deadline.saturating_duration_since(Instant::now()))).await;

            let open: Vec<(usize, String)> = legs
                .iter()
                .enumerate()
                .filter(|(_, l)| !l.is_terminal())
                .filter_map(|(i, l)| l.order_id.clone().map(|id| (i, id)))
                .collect();
            let results = join_all(open.iter().map(|(_, id)| self.exchange.order_status(id))).await;
            for ((i, id), result) in open.into_iter().zip(results) {
                match result {
                    Ok(r) => legs[i].observe(&r),
                    Err(e) => debug!(order_id = %id, error = %e, "Order status poll failed"),
                }
            }
        }

        for leg in legs.iter_mut().filter(|l| !l.is_terminal()) {
            warn!(leg = leg.index, symbol = %leg.pair.symbol, "Leg timed out, cancelling");
            if let Some(id) = leg.order_id.clone() {
                match self.exchange.cancel_order(&id).await {
                    Ok(r) => leg.observe(&r),
                    Err(e) => warn!(order_id = %id, error = %format!("{e:#}"), "Cancel failed"),
                }
            }
            leg.fail();
        }

        cancel_requested || *cancel.borrow()
    }
}

/// Opposite-side market orders for every filled quantity, last leg first.
fn reversal_legs(legs: &[Leg]) -> Vec<Leg> {
    legs.iter()
        .rev()
        .filter(|l| l.has_fill())
        .enumerate()
        .map(|(i, leg)| {
            let request = OrderRequest::new(&leg.pair.symbol, leg.side().opposite(), leg.filled_qty, None);
            Leg::new(i, leg.pair.clone(), leg.to.clone(), leg.from.clone(), request)
        })
        .collect()
}

fn truncate(qty: Decimal) -> Decimal {
    qty.round_dp_with_strategy(QTY_DP, RoundingStrategy::ToZero)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
