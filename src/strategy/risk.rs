//! Risk controller.
//!
//! Hard gates, checked in order (first failure rejects):
//!
//! 1. daily trade count below `max_daily_trades`
//! 2. daily P&L above `-max_daily_loss`
//! 3. every leg's liquidity (recent volume × base value) at least `min_liquidity`
//! 4. open exposure plus the sized notional within `max_exposure_fraction`
//!
//! Sizing is fractional Kelly on the execution track record, scaled by the
//! cycle's confidence and capped by `max_position_fraction`, `max_position_size`
//! and the remaining daily loss budget over `stop_loss_pct`. A candidate is
//! never rejected for being too large, only sized down.
//!
//! `evaluate` is pure: it reads risk, portfolio, and market state and returns
//! a decision. Only `roll_day` mutates `RiskState`.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use tracing::{debug, info};

use super::kelly::{KellyCalculator, KellyConfig};
use crate::config::RiskConfig;
use crate::market::MarketSnapshotStore;
use crate::types::{to_decimal, ArbitrageCycle, Asset, PortfolioState, RiskState};

// ---------------------------------------------------------------------------
// Decision types
// ---------------------------------------------------------------------------

/// Why a candidate was refused.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectionReason {
    #[error("daily trade limit reached ({trades}/{limit})")]
    DailyTradeLimit { trades: u32, limit: u32 },

    #[error("daily loss limit reached (pnl {pnl}, limit -{limit})")]
    DailyLossLimit { pnl: Decimal, limit: Decimal },

    #[error("insufficient liquidity on {symbol} ({liquidity} < {required})")]
    InsufficientLiquidity {
        symbol: String,
        liquidity: Decimal,
        required: Decimal,
    },

    #[error("exposure {exposure} would exceed limit {limit}")]
    ExposureLimit { exposure: Decimal, limit: Decimal },

    #[error("position {notional} below minimum trade size {minimum}")]
    PositionTooSmall { notional: Decimal, minimum: Decimal },

    #[error("insufficient {asset}: need {required}, have {available}")]
    InsufficientBalance {
        asset: Asset,
        required: Decimal,
        available: Decimal,
    },
}

impl RejectionReason {
    /// Stable reason code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::DailyTradeLimit { .. } => "DAILY_TRADE_LIMIT",
            RejectionReason::DailyLossLimit { .. } => "DAILY_LOSS_LIMIT",
            RejectionReason::InsufficientLiquidity { .. } => "INSUFFICIENT_LIQUIDITY",
            RejectionReason::ExposureLimit { .. } => "EXPOSURE_LIMIT",
            RejectionReason::PositionTooSmall { .. } => "POSITION_TOO_SMALL",
            RejectionReason::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
        }
    }
}

/// An approved, sized trade.
#[derive(Debug, Clone)]
pub struct TradeApproval {
    /// The cycle rotated to begin and end at `start_asset`.
    pub cycle: ArbitrageCycle,
    pub start_asset: Asset,
    /// Units of `start_asset` committed to the first leg.
    pub start_qty: Decimal,
    /// Trade size in valuation currency.
    pub notional: Decimal,
    /// Bankroll fraction after confidence scaling and caps.
    pub fraction: f64,
    pub kelly_fraction: f64,
    pub portfolio_value: Decimal,
}

impl fmt::Display for TradeApproval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} start={} {} notional={} ({:.2}% of {})",
            self.cycle.path(),
            self.start_qty.round_dp(8).normalize(),
            self.start_asset,
            self.notional.round_dp(2),
            self.fraction * 100.0,
            self.portfolio_value.round_dp(2),
        )
    }
}

// ---------------------------------------------------------------------------
// Risk controller
// ---------------------------------------------------------------------------

pub struct RiskController {
    config: RiskConfig,
    kelly: KellyCalculator,
    valuation: Asset,
}

impl RiskController {
    pub fn new(config: RiskConfig, valuation: Asset) -> Self {
        let kelly = KellyCalculator::new(KellyConfig::from(&config));
        Self {
            config,
            kelly,
            valuation,
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn valuation(&self) -> &Asset {
        &self.valuation
    }

    /// Reset daily counters at a calendar-day boundary.
    pub fn roll_day(&self, state: &mut RiskState, today: NaiveDate) -> bool {
        let previous = state.day;
        let rolled = state.roll_over(today);
        if rolled {
            info!(
                from = %previous,
                to = %today,
                open_exposure = %state.open_exposure.round_dp(2),
                "Daily risk counters reset"
            );
        }
        rolled
    }

    /// Approve and size `cycle`, or say why not.
    pub fn evaluate(
        &self,
        cycle: &ArbitrageCycle,
        confidence: f64,
        state: &RiskState,
        portfolio: &PortfolioState,
        store: &MarketSnapshotStore,
    ) -> Result<TradeApproval, RejectionReason> {
        let cfg = &self.config;

        // 1. Daily trade count
        if state.daily_trades >= cfg.max_daily_trades {
            return Err(RejectionReason::DailyTradeLimit {
                trades: state.daily_trades,
                limit: cfg.max_daily_trades,
            });
        }

        // 2. Daily loss
        if state.daily_pnl <= -cfg.max_daily_loss {
            return Err(RejectionReason::DailyLossLimit {
                pnl: state.daily_pnl,
                limit: cfg.max_daily_loss,
            });
        }

        // 3. Liquidity on every leg
        for hop in &cycle.hops {
            let liquidity = self.leg_liquidity(store, &hop.pair.symbol, &hop.pair.base);
            if liquidity < cfg.min_liquidity {
                return Err(RejectionReason::InsufficientLiquidity {
                    symbol: hop.pair.symbol.clone(),
                    liquidity: liquidity.round_dp(2),
                    required: cfg.min_liquidity,
                });
            }
        }

        // Sizing
        let portfolio_value = store.portfolio_value(portfolio, &self.valuation);
        let kelly_fraction = self.kelly.nominal_fraction(
            state.track_record.success_rate(),
            cycle.profit,
            cfg.stop_loss_pct,
        );
        let fraction = (confidence.clamp(0.0, 1.0) * kelly_fraction).min(cfg.max_position_fraction);

        let remaining_loss_budget = cfg.max_daily_loss + state.daily_pnl.min(Decimal::ZERO);
        let loss_budget_cap = remaining_loss_budget
            .checked_div(to_decimal(cfg.stop_loss_pct))
            .unwrap_or(Decimal::ZERO);

        let notional = (to_decimal(fraction) * portfolio_value)
            .min(cfg.max_position_size)
            .min(loss_budget_cap)
            .max(Decimal::ZERO)
            .round_dp_with_strategy(2, RoundingStrategy::ToZero);

        // 4. Exposure limit
        let exposure_limit = to_decimal(cfg.max_exposure_fraction) * portfolio_value;
        let exposure = state.open_exposure + notional;
        if exposure > exposure_limit {
            return Err(RejectionReason::ExposureLimit {
                exposure,
                limit: exposure_limit.round_dp(2),
            });
        }

        if notional < cfg.min_trade_size || notional.is_zero() {
            return Err(RejectionReason::PositionTooSmall {
                notional,
                minimum: cfg.min_trade_size,
            });
        }

        // Starting asset and quantity
        let start_asset = self.start_asset(cycle, portfolio, store);
        let unit_value = store
            .value_in(&start_asset, Decimal::ONE, &self.valuation)
            .filter(|v| *v > Decimal::ZERO);
        let available = portfolio.balance(&start_asset);
        let Some(start_qty) = unit_value.and_then(|v| notional.checked_div(v)).map(|q| q.round_dp(8)) else {
            return Err(RejectionReason::InsufficientBalance {
                asset: start_asset,
                required: notional,
                available,
            });
        };
        if start_qty > available {
            return Err(RejectionReason::InsufficientBalance {
                asset: start_asset,
                required: start_qty,
                available,
            });
        }

        let Some(rotated) = cycle.rotated_to(&start_asset) else {
            return Err(RejectionReason::InsufficientBalance {
                asset: start_asset,
                required: start_qty,
                available,
            });
        };

        debug!(
            cycle = %rotated.path(),
            kelly = format!("{:.4}", kelly_fraction),
            fraction = format!("{:.4}", fraction),
            notional = %notional,
            start = %start_asset,
            "Risk approved"
        );

        Ok(TradeApproval {
            cycle: rotated,
            start_asset,
            start_qty,
            notional,
            fraction,
            kelly_fraction,
            portfolio_value,
        })
    }

    /// Recent volume × base-asset value. Unpriced legs have zero liquidity.
    fn leg_liquidity(&self, store: &MarketSnapshotStore, symbol: &str, base: &Asset) -> Decimal {
        let Some(state) = store.get(symbol) else {
            return Decimal::ZERO;
        };
        store
            .value_in(base, to_decimal(state.volume), &self.valuation)
            .unwrap_or(Decimal::ZERO)
    }

    /// Valuation currency when the cycle passes through it, otherwise the
    /// cycle asset with the largest holding by value.
    fn start_asset(&self, cycle: &ArbitrageCycle, portfolio: &PortfolioState, store: &MarketSnapshotStore) -> Asset {
        if cycle.assets.contains(&self.valuation) {
            return self.valuation.clone();
        }
        cycle
            .assets
            .iter()
            .max_by_key(|a| {
                store
                    .value_in(a, portfolio.balance(a), &self.valuation)
                    .unwrap_or(Decimal::ZERO)
            })
            .cloned()
            .unwrap_or_else(|| self.valuation.clone())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::kelly::TrackRecord;
    use crate::types::{Hop, Pair, Quote, Side};
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    // ---- helpers ----

    fn make_store(volume: f64) -> MarketSnapshotStore {
        let mut store = MarketSnapshotStore::new(
            vec![
                Pair::new("XBTUSD", "XBT", "USD"),
                Pair::new("ETHXBT", "ETH", "XBT"),
                Pair::new("ETHUSD", "ETH", "USD"),
            ],
            50,
        );
        let now = Utc::now();
        for (symbol, px) in [("XBTUSD", 50_000.0), ("ETHXBT", 0.05), ("ETHUSD", 2_500.0)] {
            store.apply_quote(&Quote {
                symbol: symbol.into(),
                bid: px,
                ask: px,
                volume,
                timestamp: now,
            });
        }
        store
    }

    fn make_cycle(profit: f64) -> ArbitrageCycle {
        let hop = |from: &str, to: &str, symbol: &str, base: &str, quote: &str, side: Side| Hop {
            from: from.into(),
            to: to.into(),
            pair: Pair::new(symbol, base, quote),
            side,
            price: 1.0,
            rate: 1.0,
            weight: 0.0,
        };
        ArbitrageCycle {
            assets: vec!["ETH".into(), "USD".into(), "XBT".into()],
            hops: vec![
                hop("ETH", "USD", "ETHUSD", "ETH", "USD", Side::Sell),
                hop("USD", "XBT", "XBTUSD", "XBT", "USD", Side::Buy),
                hop("XBT", "ETH", "ETHXBT", "ETH", "XBT", Side::Buy),
            ],
            total_weight: -(1.0 + profit).ln(),
            profit,
        }
    }

    fn make_portfolio(usd: Decimal) -> PortfolioState {
        let mut p = PortfolioState::default();
        p.adjust(&Asset::new("USD"), usd);
        p
    }

    fn make_state() -> RiskState {
        RiskState::new(Utc::now().date_naive(), TrackRecord::default())
    }

    fn make_controller(config: RiskConfig) -> RiskController {
        RiskController::new(config, Asset::new("USD"))
    }

    // ---- gates ----

    #[test]
    fn test_approves_and_rotates_to_valuation() {
        let rc = make_controller(RiskConfig::default());
        let approval = rc
            .evaluate(&make_cycle(0.01), 0.9, &make_state(), &make_portfolio(dec!(10000)), &make_store(100.0))
            .unwrap();

        assert_eq!(approval.start_asset, Asset::new("USD"));
        assert_eq!(approval.cycle.assets[0], Asset::new("USD"));
        assert_eq!(approval.start_qty, approval.notional);
        // quarter-Kelly capped at 0.25 → 0.0625, × 0.9 confidence, capped at 10%
        assert!((approval.fraction - 0.05625).abs() < 1e-12);
        assert_eq!(approval.notional, dec!(500)); // 562.50 capped by MAX_POSITION_SIZE
    }

    #[test]
    fn test_daily_trade_limit() {
        let rc = make_controller(RiskConfig::default());
        let mut state = make_state();
        state.daily_trades = 100;
        let err = rc
            .evaluate(&make_cycle(0.01), 0.9, &state, &make_portfolio(dec!(10000)), &make_store(100.0))
            .unwrap_err();
        assert_eq!(err.code(), "DAILY_TRADE_LIMIT");
    }

    #[test]
    fn test_daily_loss_limit() {
        let rc = make_controller(RiskConfig::default());
        let mut state = make_state();
        state.daily_pnl = dec!(-500);
        let err = rc
            .evaluate(&make_cycle(0.01), 0.9, &state, &make_portfolio(dec!(10000)), &make_store(100.0))
            .unwrap_err();
        assert!(matches!(err, RejectionReason::DailyLossLimit { .. }));
    }

    #[test]
    fn test_loss_budget_caps_size() {
        let rc = make_controller(RiskConfig::default());
        let mut state = make_state();
        // 499 lost: 1 / 0.02 = 50 left to risk
        state.daily_pnl = dec!(-499);
        let approval = rc
            .evaluate(&make_cycle(0.01), 0.9, &state, &make_portfolio(dec!(10000)), &make_store(100.0))
            .unwrap();
        assert_eq!(approval.notional, dec!(50));
    }

    #[test]
    fn test_thin_leg_rejected() {
        let rc = make_controller(RiskConfig::default());
        // 0.001 ETH × $2500 = $2.50 on the ETH legs
        let err = rc
            .evaluate(&make_cycle(0.01), 0.9, &make_state(), &make_portfolio(dec!(10000)), &make_store(0.001))
            .unwrap_err();
        assert!(matches!(err, RejectionReason::InsufficientLiquidity { .. }));
    }

    #[test]
    fn test_oversized_kelly_capped_not_rejected() {
        let rc = make_controller(RiskConfig {
            kelly_multiplier: 1.0,
            kelly_cap: 1.0,
            max_position_size: dec!(100000),
            ..RiskConfig::default()
        });
        let approval = rc
            .evaluate(&make_cycle(0.05), 1.0, &make_state(), &make_portfolio(dec!(10000)), &make_store(100.0))
            .unwrap();
        assert!(approval.kelly_fraction > 0.1);
        assert_eq!(approval.fraction, 0.1);
        assert_eq!(approval.notional, dec!(1000));
    }

    #[test]
    fn test_exposure_limit() {
        let rc = make_controller(RiskConfig::default());
        let mut state = make_state();
        state.open_exposure = dec!(1800);
        let err = rc
            .evaluate(&make_cycle(0.01), 0.9, &state, &make_portfolio(dec!(10000)), &make_store(100.0))
            .unwrap_err();
        assert_eq!(err.code(), "EXPOSURE_LIMIT");
    }

    #[test]
    fn test_position_too_small() {
        let rc = make_controller(RiskConfig::default());
        let err = rc
            .evaluate(&make_cycle(0.01), 0.9, &make_state(), &make_portfolio(dec!(100)), &make_store(100.0))
            .unwrap_err();
        assert!(matches!(err, RejectionReason::PositionTooSmall { .. }));
    }

    #[test]
    fn test_negative_kelly_too_small() {
        let rc = make_controller(RiskConfig::default());
        let err = rc
            .evaluate(&make_cycle(0.0001), 0.9, &make_state(), &make_portfolio(dec!(10000)), &make_store(100.0))
            .unwrap_err();
        assert!(matches!(err, RejectionReason::PositionTooSmall { .. }));
    }

    #[test]
    fn test_start_from_largest_holding_without_valuation_leg() {
        let rc = make_controller(RiskConfig::default());
        let mut cycle = make_cycle(0.01);
        cycle.assets = vec!["ETH".into(), "XBT".into(), "SOL".into()];
        for (hop, (from, to)) in cycle.hops.iter_mut().zip([("ETH", "XBT"), ("XBT", "SOL"), ("SOL", "ETH")]) {
            hop.from = from.into();
            hop.to = to.into();
        }
        let mut portfolio = PortfolioState::default();
        portfolio.adjust(&Asset::new("XBT"), dec!(0.2)); // $10 000
        portfolio.adjust(&Asset::new("ETH"), dec!(1)); // $2 500

        let approval = rc
            .evaluate(&cycle, 0.9, &make_state(), &portfolio, &make_store(100.0))
            .unwrap();
        assert_eq!(approval.start_asset, Asset::new("XBT"));
        assert_eq!(approval.cycle.assets[0], Asset::new("XBT"));
        // $500 cap at $50 000 per XBT
        assert_eq!(approval.start_qty, dec!(0.01));
    }

    #[test]
    fn test_insufficient_balance() {
        let rc = make_controller(RiskConfig::default());
        let mut portfolio = make_portfolio(dec!(100));
        portfolio.adjust(&Asset::new("XBT"), dec!(1)); // value comes from XBT, not USD
        let err = rc
            .evaluate(&make_cycle(0.01), 0.9, &make_state(), &portfolio, &make_store(100.0))
            .unwrap_err();
        assert!(matches!(err, RejectionReason::InsufficientBalance { .. }));
    }

    #[test]
    fn test_roll_day_resets_counters() {
        let rc = make_controller(RiskConfig::default());
        let mut state = make_state();
        state.daily_trades = 100;
        state.daily_pnl = dec!(-500);
        let tomorrow = state.day.succ_opt().unwrap();
        assert!(rc.roll_day(&mut state, tomorrow));
        assert_eq!(state.daily_trades, 0);
        assert!(!rc.roll_day(&mut state, tomorrow));
        assert!(rc
            .evaluate(&make_cycle(0.01), 0.9, &state, &make_portfolio(dec!(10000)), &make_store(100.0))
            .is_ok());
    }

    // ---- limits hold over arbitrary approval sequences ----

    proptest! {
        #[test]
        fn prop_limits_never_exceeded(
            steps in proptest::collection::vec((0.0f64..=1.0, 0.001f64..0.05, any::<bool>()), 1..80)
        ) {
            let config = RiskConfig {
                max_daily_trades: 7,
                max_position_size: dec!(100000),
                min_trade_size: dec!(1),
                ..RiskConfig::default()
            };
            let max_trades = config.max_daily_trades;
            let exposure_fraction = to_decimal(config.max_exposure_fraction);
            let rc = make_controller(config);
            let store = make_store(100.0);
            let portfolio = make_portfolio(dec!(10000));
            let portfolio_value = store.portfolio_value(&portfolio, &Asset::new("USD"));
            let mut state = make_state();

            for (confidence, profit, settles) in steps {
                if let Ok(approval) = rc.evaluate(&make_cycle(profit), confidence, &state, &portfolio, &store) {
                    state.daily_trades += 1;
                    if !settles {
                        state.open_exposure += approval.notional;
                    }
                }
                prop_assert!(state.daily_trades <= max_trades);
                prop_assert!(state.open_exposure <= exposure_fraction * portfolio_value);
            }
        }
    }
}
