//! End-to-end decision cycles against the mock exchange.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use arb_engine::config::AppConfig;
use arb_engine::engine::executor::ExecutionOutcome;
use arb_engine::engine::{CyclePhase, Engine, EngineExit};
use arb_engine::llm::{Advisor, Council, CycleSummary, Decision, Recommendation};
use arb_engine::storage;
use arb_engine::strategy::kelly::TrackRecord;
use arb_engine::types::*;

use crate::mock_exchange::MockExchange;

// ---- helpers ----

const CONFIG: &str = r#"
[engine]
scan_interval_ms = 10
max_idle_minutes = 60
quote_timeout_ms = 500
max_provider_failures = 2
provider_pause_secs = 60

[strategy]
fee_estimate = 0.0
min_profit_threshold = 0.003
confidence_threshold = 0.7

[execution]
poll_interval_ms = 5
execution_timeout_ms = 200

[portfolio.initial_balances]
USD = 10000

[[pairs]]
symbol = "XBTUSD"
base = "XBT"
quote = "USD"

[[pairs]]
symbol = "ETHXBT"
base = "ETH"
quote = "XBT"

[[pairs]]
symbol = "ETHUSD"
base = "ETH"
quote = "USD"
"#;

fn make_config() -> AppConfig {
    AppConfig::from_toml(CONFIG).unwrap()
}

fn make_engine(config: &AppConfig, exchange: Arc<MockExchange>) -> Engine {
    let risk = RiskState::new(Utc::now().date_naive(), TrackRecord::from_config(&config.risk));
    let portfolio = PortfolioState::new(config.portfolio.balances());
    Engine::new(config, exchange, risk, portfolio)
}

fn no_cancel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    std::mem::forget(tx);
    rx
}

fn usd(engine: &Engine) -> Decimal {
    engine.portfolio().balance(&Asset::new("USD"))
}

fn temp_path() -> String {
    std::env::temp_dir()
        .join(format!("arb_pipeline_{}.json", uuid::Uuid::new_v4()))
        .to_string_lossy()
        .into_owned()
}

/// Advisor that always gives the same answer.
struct FixedAdvisor {
    name: String,
    decision: Decision,
    confidence: f64,
}

#[async_trait]
impl Advisor for FixedAdvisor {
    async fn review(&self, _summary: &CycleSummary) -> Result<Recommendation> {
        Ok(Recommendation {
            decision: self.decision,
            confidence: self.confidence,
            rationale: "fixed".into(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn make_council(config: &AppConfig, decisions: &[Decision]) -> Council {
    let advisors: Vec<Arc<dyn Advisor>> = decisions
        .iter()
        .enumerate()
        .map(|(i, d)| {
            Arc::new(FixedAdvisor {
                name: format!("advisor-{i}"),
                decision: *d,
                confidence: 0.9,
            }) as Arc<dyn Advisor>
        })
        .collect();
    Council::new(advisors, &config.advisory)
}

// ---- execution outcomes ----

#[tokio::test]
async fn test_profitable_triangle_settles() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.03));
    let mut engine = make_engine(&config, exchange.clone());

    let report = engine.run_cycle(&no_cancel()).await;

    assert_eq!(report.phase, CyclePhase::Settled);
    assert_eq!(report.outcome, Some(ExecutionOutcome::Settled));
    assert_eq!(report.quotes_applied, 3);
    assert!(report.candidates >= 1);
    assert!(report.trade_pnl > Decimal::ZERO, "pnl {}", report.trade_pnl);
    assert!(usd(&engine) > dec!(10000));
    assert_eq!(exchange.requests().len(), 3);

    let risk = engine.risk_state();
    assert_eq!(risk.daily_trades, 1);
    assert_eq!(risk.open_exposure, Decimal::ZERO);
    assert!(risk.last_trade_at.is_some());
}

#[tokio::test]
async fn test_flat_market_is_idle() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.0));
    let mut engine = make_engine(&config, exchange.clone());

    let report = engine.run_cycle(&no_cancel()).await;

    assert_eq!(report.phase, CyclePhase::Idle);
    assert!(report.outcome.is_none());
    assert!(exchange.requests().is_empty());
    assert_eq!(usd(&engine), dec!(10000));
}

#[tokio::test]
async fn test_small_mispricing_fails_profit_gate() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.002));
    let mut engine = make_engine(&config, exchange.clone());

    let report = engine.run_cycle(&no_cancel()).await;

    assert_eq!(report.phase, CyclePhase::Idle);
    assert!(report.below_profit_gate >= 1);
    assert!(exchange.requests().is_empty());
}

#[tokio::test]
async fn test_failed_leg_rolls_back() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.03));
    exchange.reject("ETHUSD", Side::Sell);
    let mut engine = make_engine(&config, exchange.clone());

    let report = engine.run_cycle(&no_cancel()).await;

    assert_eq!(report.phase, CyclePhase::RolledBack);
    // zero fees and unchanged prices: the round trip is exact
    assert_eq!(usd(&engine), dec!(10000));
    assert_eq!(engine.risk_state().open_exposure, Decimal::ZERO);
    assert_eq!(engine.risk_state().daily_trades, 1);

    // three legs plus two reversals
    let requests = exchange.requests();
    assert_eq!(requests.len(), 5);
    assert!(requests[3..].iter().all(|r| r.side == Side::Sell));
}

#[tokio::test]
async fn test_failed_rollback_halts_on_exposure() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.03));
    exchange.reject("ETHUSD", Side::Sell);
    exchange.reject("XBTUSD", Side::Sell);
    let mut engine = make_engine(&config, exchange);

    let (_tx, rx) = watch::channel(false);
    let exit = tokio::time::timeout(Duration::from_secs(5), engine.run(rx))
        .await
        .expect("engine should halt on its own");

    assert_eq!(exit, EngineExit::ExposureHalt);
    assert_eq!(exit.code(), 3);
    assert!(engine.risk_state().open_exposure > Decimal::ZERO);
    assert!(engine.portfolio().balance(&Asset::new("XBT")) > Decimal::ZERO);
}

// ---- risk and advisory gates ----

#[tokio::test]
async fn test_daily_trade_limit_rejects_second_cycle() {
    let mut config = make_config();
    config.risk.max_daily_trades = 1;
    let exchange = Arc::new(MockExchange::triangle(0.03));
    let mut engine = make_engine(&config, exchange.clone());
    let cancel = no_cancel();

    assert_eq!(engine.run_cycle(&cancel).await.phase, CyclePhase::Settled);

    let second = engine.run_cycle(&cancel).await;
    assert_eq!(second.phase, CyclePhase::Rejected);
    assert!(second.risk_rejected >= 1);
    assert_eq!(exchange.requests().len(), 3);
}

#[tokio::test]
async fn test_council_veto_blocks_execution() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.03));
    let council = make_council(&config, &[Decision::Hold, Decision::Hold, Decision::Execute]);
    let mut engine = make_engine(&config, exchange.clone()).with_council(council);

    let report = engine.run_cycle(&no_cancel()).await;

    assert_eq!(report.phase, CyclePhase::Vetoed);
    assert!(exchange.requests().is_empty());
    assert_eq!(engine.risk_state().daily_trades, 0);
}

#[tokio::test]
async fn test_council_approval_allows_execution() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.03));
    let council = make_council(&config, &[Decision::Execute, Decision::Execute]);
    let mut engine = make_engine(&config, exchange).with_council(council);

    let report = engine.run_cycle(&no_cancel()).await;

    assert_eq!(report.phase, CyclePhase::Settled);
}

// ---- provider failures ----

#[tokio::test]
async fn test_provider_failures_pause_scanning() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.03));
    exchange.fail_quotes("ticker unavailable");
    let mut engine = make_engine(&config, exchange.clone());
    let cancel = no_cancel();

    assert_eq!(engine.run_cycle(&cancel).await.phase, CyclePhase::ScanFailed);
    assert_eq!(engine.run_cycle(&cancel).await.phase, CyclePhase::ScanFailed);

    // paused even after the provider recovers
    exchange.clear_quote_error();
    let paused = engine.run_cycle(&cancel).await;
    assert_eq!(paused.phase, CyclePhase::Paused);
    assert_eq!(paused.quotes_applied, 0);
    assert!(exchange.requests().is_empty());
}

// ---- loop exits ----

#[tokio::test]
async fn test_idle_watchdog_halts() {
    let mut config = make_config();
    config.engine.max_idle_minutes = 0;
    config.engine.idle_counts_as_justified = false;
    let exchange = Arc::new(MockExchange::triangle(0.0));
    let mut engine = make_engine(&config, exchange);

    let (_tx, rx) = watch::channel(false);
    let exit = tokio::time::timeout(Duration::from_secs(5), engine.run(rx))
        .await
        .expect("engine should halt on its own");

    assert_eq!(exit, EngineExit::IdleHalt);
    assert_eq!(exit.code(), 4);
    assert!(engine.cycle_count() >= 1);
}

#[tokio::test]
async fn test_shutdown_signal_stops_loop() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.0));
    let mut engine = make_engine(&config, exchange);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(true);
        // keep the channel open so the loop sees the value, not a close
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let exit = tokio::time::timeout(Duration::from_secs(5), engine.run(rx))
        .await
        .expect("engine should stop after shutdown");

    assert_eq!(exit, EngineExit::Clean);
    assert_eq!(exit.code(), 0);
}

#[tokio::test]
async fn test_shutdown_before_first_cycle() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.03));
    let mut engine = make_engine(&config, exchange.clone());

    let (tx, rx) = watch::channel(true);
    let exit = engine.run(rx).await;
    drop(tx);

    assert_eq!(exit, EngineExit::Clean);
    assert_eq!(engine.cycle_count(), 0);
    assert!(exchange.requests().is_empty());
}

// ---- persistence ----

#[tokio::test]
async fn test_state_persisted_and_restored() {
    let config = make_config();
    let path = temp_path();
    let exchange = Arc::new(MockExchange::triangle(0.03));
    let mut engine = make_engine(&config, exchange.clone()).with_state_file(path.clone());

    engine.run_cycle(&no_cancel()).await;
    let balance_after = usd(&engine);

    let saved = storage::load_state(Some(&path)).unwrap().expect("state file written");
    assert_eq!(saved.cycle_count, 1);
    assert_eq!(saved.risk.daily_trades, 1);
    assert_eq!(saved.portfolio.balance(&Asset::new("USD")), balance_after);

    // a restarted engine continues from the saved state
    let mut restored = Engine::new(&config, exchange, saved.risk, saved.portfolio)
        .with_state_file(path.clone())
        .with_cycle_count(saved.cycle_count);
    let report = restored.run_cycle(&no_cancel()).await;
    assert_eq!(report.cycle_number, 2);
    assert_eq!(report.daily_trades, 2);

    storage::delete_state(Some(&path)).unwrap();
}

#[tokio::test]
async fn test_portfolio_without_start_asset_is_rejected() {
    let config = make_config();
    let exchange = Arc::new(MockExchange::triangle(0.03));
    let risk = RiskState::new(Utc::now().date_naive(), TrackRecord::from_config(&config.risk));
    let mut balances = BTreeMap::new();
    balances.insert(Asset::new("USD"), dec!(1));
    let mut engine = Engine::new(&config, exchange.clone(), risk, PortfolioState::new(balances));

    let report = engine.run_cycle(&no_cancel()).await;

    assert_eq!(report.phase, CyclePhase::Rejected);
    assert!(exchange.requests().is_empty());
}
