//! arb-engine — multi-hop crypto arbitrage engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores state from disk (or creates fresh), and runs the decision loop
//! until Ctrl+C, an exposure alert, or the idle watchdog stops it.
//!
//! Exit codes: 0 clean shutdown, 1 startup failure, 2 configuration error,
//! 3 exposure halt, 4 idle-timeout halt.

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::prelude::*;
use secrecy::SecretString;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use arb_engine::config::AppConfig;
use arb_engine::engine::Engine;
use arb_engine::llm::openrouter::OpenRouterAdvisor;
use arb_engine::llm::{Advisor, Council};
use arb_engine::platforms::kraken::KrakenTicker;
use arb_engine::platforms::paper::PaperExchange;
use arb_engine::platforms::{Exchange, QuoteFeed};
use arb_engine::storage;
use arb_engine::strategy::kelly::TrackRecord;
use arb_engine::types::{PortfolioState, RiskState};

const CONFIG_PATH: &str = "config.toml";

const EXIT_STARTUP: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    init_logging();

    let cfg = match AppConfig::load(CONFIG_PATH) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!(error = %e, path = CONFIG_PATH, "Configuration error");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    if !cfg.engine.dry_run {
        error!("Configuration error: dry_run = false but no live execution venue is available");
        return ExitCode::from(EXIT_CONFIG);
    }

    match run(cfg).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "Fatal startup failure");
            ExitCode::from(EXIT_STARTUP)
        }
    }
}

async fn run(cfg: AppConfig) -> Result<u8> {
    info!(
        name = %cfg.engine.name,
        exchange = %cfg.exchange.name,
        pairs = cfg.pairs.len(),
        scan_interval_ms = cfg.engine.scan_interval_ms,
        min_profit = cfg.strategy.min_profit_threshold,
        confidence_threshold = cfg.strategy.confidence_threshold,
        dry_run = cfg.engine.dry_run,
        "arb-engine starting up"
    );

    // -- Restore or create state -----------------------------------------

    let state_file = cfg.engine.state_file.clone();
    let (risk, portfolio, cycle_count) = match storage::load_state(Some(&state_file))? {
        Some(s) => {
            info!(cycles = s.cycle_count, risk = %s.risk, "Resumed from saved state");
            (s.risk, s.portfolio, s.cycle_count)
        }
        None => {
            let portfolio = PortfolioState::new(cfg.portfolio.balances());
            info!(portfolio = %portfolio, "Fresh start");
            (
                RiskState::new(Utc::now().date_naive(), TrackRecord::from_config(&cfg.risk)),
                portfolio,
                0,
            )
        }
    };

    // -- Initialise components -------------------------------------------

    let feed: Arc<dyn QuoteFeed> = Arc::new(KrakenTicker::new(
        &cfg.exchange.base_url,
        Duration::from_millis(cfg.engine.quote_timeout_ms),
    )?);
    let fee_rate = Decimal::from_f64(cfg.strategy.fee_estimate).context("fee_estimate is not representable")?;
    let exchange: Arc<dyn Exchange> = Arc::new(PaperExchange::new(feed, fee_rate));
    info!(venue = exchange.name(), "Execution venue ready");

    let mut engine = Engine::new(&cfg, exchange, risk, portfolio)
        .with_state_file(state_file)
        .with_cycle_count(cycle_count);

    if let Some(council) = build_council(&cfg)? {
        info!(members = council.len(), "Advisory council enabled");
        engine = engine.with_council(council);
    }

    // -- Shutdown wiring -------------------------------------------------

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping after the current cycle");
            let _ = shutdown_tx.send(true);
        }
        // hold the sender; dropping it closes the channel
        std::future::pending::<()>().await;
    });

    // -- Main loop -------------------------------------------------------

    let exit = engine.run(shutdown_rx).await;

    let risk = engine.risk_state();
    info!(
        exit = ?exit,
        cycles = engine.cycle_count(),
        trades_today = risk.daily_trades,
        daily_pnl = format!("${:.2}", risk.daily_pnl),
        portfolio = %engine.portfolio(),
        "arb-engine shut down"
    );

    u8::try_from(exit.code()).context("exit code out of range")
}

/// One OpenRouter advisor per configured model, or `None` when the council
/// is disabled or has no API key.
fn build_council(cfg: &AppConfig) -> Result<Option<Council>> {
    let advisory = &cfg.advisory;
    if !advisory.enabled {
        return Ok(None);
    }
    let api_key = match AppConfig::resolve_env(&advisory.api_key_env) {
        Ok(key) if !key.is_empty() => key,
        _ => {
            warn!(env = %advisory.api_key_env, "Advisory council enabled but no API key set, running without it");
            return Ok(None);
        }
    };

    let timeout = Duration::from_secs(advisory.timeout_secs);
    let mut advisors: Vec<Arc<dyn Advisor>> = Vec::new();
    for model in &advisory.models {
        let advisor = OpenRouterAdvisor::new(SecretString::new(api_key.clone()), model, advisory.max_tokens, timeout)?;
        advisors.push(Arc::new(advisor));
    }
    Ok(Some(Council::new(advisors, advisory)))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("arb_engine=info"));

    let json_logging = std::env::var("ARB_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
