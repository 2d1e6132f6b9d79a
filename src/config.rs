//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field has a documented default so a partial file is valid. The named
//! trading options can be overridden with `ARB_`-prefixed environment
//! variables (e.g. `ARB_MIN_PROFIT_THRESHOLD=0.004`). Secrets (API keys) are
//! referenced by env-var name and resolved at runtime.
//!
//! Configuration is loaded once at startup and is immutable for the run.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::types::{Asset, Pair};

/// Prefix for environment overrides of the named options.
pub const ENV_PREFIX: &str = "ARB_";

/// Configuration errors are fatal: the engine refuses to start.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {name}: {value:?}")]
    Env { name: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub strategy: StrategyConfig,
    pub scoring: ScoringConfig,
    pub risk: RiskConfig,
    pub execution: ExecutionConfig,
    pub advisory: AdvisoryConfig,
    pub exchange: ExchangeConfig,
    pub portfolio: PortfolioConfig,
    pub pairs: Vec<PairConfig>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub name: String,
    /// `SCAN_INTERVAL`: pause between decision cycles.
    pub scan_interval_ms: u64,
    /// `MAX_IDLE_MINUTES`: watchdog halts the engine after this long without
    /// a justified scan outcome.
    pub max_idle_minutes: u64,
    /// When true an IDLE scan ("no qualifying opportunity") resets the idle
    /// watchdog. When false only SETTLED / ROLLED_BACK do.
    pub idle_counts_as_justified: bool,
    /// Currency portfolio value, exposure and P&L are measured in.
    pub valuation_currency: String,
    /// Route orders to the paper exchange instead of a live venue.
    pub dry_run: bool,
    /// JSON file holding risk + portfolio state across restarts.
    pub state_file: String,
    /// Quotes older than this are excluded from the graph.
    pub max_quote_age_secs: u64,
    /// Per-batch timeout for quote fetches. Late batches are discarded.
    pub quote_timeout_ms: u64,
    /// Pairs per concurrent quote request.
    pub quote_batch_size: usize,
    /// Consecutive failed scans before the engine pauses.
    pub max_provider_failures: u32,
    pub provider_pause_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "arb-engine".to_string(),
            scan_interval_ms: 1_000,
            max_idle_minutes: 10,
            idle_counts_as_justified: true,
            valuation_currency: "USD".to_string(),
            dry_run: true,
            state_file: "arb_state.json".to_string(),
            max_quote_age_secs: 30,
            quote_timeout_ms: 2_000,
            quote_batch_size: 10,
            max_provider_failures: 5,
            provider_pause_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StrategyConfig {
    /// `MIN_PROFIT_THRESHOLD` as a fraction (0.003 = 0.3%). A cycle survives
    /// when `profit - 2 * fee_estimate` exceeds it.
    pub min_profit_threshold: f64,
    /// Per-hop taker fee as a fraction. Applied to every graph edge.
    pub fee_estimate: f64,
    /// Longest cycle considered (hops).
    pub max_cycle_hops: usize,
    /// `CONFIDENCE_THRESHOLD`: composite score below this is dropped.
    pub confidence_threshold: f64,
    /// `WAVELET_WINDOW`: price-history samples kept per pair.
    pub wavelet_window: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_profit_threshold: 0.003,
            fee_estimate: 0.0026,
            max_cycle_hops: 4,
            confidence_threshold: 0.7,
            wavelet_window: 50,
        }
    }
}

/// Confidence factor weights. Must sum to 1.0.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct ScoreWeights {
    pub profit: f64,
    pub volume: f64,
    pub momentum: f64,
    pub volatility: f64,
    pub spread: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            profit: 0.40,
            volume: 0.20,
            momentum: 0.20,
            volatility: 0.10,
            spread: 0.10,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.profit + self.volume + self.momentum + self.volatility + self.spread
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: ScoreWeights,
    /// Profit at which the profit sub-score saturates.
    pub profit_ceiling: f64,
    /// Weakest-leg volume, in the valuation currency, at which the volume
    /// sub-score saturates.
    pub volume_reference: f64,
    /// Coefficient of variation at which the volatility penalty saturates.
    pub volatility_ceiling: f64,
    /// Samples used for the short-window momentum trend.
    pub momentum_window: usize,
    /// Multiplier applied to the fractional trend before `tanh`.
    pub momentum_scale: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoreWeights::default(),
            profit_ceiling: 0.02,
            volume_reference: 1_000_000.0,
            volatility_ceiling: 0.02,
            momentum_window: 10,
            momentum_scale: 100.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    /// `MAX_POSITION_SIZE`: absolute notional cap per trade (valuation currency).
    pub max_position_size: Decimal,
    /// Max fraction of portfolio value in a single trade.
    pub max_position_fraction: f64,
    /// Max fraction of portfolio value across all open trades.
    pub max_exposure_fraction: f64,
    /// `MAX_DAILY_TRADES`
    pub max_daily_trades: u32,
    /// `MAX_DAILY_LOSS` (valuation currency).
    pub max_daily_loss: Decimal,
    /// `STOP_LOSS_PCT` as a fraction: worst-case loss assumed per trade.
    pub stop_loss_pct: f64,
    /// Minimum liquidity (recent volume × value) on every leg.
    pub min_liquidity: Decimal,
    /// Trades smaller than this are not worth the fees.
    pub min_trade_size: Decimal,
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    pub kelly_multiplier: f64,
    /// Upper clamp on the raw Kelly fraction.
    pub kelly_cap: f64,
    /// Beta prior for the execution track record.
    pub prior_successes: f64,
    pub prior_failures: f64,
    /// Per-observation decay applied to older outcomes.
    pub track_record_decay: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: dec!(500),
            max_position_fraction: 0.10,
            max_exposure_fraction: 0.20,
            max_daily_trades: 100,
            max_daily_loss: dec!(500),
            stop_loss_pct: 0.02,
            min_liquidity: dec!(500),
            min_trade_size: dec!(10),
            kelly_multiplier: 0.25,
            kelly_cap: 0.25,
            prior_successes: 19.0,
            prior_failures: 1.0,
            track_record_decay: 0.95,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Price constraint slack relative to the quoted price.
    pub slippage_tolerance: f64,
    pub poll_interval_ms: u64,
    /// Legs unresolved after this are cancelled and treated as failed.
    pub execution_timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            slippage_tolerance: 0.001,
            poll_interval_ms: 250,
            execution_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdvisoryConfig {
    pub enabled: bool,
    /// OpenRouter model ids, one council member each.
    pub models: Vec<String>,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Fraction of responding members that must vote EXECUTE.
    pub min_vote_ratio: f64,
    /// Mean member confidence required.
    pub min_confidence: f64,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            models: vec![
                "anthropic/claude-sonnet-4".to_string(),
                "x-ai/grok-4.1-fast".to_string(),
            ],
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            max_tokens: 512,
            timeout_secs: 20,
            min_vote_ratio: 0.6,
            min_confidence: 0.6,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExchangeConfig {
    pub name: String,
    pub base_url: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            name: "kraken".to_string(),
            base_url: "https://api.kraken.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PortfolioConfig {
    /// Starting balances for a fresh (paper) run.
    pub initial_balances: BTreeMap<String, Decimal>,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        let mut initial_balances = BTreeMap::new();
        initial_balances.insert("USD".to_string(), dec!(10000));
        Self { initial_balances }
    }
}

impl PortfolioConfig {
    pub fn balances(&self) -> BTreeMap<Asset, Decimal> {
        self.initial_balances
            .iter()
            .map(|(k, v)| (Asset::new(k), *v))
            .collect()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PairConfig {
    pub symbol: String,
    pub base: String,
    pub quote: String,
}

impl PairConfig {
    pub fn to_pair(&self) -> Pair {
        Pair::new(&self.symbol, &self.base, &self.quote)
    }
}

/// Liquid Kraken spot pairs forming several USD/XBT/ETH triangles.
fn default_pairs() -> Vec<PairConfig> {
    [
        ("XXBTZUSD", "XBT", "USD"),
        ("XETHZUSD", "ETH", "USD"),
        ("XETHXXBT", "ETH", "XBT"),
        ("SOLUSD", "SOL", "USD"),
        ("SOLXBT", "SOL", "XBT"),
        ("SOLETH", "SOL", "ETH"),
        ("ADAUSD", "ADA", "USD"),
        ("ADAETH", "ADA", "ETH"),
        ("LINKUSD", "LINK", "USD"),
        ("LINKXBT", "LINK", "XBT"),
        ("DOTUSD", "DOT", "USD"),
        ("DOTETH", "DOT", "ETH"),
        ("XLTCZUSD", "LTC", "USD"),
        ("XLTCXXBT", "LTC", "XBT"),
        ("XXRPZUSD", "XRP", "USD"),
        ("XXRPXXBT", "XRP", "XBT"),
    ]
    .into_iter()
    .map(|(symbol, base, quote)| PairConfig {
        symbol: symbol.to_string(),
        base: base.to_string(),
        quote: quote.to_string(),
    })
    .collect()
}

impl AppConfig {
    /// Load, apply `ARB_*` environment overrides, and validate.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        info!(
            path,
            pairs = config.pairs.len(),
            dry_run = config.engine.dry_run,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Parse a TOML file without overrides or validation.
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(Path::new(path)).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config: AppConfig = toml::from_str(contents)?;
        if config.pairs.is_empty() {
            config.pairs = default_pairs();
        }
        Ok(config)
    }

    /// Override the named options from a key lookup (the process
    /// environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        override_value(&get, "MIN_PROFIT_THRESHOLD", &mut self.strategy.min_profit_threshold)?;
        override_value(&get, "CONFIDENCE_THRESHOLD", &mut self.strategy.confidence_threshold)?;
        override_value(&get, "FEE_ESTIMATE", &mut self.strategy.fee_estimate)?;
        override_value(&get, "MAX_POSITION_SIZE", &mut self.risk.max_position_size)?;
        override_value(&get, "MAX_DAILY_TRADES", &mut self.risk.max_daily_trades)?;
        override_value(&get, "MAX_DAILY_LOSS", &mut self.risk.max_daily_loss)?;
        override_value(&get, "STOP_LOSS_PCT", &mut self.risk.stop_loss_pct)?;
        override_value(&get, "SCAN_INTERVAL", &mut self.engine.scan_interval_ms)?;
        override_value(&get, "MAX_IDLE_MINUTES", &mut self.engine.max_idle_minutes)?;
        override_value(&get, "WEIGHT_PROFIT", &mut self.scoring.weights.profit)?;
        override_value(&get, "WEIGHT_VOLUME", &mut self.scoring.weights.volume)?;
        override_value(&get, "WEIGHT_MOMENTUM", &mut self.scoring.weights.momentum)?;
        override_value(&get, "WEIGHT_VOLATILITY", &mut self.scoring.weights.volatility)?;
        override_value(&get, "WEIGHT_SPREAD", &mut self.scoring.weights.spread)?;
        override_value(&get, "DRY_RUN", &mut self.engine.dry_run)?;
        Ok(())
    }

    /// Reject configurations that would make the engine unsafe or meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let w = &self.scoring.weights;
        if [w.profit, w.volume, w.momentum, w.volatility, w.spread]
            .iter()
            .any(|v| !v.is_finite() || *v < 0.0)
        {
            return invalid("scorer weights must be non-negative".into());
        }
        if (w.sum() - 1.0).abs() > 1e-6 {
            return invalid(format!("scorer weights must sum to 1.0 (got {:.4})", w.sum()));
        }

        let s = &self.strategy;
        if !(s.min_profit_threshold > 0.0 && s.min_profit_threshold < 1.0) {
            return invalid("min_profit_threshold must be in (0, 1)".into());
        }
        if !(0.0..=1.0).contains(&s.confidence_threshold) {
            return invalid("confidence_threshold must be in [0, 1]".into());
        }
        if !(0.0..0.1).contains(&s.fee_estimate) {
            return invalid("fee_estimate must be in [0, 0.1)".into());
        }
        if !(2..=8).contains(&s.max_cycle_hops) {
            return invalid("max_cycle_hops must be between 2 and 8".into());
        }
        if s.wavelet_window < 2 || self.scoring.momentum_window < 2 {
            return invalid("wavelet_window and momentum_window must be at least 2".into());
        }
        if self.scoring.momentum_window > s.wavelet_window {
            return invalid("momentum_window cannot exceed wavelet_window".into());
        }
        if self.scoring.profit_ceiling <= 0.0
            || self.scoring.volume_reference <= 0.0
            || self.scoring.volatility_ceiling <= 0.0
        {
            return invalid("scoring ceilings must be positive".into());
        }

        let r = &self.risk;
        for (name, v) in [
            ("max_position_fraction", r.max_position_fraction),
            ("max_exposure_fraction", r.max_exposure_fraction),
            ("stop_loss_pct", r.stop_loss_pct),
            ("kelly_multiplier", r.kelly_multiplier),
            ("kelly_cap", r.kelly_cap),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return invalid(format!("{name} must be in (0, 1]"));
            }
        }
        if r.max_daily_trades == 0 {
            return invalid("max_daily_trades must be positive".into());
        }
        if r.max_position_size <= Decimal::ZERO || r.max_daily_loss <= Decimal::ZERO {
            return invalid("max_position_size and max_daily_loss must be positive".into());
        }
        if r.min_liquidity < Decimal::ZERO || r.min_trade_size < Decimal::ZERO {
            return invalid("min_liquidity and min_trade_size cannot be negative".into());
        }
        if r.prior_successes <= 0.0 || r.prior_failures <= 0.0 {
            return invalid("track record priors must be positive".into());
        }
        if !(r.track_record_decay > 0.0 && r.track_record_decay <= 1.0) {
            return invalid("track_record_decay must be in (0, 1]".into());
        }

        let e = &self.engine;
        if e.scan_interval_ms == 0 || e.max_idle_minutes == 0 {
            return invalid("scan_interval_ms and max_idle_minutes must be positive".into());
        }
        if e.quote_batch_size == 0 || e.quote_timeout_ms == 0 {
            return invalid("quote_batch_size and quote_timeout_ms must be positive".into());
        }
        if e.valuation_currency.trim().is_empty() {
            return invalid("valuation_currency is required".into());
        }

        let x = &self.execution;
        if !(0.0..0.1).contains(&x.slippage_tolerance) {
            return invalid("slippage_tolerance must be in [0, 0.1)".into());
        }
        if x.execution_timeout_ms == 0 || x.poll_interval_ms == 0 {
            return invalid("execution timings must be positive".into());
        }

        let a = &self.advisory;
        if a.enabled {
            if a.models.is_empty() {
                return invalid("advisory council enabled with no models".into());
            }
            if !(a.min_vote_ratio > 0.0 && a.min_vote_ratio <= 1.0) {
                return invalid("advisory.min_vote_ratio must be in (0, 1]".into());
            }
        }

        if self.pairs.is_empty() {
            return invalid("at least one trading pair is required".into());
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.pairs {
            if Asset::new(&p.base) == Asset::new(&p.quote) {
                return invalid(format!("pair {} has identical base and quote", p.symbol));
            }
            if !seen.insert(p.symbol.as_str()) {
                return invalid(format!("duplicate pair symbol {}", p.symbol));
            }
        }

        if self.portfolio.initial_balances.values().any(|v| *v < Decimal::ZERO) {
            return invalid("initial balances cannot be negative".into());
        }

        Ok(())
    }

    pub fn trading_pairs(&self) -> Vec<Pair> {
        self.pairs.iter().map(PairConfig::to_pair).collect()
    }

    pub fn valuation_asset(&self) -> Asset {
        Asset::new(&self.engine.valuation_currency)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> anyhow::Result<String> {
        use anyhow::Context;
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

fn override_value<T, G>(get: &G, name: &str, target: &mut T) -> Result<(), ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(name) {
        *target = raw.trim().parse().map_err(|_| ConfigError::Env {
            name: format!("{ENV_PREFIX}{name}"),
            value: raw.clone(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::from_toml("").unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.strategy.min_profit_threshold, 0.003);
        assert_eq!(cfg.strategy.confidence_threshold, 0.7);
        assert_eq!(cfg.strategy.wavelet_window, 50);
        assert_eq!(cfg.risk.max_daily_trades, 100);
        assert_eq!(cfg.risk.max_position_size, dec!(500));
        assert_eq!(cfg.engine.max_idle_minutes, 10);
        assert!((cfg.scoring.weights.sum() - 1.0).abs() < 1e-12);
        assert!(!cfg.pairs.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg = AppConfig::from_toml(
            r#"
            [strategy]
            min_profit_threshold = 0.004

            [[pairs]]
            symbol = "AB"
            base = "A"
            quote = "B"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.strategy.min_profit_threshold, 0.004);
        assert_eq!(cfg.strategy.fee_estimate, 0.0026);
        assert_eq!(cfg.pairs.len(), 1);
        assert_eq!(cfg.trading_pairs()[0].base, Asset::new("A"));
    }

    #[test]
    fn test_weights_overridable() {
        let cfg = AppConfig::from_toml(
            r#"
            [scoring.weights]
            profit = 0.5
            volume = 0.1
            "#,
        )
        .unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.scoring.weights.profit, 0.5);
        assert_eq!(cfg.scoring.weights.momentum, 0.2);
    }

    #[test]
    fn test_bad_weight_sum_rejected() {
        let cfg = AppConfig::from_toml("[scoring.weights]\nprofit = 0.9\n").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = AppConfig::default();
        cfg.pairs = default_pairs();
        let env: HashMap<String, String> = [
            ("ARB_MIN_PROFIT_THRESHOLD", "0.004"),
            ("ARB_MAX_DAILY_TRADES", "7"),
            ("ARB_MAX_DAILY_LOSS", "125.50"),
            ("ARB_SCAN_INTERVAL", "250"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        cfg.apply_overrides(|k| env.get(k).cloned()).unwrap();
        assert_eq!(cfg.strategy.min_profit_threshold, 0.004);
        assert_eq!(cfg.risk.max_daily_trades, 7);
        assert_eq!(cfg.risk.max_daily_loss, dec!(125.50));
        assert_eq!(cfg.engine.scan_interval_ms, 250);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_unparseable_override_is_config_error() {
        let mut cfg = AppConfig::default();
        let err = cfg
            .apply_overrides(|k| (k == "ARB_MAX_DAILY_TRADES").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { .. }));
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let cfg = AppConfig::from_toml(
            r#"
            [[pairs]]
            symbol = "AB"
            base = "A"
            quote = "B"

            [[pairs]]
            symbol = "AB"
            base = "A"
            quote = "C"
            "#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = AppConfig::from_file("/nonexistent/arb-config.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_shipped_config() {
        // cargo test runs from the crate root, where config.toml lives.
        let cfg = AppConfig::from_file("config.toml").expect("shipped config parses");
        cfg.validate().expect("shipped config validates");
        assert!(cfg.engine.dry_run);
        assert_eq!(cfg.pairs.len(), 8);
        assert_eq!(cfg.valuation_asset(), Asset::new("USD"));
        assert_eq!(cfg.scoring.volume_reference, ScoringConfig::default().volume_reference);
    }
}
