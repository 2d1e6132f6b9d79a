//! Shared types for the arbitrage engine.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that market, strategy,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::strategy::kelly::TrackRecord;

// ---------------------------------------------------------------------------
// Numeric helpers
// ---------------------------------------------------------------------------

/// Convert a float rate/price into a `Decimal`. Non-finite values map to zero.
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Convert a `Decimal` amount into a float for scoring maths.
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Assets and pairs
// ---------------------------------------------------------------------------

/// A currency or token code ("USD", "XBT", "ETH"). Normalised to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Asset {
    fn from(code: &str) -> Self {
        Asset::new(code)
    }
}

/// A tradable market on the exchange. `symbol` is the venue's identifier
/// (e.g. Kraken's `XXBTZUSD`); `base`/`quote` are the assets it converts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub symbol: String,
    pub base: Asset,
    pub quote: Asset,
}

impl Pair {
    pub fn new(symbol: impl Into<String>, base: impl AsRef<str>, quote: impl AsRef<str>) -> Self {
        Self {
            symbol: symbol.into(),
            base: Asset::new(base),
            quote: Asset::new(quote),
        }
    }

    /// Whether this pair converts to or from `asset`.
    pub fn involves(&self, asset: &Asset) -> bool {
        &self.base == asset || &self.quote == asset
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Top-of-book quote for one pair as returned by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub bid: f64,
    pub ask: f64,
    /// Recent traded volume in base units.
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    /// Spread relative to the mid price.
    pub fn relative_spread(&self) -> f64 {
        let mid = self.mid();
        if mid > 0.0 {
            (self.ask - self.bid) / mid
        } else {
            0.0
        }
    }

    /// Positive, finite, and not crossed.
    pub fn is_valid(&self) -> bool {
        self.bid.is_finite()
            && self.ask.is_finite()
            && self.volume.is_finite()
            && self.bid > 0.0
            && self.ask > 0.0
            && self.bid <= self.ask
            && self.volume >= 0.0
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Order direction relative to the pair's base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Lifecycle of an exchange order. Anything other than `Pending` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    PartiallyFilled,
    Rejected,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Filled => "FILLED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// An order as submitted to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Idempotency key, unique per request.
    pub client_id: String,
    pub symbol: String,
    pub side: Side,
    /// Quantity in base units.
    pub quantity: Decimal,
    /// Worst acceptable price (max for buys, min for sells). `None` = market.
    pub limit_price: Option<Decimal>,
}

impl OrderRequest {
    pub fn new(symbol: &str, side: Side, quantity: Decimal, limit_price: Option<Decimal>) -> Self {
        Self {
            client_id: uuid::Uuid::new_v4().to_string(),
            symbol: symbol.to_string(),
            side,
            quantity,
            limit_price,
        }
    }
}

/// Exchange view of an order after placement or a status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_price: Decimal,
    /// Fee charged, in quote units.
    pub fee: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for OrderResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} filled={} @ {} fee={} ({})",
            self.order_id, self.side, self.symbol, self.filled_qty, self.avg_price, self.fee, self.status,
        )
    }
}

/// One order within a multi-hop trade. Created by the execution controller,
/// never reused once it reaches a terminal status.
#[derive(Debug, Clone)]
pub struct Leg {
    pub index: usize,
    pub pair: Pair,
    pub from: Asset,
    pub to: Asset,
    pub request: OrderRequest,
    pub order_id: Option<String>,
    pub status: OrderStatus,
    pub filled_qty: Decimal,
    pub avg_price: Decimal,
    pub fee: Decimal,
}

impl Leg {
    pub fn new(index: usize, pair: Pair, from: Asset, to: Asset, request: OrderRequest) -> Self {
        Self {
            index,
            pair,
            from,
            to,
            request,
            order_id: None,
            status: OrderStatus::Pending,
            filled_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee: Decimal::ZERO,
        }
    }

    pub fn side(&self) -> Side {
        self.request.side
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply an exchange observation. Terminal legs ignore later updates.
    pub fn observe(&mut self, result: &OrderResult) {
        if self.is_terminal() {
            return;
        }
        self.order_id = Some(result.order_id.clone());
        self.status = result.status;
        self.filled_qty = result.filled_qty;
        self.avg_price = result.avg_price;
        self.fee = result.fee;
    }

    /// Mark as failed (timeout, transport error). No-op on terminal legs.
    pub fn fail(&mut self) {
        if !self.is_terminal() {
            self.status = OrderStatus::Failed;
        }
    }

    pub fn has_fill(&self) -> bool {
        self.filled_qty > Decimal::ZERO
    }
}

// ---------------------------------------------------------------------------
// Cycles and scores
// ---------------------------------------------------------------------------

/// One conversion step of a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    pub from: Asset,
    pub to: Asset,
    pub pair: Pair,
    /// `Sell` when converting base→quote, `Buy` when converting quote→base.
    pub side: Side,
    /// Quoted price used for this hop (bid for sells, ask for buys).
    pub price: f64,
    /// Units of `to` received per unit of `from`, after fees.
    pub rate: f64,
    /// −ln(rate).
    pub weight: f64,
}

/// A closed walk through the market graph that compounds to a gain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbitrageCycle {
    /// Assets in visit order; the cycle closes back to `assets[0]`.
    pub assets: Vec<Asset>,
    pub hops: Vec<Hop>,
    pub total_weight: f64,
    /// Fractional gain, `exp(-total_weight) - 1`.
    pub profit: f64,
}

impl ArbitrageCycle {
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// "USD → XBT → ETH → USD"
    pub fn path(&self) -> String {
        let mut parts: Vec<&str> = self.assets.iter().map(|a| a.as_str()).collect();
        if let Some(first) = self.assets.first() {
            parts.push(first.as_str());
        }
        parts.join(" → ")
    }

    /// The same cycle re-ordered to start (and end) at `start`.
    pub fn rotated_to(&self, start: &Asset) -> Option<ArbitrageCycle> {
        let pos = self.assets.iter().position(|a| a == start)?;
        let mut rotated = self.clone();
        rotated.assets.rotate_left(pos);
        rotated.hops.rotate_left(pos);
        Some(rotated)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &Pair> {
        self.hops.iter().map(|h| &h.pair)
    }
}

impl fmt::Display for ArbitrageCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:+.3}%)", self.path(), self.profit * 100.0)
    }
}

/// A sub-score in [0, 1] and its weighted contribution to the composite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScore {
    pub raw: f64,
    pub weighted: f64,
}

/// Composite trust metric for one candidate cycle. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    pub composite: f64,
    pub profit: SubScore,
    pub volume: SubScore,
    pub momentum: SubScore,
    /// Subtracted from the composite.
    pub volatility_penalty: SubScore,
    pub spread_consistency: SubScore,
}

impl fmt::Display for ConfidenceScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "conf={:.3} (profit={:.2} vol={:.2} mom={:.2} volat=-{:.2} spread={:.2})",
            self.composite,
            self.profit.raw,
            self.volume.raw,
            self.momentum.raw,
            self.volatility_penalty.raw,
            self.spread_consistency.raw,
        )
    }
}

// ---------------------------------------------------------------------------
// Risk and portfolio state
// ---------------------------------------------------------------------------

/// Daily risk accounting. Counters belong to `day` and reset when the
/// calendar day changes; the track record survives rollovers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub day: NaiveDate,
    pub daily_trades: u32,
    pub daily_pnl: Decimal,
    /// Valuation-currency value committed to open or stranded trades.
    pub open_exposure: Decimal,
    pub last_trade_at: Option<DateTime<Utc>>,
    pub track_record: TrackRecord,
}

impl RiskState {
    pub fn new(day: NaiveDate, track_record: TrackRecord) -> Self {
        Self {
            day,
            daily_trades: 0,
            daily_pnl: Decimal::ZERO,
            open_exposure: Decimal::ZERO,
            last_trade_at: None,
            track_record,
        }
    }

    /// Reset daily counters if `today` is a later day. Returns true on reset.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if today <= self.day {
            return false;
        }
        self.day = today;
        self.daily_trades = 0;
        self.daily_pnl = Decimal::ZERO;
        true
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} trades={} pnl={} exposure={} success_rate={:.1}%",
            self.day,
            self.daily_trades,
            self.daily_pnl.round_dp(2),
            self.open_exposure.round_dp(2),
            self.track_record.success_rate() * 100.0,
        )
    }
}

/// Balances per asset. Owned by the execution controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioState {
    pub balances: BTreeMap<Asset, Decimal>,
}

impl PortfolioState {
    pub fn new(balances: BTreeMap<Asset, Decimal>) -> Self {
        Self { balances }
    }

    pub fn balance(&self, asset: &Asset) -> Decimal {
        self.balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Add (or with a negative amount, remove) units of `asset`.
    pub fn adjust(&mut self, asset: &Asset, delta: Decimal) {
        let entry = self.balances.entry(asset.clone()).or_insert(Decimal::ZERO);
        *entry += delta;
    }

    /// Assets with a non-zero balance.
    pub fn holdings(&self) -> impl Iterator<Item = (&Asset, &Decimal)> {
        self.balances.iter().filter(|(_, v)| !v.is_zero())
    }
}

impl fmt::Display for PortfolioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .holdings()
            .map(|(a, v)| format!("{a}={}", v.round_dp(8).normalize()))
            .collect();
        if parts.is_empty() {
            write!(f, "(empty)")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Exchange error ({venue}): {message}")]
    Exchange { venue: String, message: String },

    /// Rate limiting, 5xx, or a dropped connection. Worth retrying.
    #[error("Transient exchange error ({venue}): {message}")]
    Transient { venue: String, message: String },

    #[error("Advisory error ({model}): {message}")]
    Advisory { model: String, message: String },

    #[error("Unknown pair: {0}")]
    UnknownPair(String),

    #[error("No quote available for {0}")]
    NoQuote(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Unhedged exposure: {0}")]
    Exposure(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
