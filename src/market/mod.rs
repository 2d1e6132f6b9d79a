//! Market snapshot store.
//!
//! Holds the latest top-of-book quote and a bounded price history for every
//! configured pair. The history is a ring buffer capped at the wavelet window;
//! the oldest sample is evicted first. Each sample records the mid price and
//! the relative spread observed at that time.
//!
//! The store also answers the statistical questions the confidence scorer
//! asks (momentum, volatility, spread stability) and values balances in the
//! valuation currency.

pub mod graph;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, warn};

use crate::types::{to_decimal, Asset, Pair, PortfolioState, Quote};

// ---------------------------------------------------------------------------
// Per-pair state
// ---------------------------------------------------------------------------

/// One history sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceSample {
    pub at: DateTime<Utc>,
    pub mid: f64,
    pub spread: f64,
}

#[derive(Debug, Clone)]
pub struct PairState {
    pub pair: Pair,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    /// Recent traded volume in base units.
    pub volume: f64,
    pub updated_at: Option<DateTime<Utc>>,
    history: VecDeque<PriceSample>,
    capacity: usize,
}

impl PairState {
    fn new(pair: Pair, capacity: usize) -> Self {
        Self {
            pair,
            bid: None,
            ask: None,
            volume: 0.0,
            updated_at: None,
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Both sides present and updated within `max_age` of `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match (self.bid, self.ask, self.updated_at) {
            (Some(_), Some(_), Some(at)) => now - at <= max_age,
            _ => false,
        }
    }

    pub fn mid(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        }
    }

    pub fn history(&self) -> &VecDeque<PriceSample> {
        &self.history
    }

    /// Up to `n` most recent samples, oldest first.
    fn recent(&self, n: usize) -> impl Iterator<Item = &PriceSample> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip)
    }

    /// Short-window trend: mean of the last half of the most recent `window`
    /// mids relative to the mean of the half before it. `None` with fewer
    /// than two samples per half.
    pub fn momentum(&self, window: usize) -> Option<f64> {
        let mids: Vec<f64> = self.recent(window).map(|s| s.mid).collect();
        let half = mids.len() / 2;
        if half < 2 {
            return None;
        }
        let split = mids.len() - half;
        let previous = mean(&mids[split - half..split])?;
        let recent = mean(&mids[split..])?;
        if previous <= 0.0 {
            return None;
        }
        Some((recent - previous) / previous)
    }

    /// Coefficient of variation of the most recent `window` mids.
    pub fn volatility(&self, window: usize) -> Option<f64> {
        let mids: Vec<f64> = self.recent(window).map(|s| s.mid).collect();
        coefficient_of_variation(&mids)
    }

    /// Coefficient of variation of the most recent `window` relative spreads.
    pub fn spread_variation(&self, window: usize) -> Option<f64> {
        let spreads: Vec<f64> = self.recent(window).map(|s| s.spread).collect();
        coefficient_of_variation(&spreads)
    }

    fn apply(&mut self, quote: &Quote) {
        if !quote.is_valid() {
            warn!(
                symbol = %quote.symbol,
                bid = quote.bid,
                ask = quote.ask,
                "Invalid quote — pair excluded until next valid update"
            );
            self.bid = None;
            self.ask = None;
            return;
        }

        self.bid = Some(quote.bid);
        self.ask = Some(quote.ask);
        self.volume = quote.volume;
        self.updated_at = Some(quote.timestamp);

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(PriceSample {
            at: quote.timestamp,
            mid: quote.mid(),
            spread: quote.relative_spread(),
        });
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population std-dev over mean. Zero mean with zero spread → 0.
fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    let std_dev = variance.sqrt();
    if m.abs() < f64::EPSILON {
        return Some(if std_dev < f64::EPSILON { 0.0 } else { f64::INFINITY });
    }
    Some(std_dev / m.abs())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Latest quotes and history for every configured pair, keyed by symbol.
#[derive(Debug, Clone)]
pub struct MarketSnapshotStore {
    pairs: BTreeMap<String, PairState>,
}

impl MarketSnapshotStore {
    pub fn new(pairs: impl IntoIterator<Item = Pair>, history_capacity: usize) -> Self {
        let capacity = history_capacity.max(1);
        let pairs = pairs
            .into_iter()
            .map(|p| (p.symbol.clone(), PairState::new(p, capacity)))
            .collect();
        Self { pairs }
    }

    /// Apply one quote. Unknown symbols are ignored.
    pub fn apply_quote(&mut self, quote: &Quote) -> bool {
        match self.pairs.get_mut(&quote.symbol) {
            Some(state) => {
                state.apply(quote);
                true
            }
            None => {
                debug!(symbol = %quote.symbol, "Quote for unconfigured pair ignored");
                false
            }
        }
    }

    /// Apply a batch of quotes; returns how many matched a configured pair.
    pub fn apply_quotes<'a>(&mut self, quotes: impl IntoIterator<Item = &'a Quote>) -> usize {
        quotes.into_iter().filter(|q| self.apply_quote(q)).count()
    }

    pub fn get(&self, symbol: &str) -> Option<&PairState> {
        self.pairs.get(symbol)
    }

    pub fn pairs(&self) -> impl Iterator<Item = &PairState> {
        self.pairs.values()
    }

    pub fn symbols(&self) -> Vec<Pair> {
        self.pairs.values().map(|s| s.pair.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Number of pairs with a fresh two-sided quote.
    pub fn fresh_count(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        self.pairs.values().filter(|s| s.is_fresh(now, max_age)).count()
    }

    /// Mid-price conversion rate `from` → `to` through one direct pair.
    pub fn mid_rate(&self, from: &Asset, to: &Asset) -> Option<f64> {
        if from == to {
            return Some(1.0);
        }
        self.pairs.values().find_map(|s| {
            let mid = s.mid().filter(|m| *m > 0.0)?;
            if &s.pair.base == from && &s.pair.quote == to {
                Some(mid)
            } else if &s.pair.quote == from && &s.pair.base == to {
                Some(1.0 / mid)
            } else {
                None
            }
        })
    }

    /// Mid-price rate `from` → `to`, directly or through one intermediate asset.
    pub fn conversion_rate(&self, from: &Asset, to: &Asset) -> Option<f64> {
        if let Some(rate) = self.mid_rate(from, to) {
            return Some(rate);
        }
        self.pairs.values().find_map(|s| {
            let via = if &s.pair.base == from {
                &s.pair.quote
            } else if &s.pair.quote == from {
                &s.pair.base
            } else {
                return None;
            };
            let first = self.mid_rate(from, via)?;
            let second = self.mid_rate(via, to)?;
            Some(first * second)
        })
    }

    /// Value `amount` of `asset` in `valuation` units.
    pub fn value_in(&self, asset: &Asset, amount: Decimal, valuation: &Asset) -> Option<Decimal> {
        if asset == valuation {
            return Some(amount);
        }
        let rate = self.conversion_rate(asset, valuation)?;
        Some(amount * to_decimal(rate))
    }

    /// Total portfolio value in `valuation` units. Holdings with no usable
    /// price are left out.
    pub fn portfolio_value(&self, portfolio: &PortfolioState, valuation: &Asset) -> Decimal {
        portfolio
            .holdings()
            .filter_map(|(asset, amount)| {
                let value = self.value_in(asset, *amount, valuation);
                if value.is_none() {
                    debug!(asset = %asset, "No price path to valuation currency");
                }
                value
            })
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
