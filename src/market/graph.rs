//! Exchange graph builder.
//!
//! Turns a market snapshot into a directed weighted graph over assets. Each
//! fresh pair contributes two edges:
//!
//!   base → quote  (sell base at the bid):   rate = bid × (1 − fee)
//!   quote → base  (buy base at the ask):    rate = (1 / ask) × (1 − fee)
//!
//! Edge weight is −ln(rate), so a cycle whose weights sum below zero
//! compounds to more than it started with. Graphs are built fresh every scan
//! and never mutated afterwards.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};

use super::MarketSnapshotStore;
use crate::types::{Asset, Hop, Pair, Side};

/// A directed edge between two asset indices.
#[derive(Debug, Clone)]
pub struct Edge {
    pub from: usize,
    pub to: usize,
    pub hop: Hop,
}

impl Edge {
    pub fn weight(&self) -> f64 {
        self.hop.weight
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarketGraph {
    assets: Vec<Asset>,
    index: BTreeMap<Asset, usize>,
    edges: Vec<Edge>,
    by_endpoints: BTreeMap<(usize, usize), usize>,
}

impl MarketGraph {
    /// Build from every pair with a fresh two-sided quote.
    pub fn build(
        store: &MarketSnapshotStore,
        now: DateTime<Utc>,
        fee: f64,
        max_quote_age: Duration,
    ) -> Self {
        let mut hops = Vec::new();
        for state in store.pairs() {
            if !state.is_fresh(now, max_quote_age) {
                continue;
            }
            let (Some(bid), Some(ask)) = (state.bid, state.ask) else {
                continue;
            };
            hops.push(sell_hop(&state.pair, bid, fee));
            hops.push(buy_hop(&state.pair, ask, fee));
        }
        Self::from_hops(hops)
    }

    /// Build from explicit hops. Asset indices follow lexicographic order.
    /// Duplicate (from, to) edges keep the better rate; non-positive or
    /// non-finite rates are dropped.
    pub fn from_hops(hops: impl IntoIterator<Item = Hop>) -> Self {
        let hops: Vec<Hop> = hops
            .into_iter()
            .filter(|h| h.rate.is_finite() && h.rate > 0.0)
            .collect();

        let assets: Vec<Asset> = hops
            .iter()
            .flat_map(|h| [h.from.clone(), h.to.clone()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: BTreeMap<Asset, usize> = assets
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i))
            .collect();

        let mut graph = Self {
            assets,
            index,
            edges: Vec::new(),
            by_endpoints: BTreeMap::new(),
        };

        for hop in hops {
            if hop.from == hop.to {
                continue;
            }
            let from = graph.index[&hop.from];
            let to = graph.index[&hop.to];
            match graph.by_endpoints.get(&(from, to)) {
                Some(&existing) => {
                    if hop.rate > graph.edges[existing].hop.rate {
                        graph.edges[existing].hop = hop;
                    }
                }
                None => {
                    graph.by_endpoints.insert((from, to), graph.edges.len());
                    graph.edges.push(Edge { from, to, hop });
                }
            }
        }
        graph
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn asset(&self, index: usize) -> &Asset {
        &self.assets[index]
    }

    pub fn index_of(&self, asset: &Asset) -> Option<usize> {
        self.index.get(asset).copied()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn edge(&self, from: &Asset, to: &Asset) -> Option<&Edge> {
        let key = (self.index_of(from)?, self.index_of(to)?);
        self.by_endpoints.get(&key).map(|&i| &self.edges[i])
    }

    /// Profit of walking `assets` in order and back to the first, or `None`
    /// if any hop has no edge.
    pub fn cycle_profit(&self, assets: &[Asset]) -> Option<f64> {
        if assets.len() < 2 {
            return None;
        }
        let mut total = 0.0;
        for (i, from) in assets.iter().enumerate() {
            let to = &assets[(i + 1) % assets.len()];
            total += self.edge(from, to)?.weight();
        }
        Some((-total).exp() - 1.0)
    }
}

fn sell_hop(pair: &Pair, bid: f64, fee: f64) -> Hop {
    let rate = bid * (1.0 - fee);
    Hop {
        from: pair.base.clone(),
        to: pair.quote.clone(),
        pair: pair.clone(),
        side: Side::Sell,
        price: bid,
        rate,
        weight: -rate.ln(),
    }
}

fn buy_hop(pair: &Pair, ask: f64, fee: f64) -> Hop {
    let rate = (1.0 / ask) * (1.0 - fee);
    Hop {
        from: pair.quote.clone(),
        to: pair.base.clone(),
        pair: pair.clone(),
        side: Side::Buy,
        price: ask,
        rate,
        weight: -rate.ln(),
    }
}
