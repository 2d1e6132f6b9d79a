//! Cycle detector.
//!
//! Hop-bounded Bellman–Ford from every asset as source. For each source `s`
//! the relaxation computes `back[r][v]`, the cheapest walk of at most `r`
//! edges from `v` back to `s`. A depth-first search from `s` then extends
//! simple paths through assets ranked above `s`, tracking the current path
//! in a predecessor-edge array, and prunes any branch whose weight plus
//! `back[remaining][v]` can no longer go negative. Every simple
//! negative cycle of 2..=max_hops edges is found exactly once, from its
//! smallest asset, so results are already in canonical rotation.

use std::collections::BTreeMap;
use tracing::debug;

use crate::market::graph::MarketGraph;
use crate::types::{ArbitrageCycle, Asset, Hop};

/// Relaxations smaller than this are treated as float noise.
const EPS: f64 = 1e-12;

pub struct CycleDetector {
    max_hops: usize,
}

impl CycleDetector {
    pub fn new(max_hops: usize) -> Self {
        Self {
            max_hops: max_hops.max(2),
        }
    }

    /// All distinct simple negative cycles of 2..=max_hops hops, best first.
    pub fn detect(&self, graph: &MarketGraph) -> Vec<ArbitrageCycle> {
        let n = graph.asset_count();
        if n < 2 || graph.edge_count() == 0 {
            return Vec::new();
        }

        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, e) in graph.edges().iter().enumerate() {
            outgoing[e.from].push(i);
        }

        let mut found: BTreeMap<Vec<Asset>, ArbitrageCycle> = BTreeMap::new();
        for source in 0..n {
            let back = self.return_costs(graph, source);
            let mut search = Search {
                graph,
                outgoing: &outgoing,
                back: &back,
                source,
                max_hops: self.max_hops,
                pred: vec![None; n],
                paths: Vec::new(),
            };
            search.extend(source, 0, 0.0);

            for edge_path in search.paths {
                let Some(cycle) = to_cycle(graph, &edge_path) else {
                    continue;
                };
                found.entry(cycle.assets.clone()).or_insert(cycle);
            }
        }

        let mut cycles: Vec<ArbitrageCycle> = found.into_values().collect();
        cycles.sort_by(|a, b| {
            b.profit
                .total_cmp(&a.profit)
                .then(a.len().cmp(&b.len()))
                .then_with(|| a.assets.cmp(&b.assets))
        });

        debug!(
            assets = n,
            edges = graph.edge_count(),
            cycles = cycles.len(),
            "Cycle detection complete"
        );
        cycles
    }

    /// `back[r][v]`: cheapest walk of at most `r` edges from `v` to `source`.
    fn return_costs(&self, graph: &MarketGraph, source: usize) -> Vec<Vec<f64>> {
        let n = graph.asset_count();
        let mut back = vec![vec![f64::INFINITY; n]; self.max_hops + 1];
        back[0][source] = 0.0;

        for r in 1..=self.max_hops {
            let (done, rest) = back.split_at_mut(r);
            let prev = &done[r - 1];
            let cur = &mut rest[0];
            cur.copy_from_slice(prev);
            for e in graph.edges() {
                if prev[e.to].is_finite() && e.weight() + prev[e.to] < cur[e.from] {
                    cur[e.from] = e.weight() + prev[e.to];
                }
            }
        }
        back
    }
}

/// Depth-first enumeration of simple cycles rooted at `source`. `pred[v]`
/// is the edge that reached `v` on the current path.
struct Search<'a> {
    graph: &'a MarketGraph,
    outgoing: &'a [Vec<usize>],
    back: &'a [Vec<f64>],
    source: usize,
    max_hops: usize,
    pred: Vec<Option<usize>>,
    paths: Vec<Vec<usize>>,
}

impl Search<'_> {
    fn extend(&mut self, node: usize, depth: usize, weight: f64) {
        let (graph, outgoing, back) = (self.graph, self.outgoing, self.back);
        for &i in &outgoing[node] {
            let edge = &graph.edges()[i];
            let total = weight + edge.weight();

            if edge.to == self.source {
                if depth + 1 >= 2 && total < -EPS {
                    let path = self.close(node, i);
                    self.paths.push(path);
                }
                continue;
            }
            // only assets ranked above the source, so each cycle has one root
            if edge.to < self.source || self.pred[edge.to].is_some() || depth + 1 >= self.max_hops {
                continue;
            }
            let remaining = self.max_hops - depth - 1;
            if total + back[remaining][edge.to] >= -EPS {
                continue;
            }

            self.pred[edge.to] = Some(i);
            self.extend(edge.to, depth + 1, total);
            self.pred[edge.to] = None;
        }
    }

    /// Edges of the cycle closed by `closing` out of `last`, in travel order.
    fn close(&self, last: usize, closing: usize) -> Vec<usize> {
        let edges = self.graph.edges();
        let mut path = vec![closing];
        let mut node = last;
        while node != self.source {
            let Some(e) = self.pred[node] else {
                break;
            };
            path.push(e);
            node = edges[e].from;
        }
        path.reverse();
        path
    }
}

fn to_cycle(graph: &MarketGraph, edge_path: &[usize]) -> Option<ArbitrageCycle> {
    let hops: Vec<Hop> = edge_path.iter().map(|&i| graph.edges()[i].hop.clone()).collect();
    let total_weight: f64 = hops.iter().map(|h| h.weight).sum();
    if total_weight >= -EPS {
        return None;
    }

    let assets: Vec<Asset> = hops.iter().map(|h| h.from.clone()).collect();
    let start = assets.iter().min()?.clone();
    let cycle = ArbitrageCycle {
        assets,
        hops,
        total_weight,
        profit: (-total_weight).exp() - 1.0,
    };
    cycle.rotated_to(&start)
}

/// Cycle survives to scoring when its profit, net of double the fee
/// estimate, exceeds the minimum threshold.
pub fn passes_profit_gate(cycle: &ArbitrageCycle, fee_estimate: f64, min_profit_threshold: f64) -> bool {
    cycle.profit - 2.0 * fee_estimate > min_profit_threshold
}
