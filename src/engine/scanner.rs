//! Quote scanner.
//!
//! Refreshes the market snapshot store from the exchange. Pairs are fetched
//! in batches concurrently, each batch under its own timeout and with a
//! short retry on transient errors and timeouts. A batch that fails is logged and
//! skipped; its pairs keep their previous (ageing) quotes.
//!
//! When every batch of a scan fails, the scan counts as a provider failure.
//! After `max_failures` consecutive failures the scanner pauses for a
//! configured interval instead of hammering the venue.

use anyhow::{Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::market::MarketSnapshotStore;
use crate::platforms::{is_transient, Exchange};
use crate::types::{Pair, Quote};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Retries per batch on transient errors (in addition to the first attempt).
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 200;

// ---------------------------------------------------------------------------
// Scan status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ScanStatus {
    /// At least one batch returned; `quotes` were applied to the store.
    Refreshed { quotes: usize, failed_batches: usize },
    /// Every batch failed.
    Failed { consecutive: u32 },
    /// Skipped while the provider is paused.
    Paused { remaining: Duration },
}

impl ScanStatus {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, ScanStatus::Refreshed { .. })
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

pub struct QuoteScanner {
    exchange: Arc<dyn Exchange>,
    pairs: Vec<Pair>,
    batch_size: usize,
    batch_timeout: Duration,
    max_failures: u32,
    pause: Duration,
    consecutive_failures: u32,
    paused_until: Option<Instant>,
}

impl QuoteScanner {
    pub fn new(exchange: Arc<dyn Exchange>, pairs: Vec<Pair>, config: &EngineConfig) -> Self {
        Self {
            exchange,
            pairs,
            batch_size: config.quote_batch_size.max(1),
            batch_timeout: Duration::from_millis(config.quote_timeout_ms),
            max_failures: config.max_provider_failures.max(1),
            pause: Duration::from_secs(config.provider_pause_secs),
            consecutive_failures: 0,
            paused_until: None,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_paused(&self) -> bool {
        self.paused_until.is_some_and(|until| Instant::now() < until)
    }

    /// Fetch all pairs and apply the results to `store`.
    pub async fn scan(&mut self, store: &mut MarketSnapshotStore) -> ScanStatus {
        if let Some(until) = self.paused_until {
            let now = Instant::now();
            if now < until {
                let remaining = until - now;
                debug!(remaining_secs = remaining.as_secs(), "Provider paused, skipping scan");
                return ScanStatus::Paused { remaining };
            }
            info!(venue = self.exchange.name(), "Provider pause elapsed, resuming scans");
            self.paused_until = None;
        }

        let batches: Vec<&[Pair]> = self.pairs.chunks(self.batch_size).collect();
        let total = batches.len();
        let results = join_all(batches.iter().enumerate().map(|(i, batch)| self.fetch_batch(i, batch))).await;

        let mut quotes: Vec<Quote> = Vec::new();
        let mut failed = 0;
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(batch_quotes) => quotes.extend(batch_quotes),
                Err(e) => {
                    failed += 1;
                    warn!(batch = i, error = %format!("{e:#}"), "Quote batch failed");
                }
            }
        }

        if total > 0 && failed == total {
            self.consecutive_failures += 1;
            warn!(
                venue = self.exchange.name(),
                consecutive = self.consecutive_failures,
                max = self.max_failures,
                "Quote scan failed"
            );
            if self.consecutive_failures >= self.max_failures {
                warn!(
                    venue = self.exchange.name(),
                    pause_secs = self.pause.as_secs(),
                    "Too many consecutive provider failures, pausing"
                );
                self.paused_until = Some(Instant::now() + self.pause);
                let consecutive = self.consecutive_failures;
                self.consecutive_failures = 0;
                return ScanStatus::Failed { consecutive };
            }
            return ScanStatus::Failed {
                consecutive: self.consecutive_failures,
            };
        }

        self.consecutive_failures = 0;
        let applied = store.apply_quotes(&quotes);
        debug!(
            received = quotes.len(),
            applied,
            failed_batches = failed,
            "Quotes refreshed"
        );
        ScanStatus::Refreshed {
            quotes: applied,
            failed_batches: failed,
        }
    }

    /// One batch under the batch timeout, with backoff on transient errors.
    async fn fetch_batch(&self, index: usize, pairs: &[Pair]) -> Result<Vec<Quote>> {
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(self.batch_timeout, self.exchange.fetch_quotes(pairs))
                .await
                .with_context(|| format!("batch {index} timed out after {:?}", self.batch_timeout))
                .and_then(|r| r);

            match result {
                Ok(quotes) => return Ok(quotes),
                Err(e) if attempt < MAX_RETRIES && is_transient(&e) => {
                    attempt += 1;
                    let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                    debug!(batch = index, attempt, delay_ms = delay, error = %e, "Retrying quote batch");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
