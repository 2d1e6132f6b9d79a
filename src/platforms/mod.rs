//! Exchange integrations.
//!
//! Defines the `QuoteFeed` and `Exchange` traits and provides:
//! - Kraken — public REST ticker feed (live prices, no authentication)
//! - Paper — simulated execution venue filling against the latest quotes

pub mod kraken;
pub mod paper;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{EngineError, OrderRequest, OrderResult, Pair, Quote};

/// Source of top-of-book quotes.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    /// Latest quote for each requested pair. Pairs the venue does not know
    /// are omitted rather than failing the whole batch.
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Result<Vec<Quote>>;

    /// Feed name for logging and identification.
    fn name(&self) -> &str;
}

/// Abstraction over an execution venue.
///
/// Implementors provide quotes, order placement, status polling and
/// cancellation. Order placement must be idempotent on
/// `OrderRequest::client_id`.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Result<Vec<Quote>>;

    /// Submit an order. The returned status may still be `Pending`.
    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult>;

    async fn order_status(&self, order_id: &str) -> Result<OrderResult>;

    /// Cancel an open order and return its final state. Fills that happened
    /// before the cancel are reported in the result.
    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult>;

    /// Venue name for logging and identification.
    fn name(&self) -> &str;
}

/// Whether a provider error is worth retrying. Request timeouts count.
pub fn is_transient(err: &anyhow::Error) -> bool {
    for cause in err.chain() {
        if cause.is::<tokio::time::error::Elapsed>() {
            return true;
        }
        if let Some(EngineError::Transient { .. }) = cause.downcast_ref::<EngineError>() {
            return true;
        }
        if let Some(e) = cause.downcast_ref::<reqwest::Error>() {
            if e.is_timeout() || e.is_connect() {
                return true;
            }
            if let Some(status) = e.status() {
                return status.as_u16() == 429 || status.is_server_error();
            }
        }
    }
    false
}
