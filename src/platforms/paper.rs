//! Paper exchange.
//!
//! Simulated execution venue for dry runs. Quotes come from a live
//! `QuoteFeed`; orders fill immediately and in full against the most recent
//! quote (buys at the ask, sells at the bid) with the configured taker fee.
//! Orders whose price constraint the quote violates are rejected.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Exchange, QuoteFeed};
use crate::types::{to_decimal, EngineError, OrderRequest, OrderResult, OrderStatus, Pair, Quote, Side};

#[derive(Default)]
struct Book {
    quotes: HashMap<String, Quote>,
    orders: HashMap<String, OrderResult>,
    /// client_id → order_id, for idempotent placement.
    by_client_id: HashMap<String, String>,
}

pub struct PaperExchange {
    feed: Arc<dyn QuoteFeed>,
    fee_rate: Decimal,
    book: Mutex<Book>,
}

impl PaperExchange {
    pub fn new(feed: Arc<dyn QuoteFeed>, fee_rate: Decimal) -> Self {
        Self {
            feed,
            fee_rate,
            book: Mutex::new(Book::default()),
        }
    }

    /// Seed or replace the quote used for fills.
    pub async fn set_quote(&self, quote: Quote) {
        self.book.lock().await.quotes.insert(quote.symbol.clone(), quote);
    }

    fn fill(&self, request: &OrderRequest, quote: Option<&Quote>) -> OrderResult {
        let mut result = OrderResult {
            order_id: format!("PAPER-{}", uuid::Uuid::new_v4()),
            symbol: request.symbol.clone(),
            side: request.side,
            status: OrderStatus::Rejected,
            filled_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            timestamp: Utc::now(),
        };

        let Some(quote) = quote.filter(|q| q.is_valid()) else {
            debug!(symbol = %request.symbol, "Paper order rejected: no quote");
            return result;
        };

        let price = to_decimal(match request.side {
            Side::Buy => quote.ask,
            Side::Sell => quote.bid,
        });
        let within_limit = match (request.side, request.limit_price) {
            (_, None) => true,
            (Side::Buy, Some(limit)) => price <= limit,
            (Side::Sell, Some(limit)) => price >= limit,
        };
        if !within_limit {
            debug!(
                symbol = %request.symbol,
                side = %request.side,
                price = %price,
                limit = ?request.limit_price,
                "Paper order rejected: price constraint"
            );
            return result;
        }

        result.status = OrderStatus::Filled;
        result.filled_qty = request.quantity;
        result.avg_price = price;
        result.fee = (request.quantity * price * self.fee_rate).round_dp(8);
        result
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Result<Vec<Quote>> {
        let quotes = self.feed.fetch_quotes(pairs).await?;
        let mut book = self.book.lock().await;
        for q in &quotes {
            book.quotes.insert(q.symbol.clone(), q.clone());
        }
        Ok(quotes)
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        if request.quantity <= Decimal::ZERO {
            return Err(EngineError::InvalidOrder(format!(
                "non-positive quantity {} for {}",
                request.quantity, request.symbol
            ))
            .into());
        }

        let mut book = self.book.lock().await;
        if let Some(existing) = book
            .by_client_id
            .get(&request.client_id)
            .and_then(|id| book.orders.get(id))
        {
            return Ok(existing.clone());
        }

        let result = self.fill(request, book.quotes.get(&request.symbol));
        info!(order = %result, "Paper order");
        book.by_client_id
            .insert(request.client_id.clone(), result.order_id.clone());
        book.orders.insert(result.order_id.clone(), result.clone());
        Ok(result)
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderResult> {
        self.book
            .lock()
            .await
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()).into())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult> {
        // Paper orders are terminal on placement; cancelling reports the final state.
        self.order_status(order_id).await
    }

    fn name(&self) -> &str {
        "paper"
    }
}
