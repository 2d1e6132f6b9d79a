//! Mock exchange for integration testing.
//!
//! Provides a deterministic `Exchange` implementation that serves fixed
//! quotes, fills orders immediately at the quoted price with no fee, and
//! tracks every request, all in-memory with no external dependencies.
//! Individual (symbol, side) combinations can be forced to reject, and the
//! quote endpoint can be forced to fail.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;

use arb_engine::platforms::Exchange;
use arb_engine::types::*;

pub struct MockExchange {
    quotes: Mutex<HashMap<String, (f64, f64, f64)>>,
    orders: Mutex<HashMap<String, OrderResult>>,
    requests: Mutex<Vec<OrderRequest>>,
    rejections: Mutex<Vec<(String, Side)>>,
    /// If set, quote fetches fail with this message.
    quote_error: Mutex<Option<String>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            quotes: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            rejections: Mutex::new(Vec::new()),
            quote_error: Mutex::new(None),
        }
    }

    /// USD/XBT/ETH triangle. ETH trades `mispricing` rich against USD, so
    /// USD → XBT → ETH → USD gains roughly that fraction.
    pub fn triangle(mispricing: f64) -> Self {
        let ex = Self::new();
        ex.set_quote("XBTUSD", 50_000.0, 50_000.0, 5_000.0);
        ex.set_quote("ETHXBT", 0.05, 0.05, 5_000.0);
        let eth = 2_500.0 * (1.0 + mispricing);
        ex.set_quote("ETHUSD", eth, eth, 5_000.0);
        ex
    }

    pub fn set_quote(&self, symbol: &str, bid: f64, ask: f64, volume: f64) {
        self.quotes
            .lock()
            .unwrap()
            .insert(symbol.to_string(), (bid, ask, volume));
    }

    /// Reject every future order for `symbol` on `side`.
    pub fn reject(&self, symbol: &str, side: Side) {
        self.rejections
            .lock()
            .unwrap()
            .push((symbol.to_string(), side));
    }

    /// Force all subsequent quote fetches to fail.
    pub fn fail_quotes(&self, msg: &str) {
        *self.quote_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_quote_error(&self) {
        *self.quote_error.lock().unwrap() = None;
    }

    /// Every order request received so far.
    pub fn requests(&self) -> Vec<OrderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Result<Vec<Quote>> {
        if let Some(msg) = self.quote_error.lock().unwrap().clone() {
            return Err(EngineError::Exchange {
                venue: "mock".into(),
                message: msg,
            }
            .into());
        }
        let quotes = self.quotes.lock().unwrap();
        Ok(pairs
            .iter()
            .filter_map(|p| {
                quotes.get(&p.symbol).map(|&(bid, ask, volume)| Quote {
                    symbol: p.symbol.clone(),
                    bid,
                    ask,
                    volume,
                    timestamp: Utc::now(),
                })
            })
            .collect())
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        self.requests.lock().unwrap().push(request.clone());

        let rejected = self
            .rejections
            .lock()
            .unwrap()
            .contains(&(request.symbol.clone(), request.side));
        let price = self.quotes.lock().unwrap().get(&request.symbol).map(|&(bid, ask, _)| match request.side {
            Side::Buy => ask,
            Side::Sell => bid,
        });

        let mut result = OrderResult {
            order_id: format!("MOCK-{}", request.client_id),
            symbol: request.symbol.clone(),
            side: request.side,
            status: OrderStatus::Rejected,
            filled_qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            fee: Decimal::ZERO,
            timestamp: Utc::now(),
        };
        if let (false, Some(price)) = (rejected, price) {
            result.status = OrderStatus::Filled;
            result.filled_qty = request.quantity;
            result.avg_price = Decimal::from_f64(price).unwrap_or_default();
        }

        self.orders
            .lock()
            .unwrap()
            .insert(result.order_id.clone(), result.clone());
        Ok(result)
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderResult> {
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()).into())
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult> {
        self.order_status(order_id).await
    }

    fn name(&self) -> &str {
        "mock"
    }
}
