//! Kraken public market data.
//!
//! Live top-of-book quotes from the public `Ticker` endpoint. No
//! authentication; order routing goes through the paper exchange.
//!
//! API docs: https://docs.kraken.com/api/docs/rest-api/get-ticker-information
//! Base URL: https://api.kraken.com/0/public/
//! Rate limit: roughly 1 request/second per IP for public endpoints
//!
//! Ticker fields used: `a[0]` best ask, `b[0]` best bid, `v[1]` rolling
//! 24-hour volume (base units).

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::QuoteFeed;
use crate::types::{EngineError, Pair, Quote};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://api.kraken.com";
const FEED_NAME: &str = "kraken";

/// Kraken error prefixes that mean "try again later".
const TRANSIENT_ERRORS: &[&str] = &["EAPI:Rate limit", "EService:Unavailable", "EService:Busy", "EGeneral:Temporary"];

// ---------------------------------------------------------------------------
// API response types (Kraken JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct KrakenResponse<T> {
    #[serde(default)]
    error: Vec<String>,
    result: Option<T>,
}

/// One entry of the `Ticker` result. Every field is an array of decimal
/// strings; only the ones we need are deserialized.
#[derive(Debug, Deserialize)]
struct TickerEntry {
    /// ask: [price, whole lot volume, lot volume]
    a: Vec<String>,
    /// bid: [price, whole lot volume, lot volume]
    b: Vec<String>,
    /// volume: [today, last 24 hours]
    v: Vec<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KrakenTicker {
    http: Client,
    base_url: String,
}

impl KrakenTicker {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("arb-engine/0.1.0")
            .build()
            .context("Failed to build HTTP client for Kraken")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn ticker(&self, pairs: &[Pair]) -> Result<HashMap<String, TickerEntry>> {
        let symbols: Vec<&str> = pairs.iter().map(|p| p.symbol.as_str()).collect();
        let url = format!("{}/0/public/Ticker", self.base_url);

        debug!(pairs = %symbols.join(","), "Fetching Kraken ticker");

        let resp = self
            .http
            .get(&url)
            .query(&[("pair", symbols.join(","))])
            .send()
            .await
            .context("Kraken ticker request failed")?;

        let status = resp.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(EngineError::Transient {
                venue: FEED_NAME.into(),
                message: format!("HTTP {status}"),
            }
            .into());
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Kraken API error {status}: {body}");
        }

        let body: KrakenResponse<HashMap<String, TickerEntry>> = resp
            .json()
            .await
            .context("Failed to parse Kraken ticker response")?;

        unwrap_response(body)
    }
}

fn unwrap_response<T>(body: KrakenResponse<T>) -> Result<T> {
    if !body.error.is_empty() {
        let message = body.error.join("; ");
        let transient = body
            .error
            .iter()
            .any(|e| TRANSIENT_ERRORS.iter().any(|p| e.starts_with(p)));
        let err = if transient {
            EngineError::Transient {
                venue: FEED_NAME.into(),
                message,
            }
        } else {
            EngineError::Exchange {
                venue: FEED_NAME.into(),
                message,
            }
        };
        return Err(err.into());
    }
    body.result
        .ok_or_else(|| anyhow::anyhow!("Kraken response has neither result nor error"))
}

/// Convert ticker entries into quotes for the requested pairs. Entries that
/// fail to parse are skipped with a warning; unrequested entries are ignored.
fn to_quotes(entries: &HashMap<String, TickerEntry>, pairs: &[Pair], now: DateTime<Utc>) -> Vec<Quote> {
    pairs
        .iter()
        .filter_map(|pair| {
            let Some(entry) = entries.get(&pair.symbol) else {
                debug!(symbol = %pair.symbol, "Pair missing from Kraken ticker");
                return None;
            };
            match parse_entry(&pair.symbol, entry, now) {
                Ok(quote) => Some(quote),
                Err(e) => {
                    warn!(symbol = %pair.symbol, error = %e, "Unparseable Kraken ticker entry");
                    None
                }
            }
        })
        .collect()
}

fn parse_entry(symbol: &str, entry: &TickerEntry, now: DateTime<Utc>) -> Result<Quote> {
    let field = |values: &[String], idx: usize, name: &str| -> Result<f64> {
        values
            .get(idx)
            .with_context(|| format!("missing {name}"))?
            .parse::<f64>()
            .with_context(|| format!("invalid {name}"))
    };
    Ok(Quote {
        symbol: symbol.to_string(),
        ask: field(&entry.a, 0, "ask")?,
        bid: field(&entry.b, 0, "bid")?,
        volume: field(&entry.v, 1, "24h volume")?,
        timestamp: now,
    })
}

#[async_trait]
impl QuoteFeed for KrakenTicker {
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Result<Vec<Quote>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.ticker(pairs).await?;
        Ok(to_quotes(&entries, pairs, Utc::now()))
    }

    fn name(&self) -> &str {
        FEED_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platforms::is_transient;

    const TICKER_JSON: &str = r#"{
        "error": [],
        "result": {
            "XXBTZUSD": {
                "a": ["64250.10000", "1", "1.000"],
                "b": ["64250.00000", "3", "3.000"],
                "c": ["64250.00000", "0.00100000"],
                "v": ["1021.55", "2870.41233"],
                "p": ["64100.1", "63990.4"],
                "t": [12345, 45678],
                "l": ["63000.0", "62900.0"],
                "h": ["64500.0", "64800.0"],
                "o": "63500.0"
            },
            "XETHXXBT": {
                "a": ["0.05210", "10", "10.000"],
                "b": ["0.05209", "4", "4.000"],
                "c": ["0.05210", "0.1"],
                "v": ["800.0", "1500.5"]
            },
            "BROKEN": {
                "a": ["not-a-number"],
                "b": ["1.0"],
                "v": ["1.0", "2.0"]
            }
        }
    }"#;

    fn pairs() -> Vec<Pair> {
        vec![
            Pair::new("XXBTZUSD", "XBT", "USD"),
            Pair::new("XETHXXBT", "ETH", "XBT"),
            Pair::new("BROKEN", "A", "B"),
            Pair::new("MISSING", "C", "D"),
        ]
    }

    #[test]
    fn test_parse_ticker() {
        let body: KrakenResponse<HashMap<String, TickerEntry>> = serde_json::from_str(TICKER_JSON).unwrap();
        let entries = unwrap_response(body).unwrap();
        let quotes = to_quotes(&entries, &pairs(), Utc::now());

        assert_eq!(quotes.len(), 2);
        let xbt = quotes.iter().find(|q| q.symbol == "XXBTZUSD").unwrap();
        assert_eq!(xbt.bid, 64250.0);
        assert_eq!(xbt.ask, 64250.1);
        assert_eq!(xbt.volume, 2870.41233);
        assert!(xbt.is_valid());
    }

    #[test]
    fn test_error_array_permanent() {
        let body: KrakenResponse<HashMap<String, TickerEntry>> =
            serde_json::from_str(r#"{"error": ["EQuery:Unknown asset pair"]}"#).unwrap();
        let err = unwrap_response(body).unwrap_err();
        assert!(!is_transient(&err));
        assert!(err.to_string().contains("Unknown asset pair"));
    }

    #[test]
    fn test_error_array_rate_limited() {
        let body: KrakenResponse<HashMap<String, TickerEntry>> =
            serde_json::from_str(r#"{"error": ["EAPI:Rate limit exceeded"]}"#).unwrap();
        assert!(is_transient(&unwrap_response(body).unwrap_err()));
    }

    #[test]
    fn test_empty_response_is_error() {
        let body: KrakenResponse<HashMap<String, TickerEntry>> = serde_json::from_str(r#"{"error": []}"#).unwrap();
        assert!(unwrap_response(body).is_err());
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let feed = KrakenTicker::new("https://api.kraken.com/", std::time::Duration::from_secs(5)).unwrap();
        assert_eq!(feed.base_url, DEFAULT_BASE_URL);
        assert_eq!(feed.name(), "kraken");
    }
}
