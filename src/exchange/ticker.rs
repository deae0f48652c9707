//! Public price feed.
//!
//! `PublicTicker` reads last prices from the venue's unauthenticated
//! `ticker/price` endpoint. A feed task polls it and writes into a shared
//! `PriceBoard`, which paper gateways read as their mark price.

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::retry::{with_retry, DEFAULT_ATTEMPTS, DEFAULT_BACKOFF_MS};
use crate::precision::parse_or_zero;

// ---------------------------------------------------------------------------
// Price board
// ---------------------------------------------------------------------------

/// Latest known price per symbol.
#[derive(Debug, Default)]
pub struct PriceBoard {
    prices: RwLock<HashMap<String, Decimal>>,
}

impl PriceBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: &str, price: Decimal) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(symbol.to_string(), price);
        }
    }

    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.prices.read().ok()?.get(symbol).copied()
    }
}

// ---------------------------------------------------------------------------
// Ticker client
// ---------------------------------------------------------------------------

/// `GET /fapi/v1/ticker/price` response. The price arrives as a string.
#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

pub struct PublicTicker {
    http: Client,
    base_url: String,
}

impl PublicTicker {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("HEDGELOCK/0.1.0 (price-feed)")
            .build()
            .context("Failed to build HTTP client for price feed")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn price_url(&self, symbol: &str) -> String {
        format!("{}/fapi/v1/ticker/price?symbol={symbol}", self.base_url)
    }

    /// Fetch the last price of `symbol`. A zero or unparsable price is an error.
    pub async fn fetch(&self, symbol: &str) -> Result<Decimal> {
        let url = self.price_url(symbol);
        debug!(url = %url, "Fetching ticker price");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Ticker request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ticker API error {status}: {body}");
        }

        let ticker: TickerPrice = resp
            .json()
            .await
            .context("Failed to parse ticker response")?;

        parse_ticker(symbol, &ticker)
    }
}

fn parse_ticker(symbol: &str, ticker: &TickerPrice) -> Result<Decimal> {
    if ticker.symbol != symbol {
        anyhow::bail!("ticker returned {} for {symbol}", ticker.symbol);
    }
    let price = parse_or_zero("price", &ticker.price);
    if price <= Decimal::ZERO {
        anyhow::bail!("ticker returned non-positive price {:?} for {symbol}", ticker.price);
    }
    Ok(price)
}

/// Poll `symbols` every `interval` into `board` until `shutdown` flips.
pub async fn run_price_feed(
    ticker: PublicTicker,
    board: Arc<PriceBoard>,
    symbols: Vec<String>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(symbols = ?symbols, interval_ms = interval.as_millis() as u64, "Price feed started");
    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                for symbol in &symbols {
                    let fetched = with_retry(
                        "ticker",
                        DEFAULT_ATTEMPTS,
                        Duration::from_millis(DEFAULT_BACKOFF_MS),
                        || ticker.fetch(symbol),
                    )
                    .await;
                    match fetched {
                        Ok(price) => board.set(symbol, price),
                        Err(e) => warn!(symbol = %symbol, error = %e, "Price fetch failed"),
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
    info!("Price feed stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
