//! Polymarket market data.
//!
//! Uses the Gamma API for market discovery and the CLOB API for order book
//! prices. Both are public and unauthenticated.
//!
//! Gamma API: https://gamma-api.polymarket.com
//! CLOB API: https://clob.polymarket.com

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use super::{MarketSource, OrderSide};
use crate::config::PolymarketConfig;
use crate::types::{AugurError, Market};

/// Gamma is over-fetched by this factor so that enough open, liquid markets
/// survive filtering.
const OVERFETCH_FACTOR: usize = 5;

const REQUEST_TIMEOUT_SECS: u64 = 15;

// ---------------------------------------------------------------------------
// Gamma API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
pub struct GammaMarket {
    #[serde(default, deserialize_with = "de_lenient_string")]
    pub id: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "conditionId")]
    pub condition_id: String,
    #[serde(default, rename = "endDate")]
    pub end_date: Option<String>,
    /// Outcome prices as JSON string: "[\"0.65\",\"0.35\"]"
    #[serde(default, rename = "outcomePrices")]
    pub outcome_prices: Option<String>,
    #[serde(default, rename = "clobTokenIds")]
    pub clob_token_ids: Option<String>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub volume: Option<f64>,
    #[serde(default, rename = "volumeNum", deserialize_with = "de_lenient_f64")]
    pub volume_num: Option<f64>,
    #[serde(default, deserialize_with = "de_lenient_f64")]
    pub liquidity: Option<f64>,
}

/// Gamma reports some numbers as strings and some ids as numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Num(f64),
    Str(String),
}

fn de_lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(match Option::<Lenient>::deserialize(d)? {
        Some(Lenient::Num(n)) => Some(n),
        Some(Lenient::Str(s)) => s.trim().parse().ok(),
        None => None,
    })
}

fn de_lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Option::<Lenient>::deserialize(d)? {
        Some(Lenient::Num(n)) => format!("{n:.0}"),
        Some(Lenient::Str(s)) => s,
        None => String::new(),
    })
}

// ---------------------------------------------------------------------------
// CLOB order book
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
pub struct OrderBook {
    #[serde(default)]
    pub bids: Vec<BookLevel>,
    #[serde(default)]
    pub asks: Vec<BookLevel>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookLevel {
    pub price: String,
    #[serde(default)]
    pub size: String,
}

impl OrderBook {
    /// Lowest ask for buys, highest bid for sells. Levels with unreadable or
    /// out-of-range prices are ignored.
    pub fn best(&self, side: OrderSide) -> Option<f64> {
        let prices = |levels: &[BookLevel]| -> Vec<f64> {
            levels
                .iter()
                .filter_map(|l| l.price.trim().parse::<f64>().ok())
                .filter(|p| *p > 0.0 && *p < 1.0)
                .collect()
        };
        match side {
            OrderSide::Buy => prices(self.asks.as_slice()).into_iter().reduce(f64::min),
            OrderSide::Sell => prices(self.bids.as_slice()).into_iter().reduce(f64::max),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PolymarketClient {
    http: Client,
    gamma_url: String,
    clob_url: String,
}

impl PolymarketClient {
    pub fn new(config: &PolymarketConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build Polymarket HTTP client")?;

        Ok(Self {
            http,
            gamma_url: config.gamma_url.trim_end_matches('/').to_string(),
            clob_url: config.clob_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch active markets from the Gamma API.
    pub async fn fetch_gamma_markets(&self, limit: usize) -> Result<Vec<GammaMarket>> {
        let url = format!("{}/markets", self.gamma_url);
        debug!(limit, "Fetching Polymarket markets from Gamma API");

        let limit = limit.to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("active", "true"),
                ("closed", "false"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await
            .context("Gamma API request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AugurError::Platform {
                platform: "gamma".into(),
                message: format!("HTTP {status}: {body}"),
            }
            .into());
        }

        let markets: Vec<GammaMarket> = resp
            .json()
            .await
            .context("Failed to parse Gamma markets response")?;

        info!(count = markets.len(), "Fetched raw Gamma markets");
        Ok(markets)
    }

    /// Read the CLOB order book for one outcome token.
    pub async fn fetch_order_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = format!("{}/book", self.clob_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("token_id", token_id)])
            .send()
            .await
            .context("CLOB book request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AugurError::Platform {
                platform: "clob".into(),
                message: format!("HTTP {status}: {body}"),
            }
            .into());
        }

        resp.json().await.context("Failed to parse CLOB order book")
    }

    /// Convert a Gamma market into our internal Market type. Markets without
    /// a question or readable outcome prices are dropped.
    pub fn convert_market(gm: &GammaMarket) -> Option<Market> {
        if gm.question.is_empty() {
            return None;
        }

        let (yes_price, no_price) = parse_outcome_prices(gm.outcome_prices.as_deref()?)?;

        let condition_id = if gm.condition_id.is_empty() {
            gm.id.clone()
        } else {
            gm.condition_id.clone()
        };

        Some(Market {
            id: if gm.id.is_empty() { condition_id.clone() } else { gm.id.clone() },
            condition_id,
            question: gm.question.clone(),
            description: gm.description.clone(),
            end_date: gm.end_date.as_deref().and_then(parse_end_date),
            volume: gm.volume.or(gm.volume_num).unwrap_or(0.0),
            liquidity: gm.liquidity.unwrap_or(0.0),
            yes_price,
            no_price,
            token_ids: gm
                .clob_token_ids
                .as_deref()
                .map(parse_token_ids)
                .unwrap_or_default(),
        })
    }

    /// Convert, drop markets that have already ended, sort by volume
    /// descending and keep the first `limit`.
    pub fn select_markets(raw: &[GammaMarket], limit: usize, now: DateTime<Utc>) -> Vec<Market> {
        let mut markets: Vec<Market> = raw
            .iter()
            .filter_map(Self::convert_market)
            .filter(|m| m.is_open_at(now))
            .collect();
        markets.sort_by(|a, b| b.volume.total_cmp(&a.volume));
        markets.truncate(limit);
        markets
    }
}

#[async_trait]
impl MarketSource for PolymarketClient {
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>> {
        let raw = self
            .fetch_gamma_markets(limit.saturating_mul(OVERFETCH_FACTOR))
            .await?;
        let markets = Self::select_markets(&raw, limit, Utc::now());
        info!(
            raw = raw.len(),
            selected = markets.len(),
            "Polymarket markets after filtering"
        );
        Ok(markets)
    }

    async fn best_price(&self, token_id: &str, side: OrderSide) -> Result<Option<f64>> {
        let book = self.fetch_order_book(token_id).await?;
        let price = book.best(side);
        debug!(token_id, side = ?side, price = ?price, "Best book price");
        Ok(price)
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse outcome prices from Gamma's string format.
/// Handles: "[\"0.65\",\"0.35\"]", "0.65, 0.35", etc.
pub fn parse_outcome_prices(s: &str) -> Option<(f64, f64)> {
    let cleaned = s.replace(['[', ']', '"', '\\'], "");
    let mut parts = cleaned.split(',').map(str::trim);
    let yes = parts.next()?.parse::<f64>().ok()?;
    let no = parts.next()?.parse::<f64>().ok()?;
    Some((yes, no))
}

/// Parse CLOB token ids from a JSON array string or a comma-separated list.
pub fn parse_token_ids(s: &str) -> Vec<String> {
    if let Ok(ids) = serde_json::from_str::<Vec<String>>(s) {
        return ids;
    }
    s.replace(['[', ']', '"', '\\'], "")
        .split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// RFC 3339 timestamps or bare `YYYY-MM-DD` dates (end of day UTC).
fn parse_end_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(23, 59, 59))
                .map(|dt| dt.and_utc())
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
