//! Large-trader ("smart money") flow from the Polymarket data API.
//!
//! Only trades with a notional of at least `min_amount` USDC are counted.
//! Buying YES or selling NO is bullish flow; buying NO or selling YES is
//! bearish flow. The summary is rendered into the model prompt as extra
//! context and never feeds the decision core directly.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::OrderSide;
use crate::config::PolymarketConfig;
use crate::types::{AugurError, Side};

const TRADES_PAGE_LIMIT: u32 = 200;

/// Single trades above this notional count toward whale activity.
const WHALE_TRADE_AMOUNT: f64 = 5000.0;

/// Average share size below which the flow looks like retail.
const RETAIL_AVG_SIZE: f64 = 100.0;

const PATTERN_WINDOW: usize = 20;

// ---------------------------------------------------------------------------
// Data API types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawTrade {
    #[serde(default, rename = "proxyWallet")]
    pub proxy_wallet: Option<String>,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub price: f64,
}

/// A trade above the notional threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargeTrade {
    pub trader: String,
    pub side: OrderSide,
    pub outcome: Side,
    /// Notional in USDC (`size × price`).
    pub amount: f64,
    /// Shares.
    pub size: f64,
    pub price: f64,
}

impl LargeTrade {
    /// Keep a raw trade only if its notional reaches `min_amount`.
    pub fn from_raw(raw: &RawTrade, min_amount: f64) -> Option<Self> {
        let amount = raw.size * raw.price;
        if !amount.is_finite() || amount < min_amount {
            return None;
        }

        let side = if raw.side.eq_ignore_ascii_case("SELL") {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };

        let outcome_is_no = raw
            .outcome
            .as_deref()
            .map(|o| o.eq_ignore_ascii_case("no"))
            .unwrap_or(false)
            || raw
                .asset
                .as_deref()
                .map(|a| a.eq_ignore_ascii_case("no"))
                .unwrap_or(false);

        Some(Self {
            trader: raw.proxy_wallet.clone().unwrap_or_else(|| "unknown".into()),
            side,
            outcome: if outcome_is_no { Side::No } else { Side::Yes },
            amount,
            size: raw.size,
            price: raw.price,
        })
    }

    fn is_bullish(&self) -> bool {
        matches!(
            (self.side, self.outcome),
            (OrderSide::Buy, Side::Yes) | (OrderSide::Sell, Side::No)
        )
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowConsensus {
    Yes,
    No,
    Neutral,
}

impl std::fmt::Display for FlowConsensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowConsensus::Yes => write!(f, "YES"),
            FlowConsensus::No => write!(f, "NO"),
            FlowConsensus::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmartMoneySummary {
    pub large_trades: usize,
    pub large_traders: usize,
    pub total_volume: f64,
    /// BUY YES notional.
    pub yes_volume: f64,
    /// BUY NO notional.
    pub no_volume: f64,
    pub bullish_flow: f64,
    pub bearish_flow: f64,
    pub consensus: FlowConsensus,
    /// Winning flow share (0–1, 2dp).
    pub confidence: f64,
    /// Buy-ratio label: "Strong BUY", "BUY", "Neutral", "SELL", "Strong SELL".
    pub direction: Option<String>,
    /// "Whale Activity" or "Retail Activity" when detected.
    pub pattern: Option<String>,
}

impl SmartMoneySummary {
    /// Summarise large trades, most recent first. `None` when there are none.
    pub fn from_trades(trades: &[LargeTrade]) -> Option<Self> {
        if trades.is_empty() {
            return None;
        }

        let yes_volume = volume(trades, |t| t.side == OrderSide::Buy && t.outcome == Side::Yes);
        let no_volume = volume(trades, |t| t.side == OrderSide::Buy && t.outcome == Side::No);
        let bullish_flow = volume(trades, LargeTrade::is_bullish);
        let bearish_flow = volume(trades, |t| !t.is_bullish());
        let buy_volume = volume(trades, |t| t.side == OrderSide::Buy);
        let total_volume = bullish_flow + bearish_flow;

        let (consensus, confidence) = if total_volume <= 0.0 {
            (FlowConsensus::Neutral, 0.0)
        } else if bullish_flow > bearish_flow {
            (FlowConsensus::Yes, bullish_flow / total_volume)
        } else {
            (FlowConsensus::No, bearish_flow / total_volume)
        };

        let traders: HashSet<&str> = trades.iter().map(|t| t.trader.as_str()).collect();

        Some(Self {
            large_trades: trades.len(),
            large_traders: traders.len(),
            total_volume,
            yes_volume,
            no_volume,
            bullish_flow,
            bearish_flow,
            consensus,
            confidence: (confidence * 100.0).round() / 100.0,
            direction: direction_label(buy_volume, total_volume).map(String::from),
            pattern: detect_pattern(trades).map(String::from),
        })
    }

    /// Prompt block handed to the model panel.
    pub fn prompt_block(&self) -> String {
        let mut block = String::from("SMART MONEY SIGNALS:\n");
        block.push_str(&format!("- Top traders consensus: {}\n", self.consensus));
        block.push_str(&format!(
            "- Smart money confidence: {:.0}%\n",
            self.confidence * 100.0
        ));
        block.push_str(&format!("- YES volume from whales: ${:.0}\n", self.yes_volume));
        block.push_str(&format!("- NO volume from whales: ${:.0}\n", self.no_volume));
        block.push_str(&format!(
            "- Number of top traders active: {}",
            self.large_traders
        ));
        if let Some(pattern) = &self.pattern {
            block.push_str(&format!("\n- Pattern: {pattern}"));
        }
        block
    }
}

fn volume(trades: &[LargeTrade], pred: impl Fn(&LargeTrade) -> bool) -> f64 {
    trades.iter().filter(|t| pred(*t)).map(|t| t.amount).sum()
}

/// Direction label from the share of notional that was buying.
fn direction_label(buy_volume: f64, total_volume: f64) -> Option<&'static str> {
    if total_volume <= 0.0 {
        return None;
    }
    let ratio = buy_volume / total_volume;
    Some(if ratio >= 0.65 {
        "Strong BUY"
    } else if ratio >= 0.55 {
        "BUY"
    } else if ratio <= 0.35 {
        "Strong SELL"
    } else if ratio <= 0.45 {
        "SELL"
    } else {
        "Neutral"
    })
}

fn detect_pattern(trades: &[LargeTrade]) -> Option<&'static str> {
    let window = &trades[..trades.len().min(PATTERN_WINDOW)];

    let whales = window.iter().filter(|t| t.amount > WHALE_TRADE_AMOUNT).count();
    if whales >= 2 {
        return Some("Whale Activity");
    }

    if trades.len() >= 10 {
        let avg_size = window.iter().map(|t| t.size).sum::<f64>() / window.len() as f64;
        if avg_size < RETAIL_AVG_SIZE {
            return Some("Retail Activity");
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Anything that can summarise large-trader flow for a market.
#[async_trait]
pub trait SmartMoneySource: Send + Sync {
    /// `Ok(None)` when the market has no large trades.
    async fn summary(&self, condition_id: &str) -> Result<Option<SmartMoneySummary>>;
}

pub struct SmartMoneyClient {
    http: reqwest::Client,
    data_url: String,
    min_amount: f64,
}

impl SmartMoneyClient {
    pub fn new(config: &PolymarketConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build data API HTTP client")?;

        Ok(Self {
            http,
            data_url: config.data_url.trim_end_matches('/').to_string(),
            min_amount: config.smart_money_min_amount,
        })
    }

    /// Recent trades at or above the notional threshold.
    pub async fn large_trades(&self, condition_id: &str) -> Result<Vec<LargeTrade>> {
        let url = format!("{}/trades", self.data_url);
        let limit = TRADES_PAGE_LIMIT.to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[("market", condition_id), ("limit", limit.as_str())])
            .send()
            .await
            .context("Data API trades request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AugurError::Platform {
                platform: "data-api".into(),
                message: format!("HTTP {status}: {body}"),
            }
            .into());
        }

        let raw: Vec<RawTrade> = resp
            .json()
            .await
            .context("Failed to parse data API trades")?;

        let trades: Vec<LargeTrade> = raw
            .iter()
            .filter_map(|t| LargeTrade::from_raw(t, self.min_amount))
            .collect();

        debug!(
            condition_id,
            raw = raw.len(),
            large = trades.len(),
            "Fetched market trades"
        );
        Ok(trades)
    }
}

#[async_trait]
impl SmartMoneySource for SmartMoneyClient {
    async fn summary(&self, condition_id: &str) -> Result<Option<SmartMoneySummary>> {
        let trades = self.large_trades(condition_id).await?;
        Ok(SmartMoneySummary::from_trades(&trades))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
