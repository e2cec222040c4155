//! Polymarket integrations.
//!
//! Defines the async seams the engine talks to and provides the HTTP
//! implementations:
//! - `polymarket`: Gamma market discovery and CLOB order book prices
//! - `smart_money`: large-trader flow from the data API
//! - `wallet`: USDC bankroll from a Polygon RPC node

pub mod polymarket;
pub mod smart_money;
pub mod wallet;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Market, Side, TradeReceipt};

/// Which side of the order book to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Source of tradeable markets and live prices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// Up to `limit` open markets, highest volume first.
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>>;

    /// Best executable price for an outcome token, if the book has one.
    async fn best_price(&self, token_id: &str, side: OrderSide) -> Result<Option<f64>>;
}

/// A fully priced order ready for placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market_id: String,
    pub token_id: String,
    pub side: Side,
    /// USDC committed.
    pub amount: f64,
    pub price: f64,
    pub shares: f64,
}

/// Places orders on an exchange (or a paper book).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderPlacer: Send + Sync {
    async fn place_order(&self, order: &OrderRequest) -> Result<TradeReceipt>;

    /// True when orders never reach a real exchange.
    fn is_paper(&self) -> bool;
}
