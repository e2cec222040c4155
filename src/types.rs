//! Shared types for the AUGUR agent.
//!
//! These types form the data model used across all modules. Everything
//! here is constructed once per analysis cycle and never mutated after
//! construction, so values can be cloned freely into history logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Market
// ---------------------------------------------------------------------------

/// An active Polymarket binary market, already reshaped from the Gamma API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    /// Condition id used by the trade and data APIs (falls back to `id`).
    pub condition_id: String,
    pub question: String,
    pub description: String,
    /// Resolution time, if the API reported a parseable one.
    pub end_date: Option<DateTime<Utc>>,
    /// Lifetime volume in USDC.
    pub volume: f64,
    pub liquidity: f64,
    /// Current YES price (0.0–1.0)
    pub yes_price: f64,
    /// Current NO price (0.0–1.0)
    pub no_price: f64,
    /// Outcome token ids: `[YES, NO]` when both are present.
    pub token_ids: Vec<String>,
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (YES: {:.0}¢ | NO: {:.0}¢ | vol: ${:.0})",
            self.question,
            self.yes_price * 100.0,
            self.no_price * 100.0,
            self.volume,
        )
    }
}

impl Market {
    /// Read-only quote handed to the decision core.
    pub fn quote(&self) -> MarketQuote {
        MarketQuote {
            question: self.question.clone(),
            market_probability: self.yes_price,
        }
    }

    /// Token id for the given outcome side.
    pub fn token_for(&self, side: Side) -> Option<&str> {
        let idx = match side {
            Side::Yes => 0,
            Side::No => 1,
        };
        self.token_ids
            .get(idx)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }

    /// Quoted price of the given outcome side.
    pub fn price_for(&self, side: Side) -> f64 {
        match side {
            Side::Yes => self.yes_price,
            Side::No => self.no_price,
        }
    }

    /// Whether the market is still open at `now` (unknown end dates count as open).
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.end_date.map_or(true, |end| end > now)
    }
}

/// Market data as seen by the decision core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub question: String,
    /// Market-implied YES probability (0.0–1.0).
    pub market_probability: f64,
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Outcome side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Yes,
    No,
}

impl Side {
    /// The opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Yes => write!(f, "YES"),
            Side::No => write!(f, "NO"),
        }
    }
}

/// Direction the model panel agreed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Bullish,
    Bearish,
    Mixed,
    /// No model produced an estimate.
    Error,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Bullish => write!(f, "BULLISH"),
            Direction::Bearish => write!(f, "BEARISH"),
            Direction::Mixed => write!(f, "MIXED"),
            Direction::Error => write!(f, "ERROR"),
        }
    }
}

/// Recommended action label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "BET YES")]
    BetYes,
    #[serde(rename = "BET NO")]
    BetNo,
    #[serde(rename = "SKIP")]
    Skip,
}

impl Action {
    /// Side traded by a directional action; `None` for `Skip`.
    pub fn side(&self) -> Option<Side> {
        match self {
            Action::BetYes => Some(Side::Yes),
            Action::BetNo => Some(Side::No),
            Action::Skip => None,
        }
    }

    pub fn is_trade(&self) -> bool {
        self.side().is_some()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::BetYes => write!(f, "BET YES"),
            Action::BetNo => write!(f, "BET NO"),
            Action::Skip => write!(f, "SKIP"),
        }
    }
}

/// Parse an action label (case-insensitive). `BUY YES`/`BUY NO` are accepted
/// as aliases; anything unrecognised is an error.
impl std::str::FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BET YES" | "BUY YES" => Ok(Action::BetYes),
            "BET NO" | "BUY NO" => Ok(Action::BetNo),
            "SKIP" | "HOLD" => Ok(Action::Skip),
            _ => Err(anyhow::anyhow!("Unknown action: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Estimates
// ---------------------------------------------------------------------------

/// One model's view of one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityEstimate {
    pub model_name: String,
    /// Estimated YES probability (0.0–1.0).
    pub probability: f64,
    /// Self-reported confidence (1–10).
    pub confidence: f64,
    pub reasoning: String,
}

impl ProbabilityEstimate {
    /// Build an estimate, clamping probability to [0, 1] and confidence to [1, 10].
    pub fn new(
        model_name: impl Into<String>,
        probability: f64,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            probability: probability.clamp(0.0, 1.0),
            confidence: confidence.clamp(1.0, 10.0),
            reasoning: reasoning.into(),
        }
    }
}

impl fmt::Display for ProbabilityEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.0}% (conf {:.0}/10)",
            self.model_name,
            self.probability * 100.0,
            self.confidence,
        )
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Receipt returned after an order is handed to the exchange (or the paper book).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub order_id: String,
    pub token_id: String,
    pub side: Side,
    /// USDC committed.
    pub amount: f64,
    pub price: f64,
    /// Shares bought (`amount / price`).
    pub shares: f64,
    pub paper: bool,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for TradeReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} {} ${:.2} @ {:.3} ({:.4} shares)",
            if self.paper { "[PAPER] " } else { "" },
            self.order_id,
            self.side,
            self.amount,
            self.price,
            self.shares,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for AUGUR.
#[derive(Debug, thiserror::Error)]
pub enum AugurError {
    #[error("Platform error ({platform}): {message}")]
    Platform { platform: String, message: String },

    #[error("Model error ({model}): {message}")]
    Llm { model: String, message: String },

    #[error("Could not parse model response: {0}")]
    Parse(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
