//! Kelly criterion position sizing.
//!
//! Two sizing strategies, used on different paths:
//!
//! - [`ProbabilityKelly`] (single-estimate analysis): classic Kelly on the
//!   decimal odds implied by the market, scaled by a fractional multiplier
//!   and capped at a fraction of bankroll.
//! - [`ConfidenceKelly`] (consensus execution): half-Kelly on the edge scaled
//!   by the panel's confidence, clamped to absolute dollar bounds.
//!
//! Both round to cents and never return a negative size.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::edge::edge;
use super::{round_currency, Rejection, SizingDecision};
use crate::config::StrategyConfig;
use crate::types::Side;

/// Which sizing strategy produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizingStrategy {
    /// Fractional Kelly on market odds (single estimate).
    ProbabilityKelly,
    /// Confidence-scaled half-Kelly (consensus).
    ConfidenceKelly,
}

// ---------------------------------------------------------------------------
// Probability-based fractional Kelly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProbabilityKelly {
    /// Fractional Kelly multiplier (0.25 = quarter-Kelly).
    pub kelly_fraction: f64,
    /// Maximum bet as a fraction of bankroll.
    pub max_bet_fraction: f64,
    /// Minimum |edge| required to bet.
    pub min_edge_fraction: f64,
}

impl ProbabilityKelly {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            kelly_fraction: config.kelly_fraction,
            max_bet_fraction: config.max_bet_fraction,
            min_edge_fraction: config.min_edge_fraction,
        }
    }

    /// Size a bet from one probability estimate.
    ///
    /// Kelly formula: f* = (bp - q) / b
    /// where:
    ///   b = decimal odds - 1
    ///   p = win probability of the chosen side
    ///   q = 1 - p
    pub fn size(
        &self,
        estimated_probability: f64,
        market_probability: f64,
        bankroll: f64,
    ) -> SizingDecision {
        let strategy = SizingStrategy::ProbabilityKelly;
        let signed_edge = edge(estimated_probability, market_probability);

        if !signed_edge.is_finite() || !(0.0..=1.0).contains(&market_probability) {
            return SizingDecision::reject(
                Rejection::DegenerateOdds(market_probability),
                strategy,
                signed_edge,
            );
        }

        if signed_edge.abs() < self.min_edge_fraction {
            return SizingDecision::reject(
                Rejection::InsufficientEdge {
                    edge: signed_edge,
                    minimum: self.min_edge_fraction,
                },
                strategy,
                signed_edge,
            );
        }

        if bankroll <= 0.0 {
            return SizingDecision::reject(Rejection::NoBankroll(bankroll), strategy, signed_edge);
        }

        let (side, win_prob, side_price) = if signed_edge > 0.0 {
            (Side::Yes, estimated_probability, market_probability)
        } else {
            (Side::No, 1.0 - estimated_probability, 1.0 - market_probability)
        };

        // A side priced at 0 has infinite odds, at 1 it pays nothing.
        if side_price <= 0.0 || side_price >= 1.0 {
            return SizingDecision::reject(
                Rejection::DegenerateOdds(market_probability),
                strategy,
                signed_edge,
            );
        }

        let odds = 1.0 / side_price;
        let b = odds - 1.0;
        let q = 1.0 - win_prob;
        let raw_fraction = if b > 0.0 { (b * win_prob - q) / b } else { 0.0 };

        let adjusted = raw_fraction * self.kelly_fraction;
        let capped = adjusted.min(self.max_bet_fraction).max(0.0);
        let bet_size = round_currency(bankroll * capped);

        debug!(
            side = %side,
            raw_kelly = format!("{:.2}%", raw_fraction * 100.0),
            fractional = format!("{:.2}%", capped * 100.0),
            bet_size = format!("${:.2}", bet_size),
            "Probability Kelly sized"
        );

        let reason = format!(
            "BET ${bet_size:.2} on {side} (edge {:.1}%, Kelly {:.1}% x {} capped at {:.1}%)",
            signed_edge.abs() * 100.0,
            raw_fraction * 100.0,
            self.kelly_fraction,
            self.max_bet_fraction * 100.0,
        );

        SizingDecision::trade(side, bet_size, capped, signed_edge, strategy, reason)
    }
}

impl Default for ProbabilityKelly {
    fn default() -> Self {
        Self::from_config(&StrategyConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Confidence-scaled half-Kelly
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConfidenceKelly {
    /// Largest bet in USDC.
    pub max_bet_size: f64,
    /// Smallest non-zero bet in USDC.
    pub min_bet_size: f64,
}

impl ConfidenceKelly {
    pub fn from_config(config: &StrategyConfig) -> Self {
        Self {
            max_bet_size: config.max_bet_size_absolute,
            min_bet_size: config.min_bet_size_absolute,
        }
    }

    /// Size a bet on `side` from the panel's edge and confidence (1–10).
    ///
    /// `fraction = |edge| * (confidence / 10) * 0.5`, then
    /// `size = bankroll * fraction` clamped to the absolute bounds.
    pub fn size(&self, side: Side, edge: f64, confidence: f64, bankroll: f64) -> SizingDecision {
        let strategy = SizingStrategy::ConfidenceKelly;

        if !edge.is_finite() || !confidence.is_finite() {
            return SizingDecision::reject(Rejection::ZeroSize, strategy, edge);
        }
        if bankroll <= 0.0 {
            return SizingDecision::reject(Rejection::NoBankroll(bankroll), strategy, edge);
        }

        let confidence = confidence.clamp(0.0, 10.0);
        let fraction = edge.abs() * (confidence / 10.0) * 0.5;
        let raw_size = bankroll * fraction;

        if raw_size <= 0.0 {
            return SizingDecision::reject(Rejection::ZeroSize, strategy, edge);
        }

        // The floor must never commit more than the bankroll holds.
        if bankroll < self.min_bet_size {
            return SizingDecision::reject(
                Rejection::BankrollBelowMinimum {
                    bankroll,
                    minimum: self.min_bet_size,
                },
                strategy,
                edge,
            );
        }

        let size = round_currency(raw_size.min(self.max_bet_size).max(self.min_bet_size));

        debug!(
            side = %side,
            fraction = format!("{:.2}%", fraction * 100.0),
            raw = format!("${:.2}", raw_size),
            size = format!("${:.2}", size),
            "Confidence Kelly sized"
        );

        let reason = format!(
            "BET ${size:.2} on {side} (half-Kelly {:.1}% of ${bankroll:.2}, bounds ${:.2}-${:.2})",
            fraction * 100.0,
            self.min_bet_size,
            self.max_bet_size,
        );

        SizingDecision::trade(side, size, fraction, edge, strategy, reason)
    }

    /// Size with the side taken from the sign of `edge`. A zero edge does not trade.
    pub fn size_for_edge(&self, edge: f64, confidence: f64, bankroll: f64) -> SizingDecision {
        if edge > 0.0 {
            self.size(Side::Yes, edge, confidence, bankroll)
        } else if edge < 0.0 {
            self.size(Side::No, edge, confidence, bankroll)
        } else {
            SizingDecision::reject(Rejection::ZeroSize, SizingStrategy::ConfidenceKelly, edge)
        }
    }
}

impl Default for ConfidenceKelly {
    fn default() -> Self {
        Self::from_config(&StrategyConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
