//! Trade signal gate.
//!
//! Checked in order, first failure wins: the action must be directional,
//! confidence must reach the minimum, and the panel must have agreed.

use super::Rejection;
use crate::config::StrategyConfig;
use crate::types::{Action, Direction};

pub struct SignalValidator {
    min_confidence: f64,
    min_votes: usize,
}

impl SignalValidator {
    pub fn new(min_confidence: f64, min_votes: usize) -> Self {
        Self {
            min_confidence,
            min_votes,
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.min_confidence, config.min_votes)
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    /// Returns a human-readable justification when the signal may trade.
    pub fn validate(
        &self,
        action: Action,
        edge: f64,
        confidence: f64,
        direction: Direction,
    ) -> Result<String, Rejection> {
        if !action.is_trade() {
            return Err(Rejection::NonTradeAction(action));
        }

        if confidence < self.min_confidence {
            return Err(Rejection::InsufficientConfidence {
                confidence,
                minimum: self.min_confidence,
            });
        }

        match direction {
            Direction::Mixed => {
                return Err(Rejection::InsufficientConsensus {
                    needed: self.min_votes,
                })
            }
            Direction::Error => return Err(Rejection::NoEstimatesAvailable),
            Direction::Bullish | Direction::Bearish => {}
        }

        Ok(format!(
            "AI consensus: {direction} with {confidence:.1}/10 confidence (edge {:+.1}%)",
            edge * 100.0
        ))
    }
}

impl Default for SignalValidator {
    fn default() -> Self {
        Self::from_config(&StrategyConfig::default())
    }
}
