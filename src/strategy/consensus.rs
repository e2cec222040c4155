//! Multi-model consensus.
//!
//! Each model casts a YES/NO/HOLD vote from its own edge. A direction is
//! only reached when a bloc of at least `min_votes` models agrees; anything
//! else is MIXED and resolves to SKIP. Averages are taken over the models
//! that actually answered, so a failed model is excluded rather than
//! counted as zero.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::edge::{edge, Vote};
use crate::config::StrategyConfig;
use crate::types::{Action, Direction, ProbabilityEstimate};

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Aggregated view of one market across the model panel.
///
/// `yes_votes + no_votes + hold_votes == estimates.len()` always holds.
/// When no estimates were available the direction is `Error`, the action is
/// `Skip` and every average is zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub direction: Direction,
    pub action: Action,
    pub market_probability: f64,
    pub average_probability: f64,
    pub average_confidence: f64,
    pub average_edge: f64,
    pub yes_votes: usize,
    pub no_votes: usize,
    pub hold_votes: usize,
    /// Contributing estimates, in panel order.
    pub estimates: Vec<ProbabilityEstimate>,
}

impl ConsensusResult {
    /// True when every model failed.
    pub fn is_error(&self) -> bool {
        self.direction == Direction::Error
    }

    pub fn models_used(&self) -> usize {
        self.estimates.len()
    }

    /// One-line summary: `[BULLISH] gpt-4o-mini: 70% | gemini-2.5-flash: 64%`.
    pub fn summary(&self) -> String {
        let votes: Vec<String> = self
            .estimates
            .iter()
            .map(|e| format!("{}: {:.0}%", e.model_name, e.probability * 100.0))
            .collect();
        format!("[{}] {}", self.direction, votes.join(" | "))
    }
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

pub struct ConsensusAggregator {
    threshold: f64,
    min_votes: usize,
}

impl ConsensusAggregator {
    pub fn new(threshold: f64, min_votes: usize) -> Self {
        Self {
            threshold,
            min_votes: min_votes.max(1),
        }
    }

    pub fn from_config(config: &StrategyConfig) -> Self {
        Self::new(config.yes_no_threshold, config.min_votes)
    }

    /// Combine the panel's estimates for one market.
    pub fn aggregate(
        &self,
        estimates: &[ProbabilityEstimate],
        market_probability: f64,
    ) -> ConsensusResult {
        if estimates.is_empty() {
            debug!("No estimates to aggregate");
            return ConsensusResult {
                direction: Direction::Error,
                action: Action::Skip,
                market_probability,
                average_probability: 0.0,
                average_confidence: 0.0,
                average_edge: 0.0,
                yes_votes: 0,
                no_votes: 0,
                hold_votes: 0,
                estimates: Vec::new(),
            };
        }

        let (mut yes_votes, mut no_votes, mut hold_votes) = (0usize, 0usize, 0usize);
        for estimate in estimates {
            match Vote::classify(edge(estimate.probability, market_probability), self.threshold) {
                Vote::Yes => yes_votes += 1,
                Vote::No => no_votes += 1,
                Vote::Hold => hold_votes += 1,
            }
        }

        let n = estimates.len() as f64;
        let average_probability = estimates.iter().map(|e| e.probability).sum::<f64>() / n;
        let average_confidence = estimates.iter().map(|e| e.confidence).sum::<f64>() / n;
        let average_edge = edge(average_probability, market_probability);

        let (direction, action) = self.decide(yes_votes, no_votes);

        debug!(
            yes_votes,
            no_votes,
            hold_votes,
            direction = %direction,
            avg_prob = format!("{:.1}%", average_probability * 100.0),
            avg_edge = format!("{:+.1}%", average_edge * 100.0),
            "Consensus computed"
        );

        ConsensusResult {
            direction,
            action,
            market_probability,
            average_probability,
            average_confidence,
            average_edge,
            yes_votes,
            no_votes,
            hold_votes,
            estimates: estimates.to_vec(),
        }
    }

    /// Direction rule. A bloc needs `min_votes`; if both sides have a bloc the
    /// larger wins and an equal split is MIXED.
    fn decide(&self, yes_votes: usize, no_votes: usize) -> (Direction, Action) {
        let yes_bloc = yes_votes >= self.min_votes;
        let no_bloc = no_votes >= self.min_votes;

        match (yes_bloc, no_bloc) {
            (true, false) => (Direction::Bullish, Action::BetYes),
            (false, true) => (Direction::Bearish, Action::BetNo),
            (true, true) if yes_votes > no_votes => (Direction::Bullish, Action::BetYes),
            (true, true) if no_votes > yes_votes => (Direction::Bearish, Action::BetNo),
            _ => (Direction::Mixed, Action::Skip),
        }
    }
}

impl Default for ConsensusAggregator {
    fn default() -> Self {
        Self::from_config(&StrategyConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
