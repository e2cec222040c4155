//! Strategy engine: consensus, signal validation and Kelly sizing.
//!
//! Everything in here is a pure function of its inputs: no I/O, no shared
//! state, no randomness. Model estimates, market prices and the bankroll are
//! resolved by collaborators before they reach this module.

pub mod consensus;
pub mod edge;
pub mod kelly;
pub mod validator;

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::StrategyConfig;
use crate::types::{Action, MarketQuote, ProbabilityEstimate, Side};
use consensus::{ConsensusAggregator, ConsensusResult};
use kelly::{ConfidenceKelly, ProbabilityKelly, SizingStrategy};
use validator::SignalValidator;

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Why a signal did not turn into a trade. Always recoverable: callers skip
/// the market and try again next cycle.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Rejection {
    #[error("Action is {0} - no trade")]
    NonTradeAction(Action),

    #[error("Confidence {confidence:.1}/10 below minimum {minimum}")]
    InsufficientConfidence { confidence: f64, minimum: f64 },

    #[error("No clear model consensus (need {needed}+ models agreeing)")]
    InsufficientConsensus { needed: usize },

    #[error("All models failed - no estimates available")]
    NoEstimatesAvailable,

    #[error("Edge {edge:+.3} below minimum {minimum:.3}")]
    InsufficientEdge { edge: f64, minimum: f64 },

    #[error("Degenerate odds at market probability {0}")]
    DegenerateOdds(f64),

    #[error("Bankroll ${0:.2} leaves nothing to size")]
    NoBankroll(f64),

    #[error("Bankroll ${bankroll:.2} below minimum bet ${minimum:.2}")]
    BankrollBelowMinimum { bankroll: f64, minimum: f64 },

    #[error("Computed position size is zero")]
    ZeroSize,
}

// ---------------------------------------------------------------------------
// Sizing decision
// ---------------------------------------------------------------------------

/// Terminal output of the decision core.
///
/// Constructed only through [`SizingDecision::trade`] and
/// [`SizingDecision::reject`], which guarantee that a tradeable decision has
/// a side and a strictly positive size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingDecision {
    should_trade: bool,
    side: Option<Side>,
    size: f64,
    /// Bankroll fraction actually applied (after multipliers and caps).
    kelly_fraction: f64,
    edge: f64,
    strategy: SizingStrategy,
    reason: String,
}

impl SizingDecision {
    /// A sized trade. Falls back to a rejection if `size` is not positive.
    pub fn trade(
        side: Side,
        size: f64,
        kelly_fraction: f64,
        edge: f64,
        strategy: SizingStrategy,
        reason: String,
    ) -> Self {
        if !(size > 0.0) {
            return Self::reject(Rejection::ZeroSize, strategy, edge);
        }
        Self {
            should_trade: true,
            side: Some(side),
            size,
            kelly_fraction,
            edge,
            strategy,
            reason,
        }
    }

    pub fn reject(rejection: Rejection, strategy: SizingStrategy, edge: f64) -> Self {
        Self {
            should_trade: false,
            side: None,
            size: 0.0,
            kelly_fraction: 0.0,
            edge,
            strategy,
            reason: rejection.to_string(),
        }
    }

    /// Prefix the reason with upstream context.
    pub fn annotate(mut self, context: &str) -> Self {
        self.reason = format!("{context}; {}", self.reason);
        self
    }

    pub fn should_trade(&self) -> bool {
        self.should_trade
    }

    pub fn side(&self) -> Option<Side> {
        self.side
    }

    /// Size in USDC, rounded to cents. Zero when not trading.
    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn kelly_fraction(&self) -> f64 {
        self.kelly_fraction
    }

    pub fn edge(&self) -> f64 {
        self.edge
    }

    pub fn strategy(&self) -> SizingStrategy {
        self.strategy
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Round a dollar amount to cents (midpoint away from zero). Non-finite
/// input rounds to zero.
pub fn round_currency(amount: f64) -> f64 {
    Decimal::from_f64(amount)
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(0.0)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Consensus plus the decision derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub consensus: ConsensusResult,
    pub decision: SizingDecision,
}

/// Pipelines consensus → validation → sizing for one market.
///
/// Construct once from the strategy configuration and reuse; it holds no
/// per-market state.
pub struct StrategyPipeline {
    config: StrategyConfig,
    aggregator: ConsensusAggregator,
    validator: SignalValidator,
    probability_kelly: ProbabilityKelly,
    confidence_kelly: ConfidenceKelly,
}

impl StrategyPipeline {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            aggregator: ConsensusAggregator::from_config(&config),
            validator: SignalValidator::from_config(&config),
            probability_kelly: ProbabilityKelly::from_config(&config),
            confidence_kelly: ConfidenceKelly::from_config(&config),
            config,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Evaluate a market from the whole panel's estimates (confidence Kelly).
    pub fn evaluate(
        &self,
        quote: &MarketQuote,
        estimates: &[ProbabilityEstimate],
        bankroll: f64,
    ) -> Evaluation {
        let consensus = self.aggregator.aggregate(estimates, quote.market_probability);

        let decision = match self.validator.validate(
            consensus.action,
            consensus.average_edge,
            consensus.average_confidence,
            consensus.direction,
        ) {
            Ok(justification) => match consensus.action.side() {
                Some(side) => self
                    .confidence_kelly
                    .size(
                        side,
                        consensus.average_edge,
                        consensus.average_confidence,
                        bankroll,
                    )
                    .annotate(&justification),
                None => SizingDecision::reject(
                    Rejection::NonTradeAction(consensus.action),
                    SizingStrategy::ConfidenceKelly,
                    consensus.average_edge,
                ),
            },
            Err(rejection) => {
                debug!(reason = %rejection, "Signal rejected");
                SizingDecision::reject(
                    rejection,
                    SizingStrategy::ConfidenceKelly,
                    consensus.average_edge,
                )
            }
        };

        info!(
            market = %truncate(&quote.question, 40),
            consensus = %consensus.direction,
            action = %consensus.action,
            edge = format!("{:+.1}%", consensus.average_edge * 100.0),
            trade = decision.should_trade(),
            size = format!("${:.2}", decision.size()),
            "Market evaluated"
        );

        Evaluation {
            consensus,
            decision,
        }
    }

    /// Evaluate a market from a single estimate (probability Kelly).
    pub fn evaluate_single(
        &self,
        quote: &MarketQuote,
        estimate: &ProbabilityEstimate,
        bankroll: f64,
    ) -> SizingDecision {
        let decision =
            self.probability_kelly
                .size(estimate.probability, quote.market_probability, bankroll);

        info!(
            market = %truncate(&quote.question, 40),
            model = %estimate.model_name,
            estimate = format!("{:.1}%", estimate.probability * 100.0),
            market_prob = format!("{:.1}%", quote.market_probability * 100.0),
            trade = decision.should_trade(),
            size = format!("${:.2}", decision.size()),
            "Single estimate evaluated"
        );

        decision
    }
}

/// Truncate on a char boundary for log/display output.
pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
