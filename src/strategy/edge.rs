//! Edge calculation and per-model vote classification.
//!
//! The edge is the signed gap between a model's probability and the
//! market-implied probability. Positive edge favours YES.

use serde::{Deserialize, Serialize};

/// Signed edge: `estimated - market`. No bounds are enforced; callers
/// interpret sign and magnitude.
pub fn edge(estimated_probability: f64, market_probability: f64) -> f64 {
    estimated_probability - market_probability
}

/// How a single estimate votes once its edge is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Yes,
    No,
    Hold,
}

impl Vote {
    /// Classify an edge against a symmetric threshold. Edges exactly on the
    /// threshold hold.
    pub fn classify(edge: f64, threshold: f64) -> Self {
        if edge > threshold {
            Vote::Yes
        } else if edge < -threshold {
            Vote::No
        } else {
            Vote::Hold
        }
    }
}
