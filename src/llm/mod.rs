//! Model panel for fair-value probability estimation.
//!
//! Defines the `ProbabilityEstimator` trait, the shared prompt/response
//! format, and `ModelPanel`, which queries several estimators for the same
//! market and keeps whatever answers come back.

pub mod gateway;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{AugurError, ProbabilityEstimate};

/// Confidence assumed when a model omits its CONFIDENCE line.
const DEFAULT_CONFIDENCE: f64 = 5.0;

/// Longest reasoning kept per estimate (chars).
const MAX_REASONING_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// What every model in the panel is asked about.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateRequest {
    pub question: String,
    /// Current YES price (0.0–1.0).
    pub market_probability: f64,
    /// Optional pre-rendered context block (smart-money flow, etc).
    pub context: Option<String>,
}

impl EstimateRequest {
    pub fn new(question: impl Into<String>, market_probability: f64) -> Self {
        Self {
            question: question.into(),
            market_probability,
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<String>) -> Self {
        self.context = context;
        self
    }
}

/// Build the user prompt sent to every model.
pub fn build_prompt(request: &EstimateRequest) -> String {
    let mut prompt = String::with_capacity(512);

    prompt.push_str("Analyze this prediction market:\n\n");
    prompt.push_str(&format!("Question: {}\n", request.question));
    prompt.push_str(&format!(
        "Current market odds: {:.1}% YES\n",
        request.market_probability * 100.0
    ));

    if let Some(context) = request.context.as_deref().filter(|c| !c.is_empty()) {
        prompt.push('\n');
        prompt.push_str(context);
        prompt.push('\n');
    }

    prompt.push_str(
        "\nRespond in this exact format:\n\
         PROBABILITY: [your estimated probability 0-100]\n\
         CONFIDENCE: [your confidence 1-10]\n\
         REASONING: [1 sentence]",
    );

    prompt
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Short display name for a model id: `openai/gpt-4o-mini` -> `gpt-4o-mini`.
pub fn display_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

/// Parse a `PROBABILITY/CONFIDENCE/REASONING` reply.
///
/// A missing or unreadable probability is an error: the model counts as
/// failed rather than silently agreeing with the market.
pub fn parse_response(model_name: &str, text: &str) -> Result<ProbabilityEstimate, AugurError> {
    let mut probability: Option<f64> = None;
    let mut confidence: Option<f64> = None;
    let mut reasoning = String::new();

    for line in text.lines() {
        let line = line.trim().trim_start_matches(['*', '-', '#', ' ']);
        if let Some(value) = strip_label(line, "PROBABILITY:") {
            probability = probability.or_else(|| parse_probability(value));
        } else if let Some(value) = strip_label(line, "CONFIDENCE:") {
            confidence = confidence.or_else(|| leading_number(value).map(|(n, _, _)| n));
        } else if let Some(value) = strip_label(line, "REASONING:") {
            if reasoning.is_empty() {
                reasoning = value.trim().trim_matches('*').trim().to_string();
            }
        }
    }

    let probability = probability.ok_or_else(|| {
        AugurError::Parse(format!("no PROBABILITY line in response from {model_name}"))
    })?;

    if reasoning.chars().count() > MAX_REASONING_CHARS {
        reasoning = reasoning.chars().take(MAX_REASONING_CHARS).collect();
    }

    Ok(ProbabilityEstimate::new(
        model_name,
        probability,
        confidence.unwrap_or(DEFAULT_CONFIDENCE),
        reasoning,
    ))
}

/// Case-insensitive label match; returns the text after the label.
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if head.eq_ignore_ascii_case(label) {
        line.get(label.len()..)
    } else {
        None
    }
}

/// `65`, `65%`, `65.5` are percentages; `0.65` is a fraction.
fn parse_probability(value: &str) -> Option<f64> {
    let (n, raw, rest) = leading_number(value)?;
    let percent = rest.trim_start().starts_with('%');
    let fraction = !percent && raw.contains('.') && n <= 1.0;
    let p = if fraction { n } else { n / 100.0 };
    Some(p.clamp(0.0, 1.0))
}

/// First number in `value`, skipping leading markup. Returns the value, its
/// digits and the remaining text.
fn leading_number(value: &str) -> Option<(f64, &str, &str)> {
    let value = value.trim_start_matches(|c: char| c == '[' || c == '*' || c.is_whitespace());
    let end = value
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(value.len());
    let (raw, rest) = value.split_at(end);
    raw.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .map(|n| (n, raw, rest))
}

// ---------------------------------------------------------------------------
// Estimator trait
// ---------------------------------------------------------------------------

/// Abstraction over a single model that can price a market.
#[async_trait]
pub trait ProbabilityEstimator: Send + Sync {
    async fn estimate(&self, request: &EstimateRequest) -> Result<ProbabilityEstimate>;

    /// Short display name (used in estimates and logs).
    fn model_name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Panel
// ---------------------------------------------------------------------------

/// A model that did not produce an estimate this round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model: String,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct PanelOutcome {
    /// Successful estimates, in panel order.
    pub estimates: Vec<ProbabilityEstimate>,
    pub failures: Vec<ModelFailure>,
}

/// Fixed set of independent estimators queried together.
#[derive(Clone)]
pub struct ModelPanel {
    estimators: Vec<Arc<dyn ProbabilityEstimator>>,
}

impl ModelPanel {
    pub fn new(estimators: Vec<Arc<dyn ProbabilityEstimator>>) -> Self {
        Self { estimators }
    }

    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    pub fn model_names(&self) -> Vec<String> {
        self.estimators
            .iter()
            .map(|e| e.model_name().to_string())
            .collect()
    }

    /// Query every estimator concurrently. Individual failures are recorded,
    /// never propagated.
    pub async fn collect(&self, request: &EstimateRequest) -> PanelOutcome {
        let results = join_all(self.estimators.iter().map(|e| e.estimate(request))).await;

        let mut outcome = PanelOutcome::default();
        for (estimator, result) in self.estimators.iter().zip(results) {
            match result {
                Ok(estimate) => {
                    debug!(
                        model = %estimator.model_name(),
                        probability = format!("{:.1}%", estimate.probability * 100.0),
                        confidence = estimate.confidence,
                        "Model estimate received"
                    );
                    outcome.estimates.push(estimate);
                }
                Err(e) => {
                    warn!(model = %estimator.model_name(), error = %e, "Model failed");
                    outcome.failures.push(ModelFailure {
                        model: estimator.model_name().to_string(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
