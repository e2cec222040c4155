//! Core engine: the fetch → panel → decide → execute cycle.
//!
//! `Agent` owns the collaborators (market source, model panel, bankroll,
//! executor) and a shared, bounded history that the dashboard reads.
//! A failure on one market is logged and the cycle moves on.

pub mod executor;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::llm::{EstimateRequest, ModelFailure, ModelPanel, ProbabilityEstimator};
use crate::platforms::smart_money::{SmartMoneySource, SmartMoneySummary};
use crate::platforms::wallet::BalanceSource;
use crate::platforms::{MarketSource, OrderPlacer};
use crate::storage::{self, Journal};
use crate::strategy::consensus::ConsensusResult;
use crate::strategy::{SizingDecision, StrategyPipeline};
use crate::types::{AugurError, Market, ProbabilityEstimate, TradeReceipt};
use executor::Executor;

/// Decisions kept in memory for the dashboard.
pub const DECISION_HISTORY_LIMIT: usize = 30;

/// Trades kept in memory for the dashboard.
pub const TRADE_HISTORY_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Everything decided about one market in one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub timestamp: DateTime<Utc>,
    pub market_id: String,
    pub question: String,
    pub market_probability: f64,
    pub consensus: ConsensusResult,
    pub decision: SizingDecision,
    #[serde(default)]
    pub failures: Vec<ModelFailure>,
    #[serde(default)]
    pub smart_money: Option<SmartMoneySummary>,
    /// Order placed for this decision, if any.
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub market_id: String,
    pub question: String,
    pub receipt: TradeReceipt,
    pub reason: String,
}

/// Outcome of one `run_cycle`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub markets_fetched: usize,
    pub markets_analyzed: usize,
    pub signals: usize,
    pub trades: usize,
    pub errors: usize,
    pub bankroll: f64,
}

/// Single-model analysis (probability Kelly).
#[derive(Debug, Clone)]
pub struct SingleAnalysis {
    pub estimate: ProbabilityEstimate,
    pub decision: SizingDecision,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Live agent state shared with the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct AgentState {
    pub started_at: DateTime<Utc>,
    pub cycle_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Scheduled cycles run only while set; the dashboard flips it.
    pub running: bool,
    pub auto_trade: bool,
    pub bankroll: f64,
    pub decisions: VecDeque<DecisionRecord>,
    pub trades: VecDeque<TradeRecord>,
}

impl AgentState {
    pub fn new(bankroll: f64, auto_trade: bool) -> Self {
        Self {
            started_at: Utc::now(),
            cycle_count: 0,
            last_run: None,
            last_error: None,
            running: true,
            auto_trade,
            bankroll,
            decisions: VecDeque::with_capacity(DECISION_HISTORY_LIMIT),
            trades: VecDeque::with_capacity(TRADE_HISTORY_LIMIT),
        }
    }

    pub fn push_decision(&mut self, record: DecisionRecord) {
        self.decisions.push_back(record);
        while self.decisions.len() > DECISION_HISTORY_LIMIT {
            self.decisions.pop_front();
        }
    }

    pub fn push_trade(&mut self, record: TradeRecord) {
        self.trades.push_back(record);
        while self.trades.len() > TRADE_HISTORY_LIMIT {
            self.trades.pop_front();
        }
    }

    /// Most recent `n` decisions, newest first.
    pub fn recent_decisions(&self, n: usize) -> Vec<DecisionRecord> {
        self.decisions.iter().rev().take(n).cloned().collect()
    }

    /// Most recent `n` trades, newest first.
    pub fn recent_trades(&self, n: usize) -> Vec<TradeRecord> {
        self.trades.iter().rev().take(n).cloned().collect()
    }

    /// Seed history from a saved journal (respecting the limits).
    pub fn restore(&mut self, journal: Journal) {
        for d in journal.decisions {
            self.push_decision(d);
        }
        for t in journal.trades {
            self.push_trade(t);
        }
    }

    pub fn journal(&self) -> Journal {
        Journal {
            saved_at: Utc::now(),
            decisions: self.decisions.iter().cloned().collect(),
            trades: self.trades.iter().cloned().collect(),
        }
    }
}

pub type SharedState = Arc<RwLock<AgentState>>;

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Collaborators the agent is assembled from.
pub struct Collaborators {
    pub markets: Arc<dyn MarketSource>,
    pub panel: ModelPanel,
    pub single_model: Option<Arc<dyn ProbabilityEstimator>>,
    pub smart_money: Option<Arc<dyn SmartMoneySource>>,
    pub bankroll: Arc<dyn BalanceSource>,
    pub placer: Arc<dyn OrderPlacer>,
}

pub struct Agent {
    name: String,
    markets_fetched: usize,
    markets_per_cycle: usize,
    journal_path: Option<String>,
    markets: Arc<dyn MarketSource>,
    panel: ModelPanel,
    single_model: Option<Arc<dyn ProbabilityEstimator>>,
    smart_money: Option<Arc<dyn SmartMoneySource>>,
    bankroll: Arc<dyn BalanceSource>,
    pipeline: StrategyPipeline,
    executor: Executor,
    state: SharedState,
    cycle_lock: Mutex<()>,
}

impl Agent {
    pub fn new(config: &AppConfig, parts: Collaborators) -> Self {
        let executor = Executor::new(
            parts.markets.clone(),
            parts.placer,
            config.strategy.max_bet_size_absolute,
        );

        Self {
            name: config.agent.name.clone(),
            markets_fetched: config.agent.markets_fetched.max(1),
            markets_per_cycle: config.agent.markets_per_cycle,
            journal_path: config
                .storage
                .enabled
                .then(|| config.storage.journal_path.clone()),
            markets: parts.markets,
            panel: parts.panel,
            single_model: parts.single_model,
            smart_money: parts.smart_money,
            bankroll: parts.bankroll,
            pipeline: StrategyPipeline::new(config.strategy.clone()),
            executor,
            state: Arc::new(RwLock::new(AgentState::new(
                config.agent.bankroll,
                config.execution.auto_trade,
            ))),
            cycle_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle to the shared state (for the dashboard).
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn is_paper(&self) -> bool {
        self.executor.is_paper()
    }

    /// Load the saved journal into history, if storage is enabled.
    ///
    /// Returns whether anything was restored. An unreadable journal is
    /// logged and the agent starts with empty history; the next cycle
    /// overwrites the file.
    pub async fn restore_journal(&self) -> bool {
        let Some(path) = self.journal_path.as_deref() else {
            return false;
        };
        match storage::load_journal(path) {
            Ok(Some(journal)) => {
                let mut state = self.state.write().await;
                state.restore(journal);
                info!(
                    decisions = state.decisions.len(),
                    trades = state.trades.len(),
                    "Journal restored"
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(path, error = %format!("{e:#}"), "Journal could not be restored, starting fresh");
                false
            }
        }
    }

    /// One full cycle. Orders are only placed when `allow_trading` is set and
    /// auto-trade is currently enabled.
    pub async fn run_cycle(&self, allow_trading: bool) -> Result<CycleReport> {
        let _guard = self.cycle_lock.lock().await;
        let cycle = self.state.read().await.cycle_count + 1;
        info!(agent = %self.name, cycle, "Starting cycle");

        let result = self.run_cycle_inner(cycle, allow_trading).await;

        let mut state = self.state.write().await;
        state.cycle_count = cycle;
        state.last_run = Some(Utc::now());
        match &result {
            Ok(report) => {
                state.last_error = None;
                state.bankroll = report.bankroll;
            }
            Err(e) => state.last_error = Some(format!("{e:#}")),
        }

        if let Some(path) = self.journal_path.as_deref() {
            if let Err(e) = storage::save_journal(&state.journal(), path) {
                error!(error = %e, "Failed to save journal");
            }
        }

        result
    }

    async fn run_cycle_inner(&self, cycle: u64, allow_trading: bool) -> Result<CycleReport> {
        let mut bankroll = self
            .bankroll
            .usdc_balance()
            .await
            .context("Failed to read bankroll")?;

        let markets = self
            .markets
            .fetch_markets(self.markets_fetched)
            .await
            .context("Failed to fetch markets")?;

        let auto_trade = allow_trading && self.state.read().await.auto_trade;

        let mut report = CycleReport {
            cycle,
            markets_fetched: markets.len(),
            bankroll,
            ..Default::default()
        };

        info!(
            fetched = markets.len(),
            analysing = markets.len().min(self.markets_per_cycle),
            bankroll = format!("${bankroll:.2}"),
            auto_trade,
            "Markets fetched"
        );

        for market in markets.iter().take(self.markets_per_cycle) {
            let mut record = match self.analyze_market(market, bankroll).await {
                Ok(record) => record,
                Err(e) => {
                    warn!(market_id = %market.id, error = %e, "Market analysis failed");
                    report.errors += 1;
                    continue;
                }
            };
            report.markets_analyzed += 1;

            if record.decision.should_trade() {
                report.signals += 1;

                if auto_trade {
                    match self.executor.execute(market, &record.decision).await {
                        Ok(receipt) => {
                            bankroll = (bankroll - receipt.amount).max(0.0);
                            record.order_id = Some(receipt.order_id.clone());
                            report.trades += 1;
                            self.state.write().await.push_trade(TradeRecord {
                                market_id: market.id.clone(),
                                question: market.question.clone(),
                                reason: record.decision.reason().to_string(),
                                receipt,
                            });
                        }
                        Err(e) => {
                            warn!(market_id = %market.id, error = %e, "Execution failed");
                            report.errors += 1;
                        }
                    }
                }
            }

            self.state.write().await.push_decision(record);
        }

        report.bankroll = bankroll;

        info!(
            cycle,
            analysed = report.markets_analyzed,
            signals = report.signals,
            trades = report.trades,
            errors = report.errors,
            bankroll = format!("${:.2}", report.bankroll),
            "Cycle complete"
        );

        Ok(report)
    }

    /// Panel analysis of one market (confidence Kelly).
    pub async fn analyze_market(&self, market: &Market, bankroll: f64) -> Result<DecisionRecord> {
        let smart_money = self.smart_money_for(market).await;

        let request = EstimateRequest::new(market.question.clone(), market.yes_price)
            .with_context(smart_money.as_ref().map(SmartMoneySummary::prompt_block));

        let outcome = self.panel.collect(&request).await;
        if outcome.estimates.is_empty() && !outcome.failures.is_empty() {
            warn!(
                market_id = %market.id,
                failures = outcome.failures.len(),
                "Every model failed for this market"
            );
        }

        let evaluation = self
            .pipeline
            .evaluate(&market.quote(), &outcome.estimates, bankroll);

        Ok(DecisionRecord {
            timestamp: Utc::now(),
            market_id: market.id.clone(),
            question: market.question.clone(),
            market_probability: market.yes_price,
            consensus: evaluation.consensus,
            decision: evaluation.decision,
            failures: outcome.failures,
            smart_money,
            order_id: None,
        })
    }

    /// Single-model analysis of one market (probability Kelly).
    pub async fn analyze_single(&self, market: &Market, bankroll: f64) -> Result<SingleAnalysis> {
        let model = self
            .single_model
            .as_ref()
            .ok_or_else(|| AugurError::Config("no single model configured".into()))?;

        let request = EstimateRequest::new(market.question.clone(), market.yes_price);
        let estimate = model
            .estimate(&request)
            .await
            .with_context(|| format!("{} failed on {}", model.model_name(), market.id))?;

        let decision = self
            .pipeline
            .evaluate_single(&market.quote(), &estimate, bankroll);

        Ok(SingleAnalysis { estimate, decision })
    }

    /// Single-model pass over this cycle's markets. Nothing is recorded or
    /// traded; a market whose estimate fails is logged and skipped.
    pub async fn analyze_single_markets(&self) -> Result<Vec<(Market, SingleAnalysis)>> {
        let bankroll = self
            .bankroll
            .usdc_balance()
            .await
            .context("Failed to read bankroll")?;
        let markets = self
            .markets
            .fetch_markets(self.markets_fetched)
            .await
            .context("Failed to fetch markets")?;

        let mut analyses = Vec::new();
        for market in markets.into_iter().take(self.markets_per_cycle) {
            match self.analyze_single(&market, bankroll).await {
                Ok(analysis) => analyses.push((market, analysis)),
                Err(e) => {
                    warn!(market_id = %market.id, error = %format!("{e:#}"), "Single-model analysis failed")
                }
            }
        }
        Ok(analyses)
    }

    /// Smart-money context; any failure means "no signal".
    async fn smart_money_for(&self, market: &Market) -> Option<SmartMoneySummary> {
        let source = self.smart_money.as_ref()?;
        match source.summary(&market.condition_id).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(market_id = %market.id, error = %e, "Smart money lookup failed");
                None
            }
        }
    }

    /// Run cycles on a fixed interval until Ctrl-C.
    pub async fn run_forever(&self, interval: Duration) -> Result<()> {
        let mut ticker = tokio::time::interval(interval);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            interval_secs = interval.as_secs(),
            "Entering main loop. Press Ctrl+C to stop."
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if !self.state.read().await.running {
                        debug!("Agent stopped, skipping scheduled cycle");
                        continue;
                    }
                    if let Err(e) = self.run_cycle(true).await {
                        error!(error = %format!("{e:#}"), "Cycle failed, continuing to next");
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received.");
                    break;
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dashboard control
// ---------------------------------------------------------------------------

/// Operations the dashboard can trigger on a live agent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AgentControl: Send + Sync {
    /// Run one cycle now, trading if auto-trade is on.
    async fn run_once(&self) -> Result<CycleReport>;

    /// Currently active markets.
    async fn markets(&self, limit: usize) -> Result<Vec<Market>>;
}

#[async_trait]
impl AgentControl for Agent {
    async fn run_once(&self) -> Result<CycleReport> {
        self.run_cycle(true).await
    }

    async fn markets(&self, limit: usize) -> Result<Vec<Market>> {
        self.markets.fetch_markets(limit).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::kelly::SizingStrategy;
    use crate::strategy::Rejection;
    use crate::types::{Action, Direction};

    fn record(id: usize) -> DecisionRecord {
        DecisionRecord {
            timestamp: Utc::now(),
            market_id: id.to_string(),
            question: format!("Q{id}?"),
            market_probability: 0.5,
            consensus: ConsensusResult {
                direction: Direction::Mixed,
                action: Action::Skip,
                market_probability: 0.5,
                average_probability: 0.5,
                average_confidence: 5.0,
                average_edge: 0.0,
                yes_votes: 0,
                no_votes: 0,
                hold_votes: 0,
                estimates: Vec::new(),
            },
            decision: SizingDecision::reject(
                Rejection::NonTradeAction(Action::Skip),
                SizingStrategy::ConfidenceKelly,
                0.0,
            ),
            failures: Vec::new(),
            smart_money: None,
            order_id: None,
        }
    }

    #[test]
    fn test_decision_history_is_bounded() {
        let mut state = AgentState::new(100.0, false);
        for i in 0..(DECISION_HISTORY_LIMIT + 5) {
            state.push_decision(record(i));
        }
        assert_eq!(state.decisions.len(), DECISION_HISTORY_LIMIT);
        // Oldest dropped first
        assert_eq!(state.decisions.front().unwrap().market_id, "5");
    }

    #[test]
    fn test_new_state_is_running() {
        let state = AgentState::new(100.0, true);
        assert!(state.running);
        assert!(state.auto_trade);
        assert_eq!(state.cycle_count, 0);
    }

    #[test]
    fn test_recent_decisions_newest_first() {
        let mut state = AgentState::new(100.0, false);
        for i in 0..5 {
            state.push_decision(record(i));
        }
        let recent = state.recent_decisions(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].market_id, "4");
        assert_eq!(recent[1].market_id, "3");
    }

    #[test]
    fn test_journal_roundtrip_through_state() {
        let mut state = AgentState::new(100.0, false);
        state.push_decision(record(1));
        let journal = state.journal();

        let mut restored = AgentState::new(50.0, true);
        restored.restore(journal);
        assert_eq!(restored.decisions.len(), 1);
        assert_eq!(restored.decisions[0].question, "Q1?");
    }
}
