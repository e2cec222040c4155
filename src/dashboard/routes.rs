//! Dashboard API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.
//! The POST control routes sit behind HTTP basic auth (`require_auth`).

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose, Engine as _};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AppConfig, DashboardConfig};
use crate::engine::{AgentControl, DecisionRecord, SharedState, TradeRecord};
use crate::types::Market;

/// How many history entries the list endpoints return.
const RECENT_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Static configuration echoed by `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub agent_name: String,
    pub consensus_models: Vec<String>,
    pub single_model: String,
    pub scan_interval_secs: u64,
    pub markets_per_cycle: usize,
    pub min_confidence: f64,
    pub yes_no_threshold: f64,
    pub min_votes: usize,
    pub max_bet_size: f64,
    pub dry_run: bool,
}

impl ConfigSummary {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            agent_name: config.agent.name.clone(),
            consensus_models: config.llm.consensus_models.clone(),
            single_model: config.llm.single_model.clone(),
            scan_interval_secs: config.agent.scan_interval_secs,
            markets_per_cycle: config.agent.markets_per_cycle,
            min_confidence: config.strategy.min_confidence,
            yes_no_threshold: config.strategy.yes_no_threshold,
            min_votes: config.strategy.min_votes,
            max_bet_size: config.strategy.max_bet_size_absolute,
            dry_run: config.execution.dry_run,
        }
    }
}

/// Basic-auth credentials for the control routes.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::new(password.into()),
        }
    }

    /// Read the credentials from the env vars named in `[dashboard]`.
    /// `None` when either is unset or empty.
    pub fn from_env(config: &DashboardConfig) -> Option<Self> {
        let username = std::env::var(&config.username_env).ok()?;
        let password = std::env::var(&config.password_env).ok()?;
        if username.is_empty() || password.is_empty() {
            return None;
        }
        Some(Self::new(username, password))
    }

    /// Check an `Authorization: Basic ...` header value.
    pub fn accepts(&self, authorization: Option<&HeaderValue>) -> bool {
        let Some(encoded) = authorization
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
        else {
            return false;
        };
        let Ok(decoded) = general_purpose::STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        match decoded.split_once(':') {
            Some((user, pass)) => {
                user == self.username && pass == self.password.expose_secret().as_str()
            }
            None => false,
        }
    }
}

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub agent: SharedState,
    pub config: ConfigSummary,
    control: Option<Arc<dyn AgentControl>>,
    credentials: Option<Credentials>,
}

impl DashboardState {
    pub fn new(agent: SharedState, config: ConfigSummary) -> Self {
        Self {
            agent,
            config,
            control: None,
            credentials: None,
        }
    }

    /// Enable run-once and the market list.
    pub fn with_control(mut self, control: Arc<dyn AgentControl>) -> Self {
        self.control = Some(control);
        self
    }

    /// Unlock the control routes. Without credentials they always answer 401.
    pub fn with_credentials(mut self, credentials: Option<Credentials>) -> Self {
        self.credentials = credentials;
        self
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub config: ConfigSummary,
    pub cycle_count: u64,
    pub last_run: Option<String>,
    pub last_error: Option<String>,
    pub running: bool,
    pub auto_trade: bool,
    pub bankroll: f64,
    pub decisions_recorded: usize,
    pub trades_recorded: usize,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutoTradeResponse {
    pub auto_trade: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketsResponse {
    pub count: usize,
    pub markets: Vec<Market>,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// Middleware for the control routes: 401 unless the request carries the
/// configured basic-auth credentials.
pub async fn require_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let authorized = state
        .credentials
        .as_ref()
        .is_some_and(|c| c.accepts(headers.get(header::AUTHORIZATION)));

    if !authorized {
        warn!(path = %request.uri().path(), "Rejected unauthenticated dashboard control request");
        let mut response = error_response(StatusCode::UNAUTHORIZED, "authentication required");
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"AUGUR\""),
        );
        return response;
    }

    next.run(request).await
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let agent = state.agent.read().await;
    let uptime = (chrono::Utc::now() - agent.started_at).num_seconds();

    Json(StatusResponse {
        config: state.config.clone(),
        cycle_count: agent.cycle_count,
        last_run: agent.last_run.map(|t| t.to_rfc3339()),
        last_error: agent.last_error.clone(),
        running: agent.running,
        auto_trade: agent.auto_trade,
        bankroll: agent.bankroll,
        decisions_recorded: agent.decisions.len(),
        trades_recorded: agent.trades.len(),
        uptime_secs: uptime,
    })
}

/// GET /api/agent/decisions
pub async fn get_decisions(State(state): State<AppState>) -> Json<Vec<DecisionRecord>> {
    let agent = state.agent.read().await;
    Json(agent.recent_decisions(RECENT_LIMIT))
}

/// GET /api/trades
pub async fn get_trades(State(state): State<AppState>) -> Json<Vec<TradeRecord>> {
    let agent = state.agent.read().await;
    Json(agent.recent_trades(RECENT_LIMIT))
}

/// POST /api/agent/auto-trade flips the flag and returns the new value.
pub async fn toggle_auto_trade(State(state): State<AppState>) -> Json<AutoTradeResponse> {
    let mut agent = state.agent.write().await;
    agent.auto_trade = !agent.auto_trade;
    info!(auto_trade = agent.auto_trade, "Auto-trade toggled from dashboard");
    Json(AutoTradeResponse {
        auto_trade: agent.auto_trade,
    })
}

/// POST /api/agent/start resumes scheduled cycles.
pub async fn start_agent(State(state): State<AppState>) -> Json<ControlResponse> {
    let mut agent = state.agent.write().await;
    if agent.running {
        return Json(ControlResponse {
            status: "already_running",
        });
    }
    agent.running = true;
    info!("Agent started from dashboard");
    Json(ControlResponse { status: "started" })
}

/// POST /api/agent/stop pauses scheduled cycles. A cycle in flight finishes.
pub async fn stop_agent(State(state): State<AppState>) -> Json<ControlResponse> {
    state.agent.write().await.running = false;
    info!("Agent stopped from dashboard");
    Json(ControlResponse { status: "stopped" })
}

/// POST /api/agent/run-once runs a single cycle while the agent is stopped.
pub async fn run_once(State(state): State<AppState>) -> Response {
    if state.agent.read().await.running {
        return error_response(StatusCode::BAD_REQUEST, "Agent is running, stop it first");
    }
    let Some(control) = state.control.as_ref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "agent control not attached");
    };

    info!("Manual cycle triggered from dashboard");
    match control.run_once().await {
        Ok(report) => Json(json!({ "status": "ok", "cycle": report })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")),
    }
}

/// GET /api/markets
pub async fn get_markets(State(state): State<AppState>) -> Response {
    let Some(control) = state.control.as_ref() else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "agent control not attached");
    };
    match control.markets(RECENT_LIMIT).await {
        Ok(markets) => Json(MarketsResponse {
            count: markets.len(),
            markets,
        })
        .into_response(),
        Err(e) => {
            warn!(error = %e, "Market list failed");
            error_response(StatusCode::BAD_GATEWAY, format!("{e:#}"))
        }
    }
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AgentState, CycleReport, MockAgentControl};
    use crate::types::{Side, TradeReceipt};
    use tokio::sync::RwLock;

    fn summary() -> ConfigSummary {
        let cfg = AppConfig::from_toml(
            r#"
            [agent]
            name = "AUGUR-TEST"
            scan_interval_secs = 60
            bankroll = 100.0

            [llm]
            base_url = "https://example.invalid/v1/chat/completions"
            api_key_env = "AUGUR_TEST_KEY"
            consensus_models = ["openai/gpt-4o-mini", "google/gemini-2.5-flash"]
            single_model = "openai/gpt-4o"
            "#,
        )
        .unwrap();
        ConfigSummary::from_config(&cfg)
    }

    fn state_with(agent: AgentState) -> AppState {
        Arc::new(DashboardState::new(Arc::new(RwLock::new(agent)), summary()))
    }

    fn trade(i: usize) -> TradeRecord {
        TradeRecord {
            market_id: format!("m{i}"),
            question: "Q?".into(),
            reason: "test".into(),
            receipt: TradeReceipt {
                order_id: format!("paper-{i}"),
                token_id: "tok".into(),
                side: Side::No,
                amount: 2.0,
                price: 0.4,
                shares: 5.0,
                paper: true,
                timestamp: chrono::Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn test_get_status_handler() {
        let state = state_with(AgentState::new(100.0, false));
        let Json(resp) = get_status(State(state)).await;
        assert!((resp.bankroll - 100.0).abs() < 1e-10);
        assert_eq!(resp.cycle_count, 0);
        assert!(resp.last_run.is_none());
        assert!(!resp.auto_trade);
    }

    #[tokio::test]
    async fn test_get_trades_limited_and_newest_first() {
        let mut agent = AgentState::new(100.0, false);
        for i in 0..25 {
            agent.push_trade(trade(i));
        }
        let Json(trades) = get_trades(State(state_with(agent))).await;
        assert_eq!(trades.len(), RECENT_LIMIT);
        assert_eq!(trades[0].market_id, "m24");
    }

    #[tokio::test]
    async fn test_get_decisions_empty() {
        let Json(decisions) = get_decisions(State(state_with(AgentState::new(1.0, false)))).await;
        assert!(decisions.is_empty());
    }

    #[tokio::test]
    async fn test_toggle_flips_flag() {
        let state = state_with(AgentState::new(100.0, false));
        let Json(first) = toggle_auto_trade(State(state.clone())).await;
        assert!(first.auto_trade);
        let Json(second) = toggle_auto_trade(State(state.clone())).await;
        assert!(!second.auto_trade);
        assert!(!state.agent.read().await.auto_trade);
    }

    fn basic(user: &str, pass: &str) -> HeaderValue {
        let encoded = general_purpose::STANDARD.encode(format!("{user}:{pass}"));
        HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
    }

    #[test]
    fn test_credentials_accept_only_exact_match() {
        let creds = Credentials::new("ops", "s3cret:with-colon");
        assert!(creds.accepts(Some(&basic("ops", "s3cret:with-colon"))));
        assert!(!creds.accepts(Some(&basic("ops", "wrong"))));
        assert!(!creds.accepts(Some(&basic("admin", "s3cret:with-colon"))));
        assert!(!creds.accepts(Some(&HeaderValue::from_static("Bearer abc"))));
        assert!(!creds.accepts(Some(&HeaderValue::from_static("Basic !!!"))));
        assert!(!creds.accepts(None));
    }

    #[test]
    fn test_credentials_from_env_requires_both() {
        let cfg = DashboardConfig {
            username_env: "AUGUR_TEST_DASH_USER_UNSET".into(),
            password_env: "AUGUR_TEST_DASH_PASS_UNSET".into(),
            ..DashboardConfig::default()
        };
        assert!(Credentials::from_env(&cfg).is_none());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("ops", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[tokio::test]
    async fn test_start_and_stop_flip_running() {
        let state = state_with(AgentState::new(100.0, false));

        let Json(resp) = start_agent(State(state.clone())).await;
        assert_eq!(resp.status, "already_running");

        let Json(resp) = stop_agent(State(state.clone())).await;
        assert_eq!(resp.status, "stopped");
        assert!(!state.agent.read().await.running);

        let Json(resp) = start_agent(State(state.clone())).await;
        assert_eq!(resp.status, "started");
        assert!(state.agent.read().await.running);
    }

    #[tokio::test]
    async fn test_run_once_refused_while_running() {
        let mut control = MockAgentControl::new();
        control.expect_run_once().never();
        let state = Arc::new(
            DashboardState::new(
                Arc::new(RwLock::new(AgentState::new(100.0, false))),
                summary(),
            )
            .with_control(Arc::new(control)),
        );

        let resp = run_once(State(state)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_run_once_when_stopped() {
        let mut control = MockAgentControl::new();
        control.expect_run_once().times(1).returning(|| {
            Ok(CycleReport {
                cycle: 4,
                markets_analyzed: 3,
                ..Default::default()
            })
        });
        let mut agent = AgentState::new(100.0, false);
        agent.running = false;
        let state = Arc::new(
            DashboardState::new(Arc::new(RwLock::new(agent)), summary())
                .with_control(Arc::new(control)),
        );

        let resp = run_once(State(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_markets_without_control_unavailable() {
        let resp = get_markets(State(state_with(AgentState::new(1.0, false)))).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_status_response_serializes() {
        let resp = StatusResponse {
            config: summary(),
            cycle_count: 5,
            last_run: Some("2026-02-21T12:00:00Z".into()),
            last_error: None,
            running: true,
            auto_trade: true,
            bankroll: 100.0,
            decisions_recorded: 3,
            trades_recorded: 1,
            uptime_secs: 3600,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"auto_trade\":true"));
        assert!(json.contains("consensus_models"));
    }
}
