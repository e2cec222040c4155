//! Dashboard: Axum web server for monitoring the agent.
//!
//! Serves a small JSON API over the shared agent state and a self-contained
//! HTML page. Binds to localhost only. Read endpoints are open; the POST
//! control endpoints require HTTP basic auth.

pub mod routes;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    response::Html,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// The embedded dashboard HTML (compiled into the binary).
const DASHBOARD_HTML: &str = include_str!("templates/index.html");

/// Start the dashboard web server in a background task.
pub fn spawn_dashboard(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);

    tokio::spawn(async move {
        let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));

        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(port, error = %e, "Failed to bind dashboard port");
                return;
            }
        };
        info!(port, "Dashboard server listening on http://127.0.0.1:{port}");

        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let controls = Router::new()
        .route("/api/agent/auto-trade", post(routes::toggle_auto_trade))
        .route("/api/agent/start", post(routes::start_agent))
        .route("/api/agent/stop", post(routes::stop_agent))
        .route("/api/agent/run-once", post(routes::run_once))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::require_auth,
        ));

    Router::new()
        .route("/api/status", get(routes::get_status))
        .route("/api/agent/decisions", get(routes::get_decisions))
        .route("/api/trades", get(routes::get_trades))
        .route("/api/markets", get(routes::get_markets))
        .route("/health", get(routes::health))
        .route("/", get(serve_dashboard))
        .merge(controls)
        .layer(cors)
        .with_state(state)
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AgentState, CycleReport, MockAgentControl};
    use crate::types::Market;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use base64::{engine::general_purpose, Engine as _};
    use routes::{ConfigSummary, Credentials, DashboardState};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        Arc::new(dashboard_state(MockAgentControl::new()))
    }

    fn dashboard_state(control: MockAgentControl) -> DashboardState {
        let config = ConfigSummary {
            agent_name: "AUGUR-TEST".into(),
            consensus_models: vec!["openai/gpt-4o-mini".into()],
            single_model: "openai/gpt-4o".into(),
            scan_interval_secs: 60,
            markets_per_cycle: 10,
            min_confidence: 5.0,
            yes_no_threshold: 0.05,
            min_votes: 2,
            max_bet_size: 10.0,
            dry_run: true,
        };
        let agent = Arc::new(RwLock::new(AgentState::new(100.0, false)));
        DashboardState::new(agent, config)
            .with_control(Arc::new(control))
            .with_credentials(Some(Credentials::new("ops", "letmein")))
    }

    fn auth(user: &str, pass: &str) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{user}:{pass}"))
        )
    }

    fn authed_post(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, auth("ops", "letmein"))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["config"]["agent_name"], "AUGUR-TEST");
        assert_eq!(json["cycle_count"], 0);
        assert_eq!(json["auto_trade"], false);
    }

    #[tokio::test]
    async fn test_decisions_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/agent/decisions")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_json(resp).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trades_endpoint() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/api/trades").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_auto_trade_toggle_endpoint() {
        let state = test_state();
        let app = build_router(state.clone());
        let resp = app.oneshot(authed_post("/api/agent/auto-trade")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["auto_trade"], true);
        assert!(state.agent.read().await.auto_trade);
    }

    #[tokio::test]
    async fn test_auto_trade_requires_post() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/agent/auto-trade")
                    .header(header::AUTHORIZATION, auth("ops", "letmein"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_controls_reject_missing_credentials() {
        let state = test_state();
        for uri in [
            "/api/agent/auto-trade",
            "/api/agent/start",
            "/api/agent/stop",
            "/api/agent/run-once",
        ] {
            let resp = build_router(state.clone())
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{uri}");
            assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
        }
        let agent = state.agent.read().await;
        assert!(agent.running);
        assert!(!agent.auto_trade);
    }

    #[tokio::test]
    async fn test_controls_reject_wrong_password() {
        let resp = build_router(test_state())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/agent/stop")
                    .header(header::AUTHORIZATION, auth("ops", "guess"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_controls_locked_without_configured_credentials() {
        let state = Arc::new(dashboard_state(MockAgentControl::new()).with_credentials(None));
        let resp = build_router(state.clone())
            .oneshot(authed_post("/api/agent/stop"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(state.agent.read().await.running);
    }

    #[tokio::test]
    async fn test_stop_then_run_once_then_start() {
        let mut control = MockAgentControl::new();
        control.expect_run_once().times(1).returning(|| {
            Ok(CycleReport {
                cycle: 7,
                markets_analyzed: 2,
                ..Default::default()
            })
        });
        let state = Arc::new(dashboard_state(control));

        // Refused while the scheduler is running.
        let resp = build_router(state.clone())
            .oneshot(authed_post("/api/agent/run-once"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "Agent is running, stop it first");

        let resp = build_router(state.clone())
            .oneshot(authed_post("/api/agent/stop"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["status"], "stopped");
        assert!(!state.agent.read().await.running);

        let resp = build_router(state.clone())
            .oneshot(authed_post("/api/agent/run-once"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["cycle"]["cycle"], 7);

        let resp = build_router(state.clone())
            .oneshot(authed_post("/api/agent/start"))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["status"], "started");
        assert!(state.agent.read().await.running);
    }

    #[tokio::test]
    async fn test_markets_endpoint_is_public() {
        let mut control = MockAgentControl::new();
        control
            .expect_markets()
            .withf(|limit| *limit == 20)
            .times(1)
            .returning(|_| {
                Ok(vec![Market {
                    id: "m1".into(),
                    condition_id: "0xm1".into(),
                    question: "Will it rain?".into(),
                    description: String::new(),
                    end_date: None,
                    volume: 10_000.0,
                    liquidity: 2_000.0,
                    yes_price: 0.3,
                    no_price: 0.7,
                    token_ids: vec!["y".into(), "n".into()],
                }])
            });
        let resp = build_router(Arc::new(dashboard_state(control)))
            .oneshot(Request::builder().uri("/api/markets").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["count"], 1);
        assert_eq!(json["markets"][0]["question"], "Will it rain?");
    }

    #[tokio::test]
    async fn test_dashboard_html() {
        let app = build_router(test_state());
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("AUGUR"));
        assert!(html.contains("Dashboard"));
    }
}
