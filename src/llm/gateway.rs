//! OpenAI-compatible chat-completions gateway.
//!
//! One `GatewayClient` per panel model. All models share the same endpoint
//! and API key; only the model id differs. Each estimate is a single
//! request; a failed call surfaces as `AugurError::Llm`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{build_prompt, display_name, parse_response, EstimateRequest, ProbabilityEstimator};
use crate::config::LlmConfig;
use crate::types::{AugurError, ProbabilityEstimate};

const REQUEST_TIMEOUT_SECS: u64 = 60;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

/// Pull the first choice's text out of a chat-completions body.
fn extract_content(body: ChatResponse) -> Option<String> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .map(|m| m.content)
        .filter(|c| !c.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GatewayClient {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    model_id: String,
    display_name: String,
    max_tokens: u32,
    temperature: f64,
    total_calls: AtomicU64,
}

impl GatewayClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: SecretString,
        model_id: impl Into<String>,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build model gateway HTTP client")?;

        let model_id = model_id.into();
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            api_key,
            display_name: display_name(&model_id).to_string(),
            model_id,
            max_tokens,
            temperature,
            total_calls: AtomicU64::new(0),
        })
    }

    /// One client per configured consensus model.
    pub fn panel_from_config(config: &LlmConfig, api_key: &SecretString) -> Result<Vec<Self>> {
        config
            .consensus_models
            .iter()
            .map(|model| Self::for_model(config, api_key, model))
            .collect()
    }

    /// Client for an arbitrary model id using the shared endpoint settings.
    pub fn for_model(config: &LlmConfig, api_key: &SecretString, model: &str) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            SecretString::new(api_key.expose_secret().clone()),
            model,
            config.max_tokens,
            config.temperature,
        )
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Successful calls made through this client.
    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    /// Send one prompt. Any transport error or non-2xx status fails the call;
    /// the panel records it as a failed model.
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model_id,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| AugurError::Llm {
                model: self.model_id.clone(),
                message: format!("request error: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model_id, error = %error_text, "Model gateway error");
            return Err(AugurError::Llm {
                model: self.model_id.clone(),
                message: format!("HTTP {status}: {error_text}"),
            }
            .into());
        }

        let body: ChatResponse = response
            .json()
            .await
            .context("Failed to parse chat completion response")?;
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        debug!(model = %self.model_id, "Chat completion received");

        extract_content(body).ok_or_else(|| {
            AugurError::Llm {
                model: self.model_id.clone(),
                message: "empty completion".into(),
            }
            .into()
        })
    }
}

#[async_trait]
impl ProbabilityEstimator for GatewayClient {
    async fn estimate(&self, request: &EstimateRequest) -> Result<ProbabilityEstimate> {
        let prompt = build_prompt(request);
        let text = self.complete(&prompt).await?;
        let estimate = parse_response(&self.display_name, &text)?;

        info!(
            model = %self.display_name,
            probability = format!("{:.1}%", estimate.probability * 100.0),
            confidence = format!("{:.0}/10", estimate.confidence),
            "Estimate complete"
        );

        Ok(estimate)
    }

    fn model_name(&self) -> &str {
        &self.display_name
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn llm_config() -> LlmConfig {
        LlmConfig {
            base_url: "https://example.invalid/v1/chat/completions".into(),
            api_key_env: "AUGUR_TEST_KEY".into(),
            consensus_models: vec![
                "openai/gpt-4o-mini".into(),
                "google/gemini-2.5-flash".into(),
                "anthropic/claude-haiku-4.5".into(),
            ],
            single_model: "openai/gpt-4o".into(),
            max_tokens: 150,
            temperature: 0.3,
        }
    }

    #[test]
    fn test_panel_from_config() {
        let key = SecretString::new("sk-test".into());
        let clients = GatewayClient::panel_from_config(&llm_config(), &key).unwrap();
        let names: Vec<&str> = clients.iter().map(|c| c.model_name()).collect();
        assert_eq!(names, vec!["gpt-4o-mini", "gemini-2.5-flash", "claude-haiku-4.5"]);
        assert_eq!(clients[0].model_id(), "openai/gpt-4o-mini");
        assert_eq!(clients[0].max_tokens, 150);
        assert_eq!(clients[0].total_calls(), 0);
    }

    #[test]
    fn test_request_serialization() {
        let req = ChatRequest {
            model: "openai/gpt-4o-mini",
            max_tokens: 150,
            temperature: 0.3,
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o-mini");
        assert_eq!(json["max_tokens"], 150);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_extract_content() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"PROBABILITY: 60"}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_content(body).as_deref(), Some("PROBABILITY: 60"));

        let empty: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(extract_content(empty).is_none());
    }

    /// Local gateway that counts hits and answers every call with `status`/`body`.
    async fn serve_gateway(
        status: u16,
        body: &'static str,
    ) -> (String, std::sync::Arc<AtomicU64>) {
        use axum::{http::StatusCode, routing::post, Router};

        let hits = std::sync::Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (
                        StatusCode::from_u16(status).unwrap(),
                        [("content-type", "application/json")],
                        body,
                    )
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/v1/chat/completions"), hits)
    }

    fn client_for(endpoint: String) -> GatewayClient {
        GatewayClient::new(
            endpoint,
            SecretString::new("sk-test".into()),
            "openai/gpt-4o-mini",
            150,
            0.3,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_estimate_over_http() {
        let (endpoint, hits) = serve_gateway(
            200,
            r#"{"choices":[{"message":{"role":"assistant","content":"PROBABILITY: 62\nCONFIDENCE: 7\nREASONING: polls"}}]}"#,
        )
        .await;
        let client = client_for(endpoint);

        let est = client
            .estimate(&EstimateRequest::new("Will it rain?", 0.5))
            .await
            .unwrap();
        assert!((est.probability - 0.62).abs() < 1e-9);
        assert!((est.confidence - 7.0).abs() < 1e-9);
        assert_eq!(est.model_name, "gpt-4o-mini");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(client.total_calls(), 1);
    }

    #[tokio::test]
    async fn test_server_error_fails_after_one_request() {
        let (endpoint, hits) = serve_gateway(503, r#"{"error":"overloaded"}"#).await;
        let client = client_for(endpoint);

        let err = client
            .estimate(&EstimateRequest::new("Will it rain?", 0.5))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AugurError>(),
            Some(AugurError::Llm { .. })
        ));
        assert!(err.to_string().contains("503"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried() {
        let (endpoint, hits) = serve_gateway(429, r#"{"error":"slow down"}"#).await;
        let err = client_for(endpoint)
            .estimate(&EstimateRequest::new("Will it rain?", 0.5))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let key = SecretString::new("sk-very-secret".into());
        assert!(!format!("{key:?}").contains("sk-very-secret"));
    }
}
