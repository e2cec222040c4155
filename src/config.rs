//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys, wallet addresses) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub polymarket: PolymarketConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub scan_interval_secs: u64,
    /// Bankroll used when no wallet is configured.
    pub bankroll: f64,
    /// Markets fetched per cycle.
    #[serde(default = "default_markets_fetched")]
    pub markets_fetched: usize,
    /// Markets sent to the model panel per cycle.
    #[serde(default = "default_markets_per_cycle")]
    pub markets_per_cycle: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    pub api_key_env: String,
    /// Panel of independent models queried for every market.
    pub consensus_models: Vec<String>,
    /// Model used for single-estimate (Mode A) analysis.
    pub single_model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PolymarketConfig {
    pub gamma_url: String,
    pub clob_url: String,
    pub data_url: String,
    pub polygon_rpc_url: String,
    /// Env var holding the wallet (or proxy wallet) address for balance reads.
    pub wallet_address_env: Option<String>,
    /// Minimum notional for a trade to count as smart money.
    pub smart_money_min_amount: f64,
    pub smart_money_enabled: bool,
}

impl Default for PolymarketConfig {
    fn default() -> Self {
        Self {
            gamma_url: "https://gamma-api.polymarket.com".into(),
            clob_url: "https://clob.polymarket.com".into(),
            data_url: "https://data-api.polymarket.com".into(),
            polygon_rpc_url: "https://polygon-rpc.com".into(),
            wallet_address_env: None,
            smart_money_min_amount: 1000.0,
            smart_money_enabled: true,
        }
    }
}

/// Every threshold the decision core reads. Passed by value into the
/// aggregator, validator and sizers.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StrategyConfig {
    /// Minimum averaged confidence (1–10 scale) to trade.
    pub min_confidence: f64,
    /// Edge beyond which a single model votes YES/NO.
    pub yes_no_threshold: f64,
    /// Votes needed for a directional consensus.
    pub min_votes: usize,
    /// Fractional Kelly multiplier (Mode A).
    pub kelly_fraction: f64,
    /// Bet cap as a fraction of bankroll (Mode A).
    pub max_bet_fraction: f64,
    /// Minimum |edge| to bet (Mode A).
    pub min_edge_fraction: f64,
    /// Absolute bet cap in USDC (Mode B, and executor safety limit).
    pub max_bet_size_absolute: f64,
    /// Absolute bet floor in USDC (Mode B).
    pub min_bet_size_absolute: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_confidence: 5.0,
            yes_no_threshold: 0.05,
            min_votes: 2,
            kelly_fraction: 0.25,
            max_bet_fraction: 0.05,
            min_edge_fraction: 0.15,
            max_bet_size_absolute: 10.0,
            min_bet_size_absolute: 1.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Hand sized decisions to the executor.
    pub auto_trade: bool,
    /// Route orders to the paper book instead of the exchange.
    pub dry_run: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            auto_trade: false,
            dry_run: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub journal_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            journal_path: "augur_journal.json".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
    /// Env vars holding the basic-auth credentials for the control routes.
    /// Controls stay locked when either variable is unset.
    pub username_env: String,
    pub password_env: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 5001,
            username_env: "AUGUR_DASHBOARD_USER".into(),
            password_env: "AUGUR_DASHBOARD_PASS".into(),
        }
    }
}

fn default_markets_fetched() -> usize {
    20
}

fn default_markets_per_cycle() -> usize {
    10
}

fn default_max_tokens() -> u32 {
    150
}

fn default_temperature() -> f64 {
    0.3
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the decision core cannot work with.
    fn validate(&self) -> Result<()> {
        let s = &self.strategy;
        if !(0.0..=1.0).contains(&s.kelly_fraction) {
            anyhow::bail!("strategy.kelly_fraction must be within [0, 1], got {}", s.kelly_fraction);
        }
        if !(0.0..=1.0).contains(&s.max_bet_fraction) {
            anyhow::bail!("strategy.max_bet_fraction must be within [0, 1], got {}", s.max_bet_fraction);
        }
        if s.min_bet_size_absolute > s.max_bet_size_absolute {
            anyhow::bail!(
                "strategy.min_bet_size_absolute ({}) exceeds max_bet_size_absolute ({})",
                s.min_bet_size_absolute,
                s.max_bet_size_absolute
            );
        }
        if s.min_votes == 0 {
            anyhow::bail!("strategy.min_votes must be at least 1");
        }
        if self.llm.consensus_models.is_empty() {
            anyhow::bail!("llm.consensus_models must name at least one model");
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [agent]
        name = "AUGUR-TEST"
        scan_interval_secs = 60
        bankroll = 100.0

        [llm]
        base_url = "https://example.invalid/v1/chat/completions"
        api_key_env = "AUGUR_TEST_KEY"
        consensus_models = ["openai/gpt-4o-mini", "google/gemini-2.5-flash", "anthropic/claude-haiku-4.5"]
        single_model = "openai/gpt-4o"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.agent.name, "AUGUR-TEST");
        assert_eq!(cfg.agent.markets_per_cycle, 10);
        assert_eq!(cfg.strategy, StrategyConfig::default());
        assert!(cfg.execution.dry_run);
        assert!(!cfg.execution.auto_trade);
        assert_eq!(cfg.llm.max_tokens, 150);
        assert_eq!(cfg.polymarket.gamma_url, "https://gamma-api.polymarket.com");
    }

    #[test]
    fn test_strategy_defaults() {
        let s = StrategyConfig::default();
        assert_eq!(s.min_confidence, 5.0);
        assert_eq!(s.yes_no_threshold, 0.05);
        assert_eq!(s.kelly_fraction, 0.25);
        assert_eq!(s.max_bet_size_absolute, 10.0);
        assert_eq!(s.min_bet_size_absolute, 1.0);
        assert_eq!(s.min_votes, 2);
    }

    #[test]
    fn test_partial_strategy_table() {
        let toml = format!("{MINIMAL}\n[strategy]\nmin_confidence = 7.0\n");
        let cfg = AppConfig::from_toml(&toml).unwrap();
        assert_eq!(cfg.strategy.min_confidence, 7.0);
        assert_eq!(cfg.strategy.kelly_fraction, 0.25);
    }

    #[test]
    fn test_partial_polymarket_table() {
        let toml = format!("{MINIMAL}\n[polymarket]\nwallet_address_env = \"AUGUR_WALLET\"\n");
        let cfg = AppConfig::from_toml(&toml).unwrap();
        assert_eq!(cfg.polymarket.wallet_address_env.as_deref(), Some("AUGUR_WALLET"));
        assert_eq!(cfg.polymarket.clob_url, "https://clob.polymarket.com");
        assert_eq!(cfg.polymarket.smart_money_min_amount, 1000.0);
        assert!(cfg.polymarket.smart_money_enabled);
    }

    #[test]
    fn test_dashboard_credential_env_names() {
        let cfg = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(cfg.dashboard.username_env, "AUGUR_DASHBOARD_USER");
        assert_eq!(cfg.dashboard.password_env, "AUGUR_DASHBOARD_PASS");

        let toml = format!("{MINIMAL}\n[dashboard]\nenabled = true\npassword_env = \"OPS_PASS\"\n");
        let cfg = AppConfig::from_toml(&toml).unwrap();
        assert!(cfg.dashboard.enabled);
        assert_eq!(cfg.dashboard.port, 5001);
        assert_eq!(cfg.dashboard.password_env, "OPS_PASS");
    }

    #[test]
    fn test_rejects_inverted_bet_bounds() {
        let toml = format!(
            "{MINIMAL}\n[strategy]\nmin_bet_size_absolute = 20.0\nmax_bet_size_absolute = 10.0\n"
        );
        assert!(AppConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn test_rejects_empty_panel() {
        let toml = MINIMAL.replace(
            r#"consensus_models = ["openai/gpt-4o-mini", "google/gemini-2.5-flash", "anthropic/claude-haiku-4.5"]"#,
            "consensus_models = []",
        );
        assert!(AppConfig::from_toml(&toml).is_err());
    }

    #[test]
    fn test_load_config_file() {
        // Requires config.toml in the working directory; skipped otherwise.
        if let Ok(cfg) = AppConfig::load("config.toml") {
            assert_eq!(cfg.agent.name, "AUGUR-001");
            assert_eq!(cfg.llm.consensus_models.len(), 3);
            assert!(cfg.strategy.kelly_fraction > 0.0);
            assert!(cfg.strategy.kelly_fraction <= 1.0);
        }
    }

    #[test]
    fn test_resolve_env_missing() {
        assert!(AppConfig::resolve_env("AUGUR_DEFINITELY_UNSET_VAR_123").is_err());
    }
}
