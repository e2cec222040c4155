//! AUGUR: multi-model consensus agent for Polymarket.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! assembles the collaborators and dispatches on the subcommand:
//!
//! - `status`: print configuration and bankroll, then exit
//! - `analyze`: run one panel cycle without trading
//! - `analyze-single`: single-model probability-Kelly pass, no trading
//! - `run` (default): restore the journal, start the dashboard and loop

use anyhow::{Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use augur::config::AppConfig;
use augur::dashboard::{
    self,
    routes::{ConfigSummary, Credentials, DashboardState},
};
use augur::engine::executor::PaperPlacer;
use augur::engine::{Agent, Collaborators};
use augur::llm::gateway::GatewayClient;
use augur::llm::{ModelPanel, ProbabilityEstimator};
use augur::platforms::polymarket::PolymarketClient;
use augur::platforms::smart_money::{SmartMoneyClient, SmartMoneySource};
use augur::platforms::wallet::{BalanceSource, FixedBankroll, PolygonWallet};
use augur::types::AugurError;

const BANNER: &str = r#"
    _   _   _  ____ _   _ ____
   / \ | | | |/ ___| | | |  _ \
  / _ \| | | | |  _| | | | |_) |
 / ___ \ |_| | |_| | |_| |  _ <
/_/   \_\___/ \____|\___/|_| \_\

  Multi-model consensus agent for Polymarket
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Status,
    Analyze,
    AnalyzeSingle,
    Run,
}

impl Command {
    fn parse(arg: Option<&str>) -> Result<Self> {
        match arg {
            None | Some("run") => Ok(Command::Run),
            Some("analyze") => Ok(Command::Analyze),
            Some("analyze-single") => Ok(Command::AnalyzeSingle),
            Some("status") => Ok(Command::Status),
            Some(other) => anyhow::bail!(
                "unknown command '{other}' (expected status, analyze, analyze-single or run)"
            ),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(args.first().map(String::as_str))?;

    let config_path = std::env::var("AUGUR_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        command = ?command,
        models = cfg.llm.consensus_models.len(),
        dry_run = cfg.execution.dry_run,
        auto_trade = cfg.execution.auto_trade,
        "AUGUR starting up"
    );

    let bankroll = build_bankroll(&cfg)?;

    if command == Command::Status {
        return print_status(&cfg, bankroll.as_ref()).await;
    }

    if !cfg.execution.dry_run {
        return Err(AugurError::Config(
            "live order placement is not supported; set execution.dry_run = true".into(),
        )
        .into());
    }

    let api_key = SecretString::new(
        AppConfig::resolve_env(&cfg.llm.api_key_env).context("LLM gateway API key missing")?,
    );

    let panel: Vec<Arc<dyn ProbabilityEstimator>> =
        GatewayClient::panel_from_config(&cfg.llm, &api_key)?
            .into_iter()
            .map(|c| Arc::new(c) as Arc<dyn ProbabilityEstimator>)
            .collect();
    let single: Arc<dyn ProbabilityEstimator> = Arc::new(GatewayClient::for_model(
        &cfg.llm,
        &api_key,
        &cfg.llm.single_model,
    )?);

    let smart_money: Option<Arc<dyn SmartMoneySource>> = if cfg.polymarket.smart_money_enabled {
        Some(Arc::new(SmartMoneyClient::new(&cfg.polymarket)?))
    } else {
        None
    };

    let agent = Arc::new(Agent::new(
        &cfg,
        Collaborators {
            markets: Arc::new(PolymarketClient::new(&cfg.polymarket)?),
            panel: ModelPanel::new(panel),
            single_model: Some(single),
            smart_money,
            bankroll,
            placer: Arc::new(PaperPlacer),
        },
    ));

    info!(paper = agent.is_paper(), "[DRY RUN] Orders are simulated");

    match command {
        Command::Analyze => {
            let report = agent.run_cycle(false).await?;
            let state = agent.state();
            let state = state.read().await;
            for record in state.recent_decisions(report.markets_analyzed).iter().rev() {
                println!("{}", record.question);
                println!("  {}", record.consensus.summary());
                println!("  -> {}", record.decision.reason());
            }
            println!(
                "\n{} markets analysed, {} signals, {} errors",
                report.markets_analyzed, report.signals, report.errors
            );
            Ok(())
        }
        Command::AnalyzeSingle => {
            let analyses = agent.analyze_single_markets().await?;
            for (market, analysis) in &analyses {
                println!("{}", market.question);
                println!(
                    "  {} says {:.1}% (market {:.1}%, confidence {:.0}/10)",
                    analysis.estimate.model_name,
                    analysis.estimate.probability * 100.0,
                    market.yes_price * 100.0,
                    analysis.estimate.confidence
                );
                println!("  -> {}", analysis.decision.reason());
            }
            let signals = analyses
                .iter()
                .filter(|(_, a)| a.decision.should_trade())
                .count();
            println!("\n{} markets analysed, {signals} signals", analyses.len());
            Ok(())
        }
        _ => {
            agent.restore_journal().await;

            if cfg.dashboard.enabled {
                let credentials = Credentials::from_env(&cfg.dashboard);
                if credentials.is_none() {
                    warn!(
                        username_env = %cfg.dashboard.username_env,
                        password_env = %cfg.dashboard.password_env,
                        "Dashboard credentials not set; control endpoints are locked"
                    );
                }
                let dash = Arc::new(
                    DashboardState::new(agent.state(), ConfigSummary::from_config(&cfg))
                        .with_control(agent.clone())
                        .with_credentials(credentials),
                );
                dashboard::spawn_dashboard(dash, cfg.dashboard.port)?;
            }

            agent
                .run_forever(Duration::from_secs(cfg.agent.scan_interval_secs))
                .await?;

            info!(agent = %agent.name(), "AUGUR shut down cleanly.");
            Ok(())
        }
    }
}

/// Wallet balance if a wallet address is configured, otherwise the fixed
/// bankroll from `[agent]`.
fn build_bankroll(cfg: &AppConfig) -> Result<Arc<dyn BalanceSource>> {
    let address = cfg
        .polymarket
        .wallet_address_env
        .as_deref()
        .and_then(|env| std::env::var(env).ok());

    match address {
        Some(address) => {
            let wallet = PolygonWallet::new(cfg.polymarket.polygon_rpc_url.clone(), address)?;
            info!(address = %wallet.address(), "Using on-chain USDC balance as bankroll");
            Ok(Arc::new(wallet))
        }
        None => {
            info!(bankroll = format!("${:.2}", cfg.agent.bankroll), "Using fixed bankroll");
            Ok(Arc::new(FixedBankroll(cfg.agent.bankroll)))
        }
    }
}

async fn print_status(cfg: &AppConfig, bankroll: &dyn BalanceSource) -> Result<()> {
    let s = &cfg.strategy;
    println!("Agent:           {}", cfg.agent.name);
    println!("Scan interval:   {}s", cfg.agent.scan_interval_secs);
    println!("Markets/cycle:   {}", cfg.agent.markets_per_cycle);
    println!("Consensus panel: {}", cfg.llm.consensus_models.join(", "));
    println!("Single model:    {}", cfg.llm.single_model);
    println!(
        "Thresholds:      confidence >= {}, edge > {:.1}%, votes >= {}",
        s.min_confidence,
        s.yes_no_threshold * 100.0,
        s.min_votes
    );
    println!(
        "Bet size:        ${:.2} - ${:.2}",
        s.min_bet_size_absolute, s.max_bet_size_absolute
    );
    println!(
        "Execution:       auto_trade={} dry_run={}",
        cfg.execution.auto_trade, cfg.execution.dry_run
    );

    match bankroll.usdc_balance().await {
        Ok(balance) => println!("Bankroll:        ${balance:.2}"),
        Err(e) => {
            warn!(error = %e, "Could not read bankroll");
            println!("Bankroll:        unavailable ({e})");
        }
    }
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("augur=info"));

    if std::env::var("AUGUR_LOG_JSON").is_ok() {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
