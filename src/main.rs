//! Synthetic Exchange Liquidation Agent
//!
//! Watches a Solana synthetic-asset exchange for under-collateralized
//! accounts and liquidates them once their deadline slot is reached.
//! Features:
//! - Coarse full-population risk scans
//! - Fine per-slot deadline checks with in-order execution
//! - Unattended single-pass mode for CI
//! - Classified failures with bounded exponential backoff

use std::sync::Arc;

use anyhow::{Context, Result};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signer;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use synth_liquidator_chain::{load_keypair, Ledger, RpcLedger, TransactionSender};
use synth_liquidator_core::{
    prices, run_supervised, AgentContext, BotConfig, Deployment, PriceSnapshot, ProgramAddresses,
    Scheduler,
};

const DEFAULT_LOG_FILTER: &str = "info,synth_liquidator_core=debug,synth_liquidator_chain=debug";

#[tokio::main]
async fn main() -> Result<()> {
    // Print startup banner
    print_banner();

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    // BOT_CONFIG (TOML path) wins over BOT_PROFILE
    let bot_config = BotConfig::from_env().context("Failed to load bot configuration")?;
    bot_config.log_config();

    let deployment = Deployment::from_env().context("Failed to resolve deployment")?;
    deployment.log();

    // Ledger client
    let ledger: Arc<dyn Ledger> = Arc::new(RpcLedger::with_config(
        deployment.rpc_url.clone(),
        parse_commitment(&bot_config.rpc.commitment)?,
        bot_config.rpc.request_timeout(),
    ));

    // Signing identity
    let keypair = load_keypair(&deployment.key_source).context("Failed to load wallet keypair")?;
    info!(wallet = %keypair.pubkey(), "Using wallet");
    let sender = Arc::new(TransactionSender::new(ledger.clone(), keypair));

    // Prices are populated on their own task; bootstrap waits for them
    let prices = Arc::new(PriceSnapshot::new());
    {
        let ledger = ledger.clone();
        let prices = prices.clone();
        let state = deployment.state;
        tokio::spawn(async move {
            if let Err(e) = prices::load_initial(ledger.as_ref(), state, &prices).await {
                error!(error = %e, "Failed to load initial prices");
            }
        });
    }

    let ctx = AgentContext::new(
        ledger,
        sender,
        bot_config.clone(),
        ProgramAddresses {
            program_id: deployment.program_id,
            state: deployment.state,
        },
    );

    info!("Bootstrapping...");
    let mut scheduler = Scheduler::bootstrap(ctx, prices).await?;

    info!(mode = ?deployment.run_mode, "Starting scheduler");
    run_supervised(
        &mut scheduler,
        deployment.run_mode,
        &bot_config.supervisor,
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await?;

    info!("Liquidation agent stopped");
    Ok(())
}

/// Plain or JSON (`LOG_FORMAT=json`) output, filtered by `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn parse_commitment(level: &str) -> Result<CommitmentConfig> {
    match level.to_lowercase().as_str() {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => anyhow::bail!("Unknown commitment level '{}'", other),
    }
}

/// Print startup banner.
fn print_banner() {
    println!(
        r#"
    ╔═╗┬ ┬┌┐┌┌┬┐┬ ┬  ╦  ┬┌─┐ ┬ ┬┬┌┬┐┌─┐┌┬┐┌─┐┬─┐
    ╚═╗└┬┘│││ │ ├─┤  ║  │─┼┐│ ││ ││├─┤ │ │ │├┬┘
    ╚═╝ ┴ ┘└┘ ┴ ┴ ┴  ╩═╝┴└─┘└└─┘┴─┴┘┴ ┴ ┴ └─┘┴└─
    Synthetic Exchange Liquidation Agent v0.1.0
    "#
    );
}
