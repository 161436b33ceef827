use sealed_bid_settlement::*;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Args, Config, AGENT_PRIVATE_KEY_ENV};
use log::{error, info, warn};
use std::sync::Arc;

use bids::Normalizer;
use domain::time::unix_now;
use domain::SettlementOutcome;
use execution::SettlementEngine;
use monitor::{FixtureBidSource, SaleMonitor};
use registry::SaleRegistry;
use scoring::{build_pitch_evaluator, ScoringEngine};
use store::SettlementStore;
use wallet::{build_key_provider, EnclaveEnvironment};

fn print_outcome(outcome: &SettlementOutcome) {
    match serde_json::to_string_pretty(outcome.signed()) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("could not render settlement: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    info!("🚀 Starting sealed-bid settlement agent");

    let args = Args::parse();
    let config = Config::load(&args.config)?;
    let contract = config.authorizing_contract()?;
    info!("📜 Authorizing contract {:?} on chain {}", contract, config.contract.chain_id);

    // ===============================
    // AGENT KEY
    // ===============================
    let private_key = std::env::var(AGENT_PRIVATE_KEY_ENV).ok();
    let key = build_key_provider(
        &config.keys,
        &EnclaveEnvironment::from_host(),
        private_key.as_deref(),
    )
    .context("building agent key provider")?;

    // ===============================
    // STORE
    // ===============================
    let store = match &config.store.path {
        Some(path) => SettlementStore::open(path).await?,
        None => {
            warn!("⚠️ No store path configured, settlements are kept in memory only");
            SettlementStore::in_memory()
        }
    };

    // ===============================
    // ENGINE
    // ===============================
    let scoring = ScoringEngine::new(&config.scoring, build_pitch_evaluator(&config.pitch_evaluator));
    let engine = Arc::new(SettlementEngine::new(
        Normalizer::new(config.scoring.max_pitch_chars),
        scoring,
        key,
        store,
        SaleRegistry::new(),
        contract,
    ));

    let source = Arc::new(FixtureBidSource::new(&args.input));
    let monitor = SaleMonitor::new(source, engine.clone(), config.monitor.poll_interval_ms);

    // ===============================
    // MAIN LOOP
    // ===============================
    if args.watch {
        tokio::select! {
            _ = monitor.run(print_outcome) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown requested");
            }
        }
        return Ok(());
    }

    let report = monitor.sweep(unix_now()).await?;
    report.outcomes.iter().for_each(print_outcome);

    info!(
        "📦 Sweep done: {} settled, {} reused, {} failed",
        report.settled(),
        report.outcomes.len() - report.settled(),
        report.failures.len()
    );
    for (sale_id, e) in &report.failures {
        error!("❌ Sale {}: {}", sale_id, e);
    }
    if report.failures.iter().any(|(_, e)| e.is_fatal()) {
        anyhow::bail!("fatal settlement failure, see log");
    }

    Ok(())
}
