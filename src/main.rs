//! # Kirana - storefront campaign engine
//!
//! Outbound WhatsApp broadcasts and lifecycle reminders for a
//! storefront, driven by a periodic orchestrator tick.
//!
//! Usage:
//!   kirana serve                  # control API + in-process tick loop
//!   kirana tick                   # one orchestrator tick (for cron)
//!   kirana config                 # print the effective configuration

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kirana_core::{KiranaConfig, MessageSender};
use kirana_engine::Orchestrator;
use kirana_store::Store;
use kirana_wa::WaClient;

#[derive(Parser)]
#[command(name = "kirana", version, about = "🛒 Kirana - storefront campaign engine")]
struct Cli {
    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control API and the periodic orchestrator loop.
    Serve {
        /// Override the API port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run exactly one orchestrator tick and exit. Intended for external
    /// schedulers (cron, systemd timers); safe to overlap thanks to the
    /// recipient claim pattern.
    Tick,
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "kirana=debug,tower_http=debug"
    } else {
        "kirana=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = KiranaConfig::load()?;

    match cli.command {
        Command::Serve { port } => serve(config, port).await,
        Command::Tick => tick(config).await,
        Command::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn open_store(config: &KiranaConfig) -> Result<Arc<Store>> {
    let db_path = config.store.resolved_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&db_path)?;
    tracing::info!("💾 store ready: {}", db_path.display());
    Ok(Arc::new(store))
}

async fn serve(mut config: KiranaConfig, port: Option<u16>) -> Result<()> {
    if let Some(p) = port {
        config.api.port = p;
    }

    let store = open_store(&config)?;

    // credentials check is advisory; sends fail per recipient if wrong
    let wa = WaClient::new(config.whatsapp.clone());
    if let Err(e) = wa.verify().await {
        tracing::warn!("⚠️ WhatsApp gateway not verified: {e}");
    }
    let sender: Arc<dyn MessageSender> = Arc::new(wa);

    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        sender,
        config.engine.clone(),
        config.reminders.clone(),
    ));
    let interval = config.engine.tick_interval_secs;
    tokio::spawn(async move {
        kirana_engine::run_loop(orchestrator, interval).await;
    });

    kirana_api::start(&config.api, store).await?;
    Ok(())
}

async fn tick(config: KiranaConfig) -> Result<()> {
    let store = open_store(&config)?;
    let sender: Arc<dyn MessageSender> = Arc::new(WaClient::new(config.whatsapp.clone()));
    let orchestrator =
        Orchestrator::new(store, sender, config.engine.clone(), config.reminders.clone());

    let summary = orchestrator.tick().await;
    tracing::info!(
        "tick done: {} promoted, {} empty-audience failures, {} sends ({} failed), \
         {} completed, {} reminders ({} failures)",
        summary.promoted,
        summary.failed_empty,
        summary.sent,
        summary.send_failures,
        summary.completed,
        summary.reminders.total_sent(),
        summary.reminders.failures
    );
    Ok(())
}
