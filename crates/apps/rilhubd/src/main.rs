mod config;
mod phone;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::DaemonConfig;
use phone::{NullTransmitter, PhoneCommand, PhoneLoop};
use rilhub_sms::AllowAllPolicy;
use rilhub_subs::{NullCarrierConfig, StaticEuiccBackend, SubscriptionStore};
use std::path::PathBuf;
use std::sync::Arc;

/// rilhub daemon — radio event dispatch, SIM subscription state, and
/// outbound SMS tracking for one phone channel.
#[derive(Parser, Debug)]
#[command(name = "rilhubd", version, about)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/rilhub/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the dispatcher loop until interrupted
    Run,
    /// Parse the configuration and print the effective settings
    CheckConfig,
}

fn load_config(path: &PathBuf) -> anyhow::Result<DaemonConfig> {
    if path.exists() {
        DaemonConfig::from_path(path)
            .with_context(|| format!("reading config {}", path.display()))
    } else {
        log::info!("rilhubd: no config at {}, using defaults", path.display());
        Ok(DaemonConfig::default())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    let config = load_config(&cli.config)?;
    match cli.command {
        Command::CheckConfig => {
            println!("slot_count = {}", config.slot_count);
            println!(
                "db_path = {}",
                config
                    .db_path
                    .as_ref()
                    .map_or_else(|| "(in-memory)".to_string(), |path| path.display().to_string())
            );
            println!("euicc_card_id = {}", config.euicc_card_id);
            let sms = config.sms_config();
            println!("sms.max_attempts = {}", sms.max_attempts);
            println!("sms.retry_delay_ms = {}", sms.retry_delay_ms);
            println!("sms.max_pending_confirmations = {}", sms.max_pending_confirmations);
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    let store = match &config.db_path {
        Some(path) => SubscriptionStore::open(path)
            .with_context(|| format!("opening subscription db {}", path.display()))?,
        None => SubscriptionStore::in_memory().context("opening in-memory subscription db")?,
    };

    let (phone, handle) = PhoneLoop::new(
        &config,
        store,
        Box::new(AllowAllPolicy),
        Box::new(NullTransmitter),
        Box::new(NullCarrierConfig::default()),
        Arc::new(StaticEuiccBackend::default()),
    );

    let mut events = phone.subscribe();
    tokio::task::spawn(async move {
        while let Ok(event) = events.recv().await {
            log::info!("rilhubd: event {event:?}");
        }
    });

    let loop_task = tokio::task::spawn(phone.run());
    tokio::signal::ctrl_c().await.context("waiting for interrupt")?;
    log::info!("rilhubd: interrupt received, shutting down");
    handle.command(PhoneCommand::Shutdown);
    loop_task.await.context("joining dispatcher loop")?;
    Ok(())
}
