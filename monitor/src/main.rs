mod alarm;
mod api;
mod calibrate;
mod config;
mod monitor;
mod notify;
mod sampling;
mod serial;
mod snapshot;
mod state;
mod store;

use crate::{
    api::HistoryParams,
    config::{Cli, Command, HistoryArgs, MonitorConfig, RunArgs},
    notify::{AnyNotifier, LogNotifier, PushbulletNotifier},
    serial::SerialLink,
    store::{FileStore, MemoryStore},
};
use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    info!(
        "Git revision: {}",
        git_version::git_version!(fallback = "unknown")
    );

    match Cli::parse().command {
        Command::Run(args) => run(args).await,
        Command::History(args) => history(args),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = MonitorConfig::from_args(args).context("Invalid configuration")?;

    let link = SerialLink::open(
        &config.serial.port,
        config.serial.baud,
        config.serial.timeout,
    )
    .with_context(|| format!("Failed to open serial port {}", config.serial.port))?;

    let store = Arc::new(
        FileStore::open(&config.store)
            .with_context(|| format!("Failed to open store {}", config.store.display()))?,
    );

    let notifier = match &config.pushbullet_token {
        Some(token) => {
            info!("Sending notifications via Pushbullet");
            AnyNotifier::Pushbullet(PushbulletNotifier::new(token.clone()))
        }
        None => {
            info!("No Pushbullet token, notifications are only logged");
            AnyNotifier::Log(LogNotifier)
        }
    };

    let monitor = monitor::start(link, store, notifier, &config);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for Ctrl+C")?;

    let surface = monitor.surface().clone();
    monitor.stop().await;

    info!(
        "Final sensors: {}",
        serde_json::to_string(&surface.sensors())?
    );
    info!("Final alarms: {}", serde_json::to_string(&surface.alarms())?);

    Ok(())
}

fn history(args: HistoryArgs) -> anyhow::Result<()> {
    let records = FileStore::read_records(&args.store)
        .with_context(|| format!("Failed to read store {}", args.store.display()))?;
    let store = MemoryStore::from_records(records);

    let params = HistoryParams {
        sensor: Some(args.sensor.as_str()),
        cnt: Some(args.cnt.as_str()),
        dt: args.dt.as_deref(),
    };
    let body = api::history(&store, params, Utc::now())?;

    println!("{}", serde_json::to_string(&body)?);
    Ok(())
}

#[cfg(test)]
#[ctor::ctor]
fn init_test_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
