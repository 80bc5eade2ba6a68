//! Watch command implementation
//!
//! Runs the polling orchestrator in a background task and prints each cycle
//! as it arrives. Ctrl+C cancels the orchestrator, which cuts any backoff
//! short, and the command waits for it to wind down before returning.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::config::{Config, ReloadingConfig};
use crate::display::DisplayManager;
use crate::live::orchestrator::{default_sources, PollingOrchestrator};
use crate::live::CycleReport;
use crate::notify::{sink_from_config, NotificationDispatcher};
use crate::power::SysfsPower;

/// Options for `watch`
#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub config_path: Option<PathBuf>,
    pub interval_override: Option<u64>,
    pub json_output: bool,
}

/// Build an orchestrator wired to the real clients, power source and notifier
pub fn build_orchestrator(config: &Config, options: &WatchOptions) -> Result<PollingOrchestrator> {
    let config_source = ReloadingConfig::new(options.config_path.clone(), config.clone())
        .with_interval_override(options.interval_override);
    let dispatcher = NotificationDispatcher::new(sink_from_config(&config.notifications));

    Ok(PollingOrchestrator::new(
        Box::new(config_source),
        dispatcher,
        Box::new(SysfsPower::default()),
    )
    .with_sources(default_sources(config)?)
    .with_notification_reload(config.notifications.clone()))
}

/// Run the `watch` command until Ctrl+C
pub async fn run_watch(config: Config, options: WatchOptions) -> Result<()> {
    if !options.json_output {
        println!("📊 Watching usage limits (Ctrl+C to stop)");
        println!();
    }

    info!(
        interval_override = ?options.interval_override,
        thresholds = ?config.alerts.thresholds,
        "Starting watch mode"
    );

    let (tx, mut rx) = mpsc::channel::<CycleReport>(16);
    let mut orchestrator = build_orchestrator(&config, &options)?.with_updates(tx);
    let cancel = orchestrator.cancel_token();

    let task = tokio::spawn(async move {
        if let Err(e) = orchestrator.run().await {
            error!(error = %e, "Polling orchestrator failed");
        }
    });

    let display = DisplayManager::new(options.json_output);
    loop {
        tokio::select! {
            maybe_report = rx.recv() => match maybe_report {
                Some(report) => display.display_cycle(&report),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                cancel.cancel();
                break;
            }
        }
    }

    // A pending send would otherwise block the task from seeing cancellation
    drop(rx);
    task.await.context("Polling task panicked")?;

    if !options.json_output {
        println!("👋 Stopped watching.");
    }
    info!("Watch mode completed");
    Ok(())
}
