//! One-shot usage snapshot
//!
//! Fetches every enabled service once (with the normal retry policy) and
//! prints the result. No trackers are involved, so no alerts are raised.
//! Claude entries also carry the extra-usage allowance and the status page
//! health when those can be fetched.

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::{fetch_status, ClaudeClient, ClientHandle, CodexClient, RetryPolicy};
use crate::config::Config;
use crate::credentials::{CodexAuthFile, CredentialStore};
use crate::display::DisplayManager;
use crate::error::FetchError;
use crate::models::{ClaudeSystemStatus, OverageSpendLimit, Service, UsageReport};

#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub service: Service,
    pub report: Option<UsageReport>,
    pub error: Option<FetchError>,
    /// Claude only
    pub overage: Option<OverageSpendLimit>,
    /// Claude only
    pub status: Option<ClaudeSystemStatus>,
}

impl ServiceSnapshot {
    fn from_result(service: Service, result: Result<UsageReport, FetchError>) -> Self {
        let (report, error) = match result {
            Ok(report) => (Some(report), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            service,
            report,
            error,
            overage: None,
            status: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,
    pub services: Vec<ServiceSnapshot>,
}

impl Snapshot {
    pub fn has_errors(&self) -> bool {
        self.services.iter().any(|s| s.error.is_some())
    }
}

async fn snapshot_claude(
    config: &Config,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ServiceSnapshot> {
    let handle = ClientHandle::new(ClaudeClient::from_config(config)?);
    let status = async {
        if config.claude.check_status {
            fetch_status(&config.claude.status_url).await
        } else {
            None
        }
    };
    let (result, status) = tokio::join!(handle.fetch_with_retry(policy, cancel), status);
    let mut entry = ServiceSnapshot::from_result(Service::Claude, result);
    entry.status = status;

    if entry.report.is_some() {
        match handle.lock().await.fetch_overage_spend_limit().await {
            Ok(overage) => entry.overage = Some(overage),
            // Informational; a failure here does not fail the snapshot
            Err(e) => warn!(error = %e, "Could not fetch Claude extra usage"),
        }
    }

    Ok(entry)
}

async fn snapshot_codex(
    config: &Config,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<ServiceSnapshot> {
    let token = CodexAuthFile::new(&config.codex.auth_file).load();
    let handle = ClientHandle::new(CodexClient::new(
        config.codex.base_url.clone(),
        token,
        Duration::from_secs(config.polling.request_timeout_secs),
    )?);

    Ok(ServiceSnapshot::from_result(
        Service::Codex,
        handle.fetch_with_retry(policy, cancel).await,
    ))
}

pub async fn take_snapshot(config: &Config) -> Result<Snapshot> {
    let policy = RetryPolicy::from_config(&config.polling);
    let cancel = CancellationToken::new();

    let mut tasks = Vec::new();
    if config.claude.enabled {
        tasks.push(futures::future::Either::Left(snapshot_claude(config, &policy, &cancel)));
    }
    if config.codex.enabled {
        tasks.push(futures::future::Either::Right(snapshot_codex(config, &policy, &cancel)));
    }

    let services = join_all(tasks)
        .await
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    Ok(Snapshot {
        taken_at: Utc::now(),
        services,
    })
}

/// Run the `snapshot` command
pub async fn run_snapshot(config: &Config, json_output: bool) -> Result<()> {
    info!(json_output, "Taking usage snapshot");

    let snapshot = take_snapshot(config).await?;
    DisplayManager::new(json_output).display_snapshot(&snapshot);

    if snapshot.has_errors() {
        warn!("Snapshot completed with errors");
    }
    Ok(())
}
