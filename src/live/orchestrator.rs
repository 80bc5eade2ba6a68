//! Polling orchestrator
//!
//! One cycle:
//! - snapshot configuration
//! - refresh credential stores and endpoint settings from that snapshot
//! - push the latest stored credential into each client
//! - fetch every enabled service concurrently, with retries
//! - feed each successful sample to its tracker and dispatch what it decides
//! - update the summary and emit a [`CycleReport`]
//!
//! then sleep for the power-aware interval. Failures never reach the trackers,
//! and once the cancellation token fires nothing is observed.

use anyhow::Result;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::client::{ClaudeClient, ClientHandle, CodexClient, RetryPolicy};
use crate::config::{Config, ConfigSource, NotificationConfig};
use crate::credentials::{ClaudeSessionKey, CodexAuthFile, CredentialStore};
use crate::error::FetchError;
use crate::live::{CycleReport, DecisionRecord, ServiceOutcome, UsageSummary};
use crate::models::{Service, UsageReport};
use crate::notify::{sink_from_config, NotificationDispatcher};
use crate::power::{effective_interval, PowerSource};
use crate::tracker::TrackerRegistry;

/// A client paired with the store its credential comes from
pub struct ServiceSource {
    client: ClientHandle,
    credentials: Box<dyn CredentialStore>,
}

impl ServiceSource {
    pub fn new(client: ClientHandle, credentials: Box<dyn CredentialStore>) -> Self {
        Self {
            client,
            credentials,
        }
    }

    pub fn service(&self) -> Service {
        self.client.service()
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }
}

/// Build the Claude and Codex sources described by `config`
pub fn default_sources(config: &Config) -> Result<Vec<ServiceSource>> {
    let claude = ClientHandle::new(ClaudeClient::from_config(config)?).erased();
    let codex = ClientHandle::new(CodexClient::from_config(config)?).erased();

    Ok(vec![
        ServiceSource::new(
            claude,
            Box::new(ClaudeSessionKey::from_config(config)),
        ),
        ServiceSource::new(codex, Box::new(CodexAuthFile::new(&config.codex.auth_file))),
    ])
}

/// Main orchestrator for the polling loop
pub struct PollingOrchestrator {
    sources: Vec<ServiceSource>,
    trackers: Arc<TrackerRegistry>,
    dispatcher: NotificationDispatcher,
    /// Set when the sink should be rebuilt as `[notifications]` changes
    notifications: Option<NotificationConfig>,
    power: Arc<dyn PowerSource>,
    config: Box<dyn ConfigSource>,
    summary: UsageSummary,
    cancel: CancellationToken,
    updates: Option<mpsc::Sender<CycleReport>>,
}

impl PollingOrchestrator {
    pub fn new(
        config: Box<dyn ConfigSource>,
        dispatcher: NotificationDispatcher,
        power: Box<dyn PowerSource>,
    ) -> Self {
        Self {
            sources: Vec::new(),
            trackers: Arc::new(TrackerRegistry::new()),
            dispatcher,
            notifications: None,
            power: Arc::from(power),
            config,
            summary: UsageSummary::new(),
            cancel: CancellationToken::new(),
            updates: None,
        }
    }

    pub fn with_source(mut self, source: ServiceSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = ServiceSource>) -> Self {
        self.sources.extend(sources);
        self
    }

    /// Send a [`CycleReport`] here after every cycle
    pub fn with_updates(mut self, tx: mpsc::Sender<CycleReport>) -> Self {
        self.updates = Some(tx);
        self
    }

    /// Rebuild the notification sink whenever `[notifications]` differs from
    /// the settings it was last built from
    pub fn with_notification_reload(mut self, current: NotificationConfig) -> Self {
        self.notifications = Some(current);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn trackers(&self) -> Arc<TrackerRegistry> {
        Arc::clone(&self.trackers)
    }

    pub fn summary(&self) -> &UsageSummary {
        &self.summary
    }

    /// Ends the sleep, any in-flight backoff, and the loop
    pub fn stop(&self) {
        info!("Stopping polling orchestrator");
        self.cancel.cancel();
    }

    /// Poll until stopped
    pub async fn run(&mut self) -> Result<()> {
        info!(services = self.sources.len(), "Starting polling orchestrator");

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let config = self.config.snapshot();
            let report = self.run_cycle(&config).await;
            let interval = std::time::Duration::from_secs(report.next_interval_secs);

            if let Some(tx) = &self.updates {
                if let Err(e) = tx.send(report).await {
                    debug!(error = %e, "Cycle report receiver closed");
                }
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        info!("Polling orchestrator stopped");
        Ok(())
    }

    /// One fetch → observe → notify pass against a fixed configuration
    pub async fn run_cycle(&mut self, config: &Config) -> CycleReport {
        let cycle_id = Uuid::new_v4();
        let span = info_span!("cycle", %cycle_id);
        self.cycle(cycle_id, config).instrument(span).await
    }

    async fn cycle(&mut self, cycle_id: Uuid, config: &Config) -> CycleReport {
        let started_at = Utc::now();
        let on_battery = self.on_battery().await;
        let interval = effective_interval(&config.polling, on_battery);
        let policy = RetryPolicy::from_config(&config.polling);

        self.reload_notifications(config);

        for source in &mut self.sources {
            if config.service_enabled(source.service()) {
                source.credentials.refresh(config);
                source.client.apply_config(config).await;
                source.client.sync_credential(source.credentials.load()).await;
            }
        }

        let fetches = self
            .sources
            .iter()
            .filter(|source| config.service_enabled(source.service()))
            .map(|source| {
                let client = source.client.clone();
                let cancel = self.cancel.clone();
                async move {
                    let result = if client.has_credential().await {
                        client.fetch_with_retry(&policy, &cancel).await
                    } else {
                        debug!(service = %client.service(), "No credential, skipping fetch");
                        Err(FetchError::Unauthenticated)
                    };
                    (client.service(), result)
                }
            });
        let results: Vec<(Service, Result<UsageReport, FetchError>)> = join_all(fetches).await;

        let mut outcomes: Vec<ServiceOutcome> = self
            .sources
            .iter()
            .map(|source| source.service())
            .filter(|service| !config.service_enabled(*service))
            .map(|service| ServiceOutcome::Disabled { service })
            .collect();
        for outcome in &outcomes {
            self.summary.record_disabled(outcome.service());
        }
        let mut decisions = Vec::new();

        let cancelled = self.cancel.is_cancelled();
        if cancelled {
            info!("Cycle cancelled, skipping observations");
        }

        for (service, result) in results {
            match result {
                Ok(report) => {
                    if !cancelled {
                        self.summary.record_success(&report, started_at);
                        decisions.extend(self.observe(&report, config).await);
                    }
                    outcomes.push(ServiceOutcome::Fetched { service, report });
                }
                Err(error) => {
                    if error != FetchError::Cancelled {
                        warn!(%service, error = %error, hint = error.user_hint(), "Fetch failed");
                        self.summary.record_failure(
                            service,
                            error.clone(),
                            config.polling.stale_after_failures,
                        );
                    }
                    outcomes.push(ServiceOutcome::Failed {
                        service,
                        error,
                        consecutive_failures: self.summary.consecutive_failures(service),
                    });
                }
            }
        }

        outcomes.sort_by_key(ServiceOutcome::service);

        info!(
            decisions = decisions.len(),
            on_battery,
            next_interval_secs = interval.as_secs(),
            "Cycle complete"
        );

        CycleReport {
            cycle_id,
            started_at,
            outcomes,
            decisions,
            summary: self.summary.clone(),
            on_battery,
            next_interval_secs: interval.as_secs(),
            cancelled,
        }
    }

    /// Sysfs reads block, so the power check runs on the blocking pool
    async fn on_battery(&self) -> bool {
        let power = Arc::clone(&self.power);
        match tokio::task::spawn_blocking(move || power.is_on_battery()).await {
            Ok(on_battery) => on_battery,
            Err(e) => {
                warn!(error = %e, "Power check failed, assuming mains");
                false
            }
        }
    }

    fn reload_notifications(&mut self, config: &Config) {
        let Some(current) = &mut self.notifications else {
            return;
        };
        if *current == config.notifications {
            return;
        }

        info!(sink = %config.notifications.sink, "Notification settings changed, rebuilding sink");
        self.dispatcher = NotificationDispatcher::new(sink_from_config(&config.notifications));
        *current = config.notifications.clone();
    }

    async fn observe(&self, report: &UsageReport, config: &Config) -> Vec<DecisionRecord> {
        let mut records = Vec::new();

        for (identity, sample) in &report.samples {
            let decision = self
                .trackers
                .observe(*identity, sample, &config.alert_config(*identity));
            if !decision.is_actionable() {
                continue;
            }
            if let Some(notification) = self.dispatcher.dispatch(*identity, decision).await {
                records.push(DecisionRecord::new(*identity, decision, notification));
            }
        }

        records
    }
}
