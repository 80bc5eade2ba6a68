//! Live polling
//!
//! [`orchestrator::PollingOrchestrator`] drives the fetch → observe → notify
//! loop. After each cycle it emits a [`CycleReport`] to whoever is listening
//! (the `watch` command's display loop), and keeps a [`summary::UsageSummary`]
//! of the last readings that were good.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::FetchError;
use crate::models::{Service, SessionIdentity, UsageReport};
use crate::notify::Notification;
use crate::tracker::Decision;

pub mod orchestrator;
pub mod summary;

pub use orchestrator::{PollingOrchestrator, ServiceSource};
pub use summary::UsageSummary;

/// What happened to one service during a cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ServiceOutcome {
    Fetched {
        service: Service,
        report: UsageReport,
    },
    Failed {
        service: Service,
        error: FetchError,
        consecutive_failures: u32,
    },
    Disabled {
        service: Service,
    },
}

impl ServiceOutcome {
    pub fn service(&self) -> Service {
        match self {
            ServiceOutcome::Fetched { service, .. }
            | ServiceOutcome::Failed { service, .. }
            | ServiceOutcome::Disabled { service } => *service,
        }
    }
}

/// A tracker decision that produced a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecisionRecord {
    pub identity: SessionIdentity,
    pub decision: Decision,
    pub title: String,
    pub body: String,
}

impl DecisionRecord {
    pub fn new(identity: SessionIdentity, decision: Decision, notification: Notification) -> Self {
        Self {
            identity,
            decision,
            title: notification.title,
            body: notification.body,
        }
    }
}

/// Result of one polling cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<ServiceOutcome>,
    pub decisions: Vec<DecisionRecord>,
    pub summary: UsageSummary,
    pub on_battery: bool,
    pub next_interval_secs: u64,
    /// Set when the cycle was cut short by shutdown
    pub cancelled: bool,
}

impl CycleReport {
    pub fn outcome(&self, service: Service) -> Option<&ServiceOutcome> {
        self.outcomes.iter().find(|o| o.service() == service)
    }
}
