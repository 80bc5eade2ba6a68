//! Last-known-good readings
//!
//! The summary is what the display shows between cycles. A failed fetch keeps the
//! previous reading on screen; once a service has failed
//! `polling.stale_after_failures` cycles in a row its readings are dropped so a
//! long outage never shows stale numbers as current.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::models::{ExtraWindow, Service, SessionIdentity, UsageReport, UsageSample};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub sample: UsageSample,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub consecutive_failures: u32,
    pub last_error: Option<FetchError>,
    pub last_success: Option<DateTime<Utc>>,
    pub plan: Option<String>,
    pub credits: Option<String>,
    pub extras: Vec<ExtraWindow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    readings: BTreeMap<SessionIdentity, Reading>,
    services: BTreeMap<Service, ServiceHealth>,
}

impl UsageSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self, report: &UsageReport, now: DateTime<Utc>) {
        let health = self.services.entry(report.service).or_default();
        health.consecutive_failures = 0;
        health.last_error = None;
        health.last_success = Some(now);
        health.plan = report.plan.clone();
        health.credits = report.credits.clone();
        health.extras = report.extras.clone();

        // Windows missing from this report are no longer current
        for identity in report.service.identities() {
            match report.sample(identity) {
                Some(sample) => {
                    self.readings.insert(
                        identity,
                        Reading {
                            sample: *sample,
                            observed_at: now,
                        },
                    );
                }
                None => {
                    self.readings.remove(&identity);
                }
            }
        }
    }

    /// Count a failed cycle; returns true when this failure made the service stale
    pub fn record_failure(&mut self, service: Service, error: FetchError, stale_after: u32) -> bool {
        let health = self.services.entry(service).or_default();
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_error = Some(error);

        let failures = health.consecutive_failures;
        if failures < stale_after.max(1) {
            debug!(%service, failures, "Keeping last known readings");
            return false;
        }

        let had_readings = service
            .identities()
            .iter()
            .any(|identity| self.readings.contains_key(identity));
        for identity in service.identities() {
            self.readings.remove(&identity);
        }
        if had_readings {
            warn!(%service, failures, "Readings are stale, discarding");
        }
        had_readings
    }

    /// A disabled service has nothing current to show
    pub fn record_disabled(&mut self, service: Service) {
        let had_state = self.services.remove(&service).is_some();
        for identity in service.identities() {
            self.readings.remove(&identity);
        }
        if had_state {
            debug!(%service, "Service disabled, clearing its readings");
        }
    }

    pub fn reading(&self, identity: SessionIdentity) -> Option<&Reading> {
        self.readings.get(&identity)
    }

    pub fn readings(&self) -> impl Iterator<Item = (SessionIdentity, &Reading)> {
        self.readings.iter().map(|(identity, reading)| (*identity, reading))
    }

    pub fn health(&self, service: Service) -> Option<&ServiceHealth> {
        self.services.get(&service)
    }

    pub fn consecutive_failures(&self, service: Service) -> u32 {
        self.health(service)
            .map(|health| health.consecutive_failures)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claude_report(five_hour: f64) -> UsageReport {
        let mut report = UsageReport::empty(Service::Claude);
        report.samples.push((
            SessionIdentity::ClaudeFiveHour,
            UsageSample::new(five_hour, None),
        ));
        report
            .samples
            .push((SessionIdentity::ClaudeSevenDay, UsageSample::new(12.0, None)));
        report
    }

    #[test]
    fn test_failures_keep_reading_until_stale() {
        let mut summary = UsageSummary::new();
        summary.record_success(&claude_report(40.0), Utc::now());

        assert!(!summary.record_failure(Service::Claude, FetchError::Server(502), 3));
        assert!(!summary.record_failure(Service::Claude, FetchError::Server(502), 3));
        assert_eq!(
            summary.reading(SessionIdentity::ClaudeFiveHour).map(|r| r.sample.percentage),
            Some(40.0)
        );

        assert!(summary.record_failure(Service::Claude, FetchError::Server(502), 3));
        assert!(summary.reading(SessionIdentity::ClaudeFiveHour).is_none());
        assert!(summary.reading(SessionIdentity::ClaudeSevenDay).is_none());
        assert_eq!(summary.consecutive_failures(Service::Claude), 3);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let mut summary = UsageSummary::new();
        summary.record_failure(Service::Claude, FetchError::Unauthenticated, 3);
        summary.record_success(&claude_report(10.0), Utc::now());

        let health = summary.health(Service::Claude).unwrap();
        assert_eq!(health.consecutive_failures, 0);
        assert!(health.last_error.is_none());
    }

    #[test]
    fn test_other_service_untouched() {
        let mut summary = UsageSummary::new();
        summary.record_success(&claude_report(10.0), Utc::now());
        summary.record_failure(Service::Codex, FetchError::Server(500), 1);

        assert!(summary.reading(SessionIdentity::ClaudeFiveHour).is_some());
        assert_eq!(summary.consecutive_failures(Service::Claude), 0);
    }

    #[test]
    fn test_disabled_service_cleared() {
        let mut summary = UsageSummary::new();
        summary.record_success(&claude_report(55.0), Utc::now());
        summary.record_failure(Service::Claude, FetchError::Server(500), 3);

        summary.record_disabled(Service::Claude);

        assert!(summary.reading(SessionIdentity::ClaudeFiveHour).is_none());
        assert!(summary.reading(SessionIdentity::ClaudeSevenDay).is_none());
        assert!(summary.health(Service::Claude).is_none());
        assert_eq!(summary.consecutive_failures(Service::Claude), 0);
    }
}
