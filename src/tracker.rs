//! Session Tracker
//!
//! Per-window threshold and reset detection. Each [`SessionIdentity`] owns exactly
//! one [`SessionTracker`]; trackers share no state, so [`TrackerRegistry`] keeps
//! them in a [`DashMap`] and two identities can be observed concurrently without
//! contending on a common lock.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized --first sample--> Armed --sample--> Armed ...
//!      (bootstrap, never alerts)      (reset detection, then threshold scan)
//! ```
//!
//! The first sample after process start only records state: thresholds already
//! surpassed are marked alerted so a restart never replays old alerts.
//!
//! A later sample whose reset instant moved by more than
//! [`RESET_JITTER_TOLERANCE_SECS`] from the last one seen starts a new window;
//! smaller moves are treated as server clock jitter and only update the stored
//! reset instant.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::models::{SessionIdentity, UsageSample};

/// Reset instants closer than this are the same window
pub const RESET_JITTER_TOLERANCE_SECS: i64 = 300;

/// Whether configured thresholds count used or remaining quota
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    #[default]
    Usage,
    Remaining,
}

impl FramingMode {
    /// Translate a configured threshold into a used-percentage threshold
    pub fn effective(&self, threshold: u8) -> i32 {
        match self {
            FramingMode::Usage => i32::from(threshold),
            FramingMode::Remaining => 100 - i32::from(threshold),
        }
    }
}

impl std::str::FromStr for FramingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "usage" | "used" => Ok(FramingMode::Usage),
            "remaining" => Ok(FramingMode::Remaining),
            other => Err(format!("unknown framing mode: {other}")),
        }
    }
}

/// Read-only alert settings for one identity, snapshotted per cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertConfig {
    pub thresholds: Vec<u8>,
    pub framing: FramingMode,
    pub enabled: bool,
}

impl AlertConfig {
    pub fn new(thresholds: Vec<u8>, framing: FramingMode, enabled: bool) -> Self {
        Self {
            thresholds,
            framing,
            enabled,
        }
    }

    /// Used-percentage thresholds, highest first, restricted to 1..=100
    pub fn effective_thresholds(&self) -> Vec<u8> {
        let unique: BTreeSet<u8> = self
            .thresholds
            .iter()
            .map(|t| self.framing.effective(*t))
            .filter(|t| (1..=100).contains(t))
            .map(|t| t as u8)
            .collect();
        unique.into_iter().rev().collect()
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self::new(vec![75, 90, 95], FramingMode::Usage, true)
    }
}

/// Outcome of one observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "threshold", rename_all = "snake_case")]
pub enum Decision {
    NoAction,
    ResetDetected,
    ThresholdCrossed(u8),
}

impl Decision {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Decision::NoAction)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionTrackerState {
    pub alerted_thresholds: BTreeSet<u8>,
    pub last_reset_at: Option<DateTime<Utc>>,
    pub is_first_check: bool,
}

impl Default for SessionTrackerState {
    fn default() -> Self {
        Self {
            alerted_thresholds: BTreeSet::new(),
            last_reset_at: None,
            is_first_check: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionTracker {
    identity: SessionIdentity,
    state: SessionTrackerState,
}

impl SessionTracker {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            state: SessionTrackerState::default(),
        }
    }

    pub fn identity(&self) -> SessionIdentity {
        self.identity
    }

    pub fn state(&self) -> &SessionTrackerState {
        &self.state
    }

    /// Feed one sample through bootstrap, reset detection and the threshold scan
    pub fn observe(&mut self, sample: &UsageSample, config: &AlertConfig) -> Decision {
        if !config.enabled {
            return Decision::NoAction;
        }

        let thresholds = config.effective_thresholds();

        if self.state.is_first_check {
            self.bootstrap(sample, &thresholds);
            return Decision::NoAction;
        }

        if let (Some(previous), Some(current)) = (self.state.last_reset_at, sample.reset_at) {
            let drift = (current - previous).num_seconds().abs();
            if drift > RESET_JITTER_TOLERANCE_SECS {
                info!(
                    session = %self.identity,
                    previous = %previous,
                    current = %current,
                    drift_secs = drift,
                    "Quota window reset detected"
                );
                self.state.alerted_thresholds.clear();
                self.state.last_reset_at = Some(current);
                return Decision::ResetDetected;
            }
        }

        // Always compare against the most recent instant so slow drift never accumulates
        if sample.reset_at.is_some() {
            self.state.last_reset_at = sample.reset_at;
        }

        let crossed = thresholds.iter().copied().find(|t| {
            sample.percentage >= f64::from(*t) && !self.state.alerted_thresholds.contains(t)
        });

        match crossed {
            Some(threshold) => {
                self.mark_reached(sample.percentage, &thresholds);
                info!(
                    session = %self.identity,
                    threshold,
                    percentage = sample.percentage,
                    "Usage threshold crossed"
                );
                Decision::ThresholdCrossed(threshold)
            }
            None => Decision::NoAction,
        }
    }

    fn bootstrap(&mut self, sample: &UsageSample, thresholds: &[u8]) {
        self.state.is_first_check = false;
        self.state.last_reset_at = sample.reset_at;
        self.mark_reached(sample.percentage, thresholds);
        debug!(
            session = %self.identity,
            percentage = sample.percentage,
            reset_at = ?sample.reset_at,
            already_alerted = ?self.state.alerted_thresholds,
            "Recorded first observation"
        );
    }

    /// Backfill every threshold at or below the current percentage
    fn mark_reached(&mut self, percentage: f64, thresholds: &[u8]) {
        self.state.alerted_thresholds.extend(
            thresholds
                .iter()
                .copied()
                .filter(|t| percentage >= f64::from(*t)),
        );
    }
}

/// One tracker per identity, each behind its own map shard
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    trackers: DashMap<SessionIdentity, SessionTracker>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        let trackers = DashMap::new();
        for identity in SessionIdentity::ALL {
            trackers.insert(identity, SessionTracker::new(identity));
        }
        Self { trackers }
    }

    pub fn observe(
        &self,
        identity: SessionIdentity,
        sample: &UsageSample,
        config: &AlertConfig,
    ) -> Decision {
        self.trackers
            .entry(identity)
            .or_insert_with(|| SessionTracker::new(identity))
            .observe(sample, config)
    }

    pub fn state(&self, identity: SessionIdentity) -> Option<SessionTrackerState> {
        self.trackers
            .get(&identity)
            .map(|tracker| tracker.state().clone())
    }
}
