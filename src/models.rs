//! Core Data Models
//!
//! This module defines the data that flows through one polling cycle:
//!
//! 1. **Wire**: [`ClaudeUsageResponse`] / [`CodexUsageResponse`] - decoded upstream payloads
//! 2. **Report**: [`UsageReport`] - one service's windows, keyed by [`SessionIdentity`]
//! 3. **Sample**: [`UsageSample`] - the `(percentage, reset_at)` pair a tracker observes
//!
//! ## Tolerant decoding
//!
//! The upstream payloads are loosely typed. Percentages arrive as integers, floats
//! or numeric strings; reset instants as ISO-8601 strings with varying fractional
//! precision (Claude) or unix seconds (Codex), and are sometimes absent. Decoding
//! never invents a zero percentage: an unusable required percentage is a decode
//! error, an unusable optional one drops the window.

use chrono::{DateTime, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::timestamp_parser::TimestampParser;

/// Backing service that reports usage windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Claude,
    Codex,
}

impl Service {
    pub const ALL: [Service; 2] = [Service::Claude, Service::Codex];

    pub fn display_name(&self) -> &'static str {
        match self {
            Service::Claude => "Claude",
            Service::Codex => "Codex",
        }
    }

    pub fn identities(&self) -> [SessionIdentity; 2] {
        match self {
            Service::Claude => [SessionIdentity::ClaudeFiveHour, SessionIdentity::ClaudeSevenDay],
            Service::Codex => [SessionIdentity::CodexPrimary, SessionIdentity::CodexSecondary],
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One independently tracked quota window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionIdentity {
    ClaudeFiveHour,
    ClaudeSevenDay,
    CodexPrimary,
    CodexSecondary,
}

impl SessionIdentity {
    pub const ALL: [SessionIdentity; 4] = [
        SessionIdentity::ClaudeFiveHour,
        SessionIdentity::ClaudeSevenDay,
        SessionIdentity::CodexPrimary,
        SessionIdentity::CodexSecondary,
    ];

    pub fn service(&self) -> Service {
        match self {
            SessionIdentity::ClaudeFiveHour | SessionIdentity::ClaudeSevenDay => Service::Claude,
            SessionIdentity::CodexPrimary | SessionIdentity::CodexSecondary => Service::Codex,
        }
    }

    /// Human label for the window
    pub fn label(&self) -> &'static str {
        match self {
            SessionIdentity::ClaudeFiveHour | SessionIdentity::CodexPrimary => "5-hour session",
            SessionIdentity::ClaudeSevenDay | SessionIdentity::CodexSecondary => "weekly limit",
        }
    }

    /// Stable key used in config files and JSON output
    pub fn key(&self) -> &'static str {
        match self {
            SessionIdentity::ClaudeFiveHour => "claude_five_hour",
            SessionIdentity::ClaudeSevenDay => "claude_seven_day",
            SessionIdentity::CodexPrimary => "codex_primary",
            SessionIdentity::CodexSecondary => "codex_secondary",
        }
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.service(), self.label())
    }
}

/// A single observation of one window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UsageSample {
    /// Percent of quota used; 0 and up, may exceed 100
    pub percentage: f64,
    pub reset_at: Option<DateTime<Utc>>,
}

impl UsageSample {
    pub fn new(percentage: f64, reset_at: Option<DateTime<Utc>>) -> Self {
        Self { percentage, reset_at }
    }
}

/// Informational window that is displayed but not tracked
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtraWindow {
    pub name: String,
    pub percentage: f64,
}

/// Everything one successful fetch produced for a service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageReport {
    pub service: Service,
    pub samples: Vec<(SessionIdentity, UsageSample)>,
    pub extras: Vec<ExtraWindow>,
    pub plan: Option<String>,
    pub credits: Option<String>,
}

impl UsageReport {
    pub fn empty(service: Service) -> Self {
        Self {
            service,
            samples: Vec::new(),
            extras: Vec::new(),
            plan: None,
            credits: None,
        }
    }

    pub fn sample(&self, identity: SessionIdentity) -> Option<&UsageSample> {
        self.samples
            .iter()
            .find(|(id, _)| *id == identity)
            .map(|(_, sample)| sample)
    }
}

// ---------------------------------------------------------------------------
// Tolerant number decoding
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    fn to_f64(&self) -> Option<f64> {
        match self {
            RawNumber::Int(v) => Some(*v as f64),
            RawNumber::Float(v) => Some(*v),
            RawNumber::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }
}

/// Required percentage: int, float or numeric string
pub(crate) fn deserialize_percentage<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = RawNumber::deserialize(deserializer)?;
    raw.to_f64().ok_or_else(|| match raw {
        RawNumber::Text(s) => de::Error::custom(format!("percentage is not numeric: {s:?}")),
        _ => de::Error::custom("percentage is not a finite number"),
    })
}

/// Optional number: absent, null or unparseable all become None
pub(crate) fn deserialize_optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .and_then(|value| serde_json::from_value::<RawNumber>(value).ok())
        .and_then(|n| n.to_f64()))
}

fn parse_reset(raw: Option<&str>, context: &str) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match TimestampParser::parse(raw) {
        Ok(dt) => Some(dt),
        Err(e) => {
            warn!(window = context, value = raw, error = %e, "Ignoring unparseable reset time");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Claude wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsageWindow {
    #[serde(deserialize_with = "deserialize_percentage")]
    pub utilization: f64,
    #[serde(default)]
    pub resets_at: Option<String>,
}

impl UsageWindow {
    pub fn to_sample(&self, context: &str) -> UsageSample {
        UsageSample::new(self.utilization, parse_reset(self.resets_at.as_deref(), context))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeUsageResponse {
    pub five_hour: UsageWindow,
    pub seven_day: UsageWindow,
    #[serde(default)]
    pub seven_day_sonnet: Option<UsageWindow>,
    #[serde(default)]
    pub seven_day_opus: Option<UsageWindow>,
}

impl ClaudeUsageResponse {
    pub fn into_report(self) -> UsageReport {
        let mut report = UsageReport::empty(Service::Claude);
        report.samples.push((
            SessionIdentity::ClaudeFiveHour,
            self.five_hour.to_sample(SessionIdentity::ClaudeFiveHour.key()),
        ));
        report.samples.push((
            SessionIdentity::ClaudeSevenDay,
            self.seven_day.to_sample(SessionIdentity::ClaudeSevenDay.key()),
        ));

        for (name, window) in [
            ("weekly Sonnet", &self.seven_day_sonnet),
            ("weekly Opus", &self.seven_day_opus),
        ] {
            if let Some(window) = window {
                report.extras.push(ExtraWindow {
                    name: name.to_string(),
                    percentage: window.utilization,
                });
            }
        }

        report
    }
}

/// Extra-usage (overage) allowance; amounts arrive in cents
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OverageSpendLimit {
    #[serde(rename = "monthly_credit_limit", default, deserialize_with = "deserialize_optional_number")]
    pub monthly_credit_limit_cents: Option<f64>,
    #[serde(rename = "used_credits", default, deserialize_with = "deserialize_optional_number")]
    pub used_credits_cents: Option<f64>,
    #[serde(default)]
    pub is_enabled: bool,
    #[serde(default)]
    pub out_of_credits: bool,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl OverageSpendLimit {
    pub fn monthly_credit_limit(&self) -> f64 {
        self.monthly_credit_limit_cents.unwrap_or(0.0) / 100.0
    }

    pub fn used_credits(&self) -> f64 {
        self.used_credits_cents.unwrap_or(0.0) / 100.0
    }

    pub fn usage_percentage(&self) -> f64 {
        let limit = self.monthly_credit_limit_cents.unwrap_or(0.0);
        if limit <= 0.0 {
            return 0.0;
        }
        self.used_credits_cents.unwrap_or(0.0) / limit * 100.0
    }

    pub fn remaining_credits(&self) -> f64 {
        (self.monthly_credit_limit() - self.used_credits()).max(0.0)
    }
}

// ---------------------------------------------------------------------------
// Codex wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CodexUsageWindow {
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub used_percent: Option<f64>,
    /// Unix seconds, integer or fractional
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub reset_at: Option<f64>,
    #[serde(default)]
    pub limit_window_seconds: Option<i64>,
}

impl CodexUsageWindow {
    fn to_sample(&self, context: &str) -> Option<UsageSample> {
        let percentage = self.used_percent?;
        let reset_at = self.reset_at.and_then(|secs| match TimestampParser::from_unix_seconds(secs) {
            Ok(dt) => Some(dt),
            Err(e) => {
                warn!(window = context, error = %e, "Ignoring out-of-range reset time");
                None
            }
        });
        Some(UsageSample::new(percentage, reset_at))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodexRateLimit {
    #[serde(default)]
    pub primary_window: Option<CodexUsageWindow>,
    #[serde(default)]
    pub secondary_window: Option<CodexUsageWindow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodexCredits {
    #[serde(default)]
    pub has_credits: bool,
    #[serde(default)]
    pub unlimited: bool,
    #[serde(default, deserialize_with = "deserialize_optional_number")]
    pub balance: Option<f64>,
}

impl CodexCredits {
    pub fn formatted_balance(&self) -> String {
        if self.unlimited {
            return "unlimited".to_string();
        }
        match self.balance {
            Some(balance) => format!("${balance:.2}"),
            None => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CodexUsageResponse {
    #[serde(default)]
    pub plan_type: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<CodexRateLimit>,
    #[serde(default)]
    pub credits: Option<CodexCredits>,
}

impl CodexUsageResponse {
    pub fn into_report(self) -> UsageReport {
        let mut report = UsageReport::empty(Service::Codex);
        report.plan = self.plan_type;
        report.credits = self.credits.as_ref().map(CodexCredits::formatted_balance);

        if let Some(rate_limit) = self.rate_limit {
            let windows = [
                (SessionIdentity::CodexPrimary, rate_limit.primary_window),
                (SessionIdentity::CodexSecondary, rate_limit.secondary_window),
            ];
            for (identity, window) in windows {
                if let Some(sample) = window.and_then(|w| w.to_sample(identity.key())) {
                    report.samples.push((identity, sample));
                }
            }
        }

        report
    }
}

// ---------------------------------------------------------------------------
// Status page wire types
// ---------------------------------------------------------------------------

/// Overall health reported by status.claude.com
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusIndicator {
    None,
    Minor,
    Major,
    Critical,
}

impl StatusIndicator {
    /// Unrecognized indicators read as operational
    pub fn parse(value: &str) -> Self {
        match value {
            "minor" => Self::Minor,
            "major" => Self::Major,
            "critical" => Self::Critical,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaudeSystemStatus {
    pub indicator: StatusIndicator,
    pub description: String,
    pub active_incidents: usize,
}

impl ClaudeSystemStatus {
    pub fn has_issue(&self) -> bool {
        self.indicator != StatusIndicator::None
    }
}

/// `GET /api/v2/summary.json`
#[derive(Debug, Clone, Deserialize)]
pub struct StatusPageResponse {
    pub status: StatusPageState,
    #[serde(default)]
    pub incidents: Vec<StatusIncident>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPageState {
    pub indicator: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusIncident {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub impact: String,
}

impl StatusPageResponse {
    pub fn into_status(self) -> ClaudeSystemStatus {
        ClaudeSystemStatus {
            indicator: StatusIndicator::parse(&self.status.indicator),
            description: self.status.description,
            active_incidents: self.incidents.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_claude_percentage_variants() {
        let body = r#"{
            "five_hour": {"utilization": 42, "resets_at": "2025-01-01T10:00:00Z"},
            "seven_day": {"utilization": "12.5", "resets_at": null},
            "seven_day_opus": {"utilization": 3.25, "resets_at": null}
        }"#;
        let report = serde_json::from_str::<ClaudeUsageResponse>(body).unwrap().into_report();

        let five = report.sample(SessionIdentity::ClaudeFiveHour).unwrap();
        assert_eq!(five.percentage, 42.0);
        assert_eq!(five.reset_at, Some(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()));

        let weekly = report.sample(SessionIdentity::ClaudeSevenDay).unwrap();
        assert_eq!(weekly.percentage, 12.5);
        assert_eq!(weekly.reset_at, None);

        assert_eq!(report.extras.len(), 1);
        assert_eq!(report.extras[0].name, "weekly Opus");
    }

    #[test]
    fn test_claude_non_numeric_percentage_is_an_error() {
        let body = r#"{
            "five_hour": {"utilization": "lots"},
            "seven_day": {"utilization": 1}
        }"#;
        assert!(serde_json::from_str::<ClaudeUsageResponse>(body).is_err());
    }

    #[test]
    fn test_claude_null_percentage_is_an_error() {
        let body = r#"{
            "five_hour": {"utilization": null},
            "seven_day": {"utilization": 1}
        }"#;
        assert!(serde_json::from_str::<ClaudeUsageResponse>(body).is_err());
    }

    #[test]
    fn test_claude_garbage_reset_is_absent() {
        let window: UsageWindow =
            serde_json::from_str(r#"{"utilization": 5, "resets_at": "soon"}"#).unwrap();
        assert_eq!(window.to_sample("test").reset_at, None);
    }

    #[test]
    fn test_codex_missing_window_is_skipped() {
        let body = r#"{
            "plan_type": "plus",
            "rate_limit": {"primary_window": {"used_percent": 40, "reset_at": 1760000000}},
            "credits": {"has_credits": true, "unlimited": false, "balance": "12.5"}
        }"#;
        let report = serde_json::from_str::<CodexUsageResponse>(body).unwrap().into_report();

        assert_eq!(report.samples.len(), 1);
        let primary = report.sample(SessionIdentity::CodexPrimary).unwrap();
        assert_eq!(primary.percentage, 40.0);
        assert_eq!(primary.reset_at.map(|dt| dt.timestamp()), Some(1_760_000_000));
        assert!(report.sample(SessionIdentity::CodexSecondary).is_none());
        assert_eq!(report.plan.as_deref(), Some("plus"));
        assert_eq!(report.credits.as_deref(), Some("$12.50"));
    }

    #[test]
    fn test_codex_window_without_percentage_is_skipped() {
        let body = r#"{"rate_limit": {"secondary_window": {"reset_at": 1760000000.5}}}"#;
        let report = serde_json::from_str::<CodexUsageResponse>(body).unwrap().into_report();
        assert!(report.samples.is_empty());
    }

    #[test]
    fn test_overage_derived_values() {
        let body = r#"{"monthly_credit_limit": 5000, "used_credits": 1250.0, "is_enabled": true}"#;
        let overage: OverageSpendLimit = serde_json::from_str(body).unwrap();
        assert_eq!(overage.monthly_credit_limit(), 50.0);
        assert_eq!(overage.used_credits(), 12.5);
        assert_eq!(overage.usage_percentage(), 25.0);
        assert_eq!(overage.remaining_credits(), 37.5);
        assert_eq!(overage.currency, "USD");
        assert!(!overage.out_of_credits);
    }

    #[test]
    fn test_overage_zero_limit() {
        let overage: OverageSpendLimit = serde_json::from_str("{}").unwrap();
        assert_eq!(overage.usage_percentage(), 0.0);
        assert_eq!(overage.remaining_credits(), 0.0);
    }

    #[test]
    fn test_identity_service_mapping() {
        for service in Service::ALL {
            for identity in service.identities() {
                assert_eq!(identity.service(), service);
            }
        }
        assert_eq!(SessionIdentity::ClaudeFiveHour.to_string(), "Claude 5-hour session");
    }

    #[test]
    fn test_status_page_summary() {
        let body = r#"{
            "page": {"id": "x", "name": "Claude"},
            "status": {"indicator": "minor", "description": "Partially Degraded Service"},
            "incidents": [{"name": "Elevated errors", "status": "investigating", "impact": "minor"}]
        }"#;
        let status = serde_json::from_str::<StatusPageResponse>(body).unwrap().into_status();
        assert_eq!(status.indicator, StatusIndicator::Minor);
        assert_eq!(status.active_incidents, 1);
        assert!(status.has_issue());

        let unknown = r#"{"status": {"indicator": "maintenance", "description": "Scheduled"}}"#;
        let status = serde_json::from_str::<StatusPageResponse>(unknown).unwrap().into_status();
        assert_eq!(status.indicator, StatusIndicator::None);
        assert_eq!(status.active_incidents, 0);
        assert!(!status.has_issue());
    }
}
