//! Credential stores
//!
//! The clients never own credential storage. The orchestrator asks a
//! [`CredentialStore`] for the current value each cycle and pushes changes into
//! the client, which invalidates anything derived from the old credential.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::Config;
use crate::timestamp_parser::TimestampParser;

pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Option<String>;

    /// Pick up a credential carried by a freshly loaded configuration
    fn refresh(&mut self, _config: &Config) {}

    fn has_value(&self) -> bool {
        self.load().is_some_and(|value| !value.is_empty())
    }
}

/// A value handed over at startup (config file or environment)
#[derive(Debug, Clone, Default)]
pub struct StaticCredential(Option<String>);

impl StaticCredential {
    pub fn new(value: Option<String>) -> Self {
        Self(non_blank(value))
    }
}

impl CredentialStore for StaticCredential {
    fn load(&self) -> Option<String> {
        self.0.clone()
    }
}

/// The Claude `sessionKey`, following `claude.session_key` across reloads
#[derive(Debug, Clone, Default)]
pub struct ClaudeSessionKey(Option<String>);

impl ClaudeSessionKey {
    pub fn from_config(config: &Config) -> Self {
        Self(non_blank(config.claude.session_key.clone()))
    }
}

impl CredentialStore for ClaudeSessionKey {
    fn load(&self) -> Option<String> {
        self.0.clone()
    }

    fn refresh(&mut self, config: &Config) {
        let latest = non_blank(config.claude.session_key.clone());
        if latest != self.0 {
            debug!(present = latest.is_some(), "Claude session key changed in configuration");
            self.0 = latest;
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Tokens written by `codex login`
const TOKEN_LIFETIME_DAYS: i64 = 8;
/// Treat tokens as expired this long before they actually expire
const EXPIRY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodexToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CodexToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => now >= expires_at - Duration::seconds(EXPIRY_MARGIN_SECS),
            None => false,
        }
    }
}

/// Reads `~/.codex/auth.json` on every load so `codex login` is picked up live
#[derive(Debug, Clone)]
pub struct CodexAuthFile {
    path: PathBuf,
}

impl CodexAuthFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn read_token(&self) -> Option<CodexToken> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str::<Value>(&content) {
            Ok(json) => parse_auth_json(&json),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Codex auth file is not valid JSON");
                None
            }
        }
    }
}

impl CredentialStore for CodexAuthFile {
    fn load(&self) -> Option<String> {
        let token = self.read_token()?;
        if token.is_expired_at(Utc::now()) {
            debug!(expires_at = ?token.expires_at, "Codex token expired, run `codex login` to refresh");
            return None;
        }
        Some(token.access_token)
    }
}

/// Accepts the nested `{"tokens": {...}}` layout, the flat legacy layout, and a bare API key
pub fn parse_auth_json(json: &Value) -> Option<CodexToken> {
    let tokens = json.get("tokens").filter(|t| t.is_object()).unwrap_or(json);

    let access_token = tokens
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty());

    let Some(access_token) = access_token else {
        return json
            .get("OPENAI_API_KEY")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|key| CodexToken {
                access_token: key.to_string(),
                refresh_token: None,
                expires_at: None,
            });
    };

    let expires_at = if let Some(last_refresh) = json.get("last_refresh").and_then(Value::as_str) {
        TimestampParser::parse(last_refresh)
            .ok()
            .map(|dt| dt + Duration::days(TOKEN_LIFETIME_DAYS))
    } else {
        match tokens.get("expires_at") {
            Some(Value::String(s)) => TimestampParser::parse(s).ok(),
            Some(Value::Number(n)) => n
                .as_f64()
                .and_then(|secs| TimestampParser::from_unix_seconds(secs).ok()),
            _ => None,
        }
    };

    Some(CodexToken {
        access_token: access_token.to_string(),
        refresh_token: tokens
            .get("refresh_token")
            .and_then(Value::as_str)
            .map(str::to_string),
        expires_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_static_credential_blank_is_absent() {
        assert!(!StaticCredential::new(Some("  ".into())).has_value());
        assert!(!StaticCredential::new(None).has_value());
        assert!(StaticCredential::new(Some("sk".into())).has_value());
    }

    #[test]
    fn test_session_key_follows_config() {
        let mut config = Config::default();
        config.claude.session_key = Some("sk-old".into());
        let mut store = ClaudeSessionKey::from_config(&config);
        assert_eq!(store.load().as_deref(), Some("sk-old"));

        config.claude.session_key = Some("sk-new".into());
        store.refresh(&config);
        assert_eq!(store.load().as_deref(), Some("sk-new"));

        config.claude.session_key = Some(" ".into());
        store.refresh(&config);
        assert!(!store.has_value());
    }

    #[test]
    fn test_static_credential_ignores_config() {
        let mut store = StaticCredential::new(Some("sk".into()));
        let mut config = Config::default();
        config.claude.session_key = Some("other".into());
        store.refresh(&config);
        assert_eq!(store.load().as_deref(), Some("sk"));
    }

    #[test]
    fn test_nested_layout_with_last_refresh() {
        let token = parse_auth_json(&json!({
            "tokens": {"access_token": "at", "refresh_token": "rt"},
            "last_refresh": "2025-01-01T00:00:00.000Z"
        }))
        .unwrap();

        assert_eq!(token.access_token, "at");
        assert_eq!(token.refresh_token.as_deref(), Some("rt"));
        assert_eq!(token.expires_at, Some(Utc.with_ymd_and_hms(2025, 1, 9, 0, 0, 0).unwrap()));
    }

    #[test]
    fn test_flat_layout_with_numeric_expiry() {
        let token = parse_auth_json(&json!({
            "access_token": "at",
            "expires_at": 1_760_000_000
        }))
        .unwrap();
        assert_eq!(token.expires_at.map(|dt| dt.timestamp()), Some(1_760_000_000));
    }

    #[test]
    fn test_api_key_fallback() {
        let token = parse_auth_json(&json!({"OPENAI_API_KEY": "sk-key"})).unwrap();
        assert_eq!(token.access_token, "sk-key");
        assert_eq!(token.expires_at, None);
        assert!(parse_auth_json(&json!({"tokens": {}})).is_none());
    }

    #[test]
    fn test_expiry_margin() {
        let expires_at = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let token = CodexToken {
            access_token: "at".into(),
            refresh_token: None,
            expires_at: Some(expires_at),
        };
        assert!(!token.is_expired_at(expires_at - Duration::seconds(301)));
        assert!(token.is_expired_at(expires_at - Duration::seconds(300)));
    }

    #[test]
    fn test_auth_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.json");
        let last_refresh = Utc::now().to_rfc3339();
        fs::write(
            &path,
            json!({"tokens": {"access_token": "fresh"}, "last_refresh": last_refresh}).to_string(),
        )
        .unwrap();

        let store = CodexAuthFile::new(&path);
        assert_eq!(store.load().as_deref(), Some("fresh"));

        fs::write(
            &path,
            json!({"tokens": {"access_token": "stale"}, "last_refresh": "2020-01-01T00:00:00Z"})
                .to_string(),
        )
        .unwrap();
        assert_eq!(store.load(), None);
    }
}
