use async_trait::async_trait;
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::RequestBuilder;
use std::time::Duration;
use tracing::{debug, info};

use super::{http_client, send_json, UsageSource};
use crate::config::Config;
use crate::error::FetchError;
use crate::models::{ClaudeUsageResponse, Organization, OverageSpendLimit, Service, UsageReport};

/// claude.ai web API, authenticated with the `sessionKey` cookie.
///
/// Usage lives under `/organizations/{id}`. The organization id is discovered
/// with one extra request the first time and reused until the session key
/// changes.
pub struct ClaudeClient {
    http: reqwest::Client,
    base_url: String,
    session_key: Option<String>,
    organization_id: Option<String>,
}

impl ClaudeClient {
    pub fn new(
        base_url: impl Into<String>,
        session_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session_key,
            organization_id: None,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            config.claude.base_url.clone(),
            config.claude.session_key.clone(),
            Duration::from_secs(config.polling.request_timeout_secs),
        )
    }

    pub fn cached_organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    fn require_key(&self) -> Result<&str, FetchError> {
        match self.session_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(FetchError::Unauthenticated),
        }
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, FetchError> {
        let key = self.require_key()?;

        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "Claude API request");
        Ok(self
            .http
            .get(url)
            .header(COOKIE, format!("sessionKey={key}"))
            .header(ACCEPT, "application/json"))
    }

    async fn organization_id(&mut self) -> Result<String, FetchError> {
        if let Some(cached) = &self.organization_id {
            debug!(organization_id = %cached, "Using cached organization id");
            return Ok(cached.clone());
        }

        let organizations: Vec<Organization> = send_json(self.get("/organizations")?).await?;
        let organization = organizations
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Parse("organization list is empty".to_string()))?;

        info!(
            organization_id = %organization.uuid,
            name = organization.name.as_deref().unwrap_or(""),
            "Resolved organization id"
        );
        self.organization_id = Some(organization.uuid.clone());
        Ok(organization.uuid)
    }

    pub async fn fetch_usage(&mut self) -> Result<ClaudeUsageResponse, FetchError> {
        // Fail before any network call when there is nothing to authenticate with
        self.require_key()?;

        let org = self.organization_id().await?;
        let usage: ClaudeUsageResponse =
            send_json(self.get(&format!("/organizations/{org}/usage"))?).await?;

        info!(
            five_hour = usage.five_hour.utilization,
            seven_day = usage.seven_day.utilization,
            "Claude usage received"
        );
        Ok(usage)
    }

    /// Extra-usage allowance; informational only
    pub async fn fetch_overage_spend_limit(&mut self) -> Result<OverageSpendLimit, FetchError> {
        self.require_key()?;

        let org = self.organization_id().await?;
        let overage: OverageSpendLimit =
            send_json(self.get(&format!("/organizations/{org}/overage_spend_limit"))?).await?;

        debug!(
            used = overage.used_credits(),
            limit = overage.monthly_credit_limit(),
            "Claude extra usage received"
        );
        Ok(overage)
    }
}

#[async_trait]
impl UsageSource for ClaudeClient {
    fn service(&self) -> Service {
        Service::Claude
    }

    fn credential(&self) -> Option<&str> {
        self.session_key.as_deref()
    }

    fn update_credential(&mut self, credential: Option<String>) {
        self.session_key = credential;
        self.organization_id = None;
    }

    fn apply_config(&mut self, config: &Config) {
        let base_url = config.claude.base_url.trim_end_matches('/');
        if base_url != self.base_url {
            info!(%base_url, "Claude API base URL changed");
            self.base_url = base_url.to_string();
            self.organization_id = None;
        }
    }

    async fn fetch(&mut self) -> Result<UsageReport, FetchError> {
        Ok(self.fetch_usage().await?.into_report())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(key: Option<&str>) -> ClaudeClient {
        ClaudeClient::new("http://127.0.0.1:9/", key.map(str::to_string), Duration::from_secs(1))
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_network() {
        let mut claude = client(None);
        assert_eq!(claude.fetch_usage().await.unwrap_err(), FetchError::Unauthenticated);

        let mut claude = client(Some(""));
        assert_eq!(claude.fetch().await.unwrap_err(), FetchError::Unauthenticated);
    }

    #[test]
    fn test_credential_update_invalidates_organization() {
        let mut claude = client(Some("old"));
        claude.organization_id = Some("org-1".to_string());

        claude.update_credential(Some("new".to_string()));

        assert_eq!(claude.credential(), Some("new"));
        assert_eq!(claude.cached_organization_id(), None);
    }

    #[test]
    fn test_base_url_change_invalidates_organization() {
        let mut claude = client(Some("sk"));
        claude.organization_id = Some("org-1".to_string());

        let mut config = Config::default();
        config.claude.base_url = "http://127.0.0.1:9/".to_string();
        claude.apply_config(&config);
        assert_eq!(claude.cached_organization_id(), Some("org-1"));

        config.claude.base_url = "http://127.0.0.1:10".to_string();
        claude.apply_config(&config);
        assert_eq!(claude.base_url, "http://127.0.0.1:10");
        assert_eq!(claude.cached_organization_id(), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client(None).base_url, "http://127.0.0.1:9");
    }
}
