use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::time::Duration;
use tracing::{debug, info};

use super::{http_client, send_json, UsageSource};
use crate::config::Config;
use crate::error::FetchError;
use crate::models::{CodexUsageResponse, Service, SessionIdentity, UsageReport};

/// ChatGPT backend usage endpoint, authenticated with the Codex CLI's OAuth token
pub struct CodexClient {
    http: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl CodexClient {
    pub fn new(
        base_url: impl Into<String>,
        access_token: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            access_token,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Self::new(
            config.codex.base_url.clone(),
            None,
            Duration::from_secs(config.polling.request_timeout_secs),
        )
    }

    pub async fn fetch_usage(&self) -> Result<CodexUsageResponse, FetchError> {
        let token = match self.access_token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => return Err(FetchError::Unauthenticated),
        };

        let url = format!("{}/wham/usage", self.base_url);
        debug!(%url, "Codex API request");

        let request = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json");
        let usage: CodexUsageResponse = send_json(request).await?;

        info!(
            plan = usage.plan_type.as_deref().unwrap_or("unknown"),
            "Codex usage received"
        );
        Ok(usage)
    }
}

#[async_trait]
impl UsageSource for CodexClient {
    fn service(&self) -> Service {
        Service::Codex
    }

    fn credential(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    fn update_credential(&mut self, credential: Option<String>) {
        self.access_token = credential;
    }

    fn apply_config(&mut self, config: &Config) {
        let base_url = config.codex.base_url.trim_end_matches('/');
        if base_url != self.base_url {
            info!(%base_url, "Codex API base URL changed");
            self.base_url = base_url.to_string();
        }
    }

    async fn fetch(&mut self) -> Result<UsageReport, FetchError> {
        let report = self.fetch_usage().await?.into_report();
        if report.samples.is_empty() {
            debug!("Codex response carried no usable windows");
        }
        for identity in [SessionIdentity::CodexPrimary, SessionIdentity::CodexSecondary] {
            if let Some(sample) = report.sample(identity) {
                debug!(session = %identity, percentage = sample.percentage, "Codex window");
            }
        }
        Ok(report)
    }
}
