//! Usage Source Clients
//!
//! One client per backing service, each implementing [`UsageSource`]. A client
//! is never shared directly: it lives inside a [`ClientHandle`], which puts it
//! behind a `tokio::sync::Mutex` so fetch attempts and credential updates are
//! serialized. The lock is held for one attempt at a time and released during
//! backoff, so a credential pushed mid-retry is used by the next attempt.
//!
//! - [`claude`] - cookie-authenticated client with a cached organization id
//! - [`codex`] - bearer-token client
//! - [`retry`] - backoff policy shared by both
//! - [`status`] - best-effort status page check

pub mod claude;
pub mod codex;
pub mod retry;
pub mod status;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::Config;
use crate::error::FetchError;
use crate::models::{Service, UsageReport};

pub use claude::ClaudeClient;
pub use codex::CodexClient;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use status::fetch_status;

#[async_trait]
pub trait UsageSource: Send {
    fn service(&self) -> Service;

    fn credential(&self) -> Option<&str>;

    /// Replace the credential and drop anything derived from the old one
    fn update_credential(&mut self, credential: Option<String>);

    fn has_credential(&self) -> bool {
        self.credential().is_some_and(|c| !c.is_empty())
    }

    /// Follow endpoint settings from a reloaded configuration
    fn apply_config(&mut self, _config: &Config) {}

    /// One attempt, no retries
    async fn fetch(&mut self) -> Result<UsageReport, FetchError>;
}

/// Exclusive-access wrapper around a client
pub struct ClientHandle<S: ?Sized + UsageSource = dyn UsageSource> {
    service: Service,
    inner: Arc<Mutex<S>>,
}

impl<S: ?Sized + UsageSource> Clone for ClientHandle<S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: UsageSource + 'static> ClientHandle<S> {
    pub fn new(source: S) -> Self {
        Self {
            service: source.service(),
            inner: Arc::new(Mutex::new(source)),
        }
    }

    /// Same client, type-erased so different services can share a list
    pub fn erased(&self) -> ClientHandle {
        let inner: Arc<Mutex<dyn UsageSource>> = self.inner.clone();
        ClientHandle {
            service: self.service,
            inner,
        }
    }
}

impl<S: ?Sized + UsageSource> ClientHandle<S> {
    pub fn service(&self) -> Service {
        self.service
    }

    /// Direct access for service-specific calls
    pub async fn lock(&self) -> MutexGuard<'_, S> {
        self.inner.lock().await
    }

    pub async fn has_credential(&self) -> bool {
        self.inner.lock().await.has_credential()
    }

    pub async fn apply_config(&self, config: &Config) {
        self.inner.lock().await.apply_config(config);
    }

    /// Push the latest stored credential; returns whether it changed
    pub async fn sync_credential(&self, latest: Option<String>) -> bool {
        let mut source = self.inner.lock().await;
        if source.credential() == latest.as_deref() {
            return false;
        }
        info!(service = %self.service, present = latest.is_some(), "Credential changed");
        source.update_credential(latest);
        true
    }

    pub async fn fetch(&self) -> Result<UsageReport, FetchError> {
        self.inner.lock().await.fetch().await
    }

    pub async fn fetch_with_retry(
        &self,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<UsageReport, FetchError> {
        retry_with_backoff(policy, cancel, |attempt| {
            let inner = Arc::clone(&self.inner);
            let service = self.service;
            async move {
                debug!(%service, attempt, "Fetching usage");
                let mut source = inner.lock().await;
                source.fetch().await
            }
        })
        .await
    }
}

/// Send a prepared request and decode a 2xx JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, FetchError> {
    let response = request.send().await?;

    let status = response.status();
    debug!(status = status.as_u16(), url = %response.url(), "HTTP response");

    if !status.is_success() {
        return Err(FetchError::from_status(status));
    }

    let body = response.text().await?;
    trace!(body = %body.chars().take(500).collect::<String>(), "Raw response");

    serde_json::from_str(&body).map_err(|e| FetchError::Parse(e.to_string()))
}

pub(crate) fn http_client(timeout: std::time::Duration) -> anyhow::Result<reqwest::Client> {
    use anyhow::Context;

    let mut builder = reqwest::Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    if !timeout.is_zero() {
        builder = builder.timeout(timeout);
    }
    builder.build().context("Failed to build HTTP client")
}
