//! status.claude.com health check
//!
//! Informational only. Any failure is logged and reported as no status.

use reqwest::header::ACCEPT;
use std::time::Duration;
use tracing::{debug, warn};

use super::{http_client, send_json};
use crate::models::{ClaudeSystemStatus, StatusPageResponse};

const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn fetch_status(url: &str) -> Option<ClaudeSystemStatus> {
    let http = match http_client(STATUS_TIMEOUT) {
        Ok(http) => http,
        Err(e) => {
            warn!(error = %e, "Could not build status client");
            return None;
        }
    };

    let request = http.get(url).header(ACCEPT, "application/json");
    match send_json::<StatusPageResponse>(request).await {
        Ok(response) => {
            let status = response.into_status();
            debug!(
                indicator = ?status.indicator,
                incidents = status.active_incidents,
                "Claude status received"
            );
            Some(status)
        }
        Err(e) => {
            warn!(%url, error = %e, "Could not fetch Claude status");
            None
        }
    }
}
