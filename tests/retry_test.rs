mod common;

use common::{claude_report, ScriptedSource};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use usage_watch::client::{ClientHandle, RetryPolicy, UsageSource};
use usage_watch::error::FetchError;
use usage_watch::models::Service;

#[cfg(test)]
mod retry_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fails_twice_then_succeeds_with_backoff() {
        let source = ScriptedSource::new(
            Service::Claude,
            vec![
                Err(FetchError::Network("connection reset".into())),
                Err(FetchError::Server(503)),
                Ok(claude_report(40.0, 10.0, None)),
            ],
        );
        let calls = source.calls();
        let handle = ClientHandle::new(source);

        let start = Instant::now();
        let report = handle
            .fetch_with_retry(&RetryPolicy::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.samples.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s before the 2nd attempt, 2s before the 3rd
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_millis(3100), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_is_not_retried() {
        let source = ScriptedSource::new(
            Service::Claude,
            vec![
                Err(FetchError::Unauthenticated),
                Ok(claude_report(40.0, 10.0, None)),
            ],
        );
        let calls = source.calls();
        let handle = ClientHandle::new(source);

        let start = Instant::now();
        let result = handle
            .fetch_with_retry(&RetryPolicy::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.unwrap_err(), FetchError::Unauthenticated);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_surfaces_last_error() {
        let source = ScriptedSource::new(
            Service::Codex,
            vec![
                Err(FetchError::Server(500)),
                Err(FetchError::Server(502)),
                Err(FetchError::Parse("missing field".into())),
            ],
        );
        let calls = source.calls();
        let handle = ClientHandle::new(source);

        let result = handle
            .fetch_with_retry(&RetryPolicy::default(), &CancellationToken::new())
            .await;

        assert_eq!(result.unwrap_err(), FetchError::Parse("missing field".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let source = ScriptedSource::new(Service::Claude, vec![Err(FetchError::Server(500))]);
        let calls = source.calls();
        let handle = ClientHandle::new(source);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                cancel.cancel();
            })
        };

        let start = Instant::now();
        let result = handle.fetch_with_retry(&RetryPolicy::default(), &cancel).await;
        canceller.await.unwrap();

        assert_eq!(result.unwrap_err(), FetchError::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_update_lands_between_attempts() {
        let source = ScriptedSource::new(
            Service::Claude,
            vec![
                Err(FetchError::Network("timeout".into())),
                Ok(claude_report(1.0, 1.0, None)),
            ],
        );
        let handle = ClientHandle::new(source);

        let updater = {
            let handle = handle.clone();
            tokio::spawn(async move {
                // Lands while the retry loop is sleeping, not holding the lock
                tokio::time::sleep(Duration::from_millis(500)).await;
                handle.sync_credential(Some("rotated".to_string())).await
            })
        };

        handle
            .fetch_with_retry(&RetryPolicy::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(updater.await.unwrap());
        assert_eq!(handle.lock().await.credential(), Some("rotated"));
    }

    #[tokio::test]
    async fn test_sync_credential_reports_changes_only() {
        let handle = ClientHandle::new(ScriptedSource::new(Service::Claude, vec![]));

        assert!(!handle.sync_credential(Some("test-credential".into())).await);
        assert!(handle.sync_credential(None).await);
        assert!(!handle.has_credential().await);
    }
}
