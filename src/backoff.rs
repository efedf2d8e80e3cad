use std::time::Duration;

use crate::config::RetryPolicy;
use crate::fetch::{FetchError, Fetcher, RetryKind};
use crate::pacing::{Pacer, PauseReason};
use crate::platform::Platform;

/// Wait before retry number `retry` (1-based).
///
/// Grows linearly with `retry` for both kinds; the connection kind always
/// waits longer than the HTTP kind for the same retry number.
pub fn retry_delay(policy: &RetryPolicy, retry: u32, kind: RetryKind) -> Duration {
    let retry = retry.max(1);
    let http = policy.http_base * retry + policy.http_step * (retry - 1);
    match kind {
        RetryKind::Http => http,
        RetryKind::Connection => http + policy.connection_base * retry,
    }
}

/// Runs one request through `fetcher`, retrying retryable failures.
///
/// At most `policy.max_attempts` calls are made. The last error is returned
/// once attempts are exhausted; non-retryable errors are returned at once.
pub async fn fetch_with_retry(
    fetcher: &dyn Fetcher,
    pacer: &dyn Pacer,
    policy: &RetryPolicy,
    url: &str,
    platform: Platform,
) -> Result<String, FetchError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        let err = match fetcher.fetch(url, platform).await {
            Ok(html) => return Ok(html),
            Err(err) => err,
        };

        let (kind, message) = match &err {
            FetchError::Retryable { kind, message } => (*kind, message.clone()),
            _ => return Err(err),
        };
        if attempt >= max_attempts {
            tracing::warn!(
                %platform,
                url,
                attempts = attempt,
                error = %message,
                "giving up after max attempts"
            );
            return Err(err);
        }

        let delay = retry_delay(policy, attempt, kind);
        tracing::warn!(
            %platform,
            url,
            attempt,
            max_attempts,
            ?kind,
            delay_ms = delay.as_millis() as u64,
            error = %message,
            "retryable fetch failure; backing off"
        );
        pacer.pause(delay, PauseReason::Retry).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct ScriptedFetcher {
        responses: Mutex<Vec<Result<String, FetchError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedFetcher {
        fn new(mut responses: Vec<Result<String, FetchError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, _url: &str, _platform: Platform) -> Result<String, FetchError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(FetchError::http("HTTP 500")))
        }
    }

    #[derive(Default)]
    struct RecordingPacer {
        pauses: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Pacer for RecordingPacer {
        async fn pause(&self, delay: Duration, _reason: PauseReason) {
            self.pauses.lock().unwrap().push(delay);
        }
    }

    #[test]
    fn delays_strictly_increase() {
        let policy = RetryPolicy::default();
        for kind in [RetryKind::Http, RetryKind::Connection] {
            let delays = (1..=10)
                .map(|n| retry_delay(&policy, n, kind))
                .collect::<Vec<_>>();
            assert!(delays.windows(2).all(|w| w[0] < w[1]), "{kind:?}: {delays:?}");
        }
        assert_eq!(
            (1..=4)
                .map(|n| retry_delay(&policy, n, RetryKind::Http).as_secs())
                .collect::<Vec<_>>(),
            vec![10, 25, 40, 55]
        );
        for n in 1..=10 {
            assert!(
                retry_delay(&policy, n, RetryKind::Connection)
                    > retry_delay(&policy, n, RetryKind::Http)
            );
        }
    }

    #[tokio::test]
    async fn stops_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let fetcher = ScriptedFetcher::new(Vec::new());
        let pacer = RecordingPacer::default();

        let result = fetch_with_retry(&fetcher, &pacer, &policy, "http://x", Platform::Indeed).await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(fetcher.calls(), 3);
        let pauses = pacer.pauses.lock().unwrap().clone();
        assert_eq!(pauses.len(), 2);
        assert!(pauses[0] < pauses[1]);
    }

    #[tokio::test]
    async fn recovers_after_retryable_failure() {
        let policy = RetryPolicy::default();
        let fetcher = ScriptedFetcher::new(vec![
            Err(FetchError::connection("connection reset")),
            Ok("<html></html>".to_owned()),
        ]);
        let pacer = RecordingPacer::default();

        let html = fetch_with_retry(&fetcher, &pacer, &policy, "http://x", Platform::Glassdoor)
            .await
            .unwrap();

        assert_eq!(html, "<html></html>");
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(
            pacer.pauses.lock().unwrap().as_slice(),
            &[retry_delay(&policy, 1, RetryKind::Connection)]
        );
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::NotFound)]);
        let pacer = RecordingPacer::default();

        let err = fetch_with_retry(&fetcher, &pacer, &policy, "http://x", Platform::Indeed)
            .await
            .unwrap_err();

        assert_eq!(err, FetchError::NotFound);
        assert_eq!(fetcher.calls(), 1);
        assert!(pacer.pauses.lock().unwrap().is_empty());
    }
}
