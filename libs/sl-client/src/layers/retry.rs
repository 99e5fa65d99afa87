use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tower::Layer;

use crate::config::{ExponentialBackoff, RetryConfig, RetryTrigger, is_idempotent_call};
use crate::error::{ApiErrorKind, Error, TransportFailure};
use crate::request::{ApiRequest, ApiResponse, PreparedRequest, TransportKind};
use crate::transport::Transport;

/// Tower layer that retries a transport with exponential backoff and jitter
#[derive(Debug, Clone, Default)]
pub struct RetryLayer {
    config: RetryConfig,
}

impl RetryLayer {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryTransport<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryTransport {
            inner,
            config: self.config.clone(),
        }
    }
}

/// Transport that re-issues a call while the failure is retriable for the
/// call's shape and attempts remain.
///
/// The per-call `retries` override replaces `max_retries`. A call is retried
/// on the idempotent trigger set only when its method is `get*`/`list*` or
/// the caller marked it idempotent. The last error is returned unchanged.
#[derive(Debug, Clone)]
pub struct RetryTransport<S> {
    inner: S,
    config: RetryConfig,
}

impl<S> RetryTransport<S> {
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Map an error to the trigger the retry policy is keyed on.
#[must_use]
pub fn retry_trigger(err: &Error) -> RetryTrigger {
    match err {
        Error::Transport { failure, .. } => match failure {
            TransportFailure::Timeout => RetryTrigger::Timeout,
            TransportFailure::Status(429) => RetryTrigger::RateLimit,
            TransportFailure::Status(status) if *status >= 500 => RetryTrigger::ServerFault,
            TransportFailure::Connect | TransportFailure::Tls | TransportFailure::Io => {
                RetryTrigger::TransportError
            }
            _ => RetryTrigger::NonRetryable,
        },
        Error::Api { kind, .. } => match kind {
            ApiErrorKind::RateLimit => RetryTrigger::RateLimit,
            ApiErrorKind::ServerInternal => RetryTrigger::ServerFault,
            _ => RetryTrigger::NonRetryable,
        },
        _ => RetryTrigger::NonRetryable,
    }
}

#[async_trait]
impl<S: Transport> Transport for RetryTransport<S> {
    fn kind(&self) -> TransportKind {
        self.inner.kind()
    }

    fn prepare(&self, request: &ApiRequest) -> Result<PreparedRequest, Error> {
        self.inner.prepare(request)
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error> {
        let max_retries = request.retries.unwrap_or(self.config.max_retries);
        let idempotent = request.idempotent || is_idempotent_call(&request.method);

        let mut attempt = 0usize;
        loop {
            let err = match self.inner.send(request).await {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            let trigger = retry_trigger(&err);
            if attempt >= max_retries || !self.config.should_retry(trigger, idempotent) {
                if attempt > 0 {
                    tracing::debug!(
                        service = %request.service,
                        method = %request.method,
                        attempts = attempt + 1,
                        error = %err,
                        "giving up after retries"
                    );
                }
                return Err(err);
            }

            let backoff = calculate_backoff(&self.config.backoff, attempt);
            tracing::debug!(
                service = %request.service,
                method = %request.method,
                retry = attempt + 1,
                max_retries,
                error = %err,
                trigger = ?trigger,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                "retrying call"
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

/// Backoff for a zero-based retry `attempt`:
/// `min(initial * multiplier^attempt, max)`, plus up to 25% jitter when
/// enabled, never exceeding `max`.
#[must_use]
pub fn calculate_backoff(backoff: &ExponentialBackoff, attempt: usize) -> Duration {
    // One day; anything longer is a misconfiguration.
    const MAX_BACKOFF_SECS: f64 = 86400.0;

    let attempt_i32 = i32::try_from(attempt).unwrap_or(i32::MAX);

    let multiplier = if backoff.multiplier.is_finite() && backoff.multiplier >= 0.0 {
        backoff.multiplier
    } else {
        1.0
    };

    let initial_secs = backoff.initial.as_secs_f64();
    let max_secs = backoff.max.as_secs_f64().min(MAX_BACKOFF_SECS);

    let base = initial_secs * multiplier.powi(attempt_i32);
    let clamped = if base.is_finite() {
        base.min(max_secs).max(0.0)
    } else {
        max_secs
    };
    let duration = Duration::from_secs_f64(clamped);

    let duration = if backoff.jitter {
        let jitter_factor = rand::rng().random_range(0.0..=0.25);
        duration + duration.mul_f64(jitter_factor)
    } else {
        duration
    };

    duration.min(Duration::from_secs_f64(max_secs))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// Replays scripted results, then succeeds with `{"id": 1}`.
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<ApiResponse, Error>>>,
        calls: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<ApiResponse, Error>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(err: &Error) -> Self {
            Self::new((0..10).map(|_| Err(err.clone())).collect())
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::XmlRpc
        }

        fn prepare(&self, _request: &ApiRequest) -> Result<PreparedRequest, Error> {
            unreachable!("not used by retry tests")
        }

        async fn send(&self, _request: &ApiRequest) -> Result<ApiResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(ApiResponse {
                    value: json!({"id": 1}),
                    http_status: 200,
                    total_items: None,
                })
            })
        }
    }

    fn request(method: &str) -> ApiRequest {
        ApiRequest::new("http://unused", "SoftLayer_Account", method)
    }

    fn timeout() -> Error {
        Error::transport("SoftLayer_Account.getObject", TransportFailure::Timeout, "read timeout")
    }

    fn retry(inner: ScriptedTransport) -> RetryTransport<ScriptedTransport> {
        RetryLayer::new(RetryConfig::fast()).layer(inner)
    }

    #[tokio::test]
    async fn success_is_not_retried() {
        let svc = retry(ScriptedTransport::new(vec![]));
        let response = svc.send(&request("getObject")).await.unwrap();
        assert_eq!(response.value, json!({"id": 1}));
        assert_eq!(svc.inner().calls(), 1);
    }

    #[tokio::test]
    async fn timeouts_are_retried_until_success() {
        let svc = retry(ScriptedTransport::new(vec![Err(timeout()), Err(timeout())]));
        let response = svc.send(&request("getObject")).await.unwrap();
        assert_eq!(response.value, json!({"id": 1}));
        assert_eq!(svc.inner().calls(), 3);
    }

    #[tokio::test]
    async fn retriable_faults_exhaust_then_propagate() {
        let fault = Error::api(
            "SoftLayer_Account.getObject",
            "SoftLayer_Exception_Public",
            "Something broke",
            Some(200),
        );
        let svc = retry(ScriptedTransport::failing(&fault));
        let err = svc.send(&request("getObject")).await.unwrap_err();
        assert_eq!(err.fault_code(), Some("SoftLayer_Exception_Public"));
        assert_eq!(svc.inner().calls(), 4);
    }

    #[tokio::test]
    async fn invalid_token_is_not_retried() {
        let fault = Error::api(
            "SoftLayer_Account.getObject",
            "SoftLayer_Exception_Public",
            "Invalid API token.",
            Some(200),
        );
        let svc = retry(ScriptedTransport::failing(&fault));
        svc.send(&request("getObject")).await.unwrap_err();
        assert_eq!(svc.inner().calls(), 1);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let err = Error::transport("A.getObject", TransportFailure::Status(400), "bad request");
        let svc = retry(ScriptedTransport::failing(&err));
        svc.send(&request("getObject")).await.unwrap_err();
        assert_eq!(svc.inner().calls(), 1);
    }

    #[tokio::test]
    async fn mutations_need_explicit_idempotency() {
        let svc = retry(ScriptedTransport::failing(&timeout()));
        svc.send(&request("createObject")).await.unwrap_err();
        assert_eq!(svc.inner().calls(), 1);

        let svc = retry(ScriptedTransport::new(vec![Err(timeout())]));
        let mut req = request("createObject");
        req.idempotent = true;
        svc.send(&req).await.unwrap();
        assert_eq!(svc.inner().calls(), 2);
    }

    #[tokio::test]
    async fn per_call_retries_override_policy() {
        let svc = retry(ScriptedTransport::failing(&timeout()));
        let mut req = request("getObject");
        req.retries = Some(1);
        svc.send(&req).await.unwrap_err();
        assert_eq!(svc.inner().calls(), 2);

        let svc = retry(ScriptedTransport::failing(&timeout()));
        req.retries = Some(0);
        svc.send(&req).await.unwrap_err();
        assert_eq!(svc.inner().calls(), 1);
    }

    #[traced_test]
    #[tokio::test]
    async fn retries_are_logged_with_backoff() {
        let svc = retry(ScriptedTransport::new(vec![Err(timeout())]));
        svc.send(&request("getObject")).await.unwrap();
        assert!(logs_contain("retrying call"));
        assert!(logs_contain("backoff_ms"));
    }

    #[test]
    fn trigger_mapping() {
        assert_eq!(retry_trigger(&timeout()), RetryTrigger::Timeout);
        assert_eq!(
            retry_trigger(&Error::transport("A.b", TransportFailure::Connect, "refused")),
            RetryTrigger::TransportError
        );
        assert_eq!(
            retry_trigger(&Error::transport("A.b", TransportFailure::Status(503), "x")),
            RetryTrigger::ServerFault
        );
        assert_eq!(
            retry_trigger(&Error::transport("A.b", TransportFailure::Status(429), "x")),
            RetryTrigger::RateLimit
        );
        assert_eq!(
            retry_trigger(&Error::api(
                "A.b",
                "SoftLayer_Exception_WebService_RateLimitExceeded",
                "slow down",
                None
            )),
            RetryTrigger::RateLimit
        );
        assert_eq!(
            retry_trigger(&Error::parse("A.b", "bad xml")),
            RetryTrigger::NonRetryable
        );
    }

    #[test]
    fn backoff_grows_and_caps() {
        let backoff = ExponentialBackoff {
            jitter: false,
            ..ExponentialBackoff::default()
        };
        assert_eq!(calculate_backoff(&backoff, 0), Duration::from_millis(500));
        assert_eq!(calculate_backoff(&backoff, 1), Duration::from_secs(1));
        assert_eq!(calculate_backoff(&backoff, 3), Duration::from_secs(4));
        assert_eq!(calculate_backoff(&backoff, 10), Duration::from_secs(8));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let backoff = ExponentialBackoff::default();
        for _ in 0..50 {
            let delay = calculate_backoff(&backoff, 1);
            assert!(delay >= Duration::from_secs(1));
            assert!(delay <= Duration::from_millis(1250));
        }
        assert!(calculate_backoff(&backoff, 20) <= Duration::from_secs(8));
    }
}
