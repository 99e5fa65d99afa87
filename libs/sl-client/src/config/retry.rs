use std::collections::HashSet;
use std::time::Duration;

/// Failure classes a [`RetryConfig`] can retry on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RetryTrigger {
    /// Connection refused, DNS failure, reset, TLS handshake
    TransportError,
    /// Request timeout
    Timeout,
    /// `RateLimitExceeded` fault or HTTP 429
    RateLimit,
    /// `SoftLayer_Exception_Public`, "Please try again", HTTP 5xx
    ServerFault,
    /// Error that is never retryable (authentication, validation, parse, ...)
    NonRetryable,
}

/// Check whether a method name is read-shaped and therefore safe to retry.
///
/// `get*` methods map to HTTP GET on REST, so this also covers GET-shaped
/// requests.
#[must_use]
pub fn is_idempotent_call(method: &str) -> bool {
    method.starts_with("get") || method.starts_with("list")
}

/// Delay before retry `n` (0-based) is `min(initial * multiplier^n, max)`,
/// plus jitter when enabled.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 500ms)
    pub initial: Duration,

    /// Maximum backoff duration (default: 8s)
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Adds a random 0-25% to each delay (default: true)
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// Create fast backoff for testing (1ms initial, 10ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(10),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

/// Which failures are retried, how often, and how long to wait.
///
/// - `always_retry`: triggers that retry any call
/// - `idempotent_retry`: triggers that retry only `get*`/`list*` calls, or
///   calls the caller marked idempotent
///
/// Mutating calls are not retried by default: `always_retry` starts empty.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the initial attempt (default: 3)
    /// Total attempts = 1 (initial) + `max_retries`
    pub max_retries: usize,

    pub backoff: ExponentialBackoff,

    /// Triggers that always retry regardless of the call shape
    pub always_retry: HashSet<RetryTrigger>,

    /// Default: `[TransportError, Timeout, RateLimit, ServerFault]`
    pub idempotent_retry: HashSet<RetryTrigger>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: ExponentialBackoff::default(),
            always_retry: HashSet::new(),
            idempotent_retry: HashSet::from([
                RetryTrigger::TransportError,
                RetryTrigger::Timeout,
                RetryTrigger::RateLimit,
                RetryTrigger::ServerFault,
            ]),
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Default policy with [`ExponentialBackoff::fast`].
    #[must_use]
    pub fn fast() -> Self {
        Self {
            backoff: ExponentialBackoff::fast(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn should_retry(&self, trigger: RetryTrigger, idempotent: bool) -> bool {
        if trigger == RetryTrigger::NonRetryable {
            return false;
        }
        self.always_retry.contains(&trigger)
            || (idempotent && self.idempotent_retry.contains(&trigger))
    }
}
