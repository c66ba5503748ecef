use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default User-Agent string for HTTP requests
pub const DEFAULT_USER_AGENT: &str = concat!("indexkit-http/", env!("CARGO_PKG_VERSION"));

/// Rate limiting / concurrency limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum concurrent requests (default: 100)
    pub max_concurrent_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 100,
        }
    }
}

impl RateLimitConfig {
    /// Create config with very conservative limit
    #[must_use]
    pub fn conservative() -> Self {
        Self {
            max_concurrent_requests: 10,
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Require TLS for all connections (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP connections (local mock servers only)
    AllowInsecureHttp,
}

/// Transport core configuration
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout covering connect, send and header receipt (default: 30 seconds)
    pub request_timeout: Duration,

    /// Maximum response body size in bytes after decompression (default: 10 MB)
    pub max_body_size: usize,

    /// User-Agent header value, set only when the request carries none
    pub user_agent: String,

    /// Concurrency limit; saturated calls fail fast with `Overloaded`
    pub rate_limit: Option<RateLimitConfig>,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Maximum number of requests queued for the connection pool (default: 1024)
    ///
    /// Values below 1 are clamped to 1. A full queue fails fast with
    /// `Overloaded` instead of waiting.
    pub buffer_capacity: usize,

    /// Timeout for idle connections in the pool (default: 90 seconds)
    ///
    /// `None` keeps hyper-util's default.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host (default: 32)
    pub pool_max_idle_per_host: usize,

    /// Worker threads of the runtime owned by [`BlockingHttpClient`](crate::BlockingHttpClient) (default: 2)
    pub io_threads: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 10 * 1024 * 1024, // 10 MB
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            rate_limit: Some(RateLimitConfig::default()),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            buffer_capacity: 1024,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
            io_threads: 2,
        }
    }
}

impl HttpClientConfig {
    /// Create minimal configuration (no rate limit, small timeout and pool)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            rate_limit: None,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            io_threads: 1,
            ..Self::default()
        }
    }

    /// Create configuration for tests against local mock servers.
    ///
    /// **WARNING**: This configuration allows plain HTTP connections.
    /// Use only for local testing with mock servers, never in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024, // 1 MB
            rate_limit: None,
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Self::default()
        }
    }
}

/// How long a task poll may run before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollDeadline {
    /// Fail with `PollTimeout` once this much time has elapsed
    #[serde(with = "humantime_serde")]
    After(Duration),
    /// Poll until the task is terminal or the call is cancelled
    Never,
}

impl Default for PollDeadline {
    fn default() -> Self {
        PollDeadline::After(Duration::from_secs(5))
    }
}

/// Delay between consecutive task status fetches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollBackoff {
    /// Always wait `interval`
    #[default]
    Fixed,
    /// `min(interval * multiplier^attempt, max_interval)`, plus 0-25% jitter when enabled
    Exponential {
        multiplier: f64,
        #[serde(with = "humantime_serde")]
        max_interval: Duration,
        #[serde(default)]
        jitter: bool,
    },
}

impl PollBackoff {
    /// Doubling backoff capped at one second, with jitter.
    #[must_use]
    pub fn exponential() -> Self {
        PollBackoff::Exponential {
            multiplier: 2.0,
            max_interval: Duration::from_secs(1),
            jitter: true,
        }
    }
}

/// Task polling configuration.
///
/// ```toml
/// interval = "100ms"
/// timeout = { after = "30s" }
/// backoff = { kind = "exponential", multiplier = 2.0, max_interval = "2s", jitter = true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TaskPollConfig {
    /// Base delay between status fetches (default: 50ms)
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Overall deadline (default: 5 seconds)
    pub timeout: PollDeadline,

    pub backoff: PollBackoff,
}

impl Default for TaskPollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            timeout: PollDeadline::default(),
            backoff: PollBackoff::Fixed,
        }
    }
}

impl TaskPollConfig {
    /// Tight polling for tests: 5ms interval, 2 second deadline.
    #[must_use]
    pub fn fast() -> Self {
        Self {
            interval: Duration::from_millis(5),
            timeout: PollDeadline::After(Duration::from_secs(2)),
            backoff: PollBackoff::Fixed,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = PollDeadline::After(timeout);
        self
    }

    /// Disable the deadline; only a terminal status or cancellation ends the poll.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = PollDeadline::Never;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: PollBackoff) -> Self {
        self.backoff = backoff;
        self
    }
}
