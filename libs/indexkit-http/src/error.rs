use crate::tasks::{TaskId, TaskStatus};
use std::time::Duration;
use thiserror::Error;

/// Boxed error type accepted from user-supplied callbacks and byte streams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// HTTP client error types
///
/// Configuration errors (`InvalidMethod`, `InvalidUri`, `InvalidScheme`,
/// header errors) are raised before any network I/O. `Closed` is returned by
/// every call issued after [`HttpClient::close`](crate::HttpClient::close).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Method token is not one of the supported verbs
    #[error("Unsupported HTTP method '{0}'")]
    InvalidMethod(String),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Header that only the transport may set
    #[error("Header '{0}' is set by the transport and cannot be changed by an interceptor")]
    ProtectedHeader(http::header::HeaderName),

    /// Request attempt timed out
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Transport error (network, connection, etc)
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Reading a file-backed body failed
    #[error("Failed to read request body source: {0}")]
    Io(#[from] std::io::Error),

    /// Response body exceeded size limit
    #[error("Response body too large: limit {limit} bytes, got {actual} bytes")]
    BodyTooLarge { limit: usize, actual: usize },

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
        content_type: Option<String>,
        /// Parsed `Retry-After` header value, if present and valid
        retry_after: Option<Duration>,
    },

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Form URL encoding error
    #[error("Form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    /// Service overloaded (concurrency limit reached, fail-fast)
    #[error("Service overloaded: concurrency limit reached")]
    Overloaded,

    /// Internal service failure (buffer worker died, channel closed)
    #[error("Service unavailable: internal failure")]
    ServiceClosed,

    /// The client was closed; no further requests are accepted
    #[error("HTTP client is closed")]
    Closed,

    /// The client was built outside a Tokio runtime
    #[error("HTTP client must be built inside a Tokio runtime")]
    NoRuntime,

    /// The blocking facade's wait completed without a value or an error
    #[error("Request completed without producing a result")]
    NoResult,

    /// A request interceptor failed; the request was not sent
    #[error("Interceptor '{name}' (position {position}) failed: {source}")]
    Interceptor {
        name: String,
        position: usize,
        #[source]
        source: BoxError,
    },

    /// A response filter failed; the response body was discarded
    #[error("Response filter '{name}' (position {position}) failed: {source}")]
    ResponseFilter {
        name: String,
        position: usize,
        #[source]
        source: BoxError,
    },

    /// The service reported a task status outside the known enumeration
    #[error("Unknown task status '{0}'")]
    UnknownTaskStatus(String),

    /// Task did not reach a terminal state before the poll deadline
    #[error("Task {task} still {last_status} after {waited:?}")]
    PollTimeout {
        task: TaskId,
        last_status: TaskStatus,
        waited: Duration,
    },

    /// Polling was cancelled by the caller before the task finished
    #[error("Polling task {task} cancelled while {last_status}")]
    PollCancelled { task: TaskId, last_status: TaskStatus },

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Invalid URL scheme for transport security configuration
    #[error("URL scheme '{scheme}' not allowed: {reason}")]
    InvalidScheme {
        /// The URL scheme that was rejected
        scheme: String,
        /// Reason the scheme was rejected
        reason: String,
    },
}

impl HttpError {
    /// Returns `true` for errors raised before any network I/O was attempted.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HttpError::RequestBuild(_)
                | HttpError::InvalidMethod(_)
                | HttpError::InvalidHeaderName(_)
                | HttpError::InvalidHeaderValue(_)
                | HttpError::ProtectedHeader(_)
                | HttpError::FormEncode(_)
                | HttpError::InvalidUri { .. }
                | HttpError::InvalidScheme { .. }
        )
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        HttpError::Transport(Box::new(err))
    }
}
