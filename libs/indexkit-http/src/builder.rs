use crate::blocking::BlockingHttpClient;
use crate::client::{ClientParts, HttpClient};
use crate::config::{HttpClientConfig, RateLimitConfig, TlsRootConfig, TransportSecurity};
use crate::encode::RequestBody;
use crate::error::HttpError;
use crate::filter::ResponseFilter;
use crate::interceptor::Interceptor;
use crate::layers::DefaultHeadersLayer;
use crate::response::ResponseBody;
use crate::tls;
use bytes::Bytes;
use http::Response;
use http::header::{HeaderName, HeaderValue};
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::sync::Arc;
use std::time::Duration;
use tower::buffer::Buffer;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;

/// Type-erased service between layer composition steps in [`HttpClientBuilder::build`].
type InnerService =
    BoxCloneService<http::Request<RequestBody>, http::Response<ResponseBody>, HttpError>;

/// Builder for [`HttpClient`] and [`BlockingHttpClient`].
///
/// Setter errors (e.g. an invalid default header) are deferred to
/// [`build`](Self::build).
#[must_use = "HttpClientBuilder does nothing until .build() is called"]
pub struct HttpClientBuilder {
    config: HttpClientConfig,
    default_headers: Vec<(HeaderName, HeaderValue)>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    filters: Vec<Arc<dyn ResponseFilter>>,
    error: Option<HttpError>,
}

impl HttpClientBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::with_config(HttpClientConfig::default())
    }

    /// Create a builder with a specific configuration
    pub fn with_config(config: HttpClientConfig) -> Self {
        Self {
            config,
            default_headers: Vec::new(),
            interceptors: Vec::new(),
            filters: Vec::new(),
            error: None,
        }
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the user agent string
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Header sent with every request that does not already carry it.
    pub fn default_header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.default_headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Set the maximum response body size
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    /// Set transport security mode
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Allow insecure HTTP connections (for testing only)
    ///
    /// **WARNING**: This should only be used for local testing with mock servers.
    /// Only available in debug builds or with the `allow-insecure-http` feature.
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "indexkit_http::security",
            "allow_insecure_http() called - HTTP traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    pub fn tls_roots(mut self, roots: TlsRootConfig) -> Self {
        self.config.tls_roots = roots;
        self
    }

    /// Limit concurrent requests; `None` disables the limit.
    pub fn rate_limit(mut self, rate_limit: Option<RateLimitConfig>) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Set the request queue capacity (clamped to at least 1).
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity.max(1);
        self
    }

    /// Set the idle connection timeout for the connection pool
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    /// Set the maximum number of idle connections per host
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Worker threads of the runtime created by [`build_blocking`](Self::build_blocking).
    pub fn io_threads(mut self, threads: usize) -> Self {
        self.config.io_threads = threads.max(1);
        self
    }

    /// Register an interceptor; interceptors run in registration order.
    pub fn interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Append a response filter; filters compose left to right.
    pub fn response_filter(mut self, filter: impl ResponseFilter) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Build the async client.
    ///
    /// Must be called from within a Tokio runtime: the request queue worker
    /// is spawned onto it.
    ///
    /// # Errors
    /// Returns the first deferred setter error, `NoRuntime` outside a Tokio
    /// runtime, or `Tls` if the root certificate store cannot be loaded.
    pub fn build(self) -> Result<HttpClient, HttpError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| HttpError::NoRuntime)?;

        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp); \
                 use only for testing with mock servers"
            );
        }

        let timeout = self.config.request_timeout;
        let https = build_https_connector(self.config.tls_roots, self.config.transport)?;

        let mut client_builder = Client::builder(TokioExecutor::new());
        // pool_timer is required for pool_idle_timeout to take effect
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.config.pool_max_idle_per_host);
        if let Some(idle_timeout) = self.config.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }
        let hyper_client = client_builder.build::<_, RequestBody>(https);

        let headers_layer =
            DefaultHeadersLayer::try_new(&self.config.user_agent, self.default_headers)?;

        // Request flow (outer -> inner):
        //   Buffer -> LoadShed/Concurrency -> ErrorMapping -> Timeout ->
        //   DefaultHeaders -> Decompression -> hyper_client
        //
        // Single shot: no retry and no redirect following. Non-2xx responses
        // are returned as responses, not errors.
        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(headers_layer)
            .layer(DecompressionLayer::new())
            .service(hyper_client)
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        let mut boxed_service: InnerService = service.boxed_clone();

        if let Some(rate_limit) = self.config.rate_limit
            && rate_limit.max_concurrent_requests < usize::MAX
        {
            let limited_service = ServiceBuilder::new()
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(
                    rate_limit.max_concurrent_requests,
                ))
                .service(boxed_service)
                .map_err(map_load_shed_error);
            boxed_service = limited_service.boxed_clone();
        }

        // The worker owns the whole stack, including the connection pool;
        // closing the client aborts it.
        let (buffered_service, worker) =
            Buffer::pair(boxed_service, self.config.buffer_capacity.max(1));
        let worker = runtime.spawn(worker);

        Ok(HttpClient::from_parts(ClientParts {
            service: buffered_service,
            worker,
            interceptors: self.interceptors,
            filters: self.filters,
            max_body_size: self.config.max_body_size,
            transport_security: self.config.transport,
        }))
    }

    /// Build the blocking client on a dedicated runtime with `io_threads` workers.
    ///
    /// Must not be called from within an async context.
    ///
    /// # Errors
    /// Returns `Io` if the runtime cannot be started, otherwise the same
    /// errors as [`build`](Self::build).
    pub fn build_blocking(self) -> Result<BlockingHttpClient, HttpError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.io_threads.max(1))
            .thread_name("indexkit-http-io")
            .enable_all()
            .build()?;
        let client = {
            let _guard = runtime.enter();
            self.build()?
        };
        Ok(BlockingHttpClient::new(client, runtime))
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Map tower errors to `HttpError` with actual timeout duration
///
/// Typed `HttpError`s boxed by inner layers are passed through unchanged.
fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

/// Map load shed errors to `HttpError::Overloaded`
fn map_load_shed_error(err: tower::BoxError) -> HttpError {
    if err.is::<tower::load_shed::error::Overloaded>() {
        HttpError::Overloaded
    } else {
        match err.downcast::<HttpError>() {
            Ok(http_err) => *http_err,
            Err(err) => HttpError::Transport(err),
        }
    }
}

/// Box the decompression body into [`ResponseBody`].
fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let boxed_body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, boxed_body)
}

/// Build the HTTPS connector for the root store and transport mode.
///
/// ALPN advertises both h2 and http/1.1.
///
/// # Errors
/// Returns `HttpError::Tls` if `TlsRootConfig::Native` is requested but no
/// valid root certificates are available from the OS certificate store.
fn build_https_connector(
    tls_roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let builder = match tls_roots {
        TlsRootConfig::WebPki => hyper_rustls::HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(tls::get_crypto_provider())
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            let client_config =
                tls::native_roots_client_config().map_err(|e| HttpError::Tls(e.into()))?;
            hyper_rustls::HttpsConnectorBuilder::new().with_tls_config(client_config)
        }
    };

    let connector = match transport {
        TransportSecurity::AllowInsecureHttp => {
            builder.https_or_http().enable_all_versions().build()
        }
        TransportSecurity::TlsOnly => builder.https_only().enable_all_versions().build(),
    };
    Ok(connector)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::DEFAULT_USER_AGENT;
    use crate::interceptor;

    #[test]
    fn test_builder_default() {
        let builder = HttpClientBuilder::new();
        assert_eq!(builder.config.request_timeout, Duration::from_secs(30));
        assert_eq!(builder.config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(builder.config.buffer_capacity, 1024);
        assert!(builder.interceptors.is_empty());
    }

    #[test]
    fn test_builder_setters() {
        let builder = HttpClientBuilder::with_config(HttpClientConfig::minimal())
            .timeout(Duration::from_secs(3))
            .buffer_capacity(0)
            .io_threads(0)
            .max_body_size(64)
            .interceptor(interceptor::from_fn("noop", |_| Ok(())));

        assert_eq!(builder.config.request_timeout, Duration::from_secs(3));
        assert_eq!(builder.config.buffer_capacity, 1);
        assert_eq!(builder.config.io_threads, 1);
        assert_eq!(builder.config.max_body_size, 64);
        assert_eq!(builder.interceptors.len(), 1);
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let result = HttpClientBuilder::new().build();
        assert!(matches!(result, Err(HttpError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_invalid_default_header_deferred() {
        let result = HttpClientBuilder::new()
            .default_header("x-client-agent", "bad\nvalue")
            .user_agent("still-chains/1.0")
            .build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }

    #[tokio::test]
    async fn test_invalid_user_agent_rejected() {
        let result = HttpClientBuilder::new().user_agent("bad\x00agent").build();
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }

    #[tokio::test]
    async fn test_build_with_rate_limit() {
        let client = HttpClientBuilder::new()
            .rate_limit(Some(RateLimitConfig::conservative()))
            .build()
            .unwrap();
        assert!(!client.is_closed());
    }

    #[test]
    fn test_map_tower_error_timeout() {
        let err: tower::BoxError = Box::new(tower::timeout::error::Elapsed::new());
        let mapped = map_tower_error(err, Duration::from_secs(7));
        assert!(matches!(mapped, HttpError::Timeout(d) if d == Duration::from_secs(7)));
    }

    #[test]
    fn test_map_load_shed_error() {
        let err: tower::BoxError = Box::new(tower::load_shed::error::Overloaded::new());
        assert!(matches!(map_load_shed_error(err), HttpError::Overloaded));

        let err: tower::BoxError = Box::new(HttpError::Closed);
        assert!(matches!(map_load_shed_error(err), HttpError::Closed));
    }
}
