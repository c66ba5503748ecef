use crate::builder::HttpClientBuilder;
use crate::config::TransportSecurity;
use crate::context::CallContext;
use crate::encode::RequestBody;
use crate::error::HttpError;
use crate::filter::{self, ResponseFilter, ResponseMeta};
use crate::interceptor::{self, Interceptor};
use crate::method::Method;
use crate::response::{HttpResponse, LimitedBody, ResponseBody, StreamingResponse, read_limited};
use crate::spec::{RequestSpec, RequestSpecBuilder};
use arc_swap::ArcSwap;
use http::{Request, Response};
use parking_lot::RwLock;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::Service;
use tower::buffer::Buffer;
use tracing::{debug, info, warn};

/// Type alias for the future type of the inner service
pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

/// Type alias for the buffered service
pub type BufferedService = Buffer<Request<RequestBody>, ServiceFuture>;

/// Everything [`HttpClientBuilder::build`] hands over to the client.
pub(crate) struct ClientParts {
    pub(crate) service: BufferedService,
    pub(crate) worker: JoinHandle<()>,
    pub(crate) interceptors: Vec<Arc<dyn Interceptor>>,
    pub(crate) filters: Vec<Arc<dyn ResponseFilter>>,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

struct ClientInner {
    /// `None` once closed
    service: RwLock<Option<BufferedService>>,
    /// Request queue worker; owns the tower stack and the connection pool
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    interceptors: ArcSwap<Vec<Arc<dyn Interceptor>>>,
    filters: Vec<Arc<dyn ResponseFilter>>,
    max_body_size: usize,
    transport_security: TransportSecurity,
}

/// Asynchronous transport core.
///
/// Sends [`RequestSpec`]s through the interceptor chain, a tower stack
/// (timeout, default headers, decompression, optional concurrency limit) and
/// a pooled hyper connection, then runs response filters over the body.
/// Every call is single shot: nothing is retried and redirects are not
/// followed.
///
/// `HttpClient` is `Clone + Send + Sync`; clones share the pool, the
/// interceptor chain and the closed state. After [`close`](Self::close),
/// every call on every clone fails with [`HttpError::Closed`] without
/// touching the network.
///
/// # Example
///
/// ```ignore
/// let client = HttpClient::create(|b| b.default_header("authorization", "Bearer masterKey"))?;
///
/// let resp = client.get("https://search.example.com/indexes", |r| {
///     r.param("limit", "20");
/// }).await?;
/// let page: IndexPage = resp.json()?;
///
/// client.close().await;
/// ```
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("closed", &self.is_closed())
            .field("interceptors", &self.inner.interceptors.load().len())
            .field("filters", &self.inner.filters.len())
            .field("max_body_size", &self.inner.max_body_size)
            .field("transport_security", &self.inner.transport_security)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    pub(crate) fn from_parts(parts: ClientParts) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                service: RwLock::new(Some(parts.service)),
                worker: tokio::sync::Mutex::new(Some(parts.worker)),
                shutdown: CancellationToken::new(),
                interceptors: ArcSwap::from_pointee(parts.interceptors),
                filters: parts.filters,
                max_body_size: parts.max_body_size,
                transport_security: parts.transport_security,
            }),
        }
    }

    /// Create a builder for configuring the HTTP client
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Build a client from a configuration callback.
    ///
    /// # Errors
    /// See [`HttpClientBuilder::build`].
    pub fn create(
        configure: impl FnOnce(HttpClientBuilder) -> HttpClientBuilder,
    ) -> Result<Self, HttpError> {
        configure(HttpClientBuilder::new()).build()
    }

    /// Append an interceptor to the chain.
    ///
    /// Requests already past the interceptor phase are unaffected.
    pub fn add_interceptor(&self, interceptor: impl Interceptor) {
        let interceptor: Arc<dyn Interceptor> = Arc::new(interceptor);
        self.inner.interceptors.rcu(|chain| {
            let mut next = Vec::with_capacity(chain.len() + 1);
            next.extend(chain.iter().cloned());
            next.push(Arc::clone(&interceptor));
            next
        });
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.inner.max_body_size
    }

    /// Send a request and read the full body.
    ///
    /// Non-2xx responses are returned, not raised; see
    /// [`HttpResponse::error_for_status`].
    ///
    /// # Errors
    /// - `Closed` if the client was closed (before or during the call)
    /// - `InvalidScheme` if the URL is not allowed by the transport security mode
    /// - `Interceptor` / `ResponseFilter` naming the failing callback
    /// - `Io` if a file body cannot be read
    /// - `Transport`, `Timeout`, `Overloaded`, `BodyTooLarge` from the exchange
    pub async fn send(&self, spec: RequestSpec) -> Result<HttpResponse, HttpError> {
        self.send_with_context(spec, CallContext::new()).await
    }

    /// Like [`send`](Self::send), handing `context` to the response filters.
    ///
    /// The context comes back on the response.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn send_with_context(
        &self,
        spec: RequestSpec,
        mut context: CallContext,
    ) -> Result<HttpResponse, HttpError> {
        let (service, request) = self.prepare(spec).await?;
        let limit = self.inner.max_body_size;

        let (parts, body) = self
            .until_closed(async move {
                let (parts, body) = dispatch(service, request).await?.into_parts();
                let body = read_limited(body, limit).await?;
                Ok((parts, body))
            })
            .await?;

        let meta = ResponseMeta {
            status: parts.status,
            headers: &parts.headers,
        };
        let body = filter::apply_filters(&self.inner.filters, &meta, body, &mut context)?;

        Ok(HttpResponse::new(parts.status, parts.headers, body, context))
    }

    /// Send a request and return as soon as the headers arrive.
    ///
    /// Response filters are not applied; the body is size-limited.
    ///
    /// # Errors
    /// See [`send`](Self::send).
    pub async fn send_streaming(&self, spec: RequestSpec) -> Result<StreamingResponse, HttpError> {
        let (service, request) = self.prepare(spec).await?;
        let (parts, body) = self
            .until_closed(dispatch(service, request))
            .await?
            .into_parts();

        Ok(StreamingResponse::new(
            parts.status,
            parts.headers,
            LimitedBody::new(body, self.inner.max_body_size),
        ))
    }

    /// Send a request whose method is given as a token, e.g. `"PATCH"`.
    ///
    /// # Errors
    /// `InvalidMethod` for unknown tokens (no I/O happens), otherwise see
    /// [`send`](Self::send) and [`RequestSpec::build`].
    pub async fn request(
        &self,
        method: &str,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        let method: Method = method.parse()?;
        self.send(RequestSpec::build(method, url, configure)?).await
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub async fn get(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Get, url, configure)?).await
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub async fn post(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Post, url, configure)?).await
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub async fn put(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Put, url, configure)?).await
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub async fn patch(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Patch, url, configure)?).await
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub async fn delete(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Delete, url, configure)?).await
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub async fn head(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Head, url, configure)?).await
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub async fn options(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Options, url, configure)?).await
    }

    /// Stop accepting requests and release the connection pool.
    ///
    /// In-flight calls fail with `Closed`. Returns once the request queue
    /// worker, which owns the pool, has been torn down. Calling it again is a
    /// no-op.
    pub async fn close(&self) {
        self.inner.shutdown.cancel();
        drop(self.inner.service.write().take());

        let mut worker = self.inner.worker.lock().await;
        if let Some(handle) = worker.take() {
            handle.abort();
            if let Err(e) = handle.await
                && !e.is_cancelled()
            {
                warn!(error = %e, "request queue worker failed during shutdown");
            }
            info!("HTTP client closed; connection pool released");
        }
    }

    /// Validate, intercept and encode a spec; fails with `Closed` once closed.
    async fn prepare(
        &self,
        mut spec: RequestSpec,
    ) -> Result<(BufferedService, Request<RequestBody>), HttpError> {
        let service = self.inner.service.read().clone().ok_or(HttpError::Closed)?;
        spec.check_transport(self.inner.transport_security)?;

        let chain = self.inner.interceptors.load_full();
        interceptor::run_chain(&chain, &mut spec.view())?;

        let request = spec.into_http_request().await?;
        debug!(method = %request.method(), url = %request.uri(), "Sending request");
        Ok((service, request))
    }

    /// Run `exchange`, abandoning it with `Closed` as soon as the client closes.
    async fn until_closed<T>(
        &self,
        exchange: impl Future<Output = Result<T, HttpError>>,
    ) -> Result<T, HttpError> {
        tokio::select! {
            biased;
            () = self.inner.shutdown.cancelled() => Err(HttpError::Closed),
            result = exchange => result,
        }
    }
}

async fn dispatch(
    mut service: BufferedService,
    request: Request<RequestBody>,
) -> Result<Response<ResponseBody>, HttpError> {
    try_acquire_buffer_slot(&mut service).await?;
    service.call(request).await.map_err(map_buffer_error)
}

/// Map buffer errors to `HttpError`
///
/// Errors from the inner stack come back boxed; anything else means the
/// queue worker is gone.
fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "request queue worker closed unexpectedly; service unavailable"
            );
            HttpError::ServiceClosed
        }
    }
}

/// Try to acquire a buffer slot with fail-fast semantics.
///
/// If the queue is full, returns `HttpError::Overloaded` immediately instead
/// of waiting.
///
/// # Errors
/// `Overloaded` when full, `ServiceClosed` when the worker is gone.
async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), HttpError> {
    use std::task::Poll;

    let poll_result = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match poll_result {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(HttpError::Overloaded),
    }
}
