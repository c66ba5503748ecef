//! Synchronous facade over [`HttpClient`].

use crate::client::HttpClient;
use crate::config::TaskPollConfig;
use crate::error::HttpError;
use crate::interceptor::Interceptor;
use crate::method::Method;
use crate::response::HttpResponse;
use crate::spec::{RequestSpec, RequestSpecBuilder};
use crate::tasks::{TaskId, TaskPoller, TaskRecord};
use parking_lot::Mutex;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tracing::debug;

/// How long [`BlockingHttpClient::close`] waits for runtime tasks to stop.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking client for synchronous callers.
///
/// Owns a dedicated multi-threaded Tokio runtime (see
/// [`HttpClientBuilder::io_threads`](crate::HttpClientBuilder::io_threads)).
/// Each call is submitted to that runtime and the calling thread waits for
/// its outcome, so errors surface exactly as the async client reports them.
///
/// Calls must not be made from inside an async context.
///
/// ```ignore
/// let client = HttpClient::builder().build_blocking()?;
/// let resp = client.get("https://search.example.com/health", |_| {})?;
/// client.close();
/// ```
#[derive(Debug)]
pub struct BlockingHttpClient {
    client: HttpClient,
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
}

impl BlockingHttpClient {
    pub(crate) fn new(client: HttpClient, runtime: Runtime) -> Self {
        Self {
            client,
            handle: runtime.handle().clone(),
            runtime: Mutex::new(Some(runtime)),
        }
    }

    /// The async client driving this facade.
    #[must_use]
    pub fn async_client(&self) -> &HttpClient {
        &self.client
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Run `fut` on the I/O runtime and block until it completes.
    fn run<T, F>(&self, fut: F) -> Result<T, HttpError>
    where
        F: Future<Output = Result<T, HttpError>> + Send + 'static,
        T: Send + 'static,
    {
        if self.client.is_closed() {
            return Err(HttpError::Closed);
        }
        let (tx, rx) = oneshot::channel();
        self.handle.spawn(async move {
            if tx.send(fut.await).is_err() {
                debug!("blocking caller went away before the call completed");
            }
        });
        rx.blocking_recv().map_err(|_| HttpError::NoResult)?
    }

    /// Blocking [`HttpClient::send`].
    ///
    /// # Errors
    /// See [`HttpClient::send`]; `NoResult` if the runtime went away
    /// before the call completed.
    pub fn send(&self, spec: RequestSpec) -> Result<HttpResponse, HttpError> {
        let client = self.client.clone();
        self.run(async move { client.send(spec).await })
    }

    /// Blocking [`HttpClient::request`].
    ///
    /// # Errors
    /// `InvalidMethod` for unknown tokens, otherwise see [`send`](Self::send).
    pub fn request(
        &self,
        method: &str,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        let method: Method = method.parse()?;
        self.send(RequestSpec::build(method, url, configure)?)
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub fn get(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Get, url, configure)?)
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub fn post(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Post, url, configure)?)
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub fn put(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Put, url, configure)?)
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub fn patch(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Patch, url, configure)?)
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub fn delete(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Delete, url, configure)?)
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub fn head(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Head, url, configure)?)
    }

    /// # Errors
    /// See [`send`](Self::send) and [`RequestSpec::build`].
    pub fn options(
        &self,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<HttpResponse, HttpError> {
        self.send(RequestSpec::build(Method::Options, url, configure)?)
    }

    /// Blocking [`TaskPoller::wait_for_task_with`] against `base_url`.
    ///
    /// # Errors
    /// See [`TaskPoller::wait_for_task`].
    pub fn wait_for_task(
        &self,
        base_url: &str,
        task: &TaskId,
        config: &TaskPollConfig,
    ) -> Result<TaskRecord, HttpError> {
        let poller = TaskPoller::new(self.client.clone(), base_url)?.with_config(config.clone());
        let task = task.clone();
        self.run(async move { poller.wait_for_task(&task).await })
    }

    /// See [`HttpClient::add_interceptor`].
    pub fn add_interceptor(&self, interceptor: impl Interceptor) {
        self.client.add_interceptor(interceptor);
    }

    /// Close the client and stop the I/O runtime.
    ///
    /// Blocks until the connection pool is released. Idempotent.
    pub fn close(&self) {
        let Some(runtime) = self.runtime.lock().take() else {
            return;
        };
        runtime.block_on(self.client.close());
        runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
        debug!("blocking HTTP client runtime stopped");
    }
}

impl Drop for BlockingHttpClient {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}
