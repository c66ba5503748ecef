#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Client transport for eventually-consistent document-indexing services.
//!
//! This crate provides a hyper-based HTTP client with:
//! - Typed request bodies (raw bytes, binary payloads, multipart forms,
//!   URL-encoded forms) encoded once per request
//! - An immutable [`RequestSpec`] built through a closure-based builder
//! - An ordered interceptor chain that can amend headers and query params
//! - Response filters that rewrite the body with access to a per-call context
//! - Close semantics: after [`HttpClient::close`] every call fails fast
//! - A blocking facade backed by a dedicated runtime
//! - [`TaskPoller`] for waiting on server-side tasks with a bounded deadline
//!
//! Transport details follow a single-shot model: TLS via rustls (HTTPS only
//! by default), connection pooling, a per-request timeout, default headers,
//! optional concurrency limiting and transparent response decompression.
//! Nothing is retried and redirects are not followed.
//!
//! # Example
//!
//! ```ignore
//! use indexkit_http::{HttpClient, TaskHandle, TaskPoller};
//!
//! let client = HttpClient::create(|b| b.default_header("authorization", "Bearer masterKey"))?;
//!
//! let resp = client
//!     .post("https://search.example.com/indexes/movies/documents", |r| {
//!         r.json(&movies);
//!     })
//!     .await?
//!     .error_for_status()?;
//!
//! let handle = TaskHandle::from_response(&resp)?;
//! let record = TaskPoller::new(client.clone(), "https://search.example.com")?
//!     .wait_for_task(handle.id())
//!     .await?;
//! ```

mod blocking;
mod body;
mod builder;
mod client;
mod config;
mod context;
mod encode;
mod error;
pub mod filter;
pub mod interceptor;
mod layers;
mod method;
mod response;
mod spec;
mod tasks;
mod tls;

pub use blocking::BlockingHttpClient;
pub use body::{Body, BodyBuilder, ByteSource, ByteStream, FormDataBuilder, FormPart, PartContent};
pub use builder::HttpClientBuilder;
pub use client::HttpClient;
pub use config::{
    DEFAULT_USER_AGENT, HttpClientConfig, PollBackoff, PollDeadline, RateLimitConfig,
    TaskPollConfig, TlsRootConfig, TransportSecurity,
};
pub use context::CallContext;
pub use encode::{EncodedBody, RequestBody, encode};
pub use error::{BoxError, HttpError, InvalidUriKind};
pub use filter::{ResponseFilter, ResponseMeta};
pub use interceptor::{Interceptor, RequestView};
pub use layers::{DefaultHeadersLayer, DefaultHeadersService};
pub use method::Method;
pub use response::{
    ERROR_BODY_PREVIEW_LIMIT, HttpResponse, LimitedBody, ResponseBody, StreamingResponse,
    parse_retry_after,
};
pub use spec::{RequestSpec, RequestSpecBuilder};
pub use tasks::{TaskError, TaskHandle, TaskId, TaskPoller, TaskRecord, TaskStatus};
