//! Pre-send request hooks.
//!
//! Interceptors run in registration order, once per request, right before
//! the request is encoded and handed to the connection pool. They see a
//! [`RequestView`]: method and URL are read-only, headers and query
//! parameters may be changed. An interceptor cannot cancel or redirect a
//! request; returning an error aborts the call with
//! [`HttpError::Interceptor`](crate::HttpError::Interceptor).

use crate::error::{BoxError, HttpError};
use crate::method::Method;
use http::header::{HOST, HeaderName, HeaderValue};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Hook invoked with every outgoing request.
pub trait Interceptor: Send + Sync + 'static {
    /// Inspect or adjust the request.
    ///
    /// # Errors
    /// Any error aborts the call before it reaches the network.
    fn intercept(&self, request: &mut RequestView<'_>) -> Result<(), BoxError>;

    /// Name reported in errors and logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Build an interceptor from a closure.
///
/// ```ignore
/// client.add_interceptor(interceptor::from_fn("api-key", |req| {
///     req.insert_header("authorization", "Bearer masterKey")?;
///     Ok(())
/// }));
/// ```
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnInterceptor<F>
where
    F: Fn(&mut RequestView<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    FnInterceptor {
        name: name.into(),
        f,
    }
}

/// Closure-backed [`Interceptor`], created by [`from_fn`].
pub struct FnInterceptor<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnInterceptor<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInterceptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(&mut RequestView<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn intercept(&self, request: &mut RequestView<'_>) -> Result<(), BoxError> {
        (self.f)(request)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Mutable view over the parts of a request an interceptor may touch.
pub struct RequestView<'a> {
    method: Method,
    url: &'a Url,
    headers: &'a mut Vec<(HeaderName, HeaderValue)>,
    params: &'a mut Vec<(String, String)>,
}

impl<'a> RequestView<'a> {
    pub(crate) fn new(
        method: Method,
        url: &'a Url,
        headers: &'a mut Vec<(HeaderName, HeaderValue)>,
        params: &'a mut Vec<(String, String)>,
    ) -> Self {
        Self {
            method,
            url,
            headers,
            params,
        }
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Destination URL, without query parameters added through the builder.
    #[must_use]
    pub fn url(&self) -> &Url {
        self.url
    }

    /// First value of `name`, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.as_str().eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.to_str().ok())
    }

    #[must_use]
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        self.headers
    }

    /// Append a header value, keeping existing values of the same name.
    ///
    /// # Errors
    /// Returns an error if the name or value is not a valid header, or
    /// `ProtectedHeader` for `Host`.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), HttpError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.push((name, value));
        Ok(())
    }

    /// Replace all values of a header with a single value.
    ///
    /// # Errors
    /// Returns an error if the name or value is not a valid header, or
    /// `ProtectedHeader` for `Host`.
    pub fn insert_header(&mut self, name: &str, value: &str) -> Result<(), HttpError> {
        let (name, value) = parse_header(name, value)?;
        self.headers.retain(|(n, _)| *n != name);
        self.headers.push((name, value));
        Ok(())
    }

    /// Remove every value of a header; returns how many were removed.
    pub fn remove_header(&mut self, name: &str) -> usize {
        let before = self.headers.len();
        self.headers
            .retain(|(n, _)| !n.as_str().eq_ignore_ascii_case(name));
        before - self.headers.len()
    }

    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        self.params
    }

    pub fn add_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.push((name.into(), value.into()));
    }
}

impl fmt::Debug for RequestView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestView")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers.len())
            .field("params", &self.params)
            .finish()
    }
}

/// Parse a header an interceptor wants to set. `Host` stays bound to the URL.
fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue), HttpError> {
    let name = HeaderName::try_from(name)?;
    if name == HOST {
        return Err(HttpError::ProtectedHeader(name));
    }
    Ok((name, HeaderValue::try_from(value)?))
}

/// Run `chain` in order over `view`, stopping at the first failure.
pub(crate) fn run_chain(
    chain: &[Arc<dyn Interceptor>],
    view: &mut RequestView<'_>,
) -> Result<(), HttpError> {
    for (position, interceptor) in chain.iter().enumerate() {
        if let Err(source) = interceptor.intercept(view) {
            tracing::warn!(
                interceptor = interceptor.name(),
                position,
                error = %source,
                "Interceptor failed, request aborted"
            );
            return Err(HttpError::Interceptor {
                name: interceptor.name().to_owned(),
                position,
                source,
            });
        }
    }
    Ok(())
}
