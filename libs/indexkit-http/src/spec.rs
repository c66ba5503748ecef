use crate::body::{Body, BodyBuilder};
use crate::config::TransportSecurity;
use crate::encode::{EncodedBody, RequestBody, encode};
use crate::error::{HttpError, InvalidUriKind};
use crate::interceptor::RequestView;
use crate::method::Method;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderName, HeaderValue};
use http::Request;
use serde::Serialize;
use url::Url;

/// Immutable description of one HTTP call.
///
/// Built once per call through [`RequestSpec::build`] (or
/// [`RequestSpec::builder`]) and consumed by
/// [`HttpClient::send`](crate::HttpClient::send). Between building and
/// sending, only interceptors may touch it, and only its headers and query
/// parameters.
///
/// Headers and query parameters keep insertion order, duplicates included.
/// Header names are case-insensitive (stored lower-case).
///
/// # Example
///
/// ```ignore
/// let spec = RequestSpec::build(Method::Get, "https://search.example.com/indexes", |r| {
///     r.header("authorization", "Bearer key")
///         .param("offset", "0")
///         .param("limit", "20");
/// })?;
/// let resp = client.send(spec).await?;
/// ```
#[derive(Debug)]
pub struct RequestSpec {
    method: Method,
    url: Url,
    headers: Vec<(HeaderName, HeaderValue)>,
    params: Vec<(String, String)>,
    body: Option<Body>,
}

impl RequestSpec {
    /// Start a builder for `method` and the absolute `url`.
    #[must_use]
    pub fn builder(method: Method, url: &str) -> RequestSpecBuilder {
        RequestSpecBuilder::new(method, url)
    }

    /// Build a spec by running `configure` on a fresh builder.
    ///
    /// The same configuration always yields the same spec.
    ///
    /// # Errors
    /// Returns the first configuration error: malformed URL, unsupported
    /// scheme, invalid header name/value or a body that failed to serialize.
    pub fn build(
        method: Method,
        url: &str,
        configure: impl FnOnce(&mut RequestSpecBuilder),
    ) -> Result<Self, HttpError> {
        let mut builder = RequestSpecBuilder::new(method, url);
        configure(&mut builder);
        builder.build()
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Target URL without the builder's query parameters.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[must_use]
    pub fn headers(&self) -> &[(HeaderName, HeaderValue)] {
        &self.headers
    }

    #[must_use]
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    #[must_use]
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Final request URL: the target URL with query parameters appended in order.
    #[must_use]
    pub fn target_url(&self) -> Url {
        let mut url = self.url.clone();
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &self.params {
                pairs.append_pair(name, value);
            }
        }
        url
    }

    pub(crate) fn view(&mut self) -> RequestView<'_> {
        RequestView::new(
            self.method,
            &self.url,
            &mut self.headers,
            &mut self.params,
        )
    }

    /// Reject schemes the transport security mode does not permit.
    pub(crate) fn check_transport(&self, transport: TransportSecurity) -> Result<(), HttpError> {
        match (self.url.scheme(), transport) {
            ("https", _) | ("http", TransportSecurity::AllowInsecureHttp) => Ok(()),
            ("http", TransportSecurity::TlsOnly) => Err(HttpError::InvalidScheme {
                scheme: "http".to_owned(),
                reason: "HTTPS required (transport security is TlsOnly)".to_owned(),
            }),
            (scheme, _) => Err(HttpError::InvalidScheme {
                scheme: scheme.to_owned(),
                reason: "only http:// and https:// schemes are supported".to_owned(),
            }),
        }
    }

    /// Encode the body and assemble the wire request.
    pub(crate) async fn into_http_request(self) -> Result<Request<RequestBody>, HttpError> {
        let target = self.target_url();
        let uri: http::Uri =
            target
                .as_str()
                .parse()
                .map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
                    url: target.to_string(),
                    kind: InvalidUriKind::ParseError,
                    reason: e.to_string(),
                })?;

        let encoded = match self.body {
            Some(body) => encode(body).await?,
            None => EncodedBody::empty(),
        };
        let (body, content_type, content_length) = encoded.into_parts();

        let mut builder = Request::builder()
            .method(http::Method::from(self.method))
            .uri(uri);

        // Caller-supplied content headers win over derived ones.
        let has_header = |name: &HeaderName| self.headers.iter().any(|(n, _)| n == name);
        if let Some(content_type) = content_type
            && !has_header(&CONTENT_TYPE)
        {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        if let Some(len) = content_length
            && !has_header(&CONTENT_LENGTH)
        {
            builder = builder.header(CONTENT_LENGTH, len);
        }

        for (name, value) in self.headers {
            builder = builder.header(name, value);
        }

        Ok(builder.body(body)?)
    }
}

/// Mutable builder handed to request configuration callbacks.
///
/// Errors (invalid header, unserializable JSON) are captured and reported
/// by [`build`](Self::build), so calls can be chained freely.
#[must_use = "RequestSpecBuilder does nothing until .build() is called"]
#[derive(Debug)]
pub struct RequestSpecBuilder {
    method: Method,
    url: String,
    headers: Vec<(HeaderName, HeaderValue)>,
    params: Vec<(String, String)>,
    body: Option<Body>,
    /// Error captured during building (deferred to `build()`)
    error: Option<HttpError>,
}

impl RequestSpecBuilder {
    fn new(method: Method, url: &str) -> Self {
        Self {
            method,
            url: url.to_owned(),
            headers: Vec::new(),
            params: Vec::new(),
            body: None,
            error: None,
        }
    }

    /// Append a header; repeated names are kept in insertion order.
    pub fn header(&mut self, name: &str, value: &str) -> &mut Self {
        if self.error.is_some() {
            return self;
        }

        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(e), _) => self.error = Some(HttpError::InvalidHeaderName(e)),
            (_, Err(e)) => self.error = Some(HttpError::InvalidHeaderValue(e)),
        }
        self
    }

    /// Append a query parameter; keys may repeat.
    pub fn param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn params<K, V>(&mut self, params: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in params {
            self.param(name, value);
        }
        self
    }

    /// Set the body from an encoder callback; a later call replaces it.
    pub fn body(&mut self, encode: impl FnOnce(BodyBuilder) -> Body) -> &mut Self {
        self.body = Some(encode(BodyBuilder));
        self
    }

    /// Serialize `value` as an `application/json` raw body.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        match serde_json::to_string(value) {
            Ok(text) => self.body = Some(BodyBuilder.json(text)),
            Err(e) => self.error = Some(HttpError::Json(e)),
        }
        self
    }

    /// Validate the URL and produce the spec.
    ///
    /// # Errors
    /// Returns the first deferred builder error, or `InvalidUri` /
    /// `InvalidScheme` when the URL is not an absolute http(s) URL.
    pub fn build(self) -> Result<RequestSpec, HttpError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        Ok(RequestSpec {
            method: self.method,
            url: parse_target_url(&self.url)?,
            headers: self.headers,
            params: self.params,
            body: self.body,
        })
    }
}

/// Parse an absolute http(s) URL.
pub(crate) fn parse_target_url(raw: &str) -> Result<Url, HttpError> {
    let url = Url::parse(raw).map_err(|e| {
        let kind = match e {
            url::ParseError::RelativeUrlWithoutBase => InvalidUriKind::MissingScheme,
            url::ParseError::EmptyHost => InvalidUriKind::MissingAuthority,
            _ => InvalidUriKind::ParseError,
        };
        HttpError::InvalidUri {
            url: raw.to_owned(),
            kind,
            reason: e.to_string(),
        }
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(HttpError::InvalidScheme {
            scheme: url.scheme().to_owned(),
            reason: "only http:// and https:// schemes are supported".to_owned(),
        });
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(HttpError::InvalidUri {
            url: raw.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "missing host/authority".to_owned(),
        });
    }

    Ok(url)
}
