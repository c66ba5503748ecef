use crate::context::CallContext;
use crate::error::{BoxError, HttpError};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use http_body::Frame;
use http_body_util::BodyExt;
use pin_project_lite::pin_project;
use serde::de::DeserializeOwned;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};

/// Maximum body preview size for error messages (8KB).
pub const ERROR_BODY_PREVIEW_LIMIT: usize = 8 * 1024;

/// Boxed response body after the decompression layer.
pub type ResponseBody = http_body_util::combinators::BoxBody<Bytes, BoxError>;

/// Parse `Retry-After` header value into a `Duration`.
///
/// Supports delay-seconds ("120") and HTTP-date (RFC 1123). Returns `None`
/// when the header is missing, unparsable, negative or already in the past.
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;
    let trimmed = value.trim();

    if let Ok(seconds) = trimmed.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        return Some(Duration::from_secs(seconds.cast_unsigned()));
    }

    let parsed = httpdate::parse_http_date(trimmed).ok()?;
    parsed.duration_since(SystemTime::now()).ok()
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn status_error(status: StatusCode, headers: &HeaderMap, preview: &[u8]) -> HttpError {
    let preview = &preview[..preview.len().min(ERROR_BODY_PREVIEW_LIMIT)];
    HttpError::HttpStatus {
        status,
        body_preview: String::from_utf8_lossy(preview).into_owned(),
        content_type: content_type(headers),
        retry_after: parse_retry_after(headers),
    }
}

/// Result of a buffered call: status, headers and the fully read body.
///
/// The body has already passed through the client's response filters.
/// Non-2xx statuses are *not* errors at this level; use
/// [`error_for_status`](Self::error_for_status) or [`json`](Self::json) to
/// turn them into [`HttpError::HttpStatus`].
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    context: CallContext,
}

impl HttpResponse {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        context: CallContext,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            context,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Call context after every filter has run.
    #[must_use]
    pub fn context(&self) -> &CallContext {
        &self.context
    }

    #[must_use]
    pub fn into_context(self) -> CallContext {
        self.context
    }

    /// Body decoded as UTF-8, invalid sequences replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Return `self` for 2xx statuses, `HttpError::HttpStatus` otherwise.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` carrying up to 8KB of the body.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status.is_success() {
            return Ok(self);
        }
        Err(status_error(self.status, &self.headers, &self.body))
    }

    /// Decode the body as JSON after checking the status.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` if status is not 2xx.
    /// Returns `HttpError::Json` if parsing fails.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        if !self.status.is_success() {
            return Err(status_error(self.status, &self.headers, &self.body));
        }
        Ok(serde_json::from_slice(&self.body)?)
    }
}

pin_project! {
    /// Body wrapper that enforces size limits during streaming.
    ///
    /// Tracks bytes read and yields [`HttpError::BodyTooLarge`] once the limit
    /// is exceeded. The limit applies to decompressed bytes.
    pub struct LimitedBody {
        #[pin]
        inner: ResponseBody,
        limit: usize,
        read: usize,
    }
}

impl LimitedBody {
    #[must_use]
    pub fn new(inner: ResponseBody, limit: usize) -> Self {
        Self {
            inner,
            limit,
            read: 0,
        }
    }

    #[must_use]
    pub fn bytes_read(&self) -> usize {
        self.read
    }

    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl std::fmt::Debug for LimitedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LimitedBody")
            .field("limit", &self.limit)
            .field("read", &self.read)
            .finish_non_exhaustive()
    }
}

impl http_body::Body for LimitedBody {
    type Data = Bytes;
    type Error = HttpError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.project();

        match this.inner.poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    *this.read += data.len();
                    if *this.read > *this.limit {
                        return Poll::Ready(Some(Err(HttpError::BodyTooLarge {
                            limit: *this.limit,
                            actual: *this.read,
                        })));
                    }
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(HttpError::Transport(e)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

/// Result of a streaming call: status, headers and a live body.
///
/// Response filters do not run on streams. The body enforces the client's
/// `max_body_size`; dropping it releases the connection.
#[derive(Debug)]
pub struct StreamingResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: LimitedBody,
}

impl StreamingResponse {
    pub(crate) fn new(status: StatusCode, headers: HeaderMap, body: LimitedBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Live body; read it with [`http_body_util::BodyExt::frame`].
    #[must_use]
    pub fn into_body(self) -> LimitedBody {
        self.body
    }

    /// Return `self` for 2xx statuses; otherwise read a body preview and fail.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus`, or a transport error raised while
    /// reading the preview.
    pub async fn error_for_status(self) -> Result<Self, HttpError> {
        if self.status.is_success() {
            return Ok(self);
        }
        let limit = self.body.limit().min(ERROR_BODY_PREVIEW_LIMIT);
        let preview = match read_limited(self.body.inner, limit).await {
            Ok(bytes) => bytes,
            Err(HttpError::BodyTooLarge { .. }) => Bytes::from_static(b"<body too large for preview>"),
            Err(e) => return Err(e),
        };
        Err(status_error(self.status, &self.headers, &preview))
    }

    /// Read the rest of the body into memory.
    ///
    /// # Errors
    /// Returns `HttpError::BodyTooLarge` past the limit, or a transport error.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        Ok(self.body.collect().await?.to_bytes())
    }
}

/// Read `body` fully, failing once more than `limit` bytes arrive.
pub(crate) async fn read_limited(body: ResponseBody, limit: usize) -> Result<Bytes, HttpError> {
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn boxed(bytes: &'static [u8]) -> ResponseBody {
        Full::new(Bytes::from_static(bytes))
            .map_err(|never| match never {})
            .boxed()
    }

    fn response(status: StatusCode, body: &'static str) -> HttpResponse {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, "application/json".parse().unwrap());
        HttpResponse::new(status, headers, Bytes::from_static(body.as_bytes()), CallContext::new())
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::RETRY_AFTER, "  120 ".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_retry_after_rejects_invalid_and_negative() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(http::header::RETRY_AFTER, "-5".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert(http::header::RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), None);
    }

    #[test]
    fn test_parse_retry_after_http_date() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::RETRY_AFTER,
            "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap(),
        );
        assert_eq!(parse_retry_after(&headers), None);

        let future = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(60));
        headers.insert(http::header::RETRY_AFTER, future.parse().unwrap());
        let secs = parse_retry_after(&headers).unwrap().as_secs();
        assert!((58..=60).contains(&secs), "{secs}");
    }

    #[test]
    fn test_json_decodes_success() {
        #[derive(serde::Deserialize)]
        struct Stats {
            #[serde(rename = "numberOfDocuments")]
            number_of_documents: u64,
        }

        let resp = response(StatusCode::OK, r#"{"numberOfDocuments":42}"#);
        let stats: Stats = resp.json().unwrap();
        assert_eq!(stats.number_of_documents, 42);
    }

    #[test]
    fn test_json_checks_status() {
        let resp = response(
            StatusCode::NOT_FOUND,
            r#"{"message":"Index `movies` not found.","code":"index_not_found"}"#,
        );
        match resp.json::<serde_json::Value>().unwrap_err() {
            HttpError::HttpStatus {
                status,
                body_preview,
                content_type,
                ..
            } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert!(body_preview.contains("index_not_found"));
                assert_eq!(content_type.as_deref(), Some("application/json"));
            }
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }

    #[test]
    fn test_json_decode_error_surfaces() {
        let resp = response(StatusCode::OK, "not json");
        assert!(matches!(
            resp.json::<serde_json::Value>(),
            Err(HttpError::Json(_))
        ));
    }

    #[test]
    fn test_error_for_status_passes_success() {
        let resp = response(StatusCode::ACCEPTED, "{}").error_for_status().unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(resp.text(), "{}");
    }

    #[tokio::test]
    async fn test_read_limited_enforces_limit() {
        let ok = read_limited(boxed(b"0123456789"), 10).await.unwrap();
        assert_eq!(ok.len(), 10);

        let err = read_limited(boxed(b"0123456789"), 9).await.unwrap_err();
        assert!(matches!(
            err,
            HttpError::BodyTooLarge {
                limit: 9,
                actual: 10
            }
        ));
    }

    #[tokio::test]
    async fn test_limited_body_stream() {
        let body = LimitedBody::new(boxed(b"abcdef"), 4);
        let err = body.collect().await.unwrap_err();
        assert!(matches!(err, HttpError::BodyTooLarge { limit: 4, .. }));

        let body = LimitedBody::new(boxed(b"abc"), 4);
        assert_eq!(body.collect().await.unwrap().to_bytes(), "abc");
    }

    #[tokio::test]
    async fn test_streaming_error_for_status_reads_preview() {
        let resp = StreamingResponse::new(
            StatusCode::SERVICE_UNAVAILABLE,
            HeaderMap::new(),
            LimitedBody::new(boxed(b"maintenance"), 1024),
        );
        match resp.error_for_status().await.unwrap_err() {
            HttpError::HttpStatus { body_preview, .. } => assert_eq!(body_preview, "maintenance"),
            other => panic!("expected HttpStatus, got {other:?}"),
        }
    }
}
