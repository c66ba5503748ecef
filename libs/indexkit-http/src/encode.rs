use crate::body::{Body, ByteSource, ByteStream, FormPart, PartContent};
use crate::error::{BoxError, HttpError};
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt, stream};
use http::HeaderValue;
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use mime::Mime;
use rand::Rng;
use std::convert::Infallible;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;

/// Request body type handed to the connection layer.
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// A body ready for the wire: payload plus the headers derived from it.
pub struct EncodedBody {
    body: RequestBody,
    content_type: Option<HeaderValue>,
    content_length: Option<u64>,
}

impl std::fmt::Debug for EncodedBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodedBody")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl EncodedBody {
    /// No payload and no content headers.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            body: full(Bytes::new()),
            content_type: None,
            content_length: None,
        }
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&HeaderValue> {
        self.content_type.as_ref()
    }

    /// Known payload length; `None` for stream-backed bodies (chunked).
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub(crate) fn into_parts(self) -> (RequestBody, Option<HeaderValue>, Option<u64>) {
        (self.body, self.content_type, self.content_length)
    }

    /// Drain the payload into memory.
    ///
    /// # Errors
    /// Returns the first error produced by the underlying source.
    pub async fn collect(self) -> Result<Bytes, BoxError> {
        Ok(self.body.collect().await?.to_bytes())
    }
}

/// Encode a logical body.
///
/// File sources are opened here so a missing file fails the call before any
/// network I/O.
///
/// # Errors
/// Returns `HttpError::Io` for unreadable files, `HttpError::FormEncode` for
/// pairs that cannot be URL-encoded and `HttpError::InvalidHeaderValue` for
/// media types that are not valid header values.
pub async fn encode(body: Body) -> Result<EncodedBody, HttpError> {
    match body {
        Body::Raw {
            content,
            media_type,
        } => {
            let bytes = Bytes::from(content);
            Ok(EncodedBody {
                content_length: Some(bytes.len() as u64),
                body: full(bytes),
                content_type: Some(mime_header(&media_type)?),
            })
        }
        Body::Binary { source, media_type } => {
            let media_type = media_type.unwrap_or(mime::APPLICATION_OCTET_STREAM);
            let (body, content_length) = source_body(source).await?;
            Ok(EncodedBody {
                body,
                content_type: Some(mime_header(&media_type)?),
                content_length,
            })
        }
        Body::FormData(parts) => encode_multipart(parts, &generate_boundary()).await,
        Body::FormUrlEncoded(pairs) => {
            let encoded = Bytes::from(serde_urlencoded::to_string(&pairs)?);
            Ok(EncodedBody {
                content_length: Some(encoded.len() as u64),
                body: full(encoded),
                content_type: Some(HeaderValue::from_static(
                    "application/x-www-form-urlencoded",
                )),
            })
        }
    }
}

fn full(bytes: Bytes) -> RequestBody {
    Full::new(bytes)
        .map_err(|never: Infallible| -> BoxError { match never {} })
        .boxed_unsync()
}

fn stream_body<S>(stream: S) -> RequestBody
where
    S: Stream<Item = Result<Bytes, BoxError>> + Send + 'static,
{
    StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync()
}

fn mime_header(media_type: &Mime) -> Result<HeaderValue, HttpError> {
    Ok(HeaderValue::from_str(media_type.as_ref())?)
}

async fn source_body(source: ByteSource) -> Result<(RequestBody, Option<u64>), HttpError> {
    match source {
        ByteSource::Bytes(bytes) => {
            let len = bytes.len() as u64;
            Ok((full(bytes), Some(len)))
        }
        ByteSource::File(path) => {
            let (stream, len) = open_file(&path).await?;
            Ok((stream_body(stream), Some(len)))
        }
        ByteSource::Stream(stream) => Ok((stream_body(ReleaseOnEnd::new(stream)), None)),
    }
}

async fn open_file(path: &Path) -> Result<(ByteStream, u64), HttpError> {
    let file = tokio::fs::File::open(path).await?;
    let metadata = file.metadata().await?;
    if !metadata.is_file() {
        return Err(HttpError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is not a regular file", path.display()),
        )));
    }
    let stream = ReaderStream::new(file).map_err(BoxError::from);
    Ok((Box::pin(stream), metadata.len()))
}

/// Random boundary token; 32 hex digits never occur by accident in a part.
fn generate_boundary() -> String {
    let mut rng = rand::rng();
    format!(
        "indexkit-{:016x}{:016x}",
        rng.random::<u64>(),
        rng.random::<u64>()
    )
}

/// Quote-safe rendering of a `Content-Disposition` parameter.
fn escape_param(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn part_header(part: &FormPart, boundary: &str) -> String {
    let mut header = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"",
        escape_param(&part.name)
    );
    if let Some(filename) = part.effective_filename() {
        header.push_str("; filename=\"");
        header.push_str(&escape_param(&filename));
        header.push('"');
    }
    header.push_str("\r\n");

    let media_type = match (&part.media_type, &part.content) {
        (Some(media_type), _) => Some(media_type.as_ref().to_owned()),
        (None, PartContent::Binary(_)) => Some(mime::APPLICATION_OCTET_STREAM.to_string()),
        (None, PartContent::Text(_)) => None,
    };
    if let Some(media_type) = media_type {
        header.push_str("Content-Type: ");
        header.push_str(&media_type);
        header.push_str("\r\n");
    }
    header.push_str("\r\n");
    header
}

async fn encode_multipart(parts: Vec<FormPart>, boundary: &str) -> Result<EncodedBody, HttpError> {
    let content_type = HeaderValue::from_str(&format!("multipart/form-data; boundary={boundary}"))?;

    if parts.is_empty() {
        return Ok(EncodedBody {
            body: full(Bytes::new()),
            content_type: Some(content_type),
            content_length: Some(0),
        });
    }

    let mut segments: Vec<ByteStream> = Vec::with_capacity(parts.len() * 3 + 1);
    let mut total: Option<u64> = Some(0);
    for part in parts {
        push_bytes(
            &mut segments,
            &mut total,
            Bytes::from(part_header(&part, boundary)),
        );
        match part.content {
            PartContent::Text(text) => push_bytes(&mut segments, &mut total, Bytes::from(text)),
            PartContent::Binary(ByteSource::Bytes(bytes)) => {
                push_bytes(&mut segments, &mut total, bytes);
            }
            PartContent::Binary(ByteSource::File(path)) => {
                let (stream, len) = open_file(&path).await?;
                total = total.map(|t| t + len);
                segments.push(stream);
            }
            PartContent::Binary(ByteSource::Stream(stream)) => {
                total = None;
                segments.push(ReleaseOnEnd::new(stream).boxed());
            }
        }
        push_bytes(&mut segments, &mut total, Bytes::from_static(b"\r\n"));
    }
    push_bytes(
        &mut segments,
        &mut total,
        Bytes::from(format!("--{boundary}--\r\n")),
    );

    Ok(EncodedBody {
        body: stream_body(stream::iter(segments).flatten()),
        content_type: Some(content_type),
        content_length: total,
    })
}

fn push_bytes(segments: &mut Vec<ByteStream>, total: &mut Option<u64>, bytes: Bytes) {
    *total = total.map(|t| t + bytes.len() as u64);
    segments.push(stream::once(async move { Ok(bytes) }).boxed());
}

/// Stream adapter that drops its source as soon as it is exhausted or fails.
struct ReleaseOnEnd {
    inner: Option<ByteStream>,
}

impl ReleaseOnEnd {
    fn new(inner: ByteStream) -> Self {
        Self { inner: Some(inner) }
    }
}

impl Stream for ReleaseOnEnd {
    type Item = Result<Bytes, BoxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };
        match inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                self.inner = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                self.inner = None;
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}
