//! Logical request payloads.
//!
//! A [`Body`] describes *what* to send; [`encode`](fn@crate::encode) turns it into bytes
//! on the wire when the request is dispatched. Bodies are usually produced
//! through [`BodyBuilder`] inside a request configuration callback:
//!
//! ```ignore
//! let spec = RequestSpec::build(Method::Post, url, |r| {
//!     r.body(|b| b.form_data(|form| {
//!         form.text("title", "Dune");
//!         form.file("cover", "/tmp/dune.png");
//!     }));
//! })?;
//! ```

use crate::error::BoxError;
use bytes::Bytes;
use futures_util::Stream;
use mime::Mime;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;

/// Live byte stream accepted as a request body source.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, BoxError>> + Send>>;

/// Where binary content comes from.
///
/// All three sources are encoded uniformly. File sources are opened only
/// when the request is dispatched; stream sources are passed through without
/// buffering and released once fully consumed.
pub enum ByteSource {
    Bytes(Bytes),
    File(PathBuf),
    Stream(ByteStream),
}

impl ByteSource {
    /// Wrap any `Send` stream of byte chunks.
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        use futures_util::TryStreamExt;
        ByteSource::Stream(Box::pin(stream.map_err(Into::into)))
    }

    /// File name component of a file source.
    pub(crate) fn file_name(&self) -> Option<String> {
        match self {
            ByteSource::File(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            ByteSource::Bytes(_) | ByteSource::Stream(_) => None,
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            ByteSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ByteSource::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for ByteSource {
    fn from(bytes: Bytes) -> Self {
        ByteSource::Bytes(bytes)
    }
}

impl From<Vec<u8>> for ByteSource {
    fn from(bytes: Vec<u8>) -> Self {
        ByteSource::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for ByteSource {
    fn from(bytes: &'static [u8]) -> Self {
        ByteSource::Bytes(Bytes::from_static(bytes))
    }
}

impl From<PathBuf> for ByteSource {
    fn from(path: PathBuf) -> Self {
        ByteSource::File(path)
    }
}

impl From<&Path> for ByteSource {
    fn from(path: &Path) -> Self {
        ByteSource::File(path.to_path_buf())
    }
}

/// Content of a single multipart part.
#[derive(Debug)]
pub enum PartContent {
    Text(String),
    Binary(ByteSource),
}

/// Named part of a `multipart/form-data` body.
#[derive(Debug)]
pub struct FormPart {
    pub(crate) name: String,
    pub(crate) content: PartContent,
    pub(crate) filename: Option<String>,
    pub(crate) media_type: Option<Mime>,
}

impl FormPart {
    /// Plain text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: PartContent::Text(value.into()),
            filename: None,
            media_type: None,
        }
    }

    /// Binary field; the filename is inferred for file sources.
    pub fn binary(name: impl Into<String>, source: impl Into<ByteSource>) -> Self {
        Self {
            name: name.into(),
            content: PartContent::Binary(source.into()),
            filename: None,
            media_type: None,
        }
    }

    /// Explicit filename; overrides the one inferred from a file path.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn media_type(mut self, media_type: Mime) -> Self {
        self.media_type = Some(media_type);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filename written to `Content-Disposition`, explicit or inferred.
    #[must_use]
    pub fn effective_filename(&self) -> Option<String> {
        if let Some(filename) = &self.filename {
            return Some(filename.clone());
        }
        match &self.content {
            PartContent::Binary(source) => source.file_name(),
            PartContent::Text(_) => None,
        }
    }
}

/// Request payload.
#[derive(Debug)]
pub enum Body {
    /// UTF-8 text sent as-is with the given media type
    Raw { content: String, media_type: Mime },
    /// Binary content; `application/octet-stream` when no media type is set
    Binary {
        source: ByteSource,
        media_type: Option<Mime>,
    },
    /// `multipart/form-data`, parts in insertion order
    FormData(Vec<FormPart>),
    /// `application/x-www-form-urlencoded`, pairs in insertion order
    FormUrlEncoded(Vec<(String, String)>),
}

impl Body {
    /// Replace the media type of a raw or binary body.
    ///
    /// Form bodies derive their content type from the encoding and are
    /// returned unchanged.
    #[must_use]
    pub fn with_media_type(self, media_type: Mime) -> Self {
        match self {
            Body::Raw { content, .. } => Body::Raw {
                content,
                media_type,
            },
            Body::Binary { source, .. } => Body::Binary {
                source,
                media_type: Some(media_type),
            },
            other @ (Body::FormData(_) | Body::FormUrlEncoded(_)) => other,
        }
    }

    /// Whether this is a form body without fields (encodes to zero bytes).
    #[must_use]
    pub fn is_empty_form(&self) -> bool {
        match self {
            Body::FormData(parts) => parts.is_empty(),
            Body::FormUrlEncoded(pairs) => pairs.is_empty(),
            Body::Raw { .. } | Body::Binary { .. } => false,
        }
    }
}

fn application_xml() -> Mime {
    "application/xml".parse().unwrap_or(mime::TEXT_XML)
}

/// Factory handed to [`RequestSpecBuilder::body`](crate::RequestSpecBuilder::body).
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyBuilder;

impl BodyBuilder {
    #[must_use]
    pub fn raw(self, content: impl Into<String>, media_type: Mime) -> Body {
        Body::Raw {
            content: content.into(),
            media_type,
        }
    }

    /// `text/plain; charset=utf-8`
    #[must_use]
    pub fn text(self, content: impl Into<String>) -> Body {
        self.raw(content, mime::TEXT_PLAIN_UTF_8)
    }

    /// Pre-serialized JSON text, `application/json`
    #[must_use]
    pub fn json(self, content: impl Into<String>) -> Body {
        self.raw(content, mime::APPLICATION_JSON)
    }

    /// `application/xml`
    #[must_use]
    pub fn xml(self, content: impl Into<String>) -> Body {
        self.raw(content, application_xml())
    }

    /// `text/html; charset=utf-8`
    #[must_use]
    pub fn html(self, content: impl Into<String>) -> Body {
        self.raw(content, mime::TEXT_HTML_UTF_8)
    }

    #[must_use]
    pub fn bytes(self, bytes: impl Into<Bytes>) -> Body {
        Body::Binary {
            source: ByteSource::Bytes(bytes.into()),
            media_type: None,
        }
    }

    #[must_use]
    pub fn file(self, path: impl Into<PathBuf>) -> Body {
        Body::Binary {
            source: ByteSource::File(path.into()),
            media_type: None,
        }
    }

    #[must_use]
    pub fn stream<S, E>(self, stream: S) -> Body
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Body::Binary {
            source: ByteSource::stream(stream),
            media_type: None,
        }
    }

    #[must_use]
    pub fn binary(self, source: ByteSource, media_type: Option<Mime>) -> Body {
        Body::Binary { source, media_type }
    }

    pub fn form_data(self, configure: impl FnOnce(&mut FormDataBuilder)) -> Body {
        let mut form = FormDataBuilder::default();
        configure(&mut form);
        Body::FormData(form.parts)
    }

    pub fn form_url_encoded<K, V>(self, pairs: impl IntoIterator<Item = (K, V)>) -> Body
    where
        K: Into<String>,
        V: Into<String>,
    {
        Body::FormUrlEncoded(
            pairs
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Collects multipart parts in insertion order.
#[derive(Debug, Default)]
pub struct FormDataBuilder {
    parts: Vec<FormPart>,
}

impl FormDataBuilder {
    pub fn text(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.part(FormPart::text(name, value))
    }

    pub fn bytes(&mut self, name: impl Into<String>, bytes: impl Into<Bytes>) -> &mut Self {
        self.part(FormPart::binary(name, ByteSource::Bytes(bytes.into())))
    }

    pub fn file(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> &mut Self {
        self.part(FormPart::binary(name, ByteSource::File(path.into())))
    }

    pub fn part(&mut self, part: FormPart) -> &mut Self {
        self.parts.push(part);
        self
    }
}
