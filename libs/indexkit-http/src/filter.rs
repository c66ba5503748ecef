//! Post-receive body transforms.

use crate::context::CallContext;
use crate::error::{BoxError, HttpError};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use std::fmt;
use std::sync::Arc;

/// Status and headers of a received response, as seen by filters.
#[derive(Debug, Clone, Copy)]
pub struct ResponseMeta<'a> {
    pub status: StatusCode,
    pub headers: &'a HeaderMap,
}

/// Rewrites response bytes after the body is read and before the caller sees them.
///
/// Filters are fixed when the client is built and compose left to right:
/// each receives the previous filter's output. An error aborts the call with
/// [`HttpError::ResponseFilter`](crate::HttpError::ResponseFilter).
pub trait ResponseFilter: Send + Sync + 'static {
    /// # Errors
    /// Any error discards the response.
    fn filter(
        &self,
        meta: &ResponseMeta<'_>,
        body: Bytes,
        ctx: &mut CallContext,
    ) -> Result<Bytes, BoxError>;

    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Build a response filter from a closure.
pub fn from_fn<F>(name: impl Into<String>, f: F) -> FnFilter<F>
where
    F: Fn(&ResponseMeta<'_>, Bytes, &mut CallContext) -> Result<Bytes, BoxError>
        + Send
        + Sync
        + 'static,
{
    FnFilter {
        name: name.into(),
        f,
    }
}

/// Closure-backed [`ResponseFilter`], created by [`from_fn`].
pub struct FnFilter<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnFilter<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFilter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> ResponseFilter for FnFilter<F>
where
    F: Fn(&ResponseMeta<'_>, Bytes, &mut CallContext) -> Result<Bytes, BoxError>
        + Send
        + Sync
        + 'static,
{
    fn filter(
        &self,
        meta: &ResponseMeta<'_>,
        body: Bytes,
        ctx: &mut CallContext,
    ) -> Result<Bytes, BoxError> {
        (self.f)(meta, body, ctx)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Pass `body` through every filter in order.
pub(crate) fn apply_filters(
    filters: &[Arc<dyn ResponseFilter>],
    meta: &ResponseMeta<'_>,
    mut body: Bytes,
    ctx: &mut CallContext,
) -> Result<Bytes, HttpError> {
    for (position, filter) in filters.iter().enumerate() {
        body = filter.filter(meta, body, ctx).map_err(|source| {
            tracing::warn!(
                filter = filter.name(),
                position,
                status = meta.status.as_u16(),
                error = %source,
                "Response filter failed"
            );
            HttpError::ResponseFilter {
                name: filter.name().to_owned(),
                position,
                source,
            }
        })?;
    }
    Ok(body)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn meta(headers: &HeaderMap) -> ResponseMeta<'_> {
        ResponseMeta {
            status: StatusCode::OK,
            headers,
        }
    }

    #[test]
    fn test_no_filters_pass_through() {
        let headers = HeaderMap::new();
        let mut ctx = CallContext::new();
        let out = apply_filters(&[], &meta(&headers), Bytes::from_static(b"raw"), &mut ctx).unwrap();
        assert_eq!(out, "raw");
    }

    #[test]
    fn test_filters_compose_left_to_right() {
        let filters: Vec<Arc<dyn ResponseFilter>> = vec![
            Arc::new(from_fn("upper", |_, body, _| {
                Ok(Bytes::from(body.to_ascii_uppercase()))
            })),
            Arc::new(from_fn("suffix", |_, body, _| {
                let mut out = body.to_vec();
                out.extend_from_slice(b"!");
                Ok(Bytes::from(out))
            })),
        ];

        let headers = HeaderMap::new();
        let mut ctx = CallContext::new();
        let out = apply_filters(&filters, &meta(&headers), Bytes::from_static(b"ok"), &mut ctx)
            .unwrap();
        assert_eq!(out, "OK!");
    }

    #[test]
    fn test_filter_reads_call_context() {
        #[derive(Clone)]
        struct Replacement(&'static str);

        let filters: Vec<Arc<dyn ResponseFilter>> =
            vec![Arc::new(from_fn("replace", |_, body, ctx| {
                Ok(ctx
                    .get::<Replacement>()
                    .map_or(body, |r| Bytes::from_static(r.0.as_bytes())))
            }))];

        let headers = HeaderMap::new();
        let mut ctx = CallContext::new();
        ctx.insert(Replacement("fixed"));
        let out = apply_filters(&filters, &meta(&headers), Bytes::from_static(b"x"), &mut ctx)
            .unwrap();
        assert_eq!(out, "fixed");
    }

    #[test]
    fn test_filter_error_names_origin() {
        let filters: Vec<Arc<dyn ResponseFilter>> = vec![
            Arc::new(from_fn("identity", |_, body, _| Ok(body))),
            Arc::new(from_fn("reject", |meta, _, _| {
                Err(format!("unexpected status {}", meta.status).into())
            })),
        ];

        let headers = HeaderMap::new();
        let mut ctx = CallContext::new();
        let err = apply_filters(&filters, &meta(&headers), Bytes::new(), &mut ctx).unwrap_err();
        match err {
            HttpError::ResponseFilter { name, position, .. } => {
                assert_eq!(name, "reject");
                assert_eq!(position, 1);
            }
            other => panic!("expected ResponseFilter error, got {other:?}"),
        }
    }
}
