use crate::error::HttpError;
use http::header::{HeaderName, HeaderValue, USER_AGENT};
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that fills in client-wide headers a request does not carry.
///
/// Headers set on the request (by the caller or an interceptor) always win;
/// a default is only inserted when the name is absent.
#[derive(Clone, Debug)]
pub struct DefaultHeadersLayer {
    headers: Arc<[(HeaderName, HeaderValue)]>,
}

impl DefaultHeadersLayer {
    /// Defaults consisting of `user_agent` followed by `extra`.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the user agent string is not valid
    pub fn try_new(
        user_agent: impl AsRef<str>,
        extra: impl IntoIterator<Item = (HeaderName, HeaderValue)>,
    ) -> Result<Self, HttpError> {
        let user_agent = HeaderValue::from_str(user_agent.as_ref())?;
        let headers: Vec<_> = std::iter::once((USER_AGENT, user_agent))
            .chain(extra)
            .collect();
        Ok(Self {
            headers: headers.into(),
        })
    }
}

impl<S> Layer<S> for DefaultHeadersLayer {
    type Service = DefaultHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeadersService {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DefaultHeadersService<S> {
    inner: S,
    headers: Arc<[(HeaderName, HeaderValue)]>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for DefaultHeadersService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let present: Vec<bool> = self
            .headers
            .iter()
            .map(|(name, _)| req.headers().contains_key(name))
            .collect();
        for ((name, value), present) in self.headers.iter().zip(present) {
            if !present {
                req.headers_mut().append(name.clone(), value.clone());
            }
        }
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::{HeaderMap, Method, StatusCode};
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Echoes the request headers back as the response headers.
    #[derive(Clone)]
    struct EchoHeaders;

    impl Service<Request<Full<Bytes>>> for EchoHeaders {
        type Response = Response<HeaderMap>;
        type Error = std::convert::Infallible;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let mut resp = Response::new(req.headers().clone());
            *resp.status_mut() = StatusCode::OK;
            std::future::ready(Ok(resp))
        }
    }

    fn request(headers: &[(&'static str, &'static str)]) -> Request<Full<Bytes>> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri("http://localhost:7700/health");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    fn layer() -> DefaultHeadersLayer {
        DefaultHeadersLayer::try_new(
            "indexkit-test/1.0",
            [(
                HeaderName::from_static("authorization"),
                HeaderValue::from_static("Bearer masterKey"),
            )],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_defaults_added_when_absent() {
        let service = layer().layer(EchoHeaders);
        let resp = service.oneshot(request(&[])).await.unwrap();
        let seen = resp.body();

        assert_eq!(seen[USER_AGENT], "indexkit-test/1.0");
        assert_eq!(seen["authorization"], "Bearer masterKey");
    }

    #[tokio::test]
    async fn test_request_headers_not_overwritten() {
        let service = layer().layer(EchoHeaders);
        let resp = service
            .oneshot(request(&[
                ("user-agent", "custom-agent/2.0"),
                ("authorization", "Bearer tenantToken"),
            ]))
            .await
            .unwrap();
        let seen = resp.body();

        let agents: Vec<_> = seen.get_all(USER_AGENT).iter().collect();
        assert_eq!(agents, ["custom-agent/2.0"]);
        assert_eq!(seen["authorization"], "Bearer tenantToken");
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let result = DefaultHeadersLayer::try_new("invalid\x00agent", []);
        assert!(matches!(result, Err(HttpError::InvalidHeaderValue(_))));
    }
}
