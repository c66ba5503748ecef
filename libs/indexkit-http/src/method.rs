use crate::error::HttpError;
use std::fmt;
use std::str::FromStr;

/// HTTP verbs supported by the transport.
///
/// Caller-supplied method tokens go through [`Method::from_str`], which
/// rejects anything outside this set instead of falling back to a default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl Method {
    /// Canonical upper-case token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
        }
    }
}

impl FromStr for Method {
    type Err = HttpError;

    /// Parses a method token, ignoring ASCII case.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let method = match token.trim().to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "PATCH" => Method::Patch,
            "DELETE" => Method::Delete,
            "HEAD" => Method::Head,
            "OPTIONS" => Method::Options,
            _ => return Err(HttpError::InvalidMethod(token.to_owned())),
        };
        Ok(method)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
            Method::Head => http::Method::HEAD,
            Method::Options => http::Method::OPTIONS,
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_methods() {
        for (token, expected) in [
            ("GET", Method::Get),
            ("post", Method::Post),
            ("Put", Method::Put),
            ("PATCH", Method::Patch),
            ("delete", Method::Delete),
            ("HEAD", Method::Head),
            ("options", Method::Options),
        ] {
            assert_eq!(token.parse::<Method>().unwrap(), expected, "{token}");
        }
    }

    #[test]
    fn test_unknown_method_rejected() {
        let err = "HELLO".parse::<Method>().unwrap_err();
        match err {
            HttpError::InvalidMethod(token) => assert_eq!(token, "HELLO"),
            other => panic!("expected InvalidMethod, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            "".parse::<Method>(),
            Err(HttpError::InvalidMethod(_))
        ));
    }

    #[test]
    fn test_into_http_method() {
        assert_eq!(http::Method::from(Method::Patch), http::Method::PATCH);
        assert_eq!(Method::Options.to_string(), "OPTIONS");
    }
}
