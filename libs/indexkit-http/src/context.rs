use http::Extensions;

/// Call-scoped values threaded from the call site through response filters.
///
/// A context belongs to exactly one call: it is moved into
/// [`HttpClient::send_with_context`](crate::HttpClient::send_with_context),
/// handed mutably to every response filter of that call, and returned on the
/// [`HttpResponse`](crate::HttpResponse). Concurrent calls never share one.
///
/// Values are keyed by type, like [`http::Extensions`].
///
/// ```ignore
/// #[derive(Clone)]
/// struct RequestTag(&'static str);
///
/// let mut ctx = CallContext::new();
/// ctx.insert(RequestTag("bulk-import"));
/// let resp = client.send_with_context(spec, ctx).await?;
/// assert!(resp.context().get::<RequestTag>().is_some());
/// ```
#[derive(Debug, Default)]
pub struct CallContext {
    values: Extensions,
}

impl CallContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the previous value of the same type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.values.insert(value)
    }

    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.values.get::<T>()
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self) -> Option<&mut T> {
        self.values.get_mut::<T>()
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.values.remove::<T>()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Tenant(String);

    #[test]
    fn test_values_keyed_by_type() {
        let mut ctx = CallContext::new();
        assert!(ctx.is_empty());

        ctx.insert(Tenant("acme".to_owned()));
        ctx.insert(7u32);

        assert_eq!(ctx.get::<Tenant>(), Some(&Tenant("acme".to_owned())));
        assert_eq!(ctx.get::<u32>(), Some(&7));
        assert_eq!(ctx.get::<u64>(), None);
    }

    #[test]
    fn test_insert_replaces_and_remove_takes() {
        let mut ctx = CallContext::new();
        assert_eq!(ctx.insert(1u8), None);
        assert_eq!(ctx.insert(2u8), Some(1));

        if let Some(v) = ctx.get_mut::<u8>() {
            *v += 1;
        }
        assert_eq!(ctx.remove::<u8>(), Some(3));
        assert!(ctx.is_empty());
    }
}
