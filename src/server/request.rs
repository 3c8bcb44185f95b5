use http::Method;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Maximum inline headers before heap allocation.
/// Most requests have ≤16 headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage for the hot path.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Transport-side cancellation flag.
///
/// The transport keeps a clone and trips it when the client goes away or a
/// deadline passes. The dispatcher checks it between filters and stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Inbound request as handed over by the transport.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Percent-decoded path, without the query string
    pub path: String,
    /// Raw query string, without the `?`
    pub query: Option<String>,
    /// Request headers in arrival order
    pub headers: HeaderVec,
    /// Raw body bytes
    pub body: Vec<u8>,
    /// Cancellation flag shared with the transport
    pub cancel: CancelToken,
}

impl Request {
    /// Build a request from a method and a request target (`/path?query`).
    ///
    /// The path is percent-decoded; if decoding yields invalid UTF-8 the raw
    /// path is kept.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (raw_path, query) = match target.split_once('?') {
            Some((p, q)) => (p, Some(q.to_string())),
            None => (target, None),
        };
        let path = urlencoding::decode(raw_path)
            .map(|p| p.into_owned())
            .unwrap_or_else(|_| raw_path.to_string());
        Self {
            method,
            path: if path.is_empty() { "/".to_string() } else { path },
            query,
            ..Self::default()
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }

    /// Replace the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Share a cancellation flag with the transport.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decoded query pairs in order of appearance.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_splits_and_decodes() {
        let req = Request::new(Method::GET, "/files/a%20b?limit=10&name=x%2By");
        assert_eq!(req.path, "/files/a b");
        assert_eq!(req.query.as_deref(), Some("limit=10&name=x%2By"));
        assert_eq!(
            req.query_pairs(),
            vec![
                ("limit".to_string(), "10".to_string()),
                ("name".to_string(), "x+y".to_string())
            ]
        );
    }

    #[test]
    fn test_empty_target_is_root() {
        assert_eq!(Request::new(Method::GET, "").path, "/");
        assert_eq!(Request::new(Method::GET, "?a=1").path, "/");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let req = Request::new(Method::GET, "/").with_header("Content-Type", "text/plain");
        assert_eq!(req.header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let token = CancelToken::new();
        let req = Request::new(Method::GET, "/").with_cancel(token.clone());
        assert!(!req.is_cancelled());
        token.cancel();
        assert!(req.is_cancelled());
    }
}
