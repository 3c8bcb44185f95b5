use serde_json::Value;
use std::sync::Arc;

use super::request::HeaderVec;

/// Canonical reason phrase for the statuses the router produces itself.
#[must_use]
pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "",
    }
}

/// Outbound response built up by filters and handlers.
///
/// `written` flips on the first body write or explicit commit; filters
/// registered with `return_on_output` use it to short-circuit.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderVec,
    /// Body bytes
    pub body: Vec<u8>,
    written: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HeaderVec::new(),
            body: Vec::new(),
            written: false,
        }
    }
}

impl Response {
    /// Empty, unwritten response with `status`.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Written JSON response.
    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        let mut res = Self::new(status);
        res.write_json(status, body);
        res
    }

    /// Written plain-text response.
    #[must_use]
    pub fn text(status: u16, body: &str) -> Self {
        let mut res = Self::new(status);
        res.set_header("content-type", "text/plain; charset=utf-8".to_string());
        res.write(body.as_bytes());
        res
    }

    /// Written `{"error": message}` response.
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    /// Get a header by name
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Add or update a header
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((Arc::from(name), value));
    }

    /// Append body bytes and mark the response written.
    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
        self.written = true;
    }

    /// Replace the body with serialized JSON and mark the response written.
    pub fn write_json(&mut self, status: u16, body: &Value) {
        self.status = status;
        self.set_header("content-type", "application/json".to_string());
        // Serializing a `Value` cannot fail
        self.body = serde_json::to_vec(body).unwrap_or_default();
        self.written = true;
    }

    /// Mark the response written without a body (redirects, 204s, HEAD).
    pub fn commit(&mut self) {
        self.written = true;
    }

    /// Whether output has started.
    #[inline]
    #[must_use]
    pub fn is_written(&self) -> bool {
        self.written
    }

    /// Body as UTF-8, lossily.
    #[must_use]
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub(crate) fn reset(&mut self) {
        self.status = 200;
        self.headers.clear();
        self.body.clear();
        self.written = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_shape() {
        let res = Response::error(404, "Not Found");
        assert_eq!(res.status, 404);
        assert!(res.is_written());
        assert_eq!(res.header("Content-Type"), Some("application/json"));
        let body: Value = serde_json::from_slice(&res.body).unwrap();
        assert_eq!(body["error"], "Not Found");
    }

    #[test]
    fn test_set_header_replaces() {
        let mut res = Response::default();
        res.set_header("X-Trace", "a".to_string());
        res.set_header("x-trace", "b".to_string());
        assert_eq!(res.headers.len(), 1);
        assert_eq!(res.header("X-TRACE"), Some("b"));
        assert!(!res.is_written());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut res = Response::text(500, "boom");
        res.reset();
        assert_eq!(res.status, 200);
        assert!(res.headers.is_empty());
        assert!(res.body.is_empty());
        assert!(!res.is_written());
    }
}
