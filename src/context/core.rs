use http::Method;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::ids::{RequestId, REQUEST_ID_HEADER};
use crate::router::ParamVec;
use crate::server::{
    RenderError, Request, Response, SessionProvider, SessionStore, TemplateRenderer,
};

/// Per-request state shared by filters and the handler.
///
/// A context is owned by exactly one request at a time. Contexts come out of a
/// [`ContextPool`](super::ContextPool) and are reset before they go back, so
/// nothing written here survives into the next request.
#[derive(Default)]
pub struct Context {
    request: Request,
    response: Response,
    params: ParamVec,
    query: Vec<(String, String)>,
    data: HashMap<String, Box<dyn Any + Send + Sync>>,
    request_id: Option<RequestId>,
    route_pattern: Option<Arc<str>>,
    session_provider: Option<Arc<dyn SessionProvider>>,
    session: Option<Option<Arc<dyn SessionStore>>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    stopped: bool,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("request_id", &self.request_id)
            .field("method", &self.request.method)
            .field("path", &self.request.path)
            .field("params", &self.params)
            .field("data_keys", &self.data.keys().collect::<Vec<_>>())
            .field("status", &self.response.status)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl Context {
    /// Standalone context around `request`, for driving handlers outside a
    /// dispatcher.
    #[must_use]
    pub fn for_request(request: Request) -> Self {
        let mut ctx = Self::default();
        ctx.begin(request, None, None);
        ctx
    }

    pub(crate) fn begin(
        &mut self,
        request: Request,
        session_provider: Option<Arc<dyn SessionProvider>>,
        renderer: Option<Arc<dyn TemplateRenderer>>,
    ) {
        self.request_id = Some(RequestId::from_header_or_new(
            request.header(REQUEST_ID_HEADER),
        ));
        self.query = request.query_pairs();
        self.request = request;
        self.session_provider = session_provider;
        self.renderer = renderer;
    }

    /// Drop every trace of the current request.
    pub(crate) fn reset(&mut self) {
        self.request = Request::default();
        self.response.reset();
        self.params.clear();
        self.query.clear();
        self.data.clear();
        self.request_id = None;
        self.route_pattern = None;
        self.session_provider = None;
        self.session = None;
        self.renderer = None;
        self.stopped = false;
    }

    // ----- input -----

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.request.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.request.path
    }

    /// Path parameter by name; the last capture wins when a name repeats.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn params(&self) -> &ParamVec {
        &self.params
    }

    /// First query value for `name`.
    #[must_use]
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.request.body
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id.unwrap_or_default()
    }

    /// Pattern of the matched route, once routing has happened.
    #[must_use]
    pub fn route_pattern(&self) -> Option<&str> {
        self.route_pattern.as_deref()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.request.is_cancelled()
    }

    /// Session for this request, resolved on first use.
    pub fn session(&mut self) -> Option<Arc<dyn SessionStore>> {
        if self.session.is_none() {
            let store = self
                .session_provider
                .as_ref()
                .and_then(|p| p.session_for(&self.request));
            self.session = Some(store);
        }
        self.session.clone().flatten()
    }

    // ----- output -----

    pub fn set_status(&mut self, status: u16) {
        self.response.status = status;
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.response.set_header(name, value.into());
    }

    /// Append raw bytes to the body.
    pub fn write(&mut self, bytes: &[u8]) {
        self.response.write(bytes);
    }

    /// Append text, defaulting the content type to plain text.
    pub fn write_text(&mut self, text: &str) {
        if self.response.header("content-type").is_none() {
            self.set_header("content-type", "text/plain; charset=utf-8");
        }
        self.response.write(text.as_bytes());
    }

    pub fn write_json(&mut self, status: u16, body: &Value) {
        self.response.write_json(status, body);
    }

    pub fn redirect(&mut self, status: u16, location: &str) {
        self.response.status = status;
        self.response.set_header("location", location.to_string());
        self.response.commit();
    }

    /// Write `body` with `status` and stop the handler lifecycle.
    pub fn abort(&mut self, status: u16, body: &str) {
        self.response.status = status;
        self.write_text(body);
        self.response.commit();
        self.stopped = true;
    }

    /// Render a template into the body as HTML.
    pub fn render(&mut self, name: &str, data: &Value) -> Result<(), RenderError> {
        let renderer = self.renderer.as_ref().ok_or(RenderError::Unconfigured)?;
        let html = renderer.render(name, data)?;
        self.set_header("content-type", "text/html; charset=utf-8");
        self.response.write(html.as_bytes());
        Ok(())
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Whether any output has been produced.
    #[must_use]
    pub fn response_written(&self) -> bool {
        self.response.is_written()
    }

    /// Whether [`abort`](Self::abort) was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Request and response together, for raw handlers.
    pub(crate) fn raw_parts(&mut self) -> (&Request, &mut Response) {
        (&self.request, &mut self.response)
    }

    pub(crate) fn take_response(&mut self) -> Response {
        std::mem::take(&mut self.response)
    }

    // ----- data bag -----

    /// Store a value for later filters or the handler.
    pub fn set_data<V: Any + Send + Sync>(&mut self, key: impl Into<String>, value: V) {
        self.data.insert(key.into(), Box::new(value));
    }

    /// Borrow a stored value if it exists and has type `V`.
    #[must_use]
    pub fn data<V: Any + Send + Sync>(&self, key: &str) -> Option<&V> {
        self.data.get(key).and_then(|v| v.downcast_ref::<V>())
    }

    /// Remove and return a stored value if it has type `V`; a value of another
    /// type stays in place.
    pub fn take_data<V: Any + Send + Sync>(&mut self, key: &str) -> Option<V> {
        if !self.data.get(key).is_some_and(|v| v.is::<V>()) {
            return None;
        }
        self.data
            .remove(key)
            .and_then(|v| v.downcast::<V>().ok())
            .map(|b| *b)
    }

    #[must_use]
    pub fn has_data(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    // ----- routing -----

    pub(crate) fn set_route_pattern(&mut self, pattern: Arc<str>) {
        self.route_pattern = Some(pattern);
    }

    /// Append captures from a filter pattern.
    pub(crate) fn merge_params(&mut self, params: &[(Arc<str>, String)]) {
        self.params.extend(params.iter().cloned());
    }

    /// Swap the parameter list, returning the previous one.
    pub(crate) fn replace_params(&mut self, params: ParamVec) -> ParamVec {
        std::mem::replace(&mut self.params, params)
    }
}
