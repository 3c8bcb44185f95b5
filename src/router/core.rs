//! Route entries and match results.

use http::Method;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::pattern::Pattern;
use crate::context::Context;
use crate::controller::ControllerTarget;
use crate::server::{Request, Response};

/// Maximum number of path parameters before heap allocation.
/// Most routes have ≤4 captures (e.g., /users/:id/posts/:post_id).
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the hot path.
///
/// Names are `Arc<str>` shared with the route tree, values are per-request
/// data from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Plain function handler.
pub type HandlerFn = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// Low-level handler that bypasses the context and writes the response itself.
pub type RawHandlerFn = Arc<dyn Fn(&Request, &mut Response) + Send + Sync>;

/// What a matched route invokes.
#[derive(Clone)]
pub enum DispatchTarget {
    /// Called directly with the request context
    Function(HandlerFn),
    /// Fresh controller instance per request, driven through its lifecycle
    Controller(Arc<ControllerTarget>),
    /// Called with the raw request and response
    Raw(RawHandlerFn),
}

impl DispatchTarget {
    /// Wrap a closure as a [`DispatchTarget::Function`].
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        DispatchTarget::Function(Arc::new(f))
    }

    /// Wrap a closure as a [`DispatchTarget::Raw`].
    pub fn raw<F>(f: F) -> Self
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        DispatchTarget::Raw(Arc::new(f))
    }

    /// Short label used in logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchTarget::Function(_) => "function",
            DispatchTarget::Controller(_) => "controller",
            DispatchTarget::Raw(_) => "raw",
        }
    }
}

impl fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchTarget::Controller(c) => f.debug_tuple("Controller").field(&c.name()).finish(),
            other => f.write_str(other.kind()),
        }
    }
}

/// One registered endpoint. Immutable once inserted into a tree.
#[derive(Debug)]
pub struct RouteEntry {
    pattern: Pattern,
    methods: Vec<Method>,
    fallback: Vec<Method>,
    target: DispatchTarget,
}

impl RouteEntry {
    pub(crate) fn new(pattern: Pattern, methods: Vec<Method>, target: DispatchTarget) -> Self {
        Self {
            pattern,
            methods,
            fallback: Vec::new(),
            target,
        }
    }

    /// Mark `methods` as reached only through `*`. Such a leaf never
    /// displaces one registered for the exact method.
    #[must_use]
    pub(crate) fn with_fallback(mut self, methods: Vec<Method>) -> Self {
        self.fallback = methods;
        self
    }

    /// Pattern as registered.
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Methods requested at registration.
    ///
    /// This is what the entry was registered for, not a live view of the
    /// table: `unregister` on one method leaves the list untouched, and a
    /// `*` method already held by an exact route keeps that route.
    /// [`crate::Dispatcher::routes`] lists what the table currently holds.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Whether `method` reached this entry only through `*`.
    #[must_use]
    pub fn is_fallback_for(&self, method: &Method) -> bool {
        self.fallback.contains(method)
    }

    /// Handler invoked on match.
    #[must_use]
    pub fn target(&self) -> &DispatchTarget {
        &self.target
    }
}

/// Result of successfully resolving a request to a route.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched entry
    pub entry: Arc<RouteEntry>,
    /// Path parameters extracted from the URL, in pattern order
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name.
    ///
    /// Uses "last write wins" semantics when a name repeats in the pattern.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Convert path_params to a HashMap.
    /// Note: This allocates - use get_path_param() in hot paths instead
    #[must_use]
    pub fn path_params_map(&self) -> HashMap<String, String> {
        self.path_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}

/// Why a request could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMiss {
    /// The path exists under other methods, or the method is not supported.
    MethodNotAllowed {
        /// Methods under which the path does match
        allow: Vec<Method>,
    },
    /// Nothing matches the path.
    NotFound,
}

impl RouteMiss {
    /// HTTP status the miss is answered with.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            RouteMiss::MethodNotAllowed { .. } => 405,
            RouteMiss::NotFound => 404,
        }
    }
}

impl fmt::Display for RouteMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMiss::MethodNotAllowed { .. } => f.write_str("Method Not Allowed"),
            RouteMiss::NotFound => f.write_str("Not Found"),
        }
    }
}

impl std::error::Error for RouteMiss {}
