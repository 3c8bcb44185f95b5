//! YAML route manifest used by the CLI.
//!
//! ```yaml
//! routes:
//!   - pattern: /users/:id:int
//!     methods: get,post
//!     handler: user
//!   - pattern: /files/*
//!     handler: files
//! filters:
//!   - stage: before_router
//!     pattern: /admin/*
//!     status: 401
//!     body: login required
//! ```
//!
//! Every route is bound to the echo handler under its `handler` name. A filter
//! with a `status` aborts the request with it; `headers` are set on the
//! response either way.

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::context::Context;
use crate::dispatcher::Dispatcher;
use crate::echo::echo_handler;
use crate::error::RegistrationError;
use crate::filter::{FilterOptions, FilterStage};
use crate::router::DispatchTarget;

fn all_methods() -> String {
    "*".to_string()
}

/// One route line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSpec {
    pub pattern: String,
    /// Comma separated methods, `*` for all
    #[serde(default = "all_methods")]
    pub methods: String,
    /// Name reported by the echo handler
    pub handler: String,
}

/// One filter line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub stage: FilterStage,
    pub pattern: String,
    /// Abort with this status when set
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(flatten)]
    pub options: FilterOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub routes: Vec<RouteSpec>,
    pub filters: Vec<FilterSpec>,
}

impl Manifest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing manifest {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Register every route and filter, stopping at the first failure.
    pub fn apply(&self, dispatcher: &Dispatcher) -> Result<(), RegistrationError> {
        for route in &self.routes {
            dispatcher.register(
                &route.methods,
                &route.pattern,
                DispatchTarget::function(echo_handler(route.handler.clone())),
            )?;
        }
        for spec in &self.filters {
            let status = spec.status;
            let body = spec.body.clone();
            let headers = spec.headers.clone();
            dispatcher.insert_filter(
                spec.stage,
                &spec.pattern,
                move |ctx: &mut Context| {
                    for (name, value) in &headers {
                        ctx.set_header(name, value.clone());
                    }
                    if let Some(status) = status {
                        let text = body
                            .as_deref()
                            .unwrap_or_else(|| crate::server::status_reason(status));
                        ctx.abort(status, text);
                    }
                },
                spec.options,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Request;
    use http::Method;

    const MANIFEST: &str = r#"
routes:
  - pattern: /users/:id:int
    methods: get
    handler: user
  - pattern: /files/*
    handler: files
filters:
  - stage: before_router
    pattern: /admin/*
    status: 401
    body: login required
  - stage: finish_router
    pattern: /*
    headers:
      x-served-by: manifest
"#;

    #[test]
    fn test_parse_defaults() {
        let m = Manifest::parse(MANIFEST).unwrap();
        assert_eq!(m.routes.len(), 2);
        assert_eq!(m.routes[1].methods, "*");
        assert_eq!(m.filters[0].stage, FilterStage::BeforeRouter);
        assert!(m.filters[0].options.return_on_output);
        assert!(!m.filters[1].options.reset_params);
    }

    #[test]
    fn test_apply_serves_echo_and_filters() {
        let d = Dispatcher::new();
        Manifest::parse(MANIFEST).unwrap().apply(&d).unwrap();

        let res = d.serve(Request::new(Method::GET, "/users/42"));
        assert_eq!(res.status, 200);
        assert_eq!(res.header("x-served-by"), Some("manifest"));
        let body: serde_json::Value = serde_json::from_slice(&res.body).unwrap();
        assert_eq!(body["handler"], "user");
        assert_eq!(body["params"]["id"], "42");

        let res = d.serve(Request::new(Method::GET, "/admin/panel"));
        assert_eq!(res.status, 401);
        assert_eq!(res.body_str(), "login required");
        assert_eq!(res.header("x-served-by"), Some("manifest"));
    }

    #[test]
    fn test_apply_reports_bad_route() {
        let m = Manifest::parse("routes:\n  - pattern: /x\n    methods: fetch\n    handler: h\n")
            .unwrap();
        assert!(matches!(
            m.apply(&Dispatcher::new()),
            Err(RegistrationError::UnknownMethod { .. })
        ));
    }
}
