//! # Controller Module
//!
//! Controllers are stateful handlers driven through a fixed lifecycle:
//! `init -> prepare -> handle(action) -> finish`. Every request gets its own
//! instance from the factory supplied at registration, so fields set while
//! serving one request are never visible to another.
//!
//! ```rust
//! use stagerouter::context::Context;
//! use stagerouter::controller::{Controller, HookOutcome};
//!
//! struct UserController;
//!
//! impl Controller for UserController {
//!     fn actions(&self) -> &[&'static str] {
//!         &["get", "Login"]
//!     }
//!
//!     fn handle(&mut self, action: &str, ctx: &mut Context) -> HookOutcome {
//!         match action {
//!             "get" => ctx.write_text("profile"),
//!             _ => ctx.write_text("welcome"),
//!         }
//!         HookOutcome::Continue
//!     }
//! }
//! ```

use http::Method;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::RegistrationError;
use crate::method::{expand, fallback_methods, known_methods, parse_mapping, MethodSel};

/// Error raised by a lifecycle hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    /// Status used when nothing has been written yet
    pub status: u16,
    /// Message logged, and sent only for client errors
    pub message: String,
}

impl HandlerError {
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.status)
    }
}

impl std::error::Error for HandlerError {}

/// What a lifecycle hook asks the dispatcher to do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Run the next hook
    Continue,
    /// Skip the remaining hooks and the after-exec filters
    StopChain,
    /// Like `StopChain`, and answer with the error if nothing was written
    Error(HandlerError),
}

impl HookOutcome {
    #[must_use]
    pub fn is_continue(&self) -> bool {
        matches!(self, HookOutcome::Continue)
    }
}

/// A request handler with lifecycle hooks.
pub trait Controller: Send {
    /// Action names `handle` understands; mappings are checked against this
    /// list at registration.
    fn actions(&self) -> &[&'static str];

    fn init(&mut self, _ctx: &mut Context, _controller: &str, _action: &str) -> HookOutcome {
        HookOutcome::Continue
    }

    fn prepare(&mut self, _ctx: &mut Context) -> HookOutcome {
        HookOutcome::Continue
    }

    /// Run `action`.
    fn handle(&mut self, action: &str, ctx: &mut Context) -> HookOutcome;

    fn finish(&mut self, _ctx: &mut Context) -> HookOutcome {
        HookOutcome::Continue
    }
}

/// Produces a fresh controller per request.
pub type ControllerFactory = Arc<dyn Fn() -> Box<dyn Controller> + Send + Sync>;

/// Type name without module path or a trailing `Controller`.
#[must_use]
pub fn short_type_name<C: ?Sized>() -> String {
    let full = std::any::type_name::<C>();
    let base = full.split('<').next().unwrap_or(full);
    let last = base.rsplit("::").next().unwrap_or(base);
    last.strip_suffix("Controller").unwrap_or(last).to_string()
}

/// A registered controller: factory plus the method-to-action table.
pub struct ControllerTarget {
    name: String,
    factory: ControllerFactory,
    mapping: Option<Vec<(MethodSel, String)>>,
    actions: Vec<&'static str>,
}

impl fmt::Debug for ControllerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerTarget")
            .field("name", &self.name)
            .field("mapping", &self.mapping)
            .field("actions", &self.actions)
            .finish()
    }
}

impl ControllerTarget {
    /// Build a target and the methods it should be registered under.
    ///
    /// The factory is called once here to obtain a prototype; every action
    /// named by `mapping` must appear in the prototype's `actions()`. Without a
    /// mapping the target is registered for every known method and each method
    /// maps to the action named after it in lower case.
    pub fn new<C, F>(
        factory: F,
        mapping: Option<&str>,
    ) -> Result<(Self, Vec<Method>), RegistrationError>
    where
        C: Controller + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let name = short_type_name::<C>();
        let prototype = factory();
        let actions = prototype.actions().to_vec();

        let (mapping, methods) = match mapping {
            Some(spec) => {
                let pairs = parse_mapping(spec)?;
                for (_, action) in &pairs {
                    if !actions.iter().any(|a| *a == action.as_str()) {
                        return Err(RegistrationError::MissingAction {
                            controller: name,
                            action: action.clone(),
                        });
                    }
                }
                let sels: Vec<MethodSel> = pairs.iter().map(|(s, _)| s.clone()).collect();
                let methods = expand(&sels);
                (Some(pairs), methods)
            }
            None => (None, known_methods().collect()),
        };

        let factory: ControllerFactory =
            Arc::new(move || -> Box<dyn Controller> { Box::new(factory()) });
        Ok((
            Self {
                name,
                factory,
                mapping,
                actions,
            },
            methods,
        ))
    }

    /// Controller name used in auto routes and logs.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn actions(&self) -> &[&'static str] {
        &self.actions
    }

    /// Action bound to `method`: an exact mapping clause wins over `*`.
    #[must_use]
    pub fn action_for(&self, method: &Method) -> Option<&str> {
        match &self.mapping {
            Some(pairs) => pairs
                .iter()
                .find(|(sel, _)| matches!(sel, MethodSel::Exact(m) if m == method))
                .or_else(|| pairs.iter().find(|(sel, _)| *sel == MethodSel::Any))
                .map(|(_, a)| a.as_str()),
            None => {
                let lower = method.as_str().to_ascii_lowercase();
                self.actions
                    .iter()
                    .find(|a| **a == lower)
                    .copied()
            }
        }
    }

    /// Methods bound only through a `*` clause.
    #[must_use]
    pub fn fallback_methods(&self) -> Vec<Method> {
        match &self.mapping {
            Some(pairs) => {
                let sels: Vec<MethodSel> = pairs.iter().map(|(s, _)| s.clone()).collect();
                fallback_methods(&sels)
            }
            None => Vec::new(),
        }
    }

    /// Fresh instance for one request.
    #[must_use]
    pub fn instantiate(&self) -> Box<dyn Controller> {
        (self.factory)()
    }

    /// Drive one request through the lifecycle.
    ///
    /// A hook returning anything but `Continue`, or a hook calling
    /// [`Context::abort`], skips the hooks after it.
    pub(crate) fn run(&self, method: &Method, ctx: &mut Context) -> HookOutcome {
        let Some(action) = self.action_for(method) else {
            let allow = self.allowed_methods().join(", ");
            ctx.set_header("allow", allow);
            ctx.write_json(
                405,
                &serde_json::json!({ "error": "Method Not Allowed" }),
            );
            return HookOutcome::StopChain;
        };
        let mut controller = self.instantiate();

        let outcome = controller.init(ctx, &self.name, action);
        if let Some(stop) = halted(outcome, ctx) {
            return stop;
        }
        let outcome = controller.prepare(ctx);
        if let Some(stop) = halted(outcome, ctx) {
            return stop;
        }
        let outcome = controller.handle(action, ctx);
        if let Some(stop) = halted(outcome, ctx) {
            return stop;
        }
        let outcome = controller.finish(ctx);
        halted(outcome, ctx).unwrap_or(HookOutcome::Continue)
    }

    fn allowed_methods(&self) -> Vec<String> {
        known_methods()
            .filter(|m| self.action_for(m).is_some())
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

fn halted(outcome: HookOutcome, ctx: &Context) -> Option<HookOutcome> {
    match outcome {
        HookOutcome::Continue if ctx.is_stopped() => Some(HookOutcome::StopChain),
        HookOutcome::Continue => None,
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static BUILT: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct ItemController {
        visits: usize,
        log: Vec<&'static str>,
    }

    impl Controller for ItemController {
        fn actions(&self) -> &[&'static str] {
            &["get", "Save", "Guarded"]
        }

        fn prepare(&mut self, ctx: &mut Context) -> HookOutcome {
            self.log.push("prepare");
            if ctx.header("x-deny").is_some() {
                ctx.abort(401, "denied");
            }
            HookOutcome::Continue
        }

        fn handle(&mut self, action: &str, ctx: &mut Context) -> HookOutcome {
            self.visits += 1;
            self.log.push("handle");
            if action == "Guarded" {
                return HookOutcome::Error(HandlerError::new(409, "conflict"));
            }
            ctx.write_text(&format!("{action}:{}", self.visits));
            HookOutcome::Continue
        }

        fn finish(&mut self, ctx: &mut Context) -> HookOutcome {
            self.log.push("finish");
            ctx.set_header("x-log", self.log.join(","));
            HookOutcome::Continue
        }
    }

    fn target(mapping: Option<&str>) -> (ControllerTarget, Vec<Method>) {
        ControllerTarget::new(ItemController::default, mapping).unwrap()
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<ItemController>(), "Item");
        assert_eq!(short_type_name::<String>(), "String");
    }

    #[test]
    fn test_default_mapping_uses_lowercase_method() {
        let (t, methods) = target(None);
        assert_eq!(methods.len(), crate::method::KNOWN_METHODS.len());
        assert_eq!(t.action_for(&Method::GET), Some("get"));
        assert_eq!(t.action_for(&Method::POST), None);
    }

    #[test]
    fn test_mapping_exact_beats_star() {
        let (t, methods) = target(Some("*:Save;get:Guarded"));
        assert!(methods.contains(&Method::DELETE));
        assert_eq!(t.action_for(&Method::GET), Some("Guarded"));
        assert_eq!(t.action_for(&Method::PUT), Some("Save"));
    }

    #[test]
    fn test_missing_action_rejected() {
        let err = ControllerTarget::new(ItemController::default, Some("post:Delete")).unwrap_err();
        assert_eq!(
            err,
            RegistrationError::MissingAction {
                controller: "Item".into(),
                action: "Delete".into()
            }
        );
    }

    #[test]
    fn test_unmapped_method_answers_405() {
        let (t, _) = target(None);
        let mut ctx = Context::for_request(Request::new(Method::POST, "/item"));
        assert_eq!(t.run(&Method::POST, &mut ctx), HookOutcome::StopChain);
        assert_eq!(ctx.response().status, 405);
        assert_eq!(ctx.response().header("allow"), Some("GET"));
    }

    #[test]
    fn test_fresh_instance_per_request() {
        let (t, _) = target(None);
        for _ in 0..2 {
            let mut ctx = Context::for_request(Request::new(Method::GET, "/item"));
            assert!(t.run(&Method::GET, &mut ctx).is_continue());
            assert_eq!(ctx.response().body_str(), "get:1");
            assert_eq!(ctx.response().header("x-log"), Some("prepare,handle,finish"));
        }
    }

    #[test]
    fn test_abort_in_prepare_skips_handle_and_finish() {
        let (t, _) = target(None);
        let mut ctx = Context::for_request(
            Request::new(Method::GET, "/item").with_header("X-Deny", "1"),
        );
        assert_eq!(t.run(&Method::GET, &mut ctx), HookOutcome::StopChain);
        assert_eq!(ctx.response().status, 401);
        assert_eq!(ctx.response().header("x-log"), None);
    }

    #[test]
    fn test_error_outcome_skips_finish() {
        let (t, _) = target(Some("get:Guarded"));
        let mut ctx = Context::for_request(Request::new(Method::GET, "/item"));
        let outcome = t.run(&Method::GET, &mut ctx);
        assert_eq!(outcome, HookOutcome::Error(HandlerError::new(409, "conflict")));
        assert_eq!(ctx.response().header("x-log"), None);
    }

    #[test]
    fn test_factory_called_per_instantiate() {
        struct Counted;
        impl Controller for Counted {
            fn actions(&self) -> &[&'static str] {
                &["get"]
            }
            fn handle(&mut self, _: &str, _: &mut Context) -> HookOutcome {
                HookOutcome::Continue
            }
        }
        let (t, _) = ControllerTarget::new(
            || {
                BUILT.fetch_add(1, Ordering::SeqCst);
                Counted
            },
            None,
        )
        .unwrap();
        let before = BUILT.load(Ordering::SeqCst);
        let _a = t.instantiate();
        let _b = t.instantiate();
        assert_eq!(BUILT.load(Ordering::SeqCst), before + 2);
    }
}
