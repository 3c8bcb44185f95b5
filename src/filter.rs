//! # Filter Module
//!
//! Five fixed interception points around dispatch. Each stage holds its rules
//! in registration order; a rule is scoped by a pattern matched with the same
//! trie as routes, so `/*` applies everywhere and `/admin/*` only below
//! `/admin`.
//!
//! ## Short-circuit
//!
//! A rule with `return_on_output` (the default) ends its stage as soon as the
//! response has been written, either before it runs or by it. The dispatcher
//! then skips straight to [`FilterStage::FinishRouter`], whose rules always run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::context::Context;
use crate::error::RegistrationError;
use crate::router::{Pattern, Tree, TreeOptions};

/// Interception point, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Before the static-file check
    BeforeStatic,
    /// Before route lookup
    BeforeRouter,
    /// After a route matched, before its handler runs
    BeforeExec,
    /// After the handler
    AfterExec,
    /// Always, last
    FinishRouter,
}

impl FilterStage {
    pub const ALL: [FilterStage; 5] = [
        FilterStage::BeforeStatic,
        FilterStage::BeforeRouter,
        FilterStage::BeforeExec,
        FilterStage::AfterExec,
        FilterStage::FinishRouter,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FilterStage::BeforeStatic => "before_static",
            FilterStage::BeforeRouter => "before_router",
            FilterStage::BeforeExec => "before_exec",
            FilterStage::AfterExec => "after_exec",
            FilterStage::FinishRouter => "finish_router",
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let norm = s.trim().to_ascii_lowercase().replace('-', "_");
        FilterStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == norm || stage.as_str().replace('_', "") == norm)
            .ok_or_else(|| format!("unknown filter stage '{s}'"))
    }
}

/// Per-rule behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterOptions {
    /// End the stage once the response has been written
    pub return_on_output: bool,
    /// Restore the context params after the filter, dropping its captures
    pub reset_params: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            return_on_output: true,
            reset_params: false,
        }
    }
}

impl FilterOptions {
    #[must_use]
    pub fn return_on_output(mut self, on: bool) -> Self {
        self.return_on_output = on;
        self
    }

    #[must_use]
    pub fn reset_params(mut self, on: bool) -> Self {
        self.reset_params = on;
        self
    }
}

/// Filter body.
pub type FilterFn = Arc<dyn Fn(&mut Context) + Send + Sync>;

/// One registered filter.
pub struct FilterRule {
    pattern: Pattern,
    scope: Tree<()>,
    filter: FilterFn,
    options: FilterOptions,
}

impl fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRule")
            .field("pattern", &self.pattern.as_str())
            .field("options", &self.options)
            .finish()
    }
}

impl FilterRule {
    /// Compile `pattern` into a single-entry scope tree.
    pub fn new(
        pattern: &str,
        filter: FilterFn,
        options: FilterOptions,
        tree_opts: TreeOptions,
    ) -> Result<Self, RegistrationError> {
        let pattern = Pattern::parse(pattern, tree_opts)?;
        let mut scope = Tree::new(tree_opts);
        scope.insert(&pattern, Arc::new(()))?;
        Ok(Self {
            pattern,
            scope,
            filter,
            options,
        })
    }

    #[must_use]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    #[must_use]
    pub fn options(&self) -> FilterOptions {
        self.options
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Every matching rule ran
    Completed,
    /// A `return_on_output` rule found the response written
    ShortCircuit,
    /// The request was cancelled between rules
    Cancelled,
}

/// Rules for all five stages. Immutable once published; writers build a new
/// chain and swap it in.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: [Vec<Arc<FilterRule>>; 5],
}

impl FilterChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stage: FilterStage, rule: FilterRule) {
        self.stages[stage.index()].push(Arc::new(rule));
    }

    /// Drop every rule in `stage` registered under exactly `pattern`.
    pub fn remove(&mut self, stage: FilterStage, pattern: &str) -> usize {
        let rules = &mut self.stages[stage.index()];
        let before = rules.len();
        rules.retain(|r| r.pattern() != pattern);
        before - rules.len()
    }

    #[must_use]
    pub fn stage(&self, stage: FilterStage) -> &[Arc<FilterRule>] {
        &self.stages[stage.index()]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(Vec::is_empty)
    }

    /// Run the rules of `stage` whose scope matches `path`.
    pub fn run(&self, stage: FilterStage, ctx: &mut Context, path: &str) -> StageOutcome {
        let finishing = stage == FilterStage::FinishRouter;
        for rule in self.stage(stage) {
            if !finishing && ctx.is_cancelled() {
                return StageOutcome::Cancelled;
            }
            if !finishing && rule.options.return_on_output && ctx.response_written() {
                return StageOutcome::ShortCircuit;
            }
            let Some(m) = rule.scope.find(path) else {
                continue;
            };
            tracing::trace!(stage = %stage, pattern = rule.pattern(), "filter matched");

            let saved = rule.options.reset_params.then(|| ctx.params().clone());
            ctx.merge_params(&m.params);
            (rule.filter)(ctx);
            if let Some(saved) = saved {
                ctx.replace_params(saved);
            }

            if !finishing && rule.options.return_on_output && ctx.response_written() {
                return StageOutcome::ShortCircuit;
            }
        }
        StageOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::Request;
    use http::Method;

    fn rule(
        pattern: &str,
        opts: FilterOptions,
        f: impl Fn(&mut Context) + Send + Sync + 'static,
    ) -> FilterRule {
        FilterRule::new(pattern, Arc::new(f), opts, TreeOptions::default()).unwrap()
    }

    fn ctx(path: &str) -> Context {
        Context::for_request(Request::new(Method::GET, path))
    }

    fn trail(ctx: &mut Context, step: &'static str) {
        let mut steps = ctx.take_data::<Vec<&'static str>>("trail").unwrap_or_default();
        steps.push(step);
        ctx.set_data("trail", steps);
    }

    #[test]
    fn test_stage_parse_and_display() {
        assert_eq!(
            "before_router".parse::<FilterStage>(),
            Ok(FilterStage::BeforeRouter)
        );
        assert_eq!(
            "FinishRouter".parse::<FilterStage>(),
            Ok(FilterStage::FinishRouter)
        );
        assert_eq!("after-exec".parse::<FilterStage>(), Ok(FilterStage::AfterExec));
        assert!("later".parse::<FilterStage>().is_err());
        assert_eq!(FilterStage::BeforeExec.to_string(), "before_exec");
    }

    #[test]
    fn test_registration_order_and_scope() {
        let mut chain = FilterChain::new();
        let opts = FilterOptions::default();
        chain.push(FilterStage::BeforeRouter, rule("/*", opts, |c| trail(c, "all")));
        chain.push(
            FilterStage::BeforeRouter,
            rule("/admin/*", opts, |c| trail(c, "admin")),
        );
        chain.push(FilterStage::BeforeRouter, rule("/*", opts, |c| trail(c, "all2")));

        let mut c = ctx("/admin/users");
        let outcome = chain.run(FilterStage::BeforeRouter, &mut c, "/admin/users");
        assert_eq!(outcome, StageOutcome::Completed);
        assert_eq!(
            c.data::<Vec<&str>>("trail").unwrap(),
            &vec!["all", "admin", "all2"]
        );

        let mut c = ctx("/public");
        chain.run(FilterStage::BeforeRouter, &mut c, "/public");
        assert_eq!(c.data::<Vec<&str>>("trail").unwrap(), &vec!["all", "all2"]);
    }

    #[test]
    fn test_short_circuit_on_output() {
        let mut chain = FilterChain::new();
        let opts = FilterOptions::default();
        chain.push(
            FilterStage::BeforeRouter,
            rule("/*", opts, |c| c.abort(401, "no")),
        );
        chain.push(
            FilterStage::BeforeRouter,
            rule("/*", opts, |c| trail(c, "second")),
        );

        let mut c = ctx("/x");
        let outcome = chain.run(FilterStage::BeforeRouter, &mut c, "/x");
        assert_eq!(outcome, StageOutcome::ShortCircuit);
        assert!(!c.has_data("trail"));
    }

    #[test]
    fn test_without_return_on_output_chain_continues() {
        let mut chain = FilterChain::new();
        let opts = FilterOptions::default().return_on_output(false);
        chain.push(FilterStage::AfterExec, rule("/*", opts, |c| c.write_text("a")));
        chain.push(FilterStage::AfterExec, rule("/*", opts, |c| c.write_text("b")));

        let mut c = ctx("/x");
        let outcome = chain.run(FilterStage::AfterExec, &mut c, "/x");
        assert_eq!(outcome, StageOutcome::Completed);
        assert_eq!(c.response().body_str(), "ab");
    }

    #[test]
    fn test_finish_router_always_runs_everything() {
        let mut chain = FilterChain::new();
        let opts = FilterOptions::default();
        chain.push(
            FilterStage::FinishRouter,
            rule("/*", opts, |c| trail(c, "one")),
        );
        chain.push(
            FilterStage::FinishRouter,
            rule("/*", opts, |c| trail(c, "two")),
        );

        let mut c = ctx("/x");
        c.write_text("already written");
        let outcome = chain.run(FilterStage::FinishRouter, &mut c, "/x");
        assert_eq!(outcome, StageOutcome::Completed);
        assert_eq!(c.data::<Vec<&str>>("trail").unwrap(), &vec!["one", "two"]);
    }

    #[test]
    fn test_filter_captures_merge_and_reset() {
        let mut chain = FilterChain::new();
        chain.push(
            FilterStage::BeforeExec,
            rule("/shop/:sku", FilterOptions::default().reset_params(true), |c| {
                let sku = c.param("sku").unwrap_or("").to_string();
                c.set_data("seen", sku);
            }),
        );
        chain.push(
            FilterStage::BeforeExec,
            rule("/:section/*", FilterOptions::default(), |_| {}),
        );

        let mut c = ctx("/shop/A1");
        chain.run(FilterStage::BeforeExec, &mut c, "/shop/A1");
        assert_eq!(c.data::<String>("seen").map(String::as_str), Some("A1"));
        assert_eq!(c.param("sku"), None);
        assert_eq!(c.param("section"), Some("shop"));
    }

    #[test]
    fn test_cancelled_between_filters() {
        let token = crate::server::CancelToken::new();
        let mut chain = FilterChain::new();
        let opts = FilterOptions::default();
        let inner = token.clone();
        chain.push(
            FilterStage::BeforeRouter,
            rule("/*", opts, move |_| inner.cancel()),
        );
        chain.push(
            FilterStage::BeforeRouter,
            rule("/*", opts, |c| trail(c, "late")),
        );

        let mut c = Context::for_request(Request::new(Method::GET, "/x").with_cancel(token));
        let outcome = chain.run(FilterStage::BeforeRouter, &mut c, "/x");
        assert_eq!(outcome, StageOutcome::Cancelled);
        assert!(!c.has_data("trail"));
    }

    #[test]
    fn test_remove_by_pattern() {
        let mut chain = FilterChain::new();
        let opts = FilterOptions::default();
        chain.push(FilterStage::BeforeExec, rule("/a/*", opts, |_| {}));
        chain.push(FilterStage::BeforeExec, rule("/b/*", opts, |_| {}));
        chain.push(FilterStage::BeforeExec, rule("/a/*", opts, |_| {}));
        assert_eq!(chain.remove(FilterStage::BeforeExec, "/a/*"), 2);
        assert_eq!(chain.stage(FilterStage::BeforeExec).len(), 1);
        assert_eq!(chain.remove(FilterStage::AfterExec, "/b/*"), 0);
    }

    #[test]
    fn test_invalid_filter_pattern_rejected() {
        let err = FilterRule::new(
            "/x/:id(",
            Arc::new(|_: &mut Context| {}),
            FilterOptions::default(),
            TreeOptions::default(),
        );
        assert!(err.is_err());
    }
}
