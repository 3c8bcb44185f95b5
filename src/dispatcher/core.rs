use arc_swap::ArcSwap;
use http::Method;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::RouterConfig;
use crate::context::{Context, ContextPool};
use crate::controller::{short_type_name, Controller, ControllerTarget};
use crate::error::RegistrationError;
use crate::filter::{FilterChain, FilterOptions, FilterRule, FilterStage};
use crate::method::{expand, fallback_methods, is_known, known_methods, parse_method_list};
use crate::router::{
    DispatchTarget, Pattern, RouteEntry, RouteMatch, RouteMiss, Tree, TreeOptions,
};
use crate::server::{Request, Response, SessionProvider, TemplateRenderer};
use crate::static_files::StaticFiles;

/// One route tree per HTTP method. Cloning is cheap: trees share nodes until
/// a writer touches them.
#[derive(Clone, Default)]
pub(crate) struct RouteTable {
    trees: HashMap<Method, Tree<RouteEntry>>,
}

impl RouteTable {
    fn insert(
        &mut self,
        pattern: &Pattern,
        entry: &Arc<RouteEntry>,
        opts: TreeOptions,
    ) -> Result<(), RegistrationError> {
        for method in entry.methods() {
            let tree = self
                .trees
                .entry(method.clone())
                .or_insert_with(|| Tree::new(opts));
            // exact method first, `*` only fills the gaps
            let held_exactly = tree
                .get(pattern)
                .is_some_and(|existing| !existing.is_fallback_for(method));
            if held_exactly && entry.is_fallback_for(method) {
                continue;
            }
            tree.insert(pattern, Arc::clone(entry))?;
        }
        Ok(())
    }

    fn remove(&mut self, pattern: &Pattern, methods: &[Method]) -> usize {
        let mut removed = 0;
        for method in methods {
            if let Some(tree) = self.trees.get_mut(method) {
                removed += tree.remove(pattern);
                if tree.is_empty() {
                    self.trees.remove(method);
                }
            }
        }
        removed
    }

    fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch, RouteMiss> {
        if let Some(found) = self.trees.get(method).and_then(|t| t.find(path)) {
            return Ok(RouteMatch {
                entry: Arc::clone(found.value),
                path_params: found.params,
            });
        }
        let allow: Vec<Method> = known_methods()
            .filter(|m| self.trees.get(m).is_some_and(|t| t.matches(path)))
            .collect();
        if allow.is_empty() && is_known(method) {
            Err(RouteMiss::NotFound)
        } else {
            Err(RouteMiss::MethodNotAllowed { allow })
        }
    }
}

/// The dispatch table: route trees, filter chain and the serving state.
///
/// Readers load snapshots of the route table and filter chain without
/// locking. Registration takes a writer lock, builds the next snapshot from
/// the current one and publishes it, so a request in flight keeps the tables
/// it started with and never sees a half-applied change.
///
/// ```rust
/// use http::Method;
/// use stagerouter::dispatcher::Dispatcher;
/// use stagerouter::server::Request;
///
/// let d = Dispatcher::new();
/// d.get("/hello/:name", |ctx| {
///     let name = ctx.param("name").unwrap_or("world").to_string();
///     ctx.write_text(&format!("hello {name}"));
/// })?;
///
/// let res = d.serve(Request::new(Method::GET, "/hello/bob"));
/// assert_eq!(res.body_str(), "hello bob");
/// assert_eq!(d.serve(Request::new(Method::POST, "/hello/bob")).status, 405);
/// # Ok::<(), stagerouter::RegistrationError>(())
/// ```
pub struct Dispatcher {
    pub(crate) config: RouterConfig,
    pub(crate) tree_opts: TreeOptions,
    pub(crate) routes: ArcSwap<RouteTable>,
    pub(crate) filters: ArcSwap<FilterChain>,
    write_lock: Mutex<()>,
    pub(crate) pool: ContextPool,
    pub(crate) statics: StaticFiles,
    pub(crate) sessions: Option<Arc<dyn SessionProvider>>,
    pub(crate) renderer: Option<Arc<dyn TemplateRenderer>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("routes", &self.routes().len())
            .field("pool", &self.pool)
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Dispatcher with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        let mut statics = StaticFiles::new();
        for (prefix, dir) in &config.static_dirs {
            statics.mount(prefix, dir.clone());
        }
        Self {
            tree_opts: config.tree_options(),
            routes: ArcSwap::from_pointee(RouteTable::default()),
            filters: ArcSwap::from_pointee(FilterChain::new()),
            write_lock: Mutex::new(()),
            pool: ContextPool::new(config.pool.max_idle, config.pool.max_in_flight),
            statics,
            sessions: None,
            renderer: None,
            config,
        }
    }

    /// Hand each context a session provider.
    #[must_use]
    pub fn with_session_provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.sessions = Some(provider);
        self
    }

    /// Hand each context a template renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Serve files from `dir` under `prefix`.
    pub fn mount_static<P: Into<PathBuf>>(&mut self, prefix: &str, dir: P) {
        self.statics.mount(prefix, dir);
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    // ----- route registration -----

    /// Register `target` at `pattern` for a comma separated method list
    /// (`"get,post"`, `"*"`; empty means every method).
    pub fn register(
        &self,
        methods: &str,
        pattern: &str,
        target: DispatchTarget,
    ) -> Result<(), RegistrationError> {
        let sels = parse_method_list(methods)?;
        let pattern = Pattern::parse(pattern, self.tree_opts)?;
        let entry = RouteEntry::new(pattern, expand(&sels), target)
            .with_fallback(fallback_methods(&sels));
        self.insert_entries(vec![entry])
    }

    /// Register a function handler for one method (or `*`).
    pub fn add_method<F>(&self, method: &str, pattern: &str, f: F) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        if method.contains(',') {
            return Err(RegistrationError::UnknownMethod {
                method: method.to_string(),
            });
        }
        self.register(method, pattern, DispatchTarget::function(f))
    }

    pub fn get<F>(&self, pattern: &str, f: F) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_method("get", pattern, f)
    }

    pub fn post<F>(&self, pattern: &str, f: F) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_method("post", pattern, f)
    }

    pub fn put<F>(&self, pattern: &str, f: F) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_method("put", pattern, f)
    }

    pub fn delete<F>(&self, pattern: &str, f: F) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_method("delete", pattern, f)
    }

    pub fn head<F>(&self, pattern: &str, f: F) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_method("head", pattern, f)
    }

    pub fn patch<F>(&self, pattern: &str, f: F) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_method("patch", pattern, f)
    }

    pub fn options<F>(&self, pattern: &str, f: F) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_method("options", pattern, f)
    }

    /// Register for every known method.
    pub fn any<F>(&self, pattern: &str, f: F) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.add_method("*", pattern, f)
    }

    /// Register a controller. `mapping` binds methods to actions
    /// (`"get:List;post:Create"`); without it each method maps to its
    /// lower-case name.
    pub fn add_controller<C, F>(
        &self,
        pattern: &str,
        factory: F,
        mapping: Option<&str>,
    ) -> Result<(), RegistrationError>
    where
        C: Controller + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let (target, methods) = ControllerTarget::new(factory, mapping)?;
        let pattern = Pattern::parse(pattern, self.tree_opts)?;
        let fallback = target.fallback_methods();
        let entry = RouteEntry::new(pattern, methods, DispatchTarget::Controller(Arc::new(target)))
            .with_fallback(fallback);
        self.insert_entries(vec![entry])
    }

    /// Register a raw handler for every method. With `match_subpaths` the
    /// handler also receives everything below `pattern`.
    pub fn add_raw<F>(
        &self,
        pattern: &str,
        handler: F,
        match_subpaths: bool,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        let pattern = if match_subpaths {
            format!("{}/*", pattern.trim_end_matches('/'))
        } else {
            pattern.to_string()
        };
        self.register("*", &pattern, DispatchTarget::raw(handler))
    }

    /// Auto routes at the root: `/<controller>/<action>` and
    /// `/<controller>/<action>/*`.
    pub fn add_auto<C, F>(&self, factory: F) -> Result<(), RegistrationError>
    where
        C: Controller + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.add_auto_prefix("/", factory)
    }

    /// Auto routes under `prefix`: for every action of the controller,
    /// `/<prefix>/<controller>/<action>` and the same with `/*`, for every
    /// method. The controller name drops its `Controller` suffix; both names
    /// are lower-cased.
    pub fn add_auto_prefix<C, F>(&self, prefix: &str, factory: F) -> Result<(), RegistrationError>
    where
        C: Controller + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        let factory = Arc::new(factory);
        let actions = (*factory)().actions().to_vec();
        let name = short_type_name::<C>().to_lowercase();
        let base = prefix.trim_end_matches('/');

        let mut entries = Vec::with_capacity(actions.len() * 2);
        for action in actions {
            let f = Arc::clone(&factory);
            let mapping = format!("*:{action}");
            let (target, methods) = ControllerTarget::new(move || (*f)(), Some(mapping.as_str()))?;
            let fallback = target.fallback_methods();
            let target = Arc::new(target);
            let path = format!("{base}/{name}/{}", action.to_lowercase());
            for raw in [path.clone(), format!("{path}/*")] {
                entries.push(
                    RouteEntry::new(
                        Pattern::parse(&raw, self.tree_opts)?,
                        methods.clone(),
                        DispatchTarget::Controller(Arc::clone(&target)),
                    )
                    .with_fallback(fallback.clone()),
                );
            }
        }
        self.insert_entries(entries)
    }

    /// Remove `pattern` from the trees of the listed methods. Returns the
    /// number of leaves removed.
    pub fn unregister(&self, pattern: &str, methods: &str) -> Result<usize, RegistrationError> {
        let methods = expand(&parse_method_list(methods)?);
        let pattern = Pattern::parse(pattern, self.tree_opts)?;
        let removed = self.update_routes(|table| Ok(table.remove(&pattern, &methods)))?;
        info!(pattern = %pattern, methods = ?methods, removed, "Route unregistered");
        Ok(removed)
    }

    /// Insert every entry or none.
    fn insert_entries(&self, entries: Vec<RouteEntry>) -> Result<(), RegistrationError> {
        let opts = self.tree_opts;
        let entries: Vec<Arc<RouteEntry>> = entries.into_iter().map(Arc::new).collect();
        self.update_routes(|table| {
            for entry in &entries {
                table.insert(entry.pattern(), entry, opts)?;
            }
            Ok(())
        })?;
        for entry in &entries {
            info!(
                pattern = %entry.pattern(),
                methods = ?entry.methods(),
                kind = entry.target().kind(),
                "Route registered"
            );
        }
        Ok(())
    }

    fn update_routes<R>(
        &self,
        f: impl FnOnce(&mut RouteTable) -> Result<R, RegistrationError>,
    ) -> Result<R, RegistrationError> {
        let _guard = self.write_lock.lock();
        let mut next = RouteTable::clone(&self.routes.load());
        let out = f(&mut next)?;
        self.routes.store(Arc::new(next));
        Ok(out)
    }

    // ----- filters -----

    /// Add a filter to `stage`, after the ones already there.
    pub fn insert_filter<F>(
        &self,
        stage: FilterStage,
        pattern: &str,
        filter: F,
        options: FilterOptions,
    ) -> Result<(), RegistrationError>
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        let rule = FilterRule::new(pattern, Arc::new(filter), options, self.tree_opts)?;
        let _guard = self.write_lock.lock();
        let mut next = FilterChain::clone(&self.filters.load());
        next.push(stage, rule);
        self.filters.store(Arc::new(next));
        debug!(stage = %stage, pattern, ?options, "Filter registered");
        Ok(())
    }

    /// Remove the filters of `stage` registered under exactly `pattern`.
    pub fn remove_filters(&self, stage: FilterStage, pattern: &str) -> usize {
        let _guard = self.write_lock.lock();
        let mut next = FilterChain::clone(&self.filters.load());
        let removed = next.remove(stage, pattern);
        if removed > 0 {
            self.filters.store(Arc::new(next));
        }
        removed
    }

    // ----- lookup -----

    /// Resolve a method and path against the current route table.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<RouteMatch, RouteMiss> {
        self.routes.load().resolve(method, path)
    }

    /// Registered `(method, pattern)` pairs in method then pattern order.
    #[must_use]
    pub fn routes(&self) -> Vec<(Method, String)> {
        let table = self.routes.load();
        known_methods()
            .filter_map(|m| table.trees.get(&m).map(|t| (m, t)))
            .flat_map(|(m, tree)| {
                tree.patterns()
                    .into_iter()
                    .map(move |p| (m.clone(), p.to_string()))
            })
            .collect()
    }
}
