//! # stagerouter
//!
//! **stagerouter** is the routing and dispatch core of an MVC-style web
//! framework: a segment-trie router per HTTP method, a five-stage filter chain
//! around every request, stateful controllers with lifecycle hooks, and a
//! pooled per-request context. It never opens sockets. A transport hands it a
//! [`server::Request`] and writes back the [`server::Response`] it returns.
//!
//! ## Architecture
//!
//! - **[`router`]** - Pattern grammar and the copy-on-write segment trie
//! - **[`dispatcher`]** - Route tables, registration API and the per-request
//!   state machine
//! - **[`filter`]** - Filter stages, rules and chain execution
//! - **[`controller`]** - Controller lifecycle and method-to-action mappings
//! - **[`context`]** - Per-request context and the context pool
//! - **[`server`]** - Request/response values, sessions and templates
//! - **[`static_files`]** - Static directory mounts
//! - **[`config`]** / **[`logging`]** - Router configuration and tracing setup
//! - **[`manifest`]** / **[`cli`]** - YAML route manifests and the
//!   `stagerouter` binary
//!
//! ### Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant T as Transport
//!     participant D as Dispatcher
//!     participant F as FilterChain
//!     participant R as RouteTable
//!     participant H as Handler
//!
//!     T->>D: serve(Request)
//!     D->>D: acquire pooled Context
//!     D->>F: BeforeStatic
//!     D->>D: static mounts (GET/HEAD)
//!     D->>F: BeforeRouter
//!     D->>R: resolve(method, path)
//!     R-->>D: RouteMatch / 404 / 405
//!     D->>F: BeforeExec
//!     D->>H: function, controller lifecycle or raw handler
//!     D->>F: AfterExec
//!     D->>F: FinishRouter (always)
//!     D-->>T: Response
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use http::Method;
//! use stagerouter::context::Context;
//! use stagerouter::controller::{Controller, HookOutcome};
//! use stagerouter::filter::{FilterOptions, FilterStage};
//! use stagerouter::server::Request;
//! use stagerouter::Dispatcher;
//!
//! #[derive(Default)]
//! struct UserController;
//!
//! impl Controller for UserController {
//!     fn actions(&self) -> &[&'static str] {
//!         &["Show"]
//!     }
//!
//!     fn handle(&mut self, _action: &str, ctx: &mut Context) -> HookOutcome {
//!         let id = ctx.param("id").unwrap_or_default().to_string();
//!         ctx.write_text(&format!("user {id}"));
//!         HookOutcome::Continue
//!     }
//! }
//!
//! let d = Dispatcher::new();
//! d.add_controller("/users/:id:int", UserController::default, Some("get:Show"))?;
//! d.insert_filter(
//!     FilterStage::BeforeRouter,
//!     "/admin/*",
//!     |ctx| ctx.abort(401, "login required"),
//!     FilterOptions::default(),
//! )?;
//!
//! assert_eq!(d.serve(Request::new(Method::GET, "/users/7")).body_str(), "user 7");
//! assert_eq!(d.serve(Request::new(Method::GET, "/users/bob")).status, 404);
//! assert_eq!(d.serve(Request::new(Method::GET, "/admin/x")).status, 401);
//! # Ok::<(), stagerouter::RegistrationError>(())
//! ```
//!
//! ## Concurrency
//!
//! `serve` takes `&self` and is safe to call from any number of threads.
//! Registration may run concurrently with serving: writers are serialized and
//! publish immutable snapshots, so a request sees either the table before a
//! change or the table after it.

pub mod cli;
pub mod config;
pub mod context;
pub mod controller;
pub mod dispatcher;
pub mod echo;
pub mod error;
pub mod filter;
pub mod ids;
pub mod logging;
pub mod manifest;
pub mod method;
pub mod router;
pub mod server;
pub mod static_files;

pub use config::RouterConfig;
pub use context::Context;
pub use controller::{Controller, HandlerError, HookOutcome};
pub use dispatcher::{default_dispatcher, Dispatcher};
pub use error::RegistrationError;
pub use filter::{FilterOptions, FilterStage};
pub use router::{DispatchTarget, RouteMatch, RouteMiss, TreeOptions};
pub use server::{CancelToken, Request, Response};
