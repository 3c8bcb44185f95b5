//! # Dispatcher Module
//!
//! The dispatch table: one route tree per HTTP method, the five-stage filter
//! chain, static mounts and the context pool, plus the per-request state
//! machine that ties them together.
//!
//! ## Request Flow
//!
//! 1. `BeforeStatic` filters
//! 2. Static-file check (GET/HEAD under a mounted prefix)
//! 3. `BeforeRouter` filters
//! 4. Route lookup: 404 when no method matches the path, 405 when only other
//!    methods do
//! 5. `BeforeExec` filters
//! 6. Handler: function, controller lifecycle, or raw handler
//! 7. `AfterExec` filters
//! 8. `FinishRouter` filters, always
//!
//! A filter that writes output with `return_on_output` set, a handler that
//! stops the chain, or a cancelled request jumps straight to step 8.
//!
//! ## Runtime changes
//!
//! Registration may happen while requests are being served. Writers are
//! serialized and publish a fresh snapshot; readers never block and never see
//! a half-applied change. A removed route stays reachable only to requests
//! that loaded the previous snapshot before the removal.

mod core;
mod serve;

pub use core::Dispatcher;

use once_cell::sync::Lazy;

static DEFAULT: Lazy<Dispatcher> = Lazy::new(Dispatcher::new);

/// Process-wide dispatcher with default configuration, created on first use.
///
/// Applications that need configuration, sessions or templates should build
/// their own [`Dispatcher`] instead.
#[must_use]
pub fn default_dispatcher() -> &'static Dispatcher {
    &DEFAULT
}
