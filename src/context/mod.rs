//! # Context Module
//!
//! The per-request [`Context`] handed to filters and handlers, and the
//! [`ContextPool`] that recycles them.
//!
//! Filters talk to each other and to the handler through the context's typed
//! data bag:
//!
//! ```rust
//! use http::Method;
//! use stagerouter::context::Context;
//! use stagerouter::server::Request;
//!
//! let mut ctx = Context::for_request(Request::new(Method::GET, "/me"));
//! ctx.set_data("user_id", 42u64);
//! assert_eq!(ctx.data::<u64>("user_id"), Some(&42));
//! ```

mod core;
mod pool;

pub use core::Context;
pub use pool::{ContextPool, PoolExhausted, PooledContext, DEFAULT_MAX_IDLE};
