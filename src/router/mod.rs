//! # Router Module
//!
//! Pattern parsing and the segment trie that both routes and filters match
//! against.
//!
//! ## Pattern grammar
//!
//! | Syntax          | Matches                                   | Captures        |
//! |-----------------|-------------------------------------------|-----------------|
//! | `users`         | that exact segment                        |                 |
//! | `:id`           | any non-empty segment                     | `id`            |
//! | `:id([0-9]+)`   | a segment matching the regex              | `id`            |
//! | `:id:int`       | digits                                    | `id`            |
//! | `:slug:string`  | word characters                           | `slug`          |
//! | `?:id`          | an optional last segment                  | `id` if present |
//! | `*`             | the rest of the path, possibly empty      | `splat`         |
//! | `*.*`           | the rest of the path, with an extension   | `path`, `ext`   |
//! | `*.json`        | the rest of the path ending in `.json`    | `path`          |
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stagerouter::router::{Pattern, Tree, TreeOptions};
//!
//! let opts = TreeOptions::default();
//! let mut tree = Tree::new(opts);
//! tree.insert(&Pattern::parse("/api/:id([0-9]+)", opts)?, Arc::new("item"))?;
//! tree.insert(&Pattern::parse("/api/*", opts)?, Arc::new("fallback"))?;
//!
//! let m = tree.find("/api/42").unwrap();
//! assert_eq!(**m.value, "item");
//! assert_eq!(m.params[0].1, "42");
//! assert_eq!(**tree.find("/api/abc").unwrap().value, "fallback");
//! # Ok::<(), stagerouter::RegistrationError>(())
//! ```

mod core;
mod pattern;
mod radix;
#[cfg(test)]
mod tests;

pub use core::{
    DispatchTarget, HandlerFn, ParamVec, RawHandlerFn, RouteEntry, RouteMatch, RouteMiss,
    MAX_INLINE_PARAMS,
};
pub use pattern::{Constraint, Pattern, Segment, TreeOptions, WildcardKind};
pub use radix::{Tree, TreeMatch};
