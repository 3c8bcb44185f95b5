//! # CLI Module
//!
//! The `stagerouter` binary loads a YAML route manifest (see
//! [`crate::manifest`]) into a [`Dispatcher`](crate::dispatcher::Dispatcher)
//! bound to echo handlers, then inspects or exercises it.
//!
//! ## Commands
//!
//! ```bash
//! # List routes by method
//! stagerouter routes --manifest routes.yaml
//!
//! # Which route does a request hit, and with which parameters?
//! stagerouter resolve --manifest routes.yaml GET /users/42
//!
//! # Run the full filter and handler pipeline
//! stagerouter request --manifest routes.yaml POST '/users/42?x=1' -H 'x-request-id: 01J...' --body hi
//! ```
//!
//! `--config` (or `STAGER_CONFIG`) points at a router configuration file;
//! logging is configured through the `STAGER_LOG_*` variables.

mod commands;


pub use commands::{run, run_cli, Cli, Commands};
