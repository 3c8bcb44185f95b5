use serde_json::Value;
use std::sync::Arc;

use super::request::Request;

/// Per-user session state. Backing providers (memory, file, cookie, external)
/// live outside this crate.
pub trait SessionStore: Send + Sync {
    /// Session identifier
    fn id(&self) -> String;
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value);
    fn delete(&self, key: &str);
}

/// Looks up (or starts) the session a request belongs to.
pub trait SessionProvider: Send + Sync {
    /// `None` when the request carries no session and none should be started.
    fn session_for(&self, request: &Request) -> Option<Arc<dyn SessionStore>>;
}
