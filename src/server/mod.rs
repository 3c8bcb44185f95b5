//! Request/response values exchanged with the transport, and the narrow
//! collaborator interfaces (sessions, templates) handlers reach through the
//! context.
//!
//! The router never opens sockets. A transport (HTTP server, FastCGI bridge,
//! test harness) builds a [`Request`], calls
//! [`Dispatcher::serve`](crate::dispatcher::Dispatcher::serve) and writes the
//! returned [`Response`] back out.

mod render;
mod request;
mod response;
mod session;

pub use render::{MiniJinjaRenderer, RenderError, TemplateRenderer};
pub use request::{CancelToken, HeaderVec, Request, MAX_INLINE_HEADERS};
pub use response::{status_reason, Response};
pub use session::{SessionProvider, SessionStore};
