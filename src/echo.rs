use serde_json::{json, Map, Value};

use crate::context::Context;

/// Handler that answers with what the router extracted: the handler name, the
/// matched route, path parameters and query pairs. Used by the CLI to bind
/// manifest routes.
pub fn echo_handler(handler: impl Into<String>) -> impl Fn(&mut Context) + Send + Sync + 'static {
    let handler = handler.into();
    move |ctx: &mut Context| {
        let params: Map<String, Value> = ctx
            .params()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.clone())))
            .collect();
        let query: Vec<Value> = ctx
            .query_pairs()
            .iter()
            .map(|(k, v)| json!([k, v]))
            .collect();
        let body = json!({
            "handler": handler,
            "method": ctx.method().as_str(),
            "path": ctx.path(),
            "route": ctx.route_pattern(),
            "params": params,
            "query": query,
            "body": String::from_utf8_lossy(ctx.body()),
        });
        ctx.write_json(200, &body);
    }
}
