use http::Method;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::core::Dispatcher;
use crate::context::Context;
use crate::controller::HookOutcome;
use crate::filter::{FilterChain, FilterStage, StageOutcome};
use crate::ids::REQUEST_ID_HEADER;
use crate::router::{DispatchTarget, RouteMatch, RouteMiss};
use crate::server::{status_reason, Request, Response};
use crate::static_files::StaticLookup;

/// Paths never written to the access log.
const QUIET_PATHS: &[&str] = &["/favicon.ico", "/robots.txt"];

impl Dispatcher {
    /// Serve one request.
    ///
    /// Stages run in order: before-static filters, the static-file check,
    /// before-router filters, route lookup, before-exec filters, the handler,
    /// after-exec filters, and finally the finish-router filters, which run
    /// no matter how the earlier stages ended. A panic in any stage replaces
    /// the buffered output with a 500.
    pub fn serve(&self, request: Request) -> Response {
        let started = Instant::now();
        let mut ctx = match self.pool.acquire() {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(
                    method = %request.method,
                    path = %request.path,
                    max_in_flight = e.max_in_flight,
                    "Context pool exhausted - rejecting request"
                );
                return Response::error(503, status_reason(503));
            }
        };
        ctx.begin(request, self.sessions.clone(), self.renderer.clone());

        let filters = self.filters.load_full();
        let method = ctx.method().clone();
        let path = ctx.path().to_string();

        self.run_pipeline(&filters, &mut ctx, &method, &path);

        self.guarded(FilterStage::FinishRouter.as_str(), &mut ctx, |ctx| {
            filters.run(FilterStage::FinishRouter, ctx, &path)
        });

        if self.config.access_logs && !self.is_quiet(&path) {
            info!(
                request_id = %ctx.request_id(),
                method = %method,
                path = %path,
                route = ctx.route_pattern().unwrap_or("-"),
                status = ctx.response().status,
                duration_us = started.elapsed().as_micros() as u64,
                "Request served"
            );
        }

        let request_id = ctx.request_id().to_string();
        let mut response = ctx.take_response();
        if response.header(REQUEST_ID_HEADER).is_none() {
            response.set_header(REQUEST_ID_HEADER, request_id);
        }
        if let Some(server) = &self.config.server_name {
            if response.header("server").is_none() {
                response.set_header("server", server.clone());
            }
        }
        response
    }

    /// Everything up to, not including, the finish-router stage. Returning
    /// early means "skip to finish".
    fn run_pipeline(&self, filters: &FilterChain, ctx: &mut Context, method: &Method, path: &str) {
        if !self.run_stage(filters, FilterStage::BeforeStatic, ctx, path) {
            return;
        }

        if (*method == Method::GET || *method == Method::HEAD) && self.serve_static(ctx, path) {
            return;
        }

        if !self.run_stage(filters, FilterStage::BeforeRouter, ctx, path) {
            return;
        }

        let RouteMatch { entry, path_params } = match self.resolve(method, path) {
            Ok(found) => found,
            Err(miss) => {
                debug!(
                    request_id = %ctx.request_id(),
                    method = %method,
                    path,
                    status = miss.status(),
                    "No route"
                );
                if !ctx.response_written() {
                    write_miss(ctx, &miss);
                }
                return;
            }
        };
        ctx.set_route_pattern(Arc::clone(entry.pattern().raw()));
        ctx.merge_params(&path_params);

        if !self.run_stage(filters, FilterStage::BeforeExec, ctx, path) {
            return;
        }
        if ctx.is_cancelled() {
            debug!(request_id = %ctx.request_id(), "Request cancelled before handler");
            return;
        }

        let outcome = self.guarded("exec", ctx, |ctx| invoke(entry.target(), method, ctx));
        match outcome {
            Some(HookOutcome::Continue) => {}
            Some(HookOutcome::StopChain) | None => return,
            Some(HookOutcome::Error(e)) => {
                warn!(
                    request_id = %ctx.request_id(),
                    route = entry.pattern().as_str(),
                    status = e.status,
                    error = %e.message,
                    "Handler returned an error"
                );
                if !ctx.response_written() {
                    let message = if e.status < 500 {
                        e.message.as_str()
                    } else {
                        status_reason(e.status)
                    };
                    ctx.write_json(e.status, &serde_json::json!({ "error": message }));
                }
                return;
            }
        }

        self.run_stage(filters, FilterStage::AfterExec, ctx, path);
    }

    /// Run one filter stage; `false` means skip ahead to finish.
    fn run_stage(
        &self,
        filters: &FilterChain,
        stage: FilterStage,
        ctx: &mut Context,
        path: &str,
    ) -> bool {
        match self.guarded(stage.as_str(), ctx, |ctx| filters.run(stage, ctx, path)) {
            Some(StageOutcome::Completed) => true,
            Some(StageOutcome::ShortCircuit) => {
                debug!(request_id = %ctx.request_id(), stage = %stage, "Filter short-circuit");
                false
            }
            Some(StageOutcome::Cancelled) => {
                debug!(request_id = %ctx.request_id(), stage = %stage, "Request cancelled");
                false
            }
            None => false,
        }
    }

    /// Answer from the static mounts. `true` when the request was handled.
    fn serve_static(&self, ctx: &mut Context, path: &str) -> bool {
        match self.statics.lookup(path) {
            None => false,
            Some(StaticLookup::File(bytes, content_type)) => {
                ctx.set_header("content-type", content_type);
                if *ctx.method() == Method::HEAD {
                    ctx.set_header("content-length", bytes.len().to_string());
                    ctx.response_mut().commit();
                } else {
                    ctx.write(&bytes);
                }
                true
            }
            Some(StaticLookup::NotFound) => {
                ctx.write_json(404, &serde_json::json!({ "error": status_reason(404) }));
                true
            }
        }
    }

    /// Run `f`, turning a panic into a logged 500 that replaces any output
    /// written so far.
    fn guarded<R>(
        &self,
        stage: &'static str,
        ctx: &mut Context,
        f: impl FnOnce(&mut Context) -> R,
    ) -> Option<R> {
        match catch_unwind(AssertUnwindSafe(|| f(ctx))) {
            Ok(out) => Some(out),
            Err(panic) => {
                error!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    path = ctx.path(),
                    stage,
                    panic_message = %panic_message(panic.as_ref()),
                    "Panic while serving request"
                );
                // nothing has left the buffer yet, so partial output is dropped
                let response = ctx.response_mut();
                response.reset();
                response.write_json(500, &serde_json::json!({ "error": status_reason(500) }));
                None
            }
        }
    }

    fn is_quiet(&self, path: &str) -> bool {
        QUIET_PATHS.contains(&path) || self.statics.covers(path)
    }
}

fn invoke(target: &DispatchTarget, method: &Method, ctx: &mut Context) -> HookOutcome {
    match target {
        DispatchTarget::Function(f) => {
            f(ctx);
            if ctx.is_stopped() {
                HookOutcome::StopChain
            } else {
                HookOutcome::Continue
            }
        }
        DispatchTarget::Controller(controller) => controller.run(method, ctx),
        DispatchTarget::Raw(handler) => {
            let (request, response) = ctx.raw_parts();
            handler(request, response);
            response.commit();
            HookOutcome::Continue
        }
    }
}

fn write_miss(ctx: &mut Context, miss: &RouteMiss) {
    if let RouteMiss::MethodNotAllowed { allow } = miss {
        let allow: Vec<&str> = allow.iter().map(Method::as_str).collect();
        ctx.set_header("allow", allow.join(", "));
    }
    ctx.write_json(miss.status(), &serde_json::json!({ "error": miss.to_string() }));
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
