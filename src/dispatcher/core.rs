use super::context::Context;
use super::element::{Pipeline, Stage};
use super::error::{End, Interrupt, Terminal};
use super::outcome::Outcome;
use super::request::Request;
use super::response::{Cookie, Response};
use crate::continuation::{worker, ContinuationManager};
use crate::ids::ContinuationId;
use crate::router::{RouteMatch, Site};
use crate::runtime_config::EngineConfig;
use http::StatusCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Runs matched requests through their pipelines.
///
/// Non-pausable routes run synchronously on the calling thread. Pausable
/// routes run on a dedicated `may` coroutine so that `pause()` can block
/// there while the calling thread returns the partial response.
pub struct Dispatcher {
    site: Arc<Site>,
    config: Arc<EngineConfig>,
    continuations: Arc<ContinuationManager>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(site: Site, config: EngineConfig) -> Self {
        let continuations = Arc::new(ContinuationManager::new(&config));
        Self {
            site: Arc::new(site),
            config: Arc::new(config),
            continuations,
        }
    }

    #[must_use]
    pub fn site(&self) -> &Arc<Site> {
        &self.site
    }

    #[must_use]
    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    #[must_use]
    pub fn continuations(&self) -> &Arc<ContinuationManager> {
        &self.continuations
    }

    /// Resolve and run a fresh request.
    #[must_use]
    pub fn dispatch(&self, request: Request) -> Outcome {
        match self.site.resolve(&request.method, &request.path) {
            Some(route_match) => self.dispatch_match(request, route_match),
            None => Outcome::NotFound,
        }
    }

    /// Run a request against an already resolved route.
    #[must_use]
    pub fn dispatch_match(&self, request: Request, route_match: RouteMatch) -> Outcome {
        let request_id = request.request_id;
        let owner = request
            .cookie(&self.config.session_cookie)
            .map(str::to_owned);

        // D1: Dispatch start
        debug!(
            request_id = %request_id,
            method = %request.method,
            path = %request.path,
            route = %route_match.route.path(),
            pausable = route_match.route.is_pausable(),
            "Dispatch start"
        );

        let ctx = Context::new(
            request,
            route_match,
            Arc::clone(&self.site),
            Arc::clone(&self.config),
        );
        if !ctx.route().is_pausable() {
            return execute(ctx);
        }

        let route_id = ctx.route().id();
        match worker::spawn(ctx, self.config.stack_size) {
            Ok(handle) => {
                let outcome = self.continuations.await_worker(handle, owner, route_id);
                self.decorate(outcome)
            }
            Err(e) => {
                // D2: Worker spawn failure
                error!(
                    request_id = %request_id,
                    error = %e,
                    stack_size = self.config.stack_size,
                    "Failed to spawn continuation worker - CRITICAL"
                );
                Outcome::Fault {
                    response: Response::with_status(StatusCode::SERVICE_UNAVAILABLE),
                    error: anyhow::Error::new(e).context("failed to spawn continuation worker"),
                }
            }
        }
    }

    /// Resume a paused continuation with a new request.
    #[must_use]
    pub fn resume(&self, id: ContinuationId, request: Request) -> Outcome {
        let session = request
            .cookie(&self.config.session_cookie)
            .map(str::to_owned);
        match self.continuations.resume(id, request, session.as_deref()) {
            Ok(outcome) => self.decorate(outcome),
            Err(err) => {
                warn!(continuation_id = %id, error = %err, "Continuation could not be resumed");
                Outcome::Unresolvable(err)
            }
        }
    }

    /// Attach the continuation cookie to a paused response.
    fn decorate(&self, outcome: Outcome) -> Outcome {
        match outcome {
            Outcome::Paused { id, mut response } => {
                response.add_cookie(
                    Cookie::new(self.config.continuation_cookie.as_str(), id.to_string())
                        .path("/")
                        .max_age(self.config.continuation_duration_ms / 1000),
                );
                Outcome::Paused { id, response }
            }
            other => other,
        }
    }
}

/// Run a context's whole pipeline, recover failures, and build the outcome.
pub(crate) fn execute(mut ctx: Context) -> Outcome {
    let start = Instant::now();
    let end = match run_from(&mut ctx, 0) {
        End::Failed(err) => recover(&mut ctx, err),
        other => other,
    };
    finish(ctx, end, start)
}

/// Run stages `start..` of the context's current pipeline.
pub(crate) fn run_from(ctx: &mut Context, start: usize) -> End {
    let pipeline = Arc::clone(ctx.pipeline());
    for index in start..pipeline.len() {
        if let Some(terminal) = ctx.terminal() {
            return terminal.clone().into();
        }
        let Some(stage) = pipeline.stage(index) else {
            break;
        };
        if let Some(end) = invoke(ctx, index, stage) {
            return end;
        }
    }
    End::Completed
}

/// Run one stage. `None` means fall through to the next one.
fn invoke(ctx: &mut Context, index: usize, stage: &Stage) -> Option<End> {
    ctx.enter_stage(index, stage.kind);
    debug!(
        request_id = %ctx.request_id(),
        stage = %stage.kind,
        index = index,
        element = stage.element.name(),
        "Stage start"
    );

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        stage.element.process(ctx)
    }));

    if let Some(end) = ctx.leave_stage() {
        if let Ok(Err(Interrupt::Failed(err))) = &result {
            warn!(
                request_id = %ctx.request_id(),
                stage = %stage.kind,
                error = %err,
                "Stage failed after next(); error ignored"
            );
        }
        return Some(end);
    }

    match result {
        Ok(Ok(())) | Ok(Err(Interrupt::Next)) | Ok(Err(Interrupt::Terminated)) => {
            ctx.terminal().cloned().map(End::from)
        }
        Ok(Err(Interrupt::Respond)) => Some(latched(ctx, Terminal::Responded)),
        Ok(Err(Interrupt::Redirect(to))) => {
            if ctx.response().header("location").is_none() {
                ctx.set_status(StatusCode::FOUND);
                ctx.set_header("location", to.clone());
            }
            Some(latched(ctx, Terminal::Redirected(to)))
        }
        Ok(Err(Interrupt::Defer)) => Some(latched(ctx, Terminal::Deferred)),
        Ok(Err(Interrupt::Cancelled)) => Some(latched(ctx, Terminal::Cancelled)),
        Ok(Err(Interrupt::Failed(err))) => {
            debug!(
                request_id = %ctx.request_id(),
                stage = %stage.kind,
                error = %err,
                "Stage failed"
            );
            Some(End::Failed(err))
        }
        Err(panic) => {
            // D3: Stage panic caught - CRITICAL ERROR
            let panic_message = panic_message(panic.as_ref());
            error!(
                request_id = %ctx.request_id(),
                stage = %stage.kind,
                element = stage.element.name(),
                panic_message = %panic_message,
                "Stage panicked - CRITICAL"
            );
            Some(End::Failed(anyhow::anyhow!(
                "stage panicked: {panic_message}"
            )))
        }
    }
}

fn latched(ctx: &mut Context, terminal: Terminal) -> End {
    ctx.latch(terminal);
    ctx.terminal()
        .cloned()
        .map(End::from)
        .unwrap_or(End::Completed)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Hand a failure to the nearest exception handler in scope, if any.
fn recover(ctx: &mut Context, err: anyhow::Error) -> End {
    // A stage may latch respond()/redirect() and still fail; the failure wins
    if let Some(dropped) = ctx.unlatch() {
        debug!(
            request_id = %ctx.request_id(),
            terminal = ?dropped,
            "Latched terminal superseded by stage failure"
        );
    }
    let router = ctx.route().router();
    let Some((scope, handler)) = ctx.site().exception_handler(router) else {
        return End::Failed(err);
    };

    info!(
        request_id = %ctx.request_id(),
        route = %ctx.route().path(),
        handler_router = scope,
        error = %err,
        "Exception handler invoked"
    );
    ctx.enter_exception_scope(Pipeline::exception(handler), err);

    match run_from(ctx, 0) {
        End::Failed(handler_err) => {
            let original = ctx
                .take_exception()
                .map(|e| format!("{e:#}"))
                .unwrap_or_default();
            error!(
                request_id = %ctx.request_id(),
                error = %handler_err,
                original_error = %original,
                "Exception handler failed"
            );
            End::Failed(handler_err.context(format!(
                "exception handler failed while handling: {original}"
            )))
        }
        other => other,
    }
}

fn finish(mut ctx: Context, end: End, start: Instant) -> Outcome {
    let request_id = ctx.request_id();
    let latency_ms = start.elapsed().as_millis() as u64;
    let outcome = match end {
        End::Completed | End::Responded | End::Redirected(_) | End::Cancelled => {
            Outcome::Handled(ctx.take_response())
        }
        End::Deferred => Outcome::Deferred,
        End::Failed(error) => {
            let mut response = ctx.take_response();
            response.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            if ctx.config().pretty_exceptions {
                response.print(format_args!("\n{error:?}\n"));
            }
            // D4: Unhandled stage failure
            error!(
                request_id = %request_id,
                route = %ctx.route().path(),
                error = %format!("{error:#}"),
                "Unhandled stage failure"
            );
            Outcome::Fault { response, error }
        }
    };

    info!(
        request_id = %request_id,
        route = %ctx.route().path(),
        status = outcome.status().as_u16(),
        latency_ms = latency_ms,
        "Dispatch complete"
    );
    outcome
}
