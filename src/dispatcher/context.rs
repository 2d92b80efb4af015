//! Per-dispatch state handed to every stage.
//!
//! A [`Context`] owns the request, the response being accumulated, the
//! matched route, request-scoped attributes and the dispatch cursor. It is
//! also where the non-local control calls live:
//!
//! - [`Context::next`] runs the rest of the pipeline right away, then makes
//!   the calling stage unwind
//! - [`Context::respond`] ends the whole dispatch
//! - [`Context::redirect`] / [`Context::defer`] end it with a redirect or by
//!   handing the request back to the transport
//! - [`Context::pause`] suspends a pausable route until a later request
//!   resumes it
//!
//! Each returns `Err(Interrupt)` when the calling stage must stop, so stage
//! code propagates them with `?`.

use super::core::run_from;
use super::element::{Pipeline, StageKind};
use super::error::{End, Interrupt, StageResult, Terminal};
use super::request::Request;
use super::response::{Cookie, Response};
use crate::continuation::worker::Suspension;
use crate::ids::ContinuationId;
use crate::router::{RouteMatch, Route, Site};
use crate::runtime_config::EngineConfig;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// One active stage invocation.
struct Frame {
    index: usize,
    kind: StageKind,
    /// Set once `next()` has run the remainder from this stage
    continued: Option<End>,
}

/// Request-scoped state and control surface for pipeline stages.
pub struct Context {
    request: Request,
    response: Response,
    route_match: RouteMatch,
    site: Arc<Site>,
    config: Arc<EngineConfig>,
    attributes: HashMap<String, serde_json::Value>,
    pipeline: Arc<Pipeline>,
    frames: SmallVec<[Frame; 8]>,
    terminal: Option<Terminal>,
    exception: Option<anyhow::Error>,
    suspension: Option<Suspension>,
    continuation_id: Option<ContinuationId>,
    pauses: u32,
}

impl Context {
    pub(crate) fn new(
        request: Request,
        route_match: RouteMatch,
        site: Arc<Site>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let router = route_match.route.router();
        let pipeline = Pipeline::assemble(
            &site.before_filters(router),
            route_match.route.handler.create(),
            &site.after_filters(router),
        );
        Self {
            request,
            response: Response::new(),
            route_match,
            site,
            config,
            attributes: HashMap::new(),
            pipeline: Arc::new(pipeline),
            frames: SmallVec::new(),
            terminal: None,
            exception: None,
            suspension: None,
            continuation_id: None,
            pauses: 0,
        }
    }

    // ---------------------------------------------------------------------
    // Request side
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Query parameter by name (last value wins)
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.request.param(name)
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.header(name)
    }

    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.request.cookie(name)
    }

    /// Raw path-info of a `Capture`/`Map` route, without the leading `/`
    #[must_use]
    pub fn path_info(&self) -> Option<&str> {
        self.route_match.path_info.as_deref()
    }

    /// Parameter bound by a path-info template
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.route_match.get_path_param(name)
    }

    #[must_use]
    pub fn route(&self) -> &Arc<Route> {
        &self.route_match.route
    }

    #[must_use]
    pub fn route_match(&self) -> &RouteMatch {
        &self.route_match
    }

    #[must_use]
    pub fn site(&self) -> &Arc<Site> {
        &self.site
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Value of the session cookie, if the request carries one
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.request.cookie(&self.config.session_cookie)
    }

    // ---------------------------------------------------------------------
    // Response side
    // ---------------------------------------------------------------------

    /// Append to the response body.
    ///
    /// Output is dropped once the dispatch has terminated, or when the
    /// calling stage has already handed off to `next()`.
    pub fn print(&mut self, value: impl Display) {
        if self.output_closed("print") {
            return;
        }
        self.response.print(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.output_closed("write_bytes") {
            return;
        }
        self.response.write_bytes(bytes);
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.response.set_status(status);
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.response.set_header(name, value);
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        self.response.set_content_type(content_type);
    }

    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.response.add_cookie(cookie);
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Has the running stage already handed the rest of the pipeline to `next()`?
    fn handed_off(&self) -> bool {
        self.frames.last().is_some_and(|f| f.continued.is_some())
    }

    fn output_closed(&self, op: &str) -> bool {
        if self.handed_off() || self.terminal.is_some() {
            warn!(
                request_id = %self.request.request_id,
                op = op,
                stage = ?self.stage_kind(),
                terminated = self.terminal.is_some(),
                "Output after control transfer discarded"
            );
            return true;
        }
        false
    }

    // ---------------------------------------------------------------------
    // Attributes
    // ---------------------------------------------------------------------

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    /// Deserialize an attribute into `T`.
    #[must_use]
    pub fn attribute_as<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.attributes
            .get(name)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Store a request-scoped attribute visible to later stages.
    pub fn set_attribute(
        &mut self,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(value)?;
        self.attributes.insert(name.into(), value);
        Ok(())
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<serde_json::Value> {
        self.attributes.remove(name)
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    // ---------------------------------------------------------------------
    // Dispatch state
    // ---------------------------------------------------------------------

    /// Error being handled, inside an exception handler
    #[must_use]
    pub fn exception(&self) -> Option<&anyhow::Error> {
        self.exception.as_ref()
    }

    /// Kind of the stage currently running
    #[must_use]
    pub fn stage_kind(&self) -> Option<StageKind> {
        self.frames.last().map(|f| f.kind)
    }

    /// Index of the stage currently running in its pipeline
    #[must_use]
    pub fn stage_index(&self) -> Option<usize> {
        self.frames.last().map(|f| f.index)
    }

    /// Has `respond()`, `redirect()`, `defer()` or a cancellation ended the dispatch?
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminal.is_some()
    }

    /// Whether `pause()` is available here
    #[must_use]
    pub fn is_pausable(&self) -> bool {
        self.suspension.is_some()
    }

    /// Id the next `pause()` will hand to the client.
    ///
    /// `None` unless the route is pausable.
    #[must_use]
    pub fn continuation_id(&self) -> Option<ContinuationId> {
        self.continuation_id
    }

    /// How many times this execution has been paused and resumed
    #[must_use]
    pub fn resume_count(&self) -> u32 {
        self.pauses
    }

    // ---------------------------------------------------------------------
    // Control flow
    // ---------------------------------------------------------------------

    /// Run every stage after the current one now, then unwind this stage.
    ///
    /// Always returns `Err`; propagate it with `?`. Output written by this
    /// stage after the call is discarded.
    pub fn next(&mut self) -> StageResult {
        if self.terminal.is_some() {
            return Err(self.misuse("next() after the dispatch terminated"));
        }
        let Some(frame) = self.frames.last() else {
            return Err(self.misuse("next() outside of a stage"));
        };
        if frame.continued.is_some() {
            return Err(self.misuse("next() called twice in the same stage"));
        }
        let start = frame.index + 1;

        debug!(
            request_id = %self.request.request_id,
            from_stage = frame.index,
            "Pipeline continued by next()"
        );
        let end = run_from(self, start);

        let interrupt = match &end {
            End::Completed | End::Failed(_) => Interrupt::Next,
            End::Responded => Interrupt::Respond,
            End::Redirected(to) => Interrupt::Redirect(to.clone()),
            End::Deferred => Interrupt::Defer,
            End::Cancelled => Interrupt::Cancelled,
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.continued = Some(end);
        }
        Err(interrupt)
    }

    /// End the dispatch; output written so far becomes the response.
    pub fn respond(&mut self) -> StageResult {
        if self.terminal.is_some() {
            return Err(self.misuse("respond() after the dispatch terminated"));
        }
        if self.handed_off() {
            return Err(self.misuse("respond() after next() in the same stage"));
        }
        self.terminal = Some(Terminal::Responded);
        Err(Interrupt::Respond)
    }

    /// End the dispatch with a `302 Found` redirect to `location`.
    pub fn redirect(&mut self, location: impl Into<String>) -> StageResult {
        if self.terminal.is_some() {
            return Err(self.misuse("redirect() after the dispatch terminated"));
        }
        if self.handed_off() {
            return Err(self.misuse("redirect() after next() in the same stage"));
        }
        let location = location.into();
        self.response.set_status(StatusCode::FOUND);
        self.response.set_header("location", location.clone());
        self.terminal = Some(Terminal::Redirected(location.clone()));
        Err(Interrupt::Redirect(location))
    }

    /// Redirect to the path of a named route.
    pub fn redirect_to(&mut self, route_name: &str) -> StageResult {
        let path = self
            .site
            .path_for(route_name)
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("no route named '{route_name}'"))?;
        self.redirect(path)
    }

    /// Give the request back to the transport unhandled.
    pub fn defer(&mut self) -> StageResult {
        if self.terminal.is_some() {
            return Err(self.misuse("defer() after the dispatch terminated"));
        }
        if self.handed_off() {
            return Err(self.misuse("defer() after next() in the same stage"));
        }
        self.terminal = Some(Terminal::Deferred);
        Err(Interrupt::Defer)
    }

    /// Suspend this execution until a later request resumes it.
    ///
    /// The response written so far is sent to the client along with the
    /// continuation id. When a resume arrives, this call returns that id and
    /// the context holds the new request and a fresh response. Returns
    /// `Err(Interrupt::Cancelled)` if the continuation is evicted or the
    /// engine shuts down while paused.
    pub fn pause(&mut self) -> Result<ContinuationId, Interrupt> {
        if self.terminal.is_some() {
            return Err(self.misuse("pause() after the dispatch terminated"));
        }
        if self.handed_off() {
            return Err(self.misuse("pause() after next() in the same stage"));
        }
        let (Some(suspension), Some(id)) = (self.suspension.as_ref(), self.continuation_id) else {
            error!(
                request_id = %self.request.request_id,
                route = %self.route_match.route.path(),
                "pause() called on a route that is not pausable"
            );
            return Err(anyhow::anyhow!(
                "pause() requires a route declared pausable ({})",
                self.route_match.route.path()
            )
            .into());
        };

        let response = std::mem::take(&mut self.response);
        info!(
            request_id = %self.request.request_id,
            continuation_id = %id,
            route = %self.route_match.route.path(),
            "Continuation paused"
        );

        match suspension.suspend(id, response) {
            Some(request) => {
                info!(
                    request_id = %request.request_id,
                    continuation_id = %id,
                    "Continuation resumed"
                );
                self.request = request;
                self.response = Response::new();
                self.continuation_id = Some(ContinuationId::new());
                self.pauses += 1;
                Ok(id)
            }
            None => {
                info!(continuation_id = %id, "Continuation cancelled while paused");
                self.terminal = Some(Terminal::Cancelled);
                Err(Interrupt::Cancelled)
            }
        }
    }

    fn misuse(&self, what: &str) -> Interrupt {
        error!(
            request_id = %self.request.request_id,
            route = %self.route_match.route.path(),
            stage = ?self.stage_kind(),
            misuse = what,
            "Control-flow misuse"
        );
        Interrupt::Terminated
    }

    // ---------------------------------------------------------------------
    // Engine internals
    // ---------------------------------------------------------------------

    pub(crate) fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub(crate) fn enter_stage(&mut self, index: usize, kind: StageKind) {
        self.frames.push(Frame {
            index,
            kind,
            continued: None,
        });
    }

    /// Pop the current frame, returning what `next()` recorded for it.
    pub(crate) fn leave_stage(&mut self) -> Option<End> {
        self.frames.pop().and_then(|f| f.continued)
    }

    pub(crate) fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    pub(crate) fn latch(&mut self, terminal: Terminal) {
        self.terminal.get_or_insert(terminal);
    }

    /// Drop a terminal latched by a stage that then failed.
    pub(crate) fn unlatch(&mut self) -> Option<Terminal> {
        self.terminal.take()
    }

    /// Switch to a single-stage exception pipeline carrying `err`.
    pub(crate) fn enter_exception_scope(&mut self, handler: Pipeline, err: anyhow::Error) {
        self.pipeline = Arc::new(handler);
        self.exception = Some(err);
    }

    pub(crate) fn take_exception(&mut self) -> Option<anyhow::Error> {
        self.exception.take()
    }

    pub(crate) fn attach_suspension(&mut self, suspension: Suspension) {
        self.suspension = Some(suspension);
        self.continuation_id = Some(ContinuationId::new());
    }

    pub(crate) fn take_response(&mut self) -> Response {
        std::mem::take(&mut self.response)
    }

    pub(crate) fn request_id(&self) -> crate::ids::RequestId {
        self.request.request_id
    }
}
