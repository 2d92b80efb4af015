use super::response::Response;
use crate::continuation::ResumeError;
use crate::ids::ContinuationId;
use http::StatusCode;

/// Result of handing one request to the engine.
#[derive(Debug)]
pub enum Outcome {
    /// The pipeline ran to completion, responded or redirected
    Handled(Response),
    /// A pausable handler paused; `response` is the output up to the pause
    Paused {
        id: ContinuationId,
        response: Response,
    },
    /// No route matches the request
    NotFound,
    /// A stage deferred the request to the transport
    Deferred,
    /// A stage failed and no exception handler recovered it
    Fault {
        /// Status 500 with the output produced before the failure
        response: Response,
        error: anyhow::Error,
    },
    /// A resume named a continuation that cannot be resumed
    Unresolvable(ResumeError),
}

impl Outcome {
    /// The response, for outcomes that carry one
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Outcome::Handled(response)
            | Outcome::Paused { response, .. }
            | Outcome::Fault { response, .. } => Some(response),
            Outcome::NotFound | Outcome::Deferred | Outcome::Unresolvable(_) => None,
        }
    }

    /// Body text of the carried response, or empty
    #[must_use]
    pub fn body_text(&self) -> String {
        self.response().map(Response::body_text).unwrap_or_default()
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Outcome::Handled(r) | Outcome::Paused { response: r, .. } | Outcome::Fault { response: r, .. } => {
                r.status()
            }
            Outcome::NotFound | Outcome::Deferred => StatusCode::NOT_FOUND,
            Outcome::Unresolvable(err) => err.status(),
        }
    }

    /// Continuation id handed out by a pause
    #[must_use]
    pub fn continuation_id(&self) -> Option<ContinuationId> {
        match self {
            Outcome::Paused { id, .. } => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        matches!(self, Outcome::Paused { .. })
    }

    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Outcome::Fault { .. })
    }

    /// Render any outcome as a response.
    ///
    /// Outcomes without a body of their own get a short plain-text one.
    #[must_use]
    pub fn into_response(self) -> Response {
        match self {
            Outcome::Handled(r) | Outcome::Paused { response: r, .. } | Outcome::Fault { response: r, .. } => r,
            Outcome::NotFound | Outcome::Deferred => {
                let mut r = Response::with_status(StatusCode::NOT_FOUND);
                r.set_content_type("text/plain");
                r.print("Not Found");
                r
            }
            Outcome::Unresolvable(err) => {
                let mut r = Response::with_status(err.status());
                r.set_content_type("text/plain");
                r.print(&err);
                r
            }
        }
    }
}
