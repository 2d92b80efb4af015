use http::StatusCode;
use std::fmt;

/// Why a resume request could not be delivered to a paused handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeError {
    /// No continuation with this id was ever issued (or it was pruned)
    Unknown,
    /// The continuation idled past its budget and was evicted
    Expired,
    /// The continuation was already resumed; its id is spent
    Answered,
    /// The resume came from a different session than the one that paused
    NotOwner,
    /// The worker behind the continuation is gone
    WorkerLost,
}

impl ResumeError {
    /// Status a transport should answer with.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ResumeError::Unknown => StatusCode::NOT_FOUND,
            ResumeError::Expired | ResumeError::WorkerLost => StatusCode::GONE,
            ResumeError::Answered => StatusCode::CONFLICT,
            ResumeError::NotOwner => StatusCode::FORBIDDEN,
        }
    }
}

impl fmt::Display for ResumeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResumeError::Unknown => "unknown continuation",
            ResumeError::Expired => "continuation expired",
            ResumeError::Answered => "continuation already resumed",
            ResumeError::NotOwner => "continuation belongs to another session",
            ResumeError::WorkerLost => "continuation worker is no longer running",
        })
    }
}

impl std::error::Error for ResumeError {}
