use std::fmt;

/// Result of running one pipeline stage.
pub type StageResult = Result<(), Interrupt>;

/// Why a stage stopped early.
///
/// Most variants are produced by [`Context`](super::Context) control calls
/// and only need to be propagated with `?`. Any error type convertible into
/// [`anyhow::Error`] converts into [`Interrupt::Failed`], so fallible code
/// inside a stage can use `?` directly.
///
/// `Interrupt` deliberately does not implement `std::error::Error`; that is
/// what makes the blanket `From` conversion possible.
#[derive(Debug)]
pub enum Interrupt {
    /// `next()` already ran the rest of the pipeline; unwind this stage
    Next,
    /// `respond()` ended the dispatch
    Respond,
    /// `redirect()` ended the dispatch with a redirect to this location
    Redirect(String),
    /// `defer()` handed the request back to the transport
    Defer,
    /// The continuation this stage was paused in was cancelled
    Cancelled,
    /// A control call was made after the dispatch had already ended
    Terminated,
    /// The stage failed
    Failed(anyhow::Error),
}

impl Interrupt {
    /// Is this a failure rather than a control-flow signal?
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Interrupt::Failed(_))
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Next => f.write_str("pipeline continued by next()"),
            Interrupt::Respond => f.write_str("response committed"),
            Interrupt::Redirect(to) => write!(f, "redirected to {to}"),
            Interrupt::Defer => f.write_str("deferred to transport"),
            Interrupt::Cancelled => f.write_str("continuation cancelled"),
            Interrupt::Terminated => f.write_str("dispatch already terminated"),
            Interrupt::Failed(err) => write!(f, "stage failed: {err:#}"),
        }
    }
}

impl<E> From<E> for Interrupt
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Interrupt::Failed(err.into())
    }
}

/// How a pipeline run (or its remainder after `next()`) ended.
#[derive(Debug)]
pub(crate) enum End {
    Completed,
    Responded,
    Redirected(String),
    Deferred,
    Cancelled,
    Failed(anyhow::Error),
}

/// Terminal state latched on the context so nothing runs after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Terminal {
    Responded,
    Redirected(String),
    Deferred,
    Cancelled,
}

impl From<Terminal> for End {
    fn from(t: Terminal) -> Self {
        match t {
            Terminal::Responded => End::Responded,
            Terminal::Redirected(to) => End::Redirected(to),
            Terminal::Deferred => End::Deferred,
            Terminal::Cancelled => End::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<u32, Interrupt> {
        Ok(s.parse::<u32>()?)
    }

    #[test]
    fn test_question_mark_converts_errors_to_failed() {
        assert_eq!(parse("7").ok(), Some(7));
        let err = parse("x").unwrap_err();
        assert!(err.is_failure());
        assert!(err.to_string().starts_with("stage failed"));
    }

    #[test]
    fn test_anyhow_errors_convert() {
        let result: StageResult = Err(anyhow::anyhow!("boom").into());
        assert!(matches!(result, Err(Interrupt::Failed(e)) if e.to_string() == "boom"));
    }
}
