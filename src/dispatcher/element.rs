use super::context::Context;
use super::error::StageResult;
use std::fmt;
use std::sync::Arc;

/// A unit of work in a dispatch pipeline: a before filter, a handler, an
/// after filter or an exception handler.
///
/// Elements are shared across requests (and across threads), so per-request
/// state belongs in the [`Context`], not in `&self`. Use
/// [`HandlerFactory::fresh`](crate::router::HandlerFactory::fresh) when a
/// handler needs its own instance per dispatch.
pub trait Element: Send + Sync + 'static {
    /// Run this stage against the request context.
    ///
    /// Return `Ok(())` to fall through to the next stage. Errors other than
    /// [`Interrupt::Failed`](super::Interrupt::Failed) are control-flow
    /// signals produced by [`Context`] methods and should be propagated with `?`.
    fn process(&self, ctx: &mut Context) -> StageResult;

    /// Name used in log events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> Element for F
where
    F: Fn(&mut Context) -> StageResult + Send + Sync + 'static,
{
    fn process(&self, ctx: &mut Context) -> StageResult {
        self(ctx)
    }
}

/// Pin a closure's signature so it can be passed where an [`Element`] is expected.
///
/// ```rust,ignore
/// root.get("/", element(|ctx| {
///     ctx.print("hello");
///     Ok(())
/// }));
/// ```
pub fn element<F>(f: F) -> F
where
    F: Fn(&mut Context) -> StageResult + Send + Sync + 'static,
{
    f
}

/// Position of a stage within its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Before,
    Handler,
    After,
    Exception,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Before => "before",
            StageKind::Handler => "handler",
            StageKind::After => "after",
            StageKind::Exception => "exception",
        })
    }
}

#[derive(Clone)]
pub(crate) struct Stage {
    pub(crate) kind: StageKind,
    pub(crate) element: Arc<dyn Element>,
}

/// The ordered stages a single dispatch walks through.
#[derive(Clone)]
pub(crate) struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    /// Before filters, the handler, then after filters.
    pub(crate) fn assemble(
        before: &[Arc<dyn Element>],
        handler: Arc<dyn Element>,
        after: &[Arc<dyn Element>],
    ) -> Self {
        let mut stages = Vec::with_capacity(before.len() + after.len() + 1);
        stages.extend(before.iter().map(|e| Stage {
            kind: StageKind::Before,
            element: Arc::clone(e),
        }));
        stages.push(Stage {
            kind: StageKind::Handler,
            element: handler,
        });
        stages.extend(after.iter().map(|e| Stage {
            kind: StageKind::After,
            element: Arc::clone(e),
        }));
        Self { stages }
    }

    /// A pipeline holding only an exception handler.
    pub(crate) fn exception(handler: Arc<dyn Element>) -> Self {
        Self {
            stages: vec![Stage {
                kind: StageKind::Exception,
                element: handler,
            }],
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.stages.len()
    }

    pub(crate) fn stage(&self, index: usize) -> Option<&Stage> {
        self.stages.get(index)
    }
}
