//! Coroutine workers for pausable routes.
//!
//! A pausable route's whole pipeline runs on its own `may` coroutine. The
//! request thread and the worker talk over two channels:
//!
//! - events (worker → request side): `Paused` with the output so far, or
//!   `Finished` with the final outcome
//! - commands (request side → worker): `Resume` with the next request, or
//!   `Cancel`
//!
//! Whoever resumes a worker blocks on its event channel until the worker
//! pauses again or finishes, so a response is never returned before the
//! worker has produced it.

use crate::dispatcher::core::execute;
use crate::dispatcher::{Context, Outcome, Request, Response};
use crate::ids::ContinuationId;
use may::coroutine;
use may::sync::mpsc;
use tracing::debug;

pub(crate) enum WorkerEvent {
    Paused {
        id: ContinuationId,
        response: Response,
    },
    Finished(Outcome),
}

pub(crate) enum WorkerCommand {
    Resume(Request),
    Cancel,
}

/// Worker-side half of the handshake, held by the [`Context`].
pub(crate) struct Suspension {
    events: mpsc::Sender<WorkerEvent>,
    commands: mpsc::Receiver<WorkerCommand>,
}

impl Suspension {
    /// Publish the output so far and block until resumed.
    ///
    /// Returns `None` on cancellation, including when the handle was dropped.
    pub(crate) fn suspend(&self, id: ContinuationId, response: Response) -> Option<Request> {
        if self
            .events
            .send(WorkerEvent::Paused { id, response })
            .is_err()
        {
            return None;
        }
        match self.commands.recv() {
            Ok(WorkerCommand::Resume(request)) => Some(request),
            Ok(WorkerCommand::Cancel) | Err(_) => None,
        }
    }
}

/// Request-side half of the handshake.
pub(crate) struct WorkerHandle {
    commands: mpsc::Sender<WorkerCommand>,
    events: mpsc::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Block until the worker pauses or finishes. `None` if it died.
    pub(crate) fn next_event(&self) -> Option<WorkerEvent> {
        self.events.recv().ok()
    }

    /// Wake the worker with a new request.
    pub(crate) fn resume(&self, request: Request) -> bool {
        self.commands.send(WorkerCommand::Resume(request)).is_ok()
    }

    /// Release a blocked worker so it can unwind and exit.
    pub(crate) fn cancel(&self) {
        if self.commands.send(WorkerCommand::Cancel).is_err() {
            debug!("Continuation worker already gone at cancel");
        }
    }
}

/// Start `ctx`'s pipeline on a new coroutine.
pub(crate) fn spawn(mut ctx: Context, stack_size: usize) -> std::io::Result<WorkerHandle> {
    let (event_tx, event_rx) = mpsc::channel();
    let (command_tx, command_rx) = mpsc::channel();
    ctx.attach_suspension(Suspension {
        events: event_tx.clone(),
        commands: command_rx,
    });
    let name = format!("continuation {}", ctx.route().path());

    // SAFETY: may::coroutine::Builder::spawn() is marked unsafe by the may runtime.
    // The closure owns everything it touches (the Context and a channel sender),
    // and stage panics are caught inside `execute`, so nothing unwinds out of
    // the coroutine.
    #[allow(unsafe_code)]
    let spawned = unsafe {
        coroutine::Builder::new()
            .name(name)
            .stack_size(stack_size)
            .spawn(move || {
                // W1: Worker start
                debug!(stack_size = stack_size, "Continuation worker start");
                let outcome = execute(ctx);
                if event_tx.send(WorkerEvent::Finished(outcome)).is_err() {
                    // W2: Nobody waiting, the continuation was cancelled
                    debug!("Continuation worker finished with no waiter");
                }
            })
    };

    spawned.map(|_| WorkerHandle {
        commands: command_tx,
        events: event_rx,
    })
}
