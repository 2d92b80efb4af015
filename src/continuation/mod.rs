//! # Continuation Module
//!
//! Lets a handler stop at `pause()`, send the output it has produced so far,
//! and carry on from the same point when a later request resumes it.
//!
//! ## Mechanism
//!
//! Routes declared `.pausable()` run their pipeline on a dedicated `may`
//! coroutine instead of the request thread. `pause()` hands the accumulated
//! response back to the request thread and blocks the coroutine on a command
//! channel. The [`ContinuationManager`] keeps the blocked worker keyed by a
//! [`ContinuationId`](crate::ids::ContinuationId); a resume looks the worker
//! up, gives it the new request, and waits until it pauses again or finishes.
//!
//! ## Liveness
//!
//! A continuation idle longer than `continuation_duration_ms` is evicted: its
//! worker is woken with a cancellation, `pause()` returns
//! `Err(Interrupt::Cancelled)` and the pipeline unwinds. Eviction runs
//! probabilistically on pause, on an optional reaper thread, and lazily on a
//! resume that finds the entry stale. [`ContinuationManager::shutdown`]
//! cancels every paused worker at once.

mod error;
mod manager;
pub(crate) mod worker;

pub use error::ResumeError;
pub use manager::{ContinuationManager, ContinuationStats, ContinuationStatus};
