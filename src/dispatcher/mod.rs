//! # Dispatcher Module
//!
//! Runs a resolved request through its pipeline of stages.
//!
//! ## Overview
//!
//! For a matched route the pipeline is, in order:
//!
//! 1. the effective before filters of the route's router (outermost router first)
//! 2. the route's handler
//! 3. the effective after filters (innermost router first)
//!
//! Every stage is an [`Element`] receiving the shared [`Context`]. A stage
//! that returns `Ok(())` falls through to the next one. Control calls on the
//! context change that:
//!
//! - `ctx.next()?` runs every later stage immediately and then unwinds the
//!   caller, so code after the call never runs
//! - `ctx.respond()?` ends the dispatch; no later stage runs
//! - `ctx.redirect(..)?` / `ctx.defer()?` end it with a redirect, or hand
//!   the request back to the transport
//! - `ctx.pause()?` suspends a pausable handler until it is resumed
//!
//! ## Error Handling
//!
//! A stage error (`Err(Interrupt::Failed)`, or any error converted through
//! `?`) and a stage panic both end the pipeline. The nearest exception handler
//! in the route's router ancestry then runs once with
//! [`Context::exception`] set. Without one, the result is
//! [`Outcome::Fault`]: status 500 with the output produced so far.
//!
//! ## Threading
//!
//! Non-pausable routes run synchronously on the calling thread. Pausable
//! routes run on a `may` coroutine; see [`crate::continuation`].

mod context;
pub(crate) mod core;
mod element;
mod error;
mod outcome;
mod request;
mod response;

pub use context::Context;
pub use core::Dispatcher;
pub use element::{element, Element, StageKind};
pub use error::{Interrupt, StageResult};
pub use outcome::Outcome;
pub use request::{parse_cookies, parse_query_params, HeaderVec, Request, MAX_INLINE_HEADERS};
pub use response::{Cookie, Response};
