//! # brrtengine
//!
//! **brrtengine** is a coroutine-powered request-dispatch engine: scoped
//! router trees, filter pipelines with `next()`/`respond()` control flow,
//! per-scope exception recovery, and handlers that can pause mid-execution
//! and be resumed by a later request.
//!
//! ## Overview
//!
//! A site is declared once at startup and frozen. Each request is resolved
//! to the first matching route and run through a pipeline of stages: the
//! before filters of every enclosing router, the route's handler, then the
//! after filters. Stages steer the pipeline through the [`Context`]:
//! skipping ahead with `next()`, ending early with `respond()`, or (on a
//! pausable route) suspending with `pause()`.
//!
//! ## Architecture
//!
//! - **[`router`]** - Router trees, groups, filters, path-info templates, route resolution
//! - **[`dispatcher`]** - Stage pipeline, [`Context`], control flow, exception recovery
//! - **[`continuation`]** - Paused handler workers and the continuation table
//! - **[`gate`]** - Transport-facing entry point: path cleanup, resume routing
//! - **[`runtime_config`]** - Engine configuration from defaults, env or file
//! - **[`logging`]** - `tracing` subscriber setup
//! - **[`ids`]** - Request and continuation identifiers
//!
//! ### Pause and Resume
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Gate
//!     participant Manager as ContinuationManager
//!     participant Worker as Worker coroutine
//!
//!     Client->>Gate: GET /guess
//!     Gate->>Worker: spawn pipeline (pausable route)
//!     Worker->>Worker: before filters, handler runs
//!     Worker->>Worker: ctx.print("pick a number")
//!     Worker-->>Gate: Paused(id, response)
//!     Note over Worker: blocked inside pause()
//!     Gate->>Manager: park(id, worker)
//!     Gate-->>Client: 200 + Set-Cookie continuationId=id
//!
//!     Client->>Gate: GET /guess?contId=id&n=7
//!     Gate->>Manager: resume(id, request)
//!     Manager->>Manager: mark id answered (under lock)
//!     Manager->>Worker: Resume(request)
//!     Worker->>Worker: pause() returns, handler continues
//!     Worker->>Worker: after filters run
//!     Worker-->>Manager: Finished(outcome)
//!     Manager-->>Gate: outcome
//!     Gate-->>Client: 200 "you guessed 7"
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use brrtengine::dispatcher::element;
//! use brrtengine::{EngineConfig, Gate, Request};
//!
//! let gate = Gate::setup(EngineConfig::default(), |root| {
//!     root.before(element(|ctx| {
//!         ctx.set_header("x-powered-by", "brrtengine");
//!         Ok(())
//!     }));
//!     root.get("/hello", element(|ctx| {
//!         ctx.print("hello");
//!         Ok(())
//!     }));
//!     root.get("/counter", element(|ctx| {
//!         for n in 0.. {
//!             ctx.print(n);
//!             ctx.pause()?;
//!         }
//!         Ok(())
//!     }))
//!     .pausable();
//! })?;
//!
//! let outcome = gate.handle(Request::get("/hello"));
//! assert_eq!(outcome.body_text(), "hello");
//! ```

pub mod continuation;
pub mod dispatcher;
pub mod gate;
pub mod ids;
pub mod logging;
pub mod router;
pub mod runtime_config;

pub use continuation::{ContinuationManager, ResumeError};
pub use dispatcher::{element, Context, Element, Interrupt, Outcome, Request, Response, StageResult};
pub use gate::Gate;
pub use ids::{ContinuationId, RequestId};
pub use router::{PathInfo, RouterBuilder, SetupError, Site};
pub use runtime_config::EngineConfig;
