//! Pause/resume through the gate
//!
//! # Test Coverage
//!
//! - Output split across a pause, local state preserved across pauses
//! - Fresh continuation id per pause, cookie attached to paused responses
//! - Unknown, expired, replayed and concurrent resumes
//! - Session ownership
//! - Purge, stats and shutdown cancellation

mod common;

use brrtengine::continuation::ContinuationStatus;
use brrtengine::dispatcher::{element, Context, Element, Interrupt, StageResult};
use brrtengine::router::{HandlerFactory, PathInfo, RouterBuilder};
use brrtengine::{ContinuationId, EngineConfig, Gate, Outcome, Request, ResumeError};
use common::http_helpers::{handled_body, paused};
use common::runtime::setup_may_runtime;
use http::{Method, StatusCode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn quiet_config() -> EngineConfig {
    EngineConfig {
        purge_frequency: 0,
        ..EngineConfig::default()
    }
}

fn gate_with(config: EngineConfig, setup: impl FnOnce(&mut RouterBuilder)) -> Gate {
    setup_may_runtime();
    Gate::setup(config, setup).unwrap()
}

fn simple(r: &mut RouterBuilder) {
    r.get("/simple", element(|ctx| {
        ctx.print("before simple pause");
        ctx.pause()?;
        ctx.print("after simple pause");
        Ok(())
    }))
    .pausable();
}

fn resume_req(path: &str, id: ContinuationId) -> Request {
    Request::get(&format!("{path}?contId={id}"))
}

fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn test_simple_pause_splits_output() {
    let gate = gate_with(quiet_config(), simple);

    let (id, response) = paused(gate.handle(Request::get("/simple")));
    assert_eq!(response.body_text(), "before simple pause");
    assert_eq!(response.status(), StatusCode::OK);

    let outcome = gate.handle(resume_req("/simple", id));
    assert_eq!(handled_body(&outcome), "after simple pause");
}

#[test]
fn test_paused_response_carries_continuation_cookie() {
    let gate = gate_with(quiet_config(), simple);
    let (id, response) = paused(gate.handle(Request::get("/simple")));

    let cookie = response.cookie("continuationId").unwrap();
    assert_eq!(cookie.value, id.to_string());
    assert_eq!(cookie.path.as_deref(), Some("/"));
    assert_eq!(cookie.max_age, Some(1200));
}

#[test]
fn test_continuation_id_is_known_before_pausing() {
    let gate = gate_with(quiet_config(), |r| {
        r.get("/id", element(|ctx| {
            let announced = ctx.continuation_id();
            if let Some(id) = announced {
                ctx.print(id);
            }
            let resumed_as = ctx.pause()?;
            ctx.print(format_args!("{}", Some(resumed_as) == announced));
            Ok(())
        }))
        .pausable();
    });

    let (id, response) = paused(gate.handle(Request::get("/id")));
    assert_eq!(response.body_text(), id.to_string());
    assert_eq!(handled_body(&gate.handle(resume_req("/id", id))), "true");
}

struct Wizard;

impl Element for Wizard {
    fn process(&self, ctx: &mut Context) -> StageResult {
        let mut answers: Vec<String> = Vec::new();
        for question in ["name?", "quest?", "colour?"] {
            ctx.print(question);
            ctx.pause()?;
            answers.push(ctx.param("a").unwrap_or("").to_string());
        }
        ctx.print(format_args!(
            "{} after {} pauses",
            answers.join(","),
            ctx.resume_count()
        ));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "Wizard"
    }
}

#[test]
fn test_local_state_survives_several_pauses() {
    let gate = gate_with(quiet_config(), |r| {
        r.on(Method::GET, "/wizard", PathInfo::None, HandlerFactory::fresh(|| Wizard))
            .pausable();
    });

    let (id1, r1) = paused(gate.handle(Request::get("/wizard")));
    assert_eq!(r1.body_text(), "name?");

    let (id2, r2) = paused(gate.handle(Request::get(&format!("/wizard?contId={id1}&a=arthur"))));
    assert_eq!(r2.body_text(), "quest?");
    assert_ne!(id1, id2, "every pause issues a new id");

    let (id3, r3) = paused(gate.handle(Request::get(&format!("/wizard?contId={id2}&a=grail"))));
    assert_eq!(r3.body_text(), "colour?");

    let done = gate.handle(Request::get(&format!("/wizard?contId={id3}&a=blue")));
    assert_eq!(handled_body(&done), "arthur,grail,blue after 3 pauses");

    assert_eq!(
        gate.continuations().status(id1),
        Some(ContinuationStatus::Answered)
    );
}

#[test]
fn test_independent_executions_do_not_share_state() {
    let gate = gate_with(quiet_config(), |r| {
        r.on(Method::GET, "/wizard", PathInfo::None, HandlerFactory::fresh(|| Wizard))
            .pausable();
    });
    let (a, _) = paused(gate.handle(Request::get("/wizard")));
    let (b, _) = paused(gate.handle(Request::get("/wizard")));
    assert_ne!(a, b);

    let (_, rb) = paused(gate.handle(Request::get(&format!("/wizard?contId={b}&a=bob"))));
    let (_, ra) = paused(gate.handle(Request::get(&format!("/wizard?contId={a}&a=alice"))));
    assert_eq!(rb.body_text(), "quest?");
    assert_eq!(ra.body_text(), "quest?");
    assert_eq!(gate.stats().active, 2);
}

#[test]
fn test_unknown_id_is_unresolvable() {
    let gate = gate_with(quiet_config(), simple);
    let outcome = gate.handle(resume_req("/simple", ContinuationId::new()));
    assert!(matches!(outcome, Outcome::Unresolvable(ResumeError::Unknown)));
    assert_eq!(outcome.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_replayed_resume_is_rejected() {
    let gate = gate_with(quiet_config(), simple);
    let (id, _) = paused(gate.handle(Request::get("/simple")));

    assert_eq!(
        handled_body(&gate.handle(resume_req("/simple", id))),
        "after simple pause"
    );
    let replay = gate.handle(resume_req("/simple", id));
    assert!(matches!(replay, Outcome::Unresolvable(ResumeError::Answered)));
    assert_eq!(replay.status(), StatusCode::CONFLICT);
}

#[test]
fn test_concurrent_resumes_deliver_exactly_one() {
    let gate = gate_with(quiet_config(), simple);
    let (id, _) = paused(gate.handle(Request::get("/simple")));

    let outcomes: Vec<Outcome> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| gate.handle(resume_req("/simple", id))))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let handled: Vec<_> = outcomes
        .iter()
        .filter(|o| matches!(o, Outcome::Handled(_)))
        .collect();
    assert_eq!(handled.len(), 1);
    assert_eq!(handled[0].body_text(), "after simple pause");
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::Unresolvable(ResumeError::Answered)))
            .count(),
        3
    );
}

#[test]
fn test_idle_continuation_expires() {
    let config = EngineConfig {
        continuation_duration_ms: 50,
        ..quiet_config()
    };
    let gate = gate_with(config, simple);
    let (id, _) = paused(gate.handle(Request::get("/simple")));

    std::thread::sleep(Duration::from_millis(120));
    let outcome = gate.handle(resume_req("/simple", id));
    assert!(matches!(outcome, Outcome::Unresolvable(ResumeError::Expired)));
    assert_eq!(outcome.status(), StatusCode::GONE);

    // Still reported as expired, never resumed late
    let again = gate.handle(resume_req("/simple", id));
    assert!(matches!(again, Outcome::Unresolvable(ResumeError::Expired)));
    assert_eq!(gate.stats().evicted_total, 1);
}

#[test]
fn test_purge_evicts_then_forgets() {
    let config = EngineConfig {
        continuation_duration_ms: 50,
        ..quiet_config()
    };
    let gate = gate_with(config, simple);
    let (id, _) = paused(gate.handle(Request::get("/simple")));
    assert_eq!(gate.continuations().purge(), 0);
    assert_eq!(
        gate.continuations().status(id),
        Some(ContinuationStatus::Active)
    );

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(gate.continuations().purge(), 1);
    assert_eq!(
        gate.continuations().status(id),
        Some(ContinuationStatus::Expired)
    );

    std::thread::sleep(Duration::from_millis(80));
    assert_eq!(gate.continuations().purge(), 0);
    assert_eq!(gate.continuations().status(id), None);
    assert!(matches!(
        gate.handle(resume_req("/simple", id)),
        Outcome::Unresolvable(ResumeError::Unknown)
    ));
}

#[test]
fn test_reaper_evicts_in_background() {
    let config = EngineConfig {
        continuation_duration_ms: 30,
        reaper_interval_ms: Some(10),
        ..quiet_config()
    };
    let gate = gate_with(config, simple);
    let (id, _) = paused(gate.handle(Request::get("/simple")));
    assert!(wait_until(|| gate.continuations().status(id)
        != Some(ContinuationStatus::Active)));
}

#[test]
fn test_resume_requires_owning_session() {
    let gate = gate_with(quiet_config(), simple);
    let (id, _) = paused(gate.handle(Request::get("/simple").with_cookie("session", "alice")));

    let stranger = gate.handle(resume_req("/simple", id).with_cookie("session", "mallory"));
    assert!(matches!(stranger, Outcome::Unresolvable(ResumeError::NotOwner)));
    let anonymous = gate.handle(resume_req("/simple", id));
    assert!(matches!(anonymous, Outcome::Unresolvable(ResumeError::NotOwner)));

    // A rejected resume does not spend the id
    let owner = gate.handle(resume_req("/simple", id).with_cookie("session", "alice"));
    assert_eq!(handled_body(&owner), "after simple pause");
}

#[test]
fn test_shutdown_cancels_paused_handlers() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let gate = gate_with(quiet_config(), move |r| {
        r.get("/wait", element(move |ctx| {
            ctx.print("waiting");
            match ctx.pause() {
                Err(Interrupt::Cancelled) => {
                    flag.store(true, Ordering::SeqCst);
                    Err(Interrupt::Cancelled)
                }
                Err(other) => Err(other),
                Ok(_) => Ok(()),
            }
        }))
        .pausable();
    });

    let (id, _) = paused(gate.handle(Request::get("/wait")));
    gate.shutdown();
    assert!(gate.continuations().is_shut_down());
    assert!(wait_until(|| cancelled.load(Ordering::SeqCst)));
    assert_eq!(
        gate.continuations().status(id),
        Some(ContinuationStatus::Expired)
    );
    assert!(matches!(
        gate.handle(resume_req("/wait", id)),
        Outcome::Unresolvable(ResumeError::Expired)
    ));
}

#[test]
fn test_pause_after_next_is_refused() {
    let refused = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&refused);
    let gate = gate_with(quiet_config(), move |r| {
        r.before(element(move |ctx| {
            let _ = ctx.next();
            if matches!(ctx.pause(), Err(Interrupt::Terminated)) {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(())
        }));
        r.get("/flow", element(|ctx| {
            ctx.print("handler-done");
            Ok(())
        }))
        .pausable();
    });

    let outcome = gate.handle(Request::get("/flow"));
    assert_eq!(handled_body(&outcome), "handler-done");
    assert!(refused.load(Ordering::SeqCst));
    let stats = gate.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.paused_total, 0);
}

#[test]
fn test_pause_after_shutdown_is_cancelled_on_park() {
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    let gate = gate_with(quiet_config(), move |r| {
        r.get("/late", element(move |ctx| {
            ctx.print("late");
            if matches!(ctx.pause(), Err(Interrupt::Cancelled)) {
                flag.store(true, Ordering::SeqCst);
            }
            Ok(())
        }))
        .pausable();
    });

    gate.shutdown();
    let (id, response) = paused(gate.handle(Request::get("/late")));
    assert_eq!(response.body_text(), "late");
    assert!(wait_until(|| cancelled.load(Ordering::SeqCst)));
    assert_eq!(
        gate.continuations().status(id),
        Some(ContinuationStatus::Expired)
    );
    assert_eq!(gate.stats().active, 0);
    assert!(matches!(
        gate.handle(resume_req("/late", id)),
        Outcome::Unresolvable(ResumeError::Expired)
    ));
}

#[test]
fn test_failure_after_resume_reaches_exception_handler() {
    let gate = gate_with(quiet_config(), |r| {
        r.exception(element(|ctx| {
            let msg = ctx.exception().map(|e| e.to_string()).unwrap_or_default();
            ctx.print(format_args!("recovered: {msg}"));
            Ok(())
        }));
        r.get("/checkout", element(|ctx| {
            ctx.print("confirm?");
            ctx.pause()?;
            if ctx.param("ok") != Some("yes") {
                return Err(anyhow::anyhow!("not confirmed").into());
            }
            ctx.print("ordered");
            Ok(())
        }))
        .pausable();
    });

    let (id, _) = paused(gate.handle(Request::get("/checkout")));
    let outcome = gate.handle(Request::get(&format!("/checkout?contId={id}&ok=no")));
    assert_eq!(handled_body(&outcome), "recovered: not confirmed");
}

#[test]
fn test_filters_around_a_paused_handler() {
    let gate = gate_with(quiet_config(), |r| {
        r.before(element(|ctx| {
            ctx.print("[before]");
            Ok(())
        }));
        r.after(element(|ctx| {
            ctx.print("[after]");
            Ok(())
        }));
        simple(r);
    });

    let (id, response) = paused(gate.handle(Request::get("/simple")));
    assert_eq!(response.body_text(), "[before]before simple pause");
    assert_eq!(
        handled_body(&gate.handle(resume_req("/simple", id))),
        "after simple pause[after]"
    );
}

#[test]
fn test_stats_track_lifecycle() {
    let gate = gate_with(quiet_config(), simple);
    let (id, _) = paused(gate.handle(Request::get("/simple")));
    let stats = gate.stats();
    assert_eq!(stats.active, 1);
    assert_eq!(stats.paused_total, 1);

    let _ = gate.handle(resume_req("/simple", id));
    let stats = gate.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.answered, 1);
    assert_eq!(stats.resumed_total, 1);
}
