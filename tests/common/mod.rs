#![allow(dead_code)]

pub mod test_tracing {
    use std::fmt::Write as _;
    use std::sync::{Arc, Mutex};
    use tracing::field::{Field, Visit};
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::{Layer, Registry};

    /// One captured event: level, message and rendered fields.
    #[derive(Debug, Clone)]
    pub struct Captured {
        pub level: Level,
        pub message: String,
        pub fields: String,
    }

    #[derive(Clone, Default)]
    struct CaptureLayer {
        events: Arc<Mutex<Vec<Captured>>>,
    }

    struct Visitor<'a> {
        message: &'a mut String,
        fields: &'a mut String,
    }

    impl Visit for Visitor<'_> {
        fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
            if field.name() == "message" {
                let _ = write!(self.message, "{value:?}");
            } else {
                let _ = write!(self.fields, "{}={:?} ", field.name(), value);
            }
        }
    }

    impl<S: Subscriber> Layer<S> for CaptureLayer {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut message = String::new();
            let mut fields = String::new();
            event.record(&mut Visitor {
                message: &mut message,
                fields: &mut fields,
            });
            self.events.lock().unwrap().push(Captured {
                level: *event.metadata().level(),
                message,
                fields,
            });
        }
    }

    /// Thread-local subscriber that records every event emitted on the
    /// test thread while the guard is alive.
    pub struct TestTracing {
        events: Arc<Mutex<Vec<Captured>>>,
        _guard: tracing::subscriber::DefaultGuard,
    }

    impl TestTracing {
        pub fn init() -> Self {
            let layer = CaptureLayer::default();
            let events = Arc::clone(&layer.events);
            let subscriber = Registry::default().with(layer);
            let guard = tracing::subscriber::set_default(subscriber);
            Self {
                events,
                _guard: guard,
            }
        }

        pub fn events(&self) -> Vec<Captured> {
            self.events.lock().unwrap().clone()
        }

        /// Events at `level` whose message contains `needle`.
        pub fn count(&self, level: Level, needle: &str) -> usize {
            self.events()
                .iter()
                .filter(|e| e.level == level && e.message.contains(needle))
                .count()
        }
    }
}

pub mod runtime {
    use std::sync::Once;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_workers(4);
        });
    }
}

pub mod http_helpers {
    use brrtengine::dispatcher::Response;
    use brrtengine::{ContinuationId, Outcome};

    /// Body of a handled outcome; panics on anything else.
    pub fn handled_body(outcome: &Outcome) -> String {
        match outcome {
            Outcome::Handled(response) => response.body_text(),
            other => panic!("expected Handled, got {other:?}"),
        }
    }

    /// Id and body of a paused outcome; panics on anything else.
    pub fn paused(outcome: Outcome) -> (ContinuationId, Response) {
        match outcome {
            Outcome::Paused { id, response } => (id, response),
            other => panic!("expected Paused, got {other:?}"),
        }
    }
}
