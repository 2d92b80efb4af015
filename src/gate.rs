//! Entry point between a transport and the engine.
//!
//! The [`Gate`] owns the frozen site and the dispatcher. For every inbound
//! request it:
//!
//! 1. cleans the path (empty becomes `/`, a `;...` matrix suffix is dropped)
//! 2. routes an explicit resume (`?contId=<id>`) to the continuation manager
//! 3. resumes through the continuation cookie when it names a live
//!    continuation created on the route this request resolves to
//! 4. otherwise resolves and dispatches the request fresh

use crate::continuation::{ContinuationManager, ContinuationStats, ResumeError};
use crate::dispatcher::{Dispatcher, Outcome, Request};
use crate::ids::ContinuationId;
use crate::router::{RouterBuilder, SetupError, Site};
use crate::runtime_config::EngineConfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Request entry point for a built site.
pub struct Gate {
    dispatcher: Dispatcher,
}

impl Gate {
    /// Wrap a built site. Starts the continuation reaper when configured.
    #[must_use]
    pub fn new(site: Site, config: EngineConfig) -> Self {
        let reaper_interval = config.reaper_interval();
        let dispatcher = Dispatcher::new(site, config);
        if let Some(interval) = reaper_interval {
            if let Err(e) = dispatcher.continuations().start_reaper(interval) {
                warn!(error = %e, "Failed to start continuation reaper; relying on lazy purge");
            }
        }
        info!(
            routes_count = dispatcher.site().routes().len(),
            "Gate ready"
        );
        Self { dispatcher }
    }

    /// Declare a site with `setup` and wrap it.
    pub fn setup<F>(config: EngineConfig, setup: F) -> Result<Self, SetupError>
    where
        F: FnOnce(&mut RouterBuilder),
    {
        let mut root = RouterBuilder::new();
        setup(&mut root);
        Ok(Self::new(root.build()?, config))
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn site(&self) -> &Arc<Site> {
        self.dispatcher.site()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        self.dispatcher.config()
    }

    #[must_use]
    pub fn continuations(&self) -> &Arc<ContinuationManager> {
        self.dispatcher.continuations()
    }

    #[must_use]
    pub fn stats(&self) -> ContinuationStats {
        self.continuations().stats()
    }

    /// Handle one request.
    #[must_use]
    pub fn handle(&self, mut request: Request) -> Outcome {
        request.path = clean_path(&request.path);
        let config = self.dispatcher.config();

        if let Some(raw) = request.param(&config.continuation_param) {
            let parsed = raw.parse::<ContinuationId>();
            return match parsed {
                Ok(id) => {
                    debug!(continuation_id = %id, path = %request.path, "Explicit resume");
                    self.dispatcher.resume(id, request)
                }
                Err(_) => {
                    warn!(value = %raw, "Malformed continuation id");
                    Outcome::Unresolvable(ResumeError::Unknown)
                }
            };
        }

        let Some(route_match) = self
            .dispatcher
            .site()
            .resolve(&request.method, &request.path)
        else {
            return Outcome::NotFound;
        };

        let cookie_id = request
            .cookie(&config.continuation_cookie)
            .and_then(|v| v.parse::<ContinuationId>().ok());
        if let Some(id) = cookie_id {
            if self
                .continuations()
                .is_resumable(id, route_match.route.id())
            {
                debug!(continuation_id = %id, path = %request.path, "Cookie resume");
                return self.dispatcher.resume(id, request);
            }
        }

        self.dispatcher.dispatch_match(request, route_match)
    }

    /// Handle an `http::Request` and render the outcome as an `http::Response`.
    #[must_use]
    pub fn handle_http(&self, request: http::Request<Vec<u8>>) -> http::Response<Vec<u8>> {
        self.handle(Request::from_http(request))
            .into_response()
            .into_http()
    }

    /// Cancel every paused continuation and stop the reaper.
    pub fn shutdown(&self) {
        self.continuations().shutdown();
    }
}

impl Drop for Gate {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Empty paths become `/`; a `;` matrix suffix is removed.
#[must_use]
pub fn clean_path(path: &str) -> String {
    let path = path.split_once(';').map_or(path, |(p, _)| p);
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}
