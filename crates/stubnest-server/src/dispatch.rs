//! Per-request control flow, shared by every transport backend.
//!
//! A backend parses the wire into a [`ServedRequest`], calls
//! [`ServerCore::dispatch`], and then either writes the returned response or
//! hands the connection to the fault injector when the response carries a
//! fault marker. Everything between those two points lives here, so
//! concrete backends stay substitutable.

use crate::admin;
use crate::config::ServerOptions;
use crate::error::StartError;
use crate::exchange::{MockResponse, ServedRequest};
use crate::notifier::Notifier;
use crate::pipeline::{FilterOutcome, Pipeline, TransformParams};
use crate::router::{route, RouteKind};
use crate::settings::SharedSettings;
use crate::stub::{Journal, JournalEntry, StubStore};
use http::StatusCode;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Backend-independent server state: chains, stubs, journal, settings.
pub struct ServerCore {
    pipeline: Pipeline,
    pub stubs: StubStore,
    pub journal: Journal,
    pub settings: SharedSettings,
    pub notifier: Arc<dyn Notifier>,
    admin_prefix: String,
    request_seq: AtomicU64,
}

impl ServerCore {
    /// Build the core from startup options. Fails (pre-bind) on invalid
    /// configuration, including duplicate extension names.
    pub fn build(options: &ServerOptions, notifier: Arc<dyn Notifier>) -> Result<Self, StartError> {
        options.validate()?;
        let pipeline = Pipeline::build(&options.registrations)?;
        Ok(Self {
            pipeline,
            stubs: StubStore::new(),
            journal: Journal::new(options.journal_capacity),
            settings: SharedSettings::default(),
            notifier,
            admin_prefix: options.admin_prefix.clone(),
            request_seq: AtomicU64::new(1),
        })
    }

    /// Process-unique id for the next accepted request.
    pub fn next_request_id(&self) -> u64 {
        self.request_seq.fetch_add(1, Ordering::Relaxed)
    }

    pub fn admin_prefix(&self) -> &str {
        &self.admin_prefix
    }

    /// Classify and serve one request. The returned response may carry a
    /// fault marker; writing it (or injecting the fault) is the backend's
    /// job.
    pub async fn dispatch(&self, request: ServedRequest) -> MockResponse {
        match route(&request.path, &self.admin_prefix) {
            // Control-plane: untouched by filters, transformers, and faults.
            RouteKind::Admin => admin::handle(self, &request),
            RouteKind::Stub => self.dispatch_stub(request).await,
        }
    }

    async fn dispatch_stub(&self, request: ServedRequest) -> MockResponse {
        let request_id = request.id;
        let original = request.clone();

        let (response, matched_stub, parameters) = match self.pipeline.apply_filters(request) {
            Ok(FilterOutcome::Stopped { response, .. }) => {
                // Short-circuit: stub matching is skipped entirely.
                (response, None, TransformParams::new())
            }
            Ok(FilterOutcome::Pass(filtered)) => match self.stubs.find_match(&filtered) {
                Some(mapping) => {
                    let response = mapping.build_response();
                    let parameters = mapping.transformer_parameters.clone();
                    (response, mapping.id, parameters)
                }
                None => (
                    MockResponse::json(
                        StatusCode::NOT_FOUND,
                        &serde_json::json!({
                            "error": "no stub matched",
                            "method": filtered.method.as_str(),
                            "path": filtered.path,
                        }),
                    ),
                    None,
                    TransformParams::new(),
                ),
            },
            Err(err) => {
                self.notifier.error(&format!(
                    "request {request_id}: extension '{}' failed: {:#}",
                    err.extension, err.source
                ));
                self.journal_request(&original, None, None);
                return MockResponse::json(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &serde_json::json!({"error": "extension failure"}),
                );
            }
        };

        // Transformers see every response, whether filter-stopped or matched.
        let response =
            match self
                .pipeline
                .apply_transformers(response, &original, &parameters)
            {
                Ok(response) => response,
                Err(err) => {
                    self.notifier.error(&format!(
                        "request {request_id}: extension '{}' failed: {:#}",
                        err.extension, err.source
                    ));
                    self.journal_request(&original, None, None);
                    return MockResponse::json(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &serde_json::json!({"error": "extension failure"}),
                    );
                }
            };

        self.journal_request(&original, matched_stub, response.fault);

        self.apply_global_delay().await;

        if let Some(fault) = response.fault {
            self.notifier
                .info(&format!("request {request_id}: applying fault {fault:?}"));
        }
        response
    }

    /// Every stub-path request is journaled, including ones that ended in an
    /// extension failure (recorded with no matched stub).
    fn journal_request(
        &self,
        request: &ServedRequest,
        matched_stub: Option<String>,
        fault: Option<crate::exchange::Fault>,
    ) {
        self.journal.record(JournalEntry {
            request_id: request.id,
            method: request.method.to_string(),
            path: request.path.clone(),
            matched_stub,
            fault,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Fixed artificial delay from the shared settings, plus optional jitter.
    async fn apply_global_delay(&self) {
        let settings = self.settings.get();
        let mut delay_ms = match settings.fixed_delay_ms {
            Some(ms) => ms,
            None => return,
        };
        if let Some(jitter) = settings.delay_jitter_ms {
            // Draw before the await point; ThreadRng is not Send.
            delay_ms += rand::thread_rng().gen_range(0..=jitter);
        }
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}
