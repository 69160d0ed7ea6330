//! JSON administrative control surface.
//!
//! Served under the configured admin prefix. These handlers are control-plane
//! operations: the router delivers requests here before the interception
//! pipeline runs, and no user-installed fault configuration can corrupt them.

use crate::dispatch::ServerCore;
use crate::exchange::{MockResponse, ServedRequest};
use crate::settings::Settings;
use crate::stub::StubMapping;
use http::{Method, StatusCode};
use tracing::debug;

/// Dispatch one admin request. `request.path` is already known to be under
/// the admin prefix.
pub fn handle(core: &ServerCore, request: &ServedRequest) -> MockResponse {
    let subpath = request
        .path
        .strip_prefix(core.admin_prefix())
        .unwrap_or("");

    debug!("admin: {} {}", request.method, subpath);

    match (&request.method, subpath) {
        (&Method::GET, "/health") => {
            MockResponse::json(StatusCode::OK, &serde_json::json!({"status": "ok"}))
        }

        (&Method::GET, "/mappings") => MockResponse::json(
            StatusCode::OK,
            &serde_json::json!({"mappings": core.stubs.all()}),
        ),
        (&Method::POST, "/mappings") => register_mapping(core, request),
        (&Method::DELETE, "/mappings") => {
            core.stubs.clear();
            MockResponse::new(StatusCode::NO_CONTENT)
        }

        (&Method::GET, "/requests") => MockResponse::json(
            StatusCode::OK,
            &serde_json::json!({"requests": core.journal.entries()}),
        ),
        (&Method::DELETE, "/requests") => {
            core.journal.clear();
            MockResponse::new(StatusCode::NO_CONTENT)
        }

        (&Method::GET, "/settings") => MockResponse::json(StatusCode::OK, &*core.settings.get()),
        (&Method::PUT, "/settings") => replace_settings(core, request),

        _ => MockResponse::json(
            StatusCode::NOT_FOUND,
            &serde_json::json!({"error": "unknown admin operation"}),
        ),
    }
}

fn register_mapping(core: &ServerCore, request: &ServedRequest) -> MockResponse {
    match serde_json::from_slice::<StubMapping>(&request.body) {
        Ok(mapping) => {
            let stored = core.stubs.register(mapping);
            MockResponse::json(StatusCode::CREATED, &stored)
        }
        Err(e) => MockResponse::json(
            StatusCode::BAD_REQUEST,
            &serde_json::json!({"error": format!("invalid stub mapping: {e}")}),
        ),
    }
}

fn replace_settings(core: &ServerCore, request: &ServedRequest) -> MockResponse {
    match serde_json::from_slice::<Settings>(&request.body) {
        Ok(settings) => {
            core.settings.replace(settings);
            MockResponse::json(StatusCode::OK, &*core.settings.get())
        }
        Err(e) => MockResponse::json(
            StatusCode::BAD_REQUEST,
            &serde_json::json!({"error": format!("invalid settings: {e}")}),
        ),
    }
}
