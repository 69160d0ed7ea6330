//! Stub mappings and matching.
//!
//! A stub is a request-matching rule plus the response (or fault) to produce
//! when it matches. Matching here is deliberately narrow: method plus exact
//! path, first match in insertion order wins. The richer predicate language
//! lives outside this core.

mod journal;

pub use journal::{Journal, JournalEntry};

use crate::exchange::{Fault, MockResponse, ServedRequest};
use http::StatusCode;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Response definition carried by a stub mapping.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseDef {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// When set, the fault injector takes the connection over instead of
    /// writing this response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
}

fn default_status() -> u16 {
    200
}

impl Default for ResponseDef {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: String::new(),
            fault: None,
        }
    }
}

/// A configured request-matching rule and its response.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StubMapping {
    /// Assigned by the store when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// HTTP method to match; `None` matches any method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Exact request path to match.
    pub path: String,
    #[serde(default)]
    pub response: ResponseDef,
    /// Per-stub parameter bag handed to response transformers.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub transformer_parameters: HashMap<String, serde_json::Value>,
}

impl StubMapping {
    pub fn for_path(path: impl Into<String>) -> Self {
        Self {
            id: None,
            method: None,
            path: path.into(),
            response: ResponseDef::default(),
            transformer_parameters: HashMap::new(),
        }
    }

    fn matches(&self, request: &ServedRequest) -> bool {
        if let Some(ref method) = self.method {
            if !method.eq_ignore_ascii_case(request.method.as_str()) {
                return false;
            }
        }
        self.path == request.path
    }

    /// Materialize the configured response.
    pub fn build_response(&self) -> MockResponse {
        let status =
            StatusCode::from_u16(self.response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = MockResponse::new(status).with_body(self.response.body.clone());
        for (name, value) in &self.response.headers {
            response = response.with_header(name, value);
        }
        if let Some(fault) = self.response.fault {
            response = response.with_fault(fault);
        }
        response
    }
}

/// Runtime-registered stub mappings, ordered by insertion.
pub struct StubStore {
    mappings: RwLock<Vec<StubMapping>>,
    next_id: AtomicU64,
}

impl StubStore {
    pub fn new() -> Self {
        Self {
            mappings: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a mapping, assigning an id when the caller did not supply
    /// one. Returns the stored mapping.
    pub fn register(&self, mut mapping: StubMapping) -> StubMapping {
        if mapping.id.is_none() {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            mapping.id = Some(format!("stub-{id}"));
        }
        let mut mappings = self.mappings.write();
        mappings.push(mapping.clone());
        mapping
    }

    /// First mapping that matches the request, in insertion order.
    pub fn find_match(&self, request: &ServedRequest) -> Option<StubMapping> {
        let mappings = self.mappings.read();
        mappings.iter().find(|m| m.matches(request)).cloned()
    }

    pub fn all(&self) -> Vec<StubMapping> {
        self.mappings.read().clone()
    }

    pub fn clear(&self) {
        self.mappings.write().clear();
    }

    pub fn len(&self) -> usize {
        self.mappings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.read().is_empty()
    }
}

impl Default for StubStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    fn get(path: &str) -> ServedRequest {
        ServedRequest::new(1, Method::GET, path)
    }

    #[test]
    fn test_register_assigns_ids() {
        let store = StubStore::new();
        let first = store.register(StubMapping::for_path("/a"));
        let second = store.register(StubMapping::for_path("/b"));
        assert_eq!(first.id.as_deref(), Some("stub-1"));
        assert_eq!(second.id.as_deref(), Some("stub-2"));
    }

    #[test]
    fn test_exact_path_match() {
        let store = StubStore::new();
        store.register(StubMapping::for_path("/orders"));
        assert!(store.find_match(&get("/orders")).is_some());
        assert!(store.find_match(&get("/orders/1")).is_none());
        assert!(store.find_match(&get("/order")).is_none());
    }

    #[test]
    fn test_method_constraint() {
        let store = StubStore::new();
        let mut mapping = StubMapping::for_path("/submit");
        mapping.method = Some("POST".to_string());
        store.register(mapping);

        assert!(store.find_match(&get("/submit")).is_none());
        let post = ServedRequest::new(2, Method::POST, "/submit");
        assert!(store.find_match(&post).is_some());
    }

    #[test]
    fn test_first_match_wins() {
        let store = StubStore::new();
        let mut early = StubMapping::for_path("/dup");
        early.response.body = "early".to_string();
        let mut late = StubMapping::for_path("/dup");
        late.response.body = "late".to_string();
        store.register(early);
        store.register(late);

        let matched = store.find_match(&get("/dup")).unwrap();
        assert_eq!(matched.response.body, "early");
    }

    #[test]
    fn test_build_response_with_fault() {
        let mut mapping = StubMapping::for_path("/bad");
        mapping.response.fault = Some(Fault::ConnectionResetByPeer);
        let response = mapping.build_response();
        assert_eq!(response.fault, Some(Fault::ConnectionResetByPeer));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_mapping_wire_format() {
        let json = r#"{
            "method": "GET",
            "path": "/bad",
            "response": {"status": 200, "fault": "MALFORMED_RESPONSE_CHUNK"}
        }"#;
        let mapping: StubMapping = serde_json::from_str(json).unwrap();
        assert_eq!(mapping.response.fault, Some(Fault::MalformedResponseChunk));
    }

    #[test]
    fn test_clear() {
        let store = StubStore::new();
        store.register(StubMapping::for_path("/a"));
        assert_eq!(store.len(), 1);
        store.clear();
        assert!(store.is_empty());
    }
}
