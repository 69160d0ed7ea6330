//! Request/response values threaded through the interception pipeline.
//!
//! `ServedRequest` is an immutable view of an accepted request; filters that
//! want to modify it produce a new value through the `with_*` methods rather
//! than mutating in place. `MockResponse` is built incrementally by the stub
//! execution step and the transformer chain, and is frozen once it reaches
//! the write-out stage.

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Deliberate connection-level fault kinds.
///
/// A fault is attached to a matched stub (or produced by a filter), never to
/// the pipeline itself. When present on the response that reaches write-out,
/// the fault injector takes over the raw connection instead of the HTTP
/// encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Fault {
    /// Abort the connection so the peer observes a TCP reset, not a clean close.
    ConnectionResetByPeer,
    /// Close the connection after reading the request, before any response bytes.
    EmptyResponse,
    /// Write a chunked response head followed by an invalid chunk-size line.
    MalformedResponseChunk,
    /// Write a bounded amount of non-HTTP garbage, then close.
    RandomDataThenClose,
}

/// Well-known correlation context keys populated by the bundled
/// `CorrelationFilter` and consumed by the notifier/logging collaborators.
pub const CONTEXT_TRACE_ID: &str = "trace-id";
pub const CONTEXT_SPAN_ID: &str = "span-id";

/// Immutable view of a single accepted request.
#[derive(Debug, Clone)]
pub struct ServedRequest {
    /// Process-unique sequence number, used as the request identifier in
    /// notifier output and the journal.
    pub id: u64,
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Opaque key/value map for cross-cutting concerns (trace propagation).
    /// Propagated unchanged through filters unless a filter replaces it.
    pub context: HashMap<String, String>,
    pub received_at: chrono::DateTime<chrono::Utc>,
}

impl ServedRequest {
    pub fn new(id: u64, method: Method, path: impl Into<String>) -> Self {
        Self {
            id,
            method,
            path: path.into(),
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            context: HashMap::new(),
            received_at: chrono::Utc::now(),
        }
    }

    /// Return a copy with a different path. The correlation context and
    /// request id carry over untouched.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_context_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// First value of a header, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Response produced by a filter stop, a stub match, or the admin plane.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub fault: Option<Fault>,
}

impl MockResponse {
    /// A response always carries a status from construction onward; the
    /// write-out stage never sees a status-less value.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            fault: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.fault = Some(fault);
        self
    }

    /// JSON body helper used by the admin plane.
    pub fn json(status: StatusCode, value: &impl Serialize) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(status)
            .with_header("content-type", "application/json")
            .with_body(body)
    }
}

/// Outcome of a single request filter invocation.
pub enum FilterAction {
    /// Proceed to the next filter (or the stub match step) with this request.
    Continue(ServedRequest),
    /// Short-circuit: remaining filters and the stub match step are skipped.
    /// The response still passes through the transformer chain.
    Stop(MockResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_wire_names() {
        let json = serde_json::to_string(&Fault::ConnectionResetByPeer).unwrap();
        assert_eq!(json, "\"CONNECTION_RESET_BY_PEER\"");
        let fault: Fault = serde_json::from_str("\"MALFORMED_RESPONSE_CHUNK\"").unwrap();
        assert_eq!(fault, Fault::MalformedResponseChunk);
    }

    #[test]
    fn test_with_path_keeps_context() {
        let req = ServedRequest::new(1, Method::GET, "/old")
            .with_context_value(CONTEXT_TRACE_ID, "abc123");
        let rewritten = req.with_path("/new");
        assert_eq!(rewritten.path, "/new");
        assert_eq!(rewritten.context.get(CONTEXT_TRACE_ID).unwrap(), "abc123");
        assert_eq!(rewritten.id, 1);
    }

    #[test]
    fn test_response_json_sets_content_type() {
        let resp = MockResponse::json(StatusCode::OK, &serde_json::json!({"ok": true}));
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers.get("content-type").unwrap(), "application/json");
        assert!(!resp.body.is_empty());
    }
}
