//! Correlation propagation filter.
//!
//! Copies the well-known trace/span request headers into the per-request
//! correlation context so the notifier and any downstream extension can rely
//! on the same key convention without the values appearing in the wire
//! response.

use crate::exchange::{FilterAction, ServedRequest, CONTEXT_SPAN_ID, CONTEXT_TRACE_ID};
use crate::pipeline::RequestFilter;

pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const SPAN_ID_HEADER: &str = "x-span-id";

/// Reads `x-trace-id` and `x-span-id` from the inbound request and records
/// them under the [`CONTEXT_TRACE_ID`]/[`CONTEXT_SPAN_ID`] context keys.
/// Always continues; never alters path, headers, or body.
#[derive(Default)]
pub struct CorrelationFilter;

impl RequestFilter for CorrelationFilter {
    fn filter(&self, request: ServedRequest) -> anyhow::Result<FilterAction> {
        let trace = request.header(TRACE_ID_HEADER).map(str::to_string);
        let span = request.header(SPAN_ID_HEADER).map(str::to_string);

        let mut request = request;
        if let Some(trace) = trace {
            request = request.with_context_value(CONTEXT_TRACE_ID, trace);
        }
        if let Some(span) = span {
            request = request.with_context_value(CONTEXT_SPAN_ID, span);
        }
        Ok(FilterAction::Continue(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, Method};

    #[test]
    fn test_copies_trace_headers_into_context() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", HeaderValue::from_static("trace-42"));
        headers.insert("x-span-id", HeaderValue::from_static("span-7"));
        let request = ServedRequest::new(1, Method::GET, "/orders").with_headers(headers);

        match CorrelationFilter.filter(request).unwrap() {
            FilterAction::Continue(req) => {
                assert_eq!(req.context.get(CONTEXT_TRACE_ID).unwrap(), "trace-42");
                assert_eq!(req.context.get(CONTEXT_SPAN_ID).unwrap(), "span-7");
            }
            FilterAction::Stop(_) => panic!("Expected Continue"),
        }
    }

    #[test]
    fn test_absent_headers_leave_context_empty() {
        let request = ServedRequest::new(2, Method::GET, "/orders");
        match CorrelationFilter.filter(request).unwrap() {
            FilterAction::Continue(req) => assert!(req.context.is_empty()),
            FilterAction::Stop(_) => panic!("Expected Continue"),
        }
    }
}
