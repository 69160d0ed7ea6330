//! Minimal HTTP/1.1 wire handling.
//!
//! The transport owns the raw socket for the whole exchange (the fault
//! injector needs it at response time), so request heads are parsed here
//! with `httparse` instead of handing the stream to a full server engine.
//! One request per connection; responses always carry `connection: close`.

use crate::exchange::MockResponse;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;
const MAX_HEADERS: usize = 64;

/// A fully read request, before it becomes a `ServedRequest`.
#[derive(Debug)]
pub struct ParsedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("connection closed before a complete request head")]
    ConnectionClosed,
    #[error("request head exceeds {MAX_HEAD_BYTES} bytes")]
    HeadTooLarge,
    #[error("request body exceeds {MAX_BODY_BYTES} bytes")]
    BodyTooLarge,
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read one request (head + content-length body) off the stream.
pub async fn read_request<S>(stream: &mut S) -> Result<ParsedRequest, ReadError>
where
    S: AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let head_len = loop {
        if let Some(end) = find_head_end(&buf) {
            break end;
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(ReadError::HeadTooLarge);
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ReadError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let mut header_storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut header_storage);
    match parsed.parse(&buf[..head_len]) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(ReadError::Malformed("incomplete request head".to_string()))
        }
        Err(e) => return Err(ReadError::Malformed(e.to_string())),
    }

    let method = parsed
        .method
        .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
        .ok_or_else(|| ReadError::Malformed("missing or invalid method".to_string()))?;
    let target = parsed
        .path
        .ok_or_else(|| ReadError::Malformed("missing request target".to_string()))?;
    let (path, query) = split_target(target);

    let mut headers = HeaderMap::new();
    for header in parsed.headers.iter() {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(header.name.as_bytes()),
            HeaderValue::from_bytes(header.value),
        ) {
            headers.append(name, value);
        }
    }

    let content_length = headers
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY_BYTES {
        return Err(ReadError::BodyTooLarge);
    }

    let mut body = buf.split_off(head_len);
    while body.len() < content_length {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(ReadError::ConnectionClosed);
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(ParsedRequest {
        method,
        path,
        query,
        headers,
        body: Bytes::from(body),
    })
}

/// Encode a well-formed response with explicit content-length and
/// `connection: close` semantics.
pub fn encode_response(response: &MockResponse) -> Vec<u8> {
    let status = response.status();
    let mut out = Vec::with_capacity(256 + response.body.len());
    out.extend_from_slice(
        format!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )
        .as_bytes(),
    );
    for (name, value) in response.headers.iter() {
        // Framing is ours: the body length and close semantics below win
        // over anything a stub or transformer put in the header map.
        if name == http::header::CONTENT_LENGTH
            || name == http::header::TRANSFER_ENCODING
            || name == http::header::CONNECTION
        {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("content-length: {}\r\n", response.body.len()).as_bytes());
    out.extend_from_slice(b"connection: close\r\n\r\n");
    out.extend_from_slice(&response.body);
    out
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

fn split_target(target: &str) -> (String, Option<String>) {
    match target.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (target.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use std::io::Cursor;

    async fn parse(raw: &[u8]) -> Result<ParsedRequest, ReadError> {
        let mut cursor = Cursor::new(raw.to_vec());
        read_request(&mut cursor).await
    }

    #[tokio::test]
    async fn test_parse_get_with_query() {
        let parsed = parse(b"GET /orders?limit=5 HTTP/1.1\r\nhost: localhost\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(parsed.method, Method::GET);
        assert_eq!(parsed.path, "/orders");
        assert_eq!(parsed.query.as_deref(), Some("limit=5"));
        assert_eq!(parsed.headers.get("host").unwrap(), "localhost");
        assert!(parsed.body.is_empty());
    }

    #[tokio::test]
    async fn test_parse_post_with_body() {
        let parsed = parse(
            b"POST /submit HTTP/1.1\r\nhost: x\r\ncontent-length: 5\r\n\r\nhello",
        )
        .await
        .unwrap();
        assert_eq!(parsed.method, Method::POST);
        assert_eq!(&parsed.body[..], b"hello");
    }

    #[tokio::test]
    async fn test_repeated_headers_are_multi_valued() {
        let parsed = parse(
            b"GET / HTTP/1.1\r\nx-tag: one\r\nx-tag: two\r\n\r\n",
        )
        .await
        .unwrap();
        let values: Vec<_> = parsed.headers.get_all("x-tag").iter().collect();
        assert_eq!(values.len(), 2);
    }

    #[tokio::test]
    async fn test_premature_close_is_detected() {
        match parse(b"GET / HTTP/1.1\r\nhost").await {
            Err(ReadError::ConnectionClosed) => {}
            other => panic!("Expected ConnectionClosed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        match parse(b"\x00\x01\x02garbage\r\n\r\n").await {
            Err(ReadError::Malformed(_)) => {}
            other => panic!("Expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_sets_framing_headers() {
        let response = MockResponse::new(StatusCode::OK)
            .with_header("content-type", "text/plain")
            // A stub-supplied length must not survive into the wire bytes.
            .with_header("content-length", "9999")
            .with_body("ok");
        let bytes = encode_response(&response);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("content-type: text/plain\r\n"));
        assert!(text.contains("content-length: 2\r\n"));
        assert!(!text.contains("9999"));
        assert!(text.contains("connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\nok"));
    }
}
