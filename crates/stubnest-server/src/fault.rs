//! Deliberate protocol-violating connection behavior.
//!
//! The injector bypasses the well-formed write-out path entirely: it runs
//! synchronously on the worker that owns the connection, before the pool
//! slot is released, and before any well-formed response bytes are flushed.
//! Fault outcomes are intentional and are never reported as failures.

use crate::exchange::Fault;
use async_trait::async_trait;
use rand::RngCore;
use std::io;

/// Upper bound on the garbage payload for `RandomDataThenClose`.
const RANDOM_DATA_LEN: usize = 1024;

/// The minimal raw-connection capability the injector needs. Each transport
/// backend supplies its own implementation; for TLS connections the writes
/// travel through the TLS layer (handshake already complete) while the abort
/// still tears down the TCP layer underneath.
#[async_trait]
pub trait RawConnection: Send {
    /// Write bytes to the connection without any HTTP framing.
    async fn raw_write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Arrange for a non-graceful teardown: when the connection is dropped
    /// the peer observes an abrupt termination (TCP RST), not a clean close.
    async fn abrupt_close(&mut self) -> io::Result<()>;
}

/// How the worker should dispose of the connection after injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Normal close; the peer sees EOF after whatever bytes were written.
    Graceful,
    /// Drop without shutdown; `abrupt_close` has already been applied.
    Abrupt,
}

/// Apply the selected fault to the raw connection.
pub async fn inject(fault: Fault, conn: &mut dyn RawConnection) -> io::Result<Teardown> {
    match fault {
        Fault::ConnectionResetByPeer => {
            conn.abrupt_close().await?;
            Ok(Teardown::Abrupt)
        }
        Fault::EmptyResponse => {
            // Nothing at all: no status line, no headers. Close only.
            Ok(Teardown::Graceful)
        }
        Fault::MalformedResponseChunk => {
            conn.raw_write(&malformed_chunk_bytes()).await?;
            Ok(Teardown::Graceful)
        }
        Fault::RandomDataThenClose => {
            let mut garbage = vec![0u8; RANDOM_DATA_LEN];
            rand::thread_rng().fill_bytes(&mut garbage);
            conn.raw_write(&garbage).await?;
            Ok(Teardown::Graceful)
        }
    }
}

/// A valid chunked response head followed by a chunk-size line that no
/// decoder accepts.
fn malformed_chunk_bytes() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"HTTP/1.1 200 OK\r\n");
    bytes.extend_from_slice(b"transfer-encoding: chunked\r\n");
    bytes.extend_from_slice(b"\r\n");
    // "ZZZZ" is not a hex chunk size; decoders fail before yielding a body.
    bytes.extend_from_slice(b"ZZZZ\r\nlorem ipsum dolor sit amet\r\n");
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory adapter recording what the injector did.
    #[derive(Default)]
    struct RecordingConnection {
        written: Vec<u8>,
        aborted: bool,
    }

    #[async_trait]
    impl RawConnection for RecordingConnection {
        async fn raw_write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }

        async fn abrupt_close(&mut self) -> io::Result<()> {
            self.aborted = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_reset_writes_nothing_and_aborts() {
        let mut conn = RecordingConnection::default();
        let teardown = inject(Fault::ConnectionResetByPeer, &mut conn).await.unwrap();
        assert_eq!(teardown, Teardown::Abrupt);
        assert!(conn.aborted);
        assert!(conn.written.is_empty());
    }

    #[tokio::test]
    async fn test_empty_response_writes_nothing() {
        let mut conn = RecordingConnection::default();
        let teardown = inject(Fault::EmptyResponse, &mut conn).await.unwrap();
        assert_eq!(teardown, Teardown::Graceful);
        assert!(!conn.aborted);
        assert!(conn.written.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_chunk_has_invalid_size_line() {
        let mut conn = RecordingConnection::default();
        inject(Fault::MalformedResponseChunk, &mut conn).await.unwrap();
        let written = String::from_utf8_lossy(&conn.written);
        assert!(written.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(written.contains("transfer-encoding: chunked"));
        assert!(written.contains("ZZZZ\r\n"));
    }

    #[tokio::test]
    async fn test_random_data_is_bounded() {
        let mut conn = RecordingConnection::default();
        inject(Fault::RandomDataThenClose, &mut conn).await.unwrap();
        assert_eq!(conn.written.len(), RANDOM_DATA_LEN);
        assert!(!conn.aborted);
    }
}
