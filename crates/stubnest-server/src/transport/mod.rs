//! Transport backend contract and the tokio-based implementation.
//!
//! The contract isolates the router, pipeline, and fault injector from any
//! specific network engine: a backend accepts connections, terminates TLS
//! when configured, exposes the actually-bound ports, and delivers each
//! parsed request to the core before any response bytes are written.
//! Substituting one backend for another must not change router, pipeline,
//! or fault behavior.

pub mod http1;
mod tls;
mod tokio_backend;

pub use tls::create_tls_acceptor;
pub use tokio_backend::{ServerStream, TokioBackend};

use crate::config::ServerOptions;
use crate::error::StartError;
use async_trait::async_trait;

/// Concrete server engine contract.
#[async_trait]
pub trait TransportBackend: Send + Sync {
    /// Validate options, build the server core, bind listeners, and begin
    /// accepting connections. Any configuration error is returned before a
    /// port is bound.
    async fn start(&self, options: ServerOptions) -> Result<Box<dyn RunningServer>, StartError>;
}

/// Handle to a started server.
#[async_trait]
pub trait RunningServer: Send + Sync {
    /// The actually-bound HTTP port (differs from the configured one when
    /// port 0 requested an ephemeral port).
    fn bound_port(&self) -> u16;

    /// The actually-bound HTTPS port, when TLS is configured.
    fn bound_https_port(&self) -> Option<u16>;

    /// Close listening sockets, give in-flight workers a bounded grace
    /// period, then force-terminate stragglers. Idempotent.
    async fn stop(&self);
}
