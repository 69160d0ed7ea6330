//! Stubnest: a programmable HTTP(S) stub server.
//!
//! A transport backend accepts connections and hands each parsed request to
//! the core, which routes it to the administrative control plane or through
//! the interception pipeline to stub matching. A matched stub may carry a
//! fault marker, in which case the fault injector takes over the raw
//! connection instead of the HTTP encoder.

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod fault;
pub mod notifier;
pub mod pipeline;
pub mod router;
pub mod settings;
pub mod stub;
pub mod transport;

pub use config::{ServerOptions, TlsConfig};
pub use dispatch::ServerCore;
pub use error::{ExtensionError, StartError};
pub use exchange::{Fault, FilterAction, MockResponse, ServedRequest};
pub use notifier::{Notifier, TracingNotifier};
pub use pipeline::{
    CorrelationFilter, ExtensionRegistration, Pipeline, RequestFilter, ResponseTransformer,
};
pub use settings::{Settings, SharedSettings};
pub use stub::{StubMapping, StubStore};
pub use transport::{RunningServer, TokioBackend, TransportBackend};
