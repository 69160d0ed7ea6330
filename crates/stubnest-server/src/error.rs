//! Error types for server startup and per-request extension failures.

use thiserror::Error;

/// Fatal startup/configuration errors. The server does not start and no port
/// is bound when any of these is returned.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("duplicate extension name '{0}'")]
    DuplicateExtension(String),

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("invalid admin prefix '{0}': must start with '/'")]
    InvalidAdminPrefix(String),

    #[error("https listener configured without TLS material")]
    MissingTlsMaterial,

    #[error("failed to load TLS material: {0}")]
    Tls(String),

    #[error("failed to bind {addr}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure raised by a single filter or transformer. Isolated to the request
/// that triggered it: the affected connection gets a server-error response
/// and the failure is reported through the notifier, never silently swallowed.
#[derive(Debug, Error)]
#[error("extension '{extension}' failed")]
pub struct ExtensionError {
    /// Registration name of the failing extension.
    pub extension: String,
    #[source]
    pub source: anyhow::Error,
}
