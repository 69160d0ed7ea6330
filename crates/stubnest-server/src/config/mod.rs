//! Server configuration.
//!
//! `ServerOptions` is an immutable snapshot created at startup and owned by
//! the transport backend for its lifetime. Validation happens before any
//! port is bound; violations are fatal.

use crate::error::StartError;
use crate::pipeline::ExtensionRegistration;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ADMIN_PREFIX: &str = "/__admin";

/// TLS material for the HTTPS listener (PEM files).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

/// Immutable startup snapshot: ports, pool size, extension registrations,
/// TLS material reference.
pub struct ServerOptions {
    /// Host to bind listeners on.
    pub bind_host: String,
    /// HTTP listener port; 0 selects an ephemeral port.
    pub http_port: u16,
    /// Optional HTTPS listener port (0 = ephemeral). Requires `tls`.
    pub https_port: Option<u16>,
    pub tls: Option<TlsConfig>,
    /// Admin path prefix; requests under it bypass the pipeline and injector.
    pub admin_prefix: String,
    /// Worker pool size; 0 = auto-detect CPU count.
    pub workers: usize,
    /// Gates the notifier's `info` channel.
    pub verbose: bool,
    /// How long `stop()` waits for in-flight workers before aborting them.
    pub grace_period: Duration,
    /// Extension registrations, collected once; read-only afterwards.
    pub registrations: Vec<ExtensionRegistration>,
    /// Bounded request journal capacity; 0 disables recording.
    pub journal_capacity: usize,
}

impl ServerOptions {
    pub fn new() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            http_port: 0,
            https_port: None,
            tls: None,
            admin_prefix: DEFAULT_ADMIN_PREFIX.to_string(),
            workers: 0,
            verbose: false,
            grace_period: Duration::from_secs(5),
            registrations: Vec::new(),
            journal_capacity: 1000,
        }
    }

    pub fn with_http_port(mut self, port: u16) -> Self {
        self.http_port = port;
        self
    }

    pub fn with_https_port(mut self, port: u16, tls: TlsConfig) -> Self {
        self.https_port = Some(port);
        self.tls = Some(tls);
        self
    }

    pub fn with_admin_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.admin_prefix = prefix.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn register(mut self, registration: ExtensionRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Effective worker pool size.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get()
        } else {
            self.workers
        }
    }

    /// Configuration checks that must pass before any port is bound.
    pub fn validate(&self) -> Result<(), StartError> {
        if !self.admin_prefix.starts_with('/') || self.admin_prefix.len() < 2 {
            return Err(StartError::InvalidAdminPrefix(self.admin_prefix.clone()));
        }
        if self.https_port.is_some() && self.tls.is_none() {
            return Err(StartError::MissingTlsMaterial);
        }
        if self.bind_host.is_empty() {
            return Err(StartError::InvalidBindAddress(self.bind_host.clone()));
        }
        Ok(())
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ServerOptions::new();
        assert_eq!(options.admin_prefix, "/__admin");
        assert_eq!(options.http_port, 0);
        assert!(options.https_port.is_none());
        assert!(options.validate().is_ok());
        assert!(options.worker_count() >= 1);
    }

    #[test]
    fn test_https_requires_tls_material() {
        let mut options = ServerOptions::new();
        options.https_port = Some(0);
        match options.validate() {
            Err(StartError::MissingTlsMaterial) => {}
            other => panic!("Expected MissingTlsMaterial, got {other:?}"),
        }
    }

    #[test]
    fn test_admin_prefix_must_be_rooted() {
        let options = ServerOptions::new().with_admin_prefix("admin");
        match options.validate() {
            Err(StartError::InvalidAdminPrefix(prefix)) => assert_eq!(prefix, "admin"),
            other => panic!("Expected InvalidAdminPrefix, got {other:?}"),
        }
    }
}
