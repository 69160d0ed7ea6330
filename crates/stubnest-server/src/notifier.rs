//! Process-wide diagnostic sink.
//!
//! The core depends only on the `Notifier` capability, never on a concrete
//! sink, so multiple implementations can coexist (tracing-backed in the
//! binary, collecting in tests).

use std::error::Error;
use std::sync::Arc;

/// Diagnostic capability. `info` is gated by the verbosity flag chosen at
/// construction; `error` is never gated.
pub trait Notifier: Send + Sync {
    fn info(&self, message: &str);
    fn error(&self, message: &str);
    fn error_with_cause(&self, message: &str, cause: &(dyn Error + 'static));
}

/// Notifier backed by the `tracing` subscriber installed by the binary.
pub struct TracingNotifier {
    verbose: bool,
}

impl TracingNotifier {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Notifier for TracingNotifier {
    fn info(&self, message: &str) {
        if self.verbose {
            tracing::info!("{message}");
        }
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }

    fn error_with_cause(&self, message: &str, cause: &(dyn Error + 'static)) {
        tracing::error!(cause = %cause, "{message}");
    }
}

/// Notifier that records messages in memory, for assertions in tests.
#[derive(Default)]
pub struct CollectingNotifier {
    pub infos: parking_lot::Mutex<Vec<String>>,
    pub errors: parking_lot::Mutex<Vec<String>>,
}

impl CollectingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl Notifier for CollectingNotifier {
    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    fn error_with_cause(&self, message: &str, cause: &(dyn Error + 'static)) {
        self.errors.lock().push(format!("{message}: {cause}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_notifier_records_errors() {
        let notifier = CollectingNotifier::new();
        notifier.info("started");
        notifier.error("boom");
        assert_eq!(notifier.infos.lock().as_slice(), ["started"]);
        assert_eq!(notifier.errors.lock().as_slice(), ["boom"]);
    }

    #[test]
    fn test_error_with_cause_includes_cause() {
        let notifier = CollectingNotifier::new();
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "underlying");
        notifier.error_with_cause("extension failed", &cause);
        assert!(notifier.errors.lock()[0].contains("underlying"));
    }
}
