//! Shared mutable settings, readable by all in-flight requests.
//!
//! The whole value is replaced atomically; readers never lock and never
//! observe a partially updated value. Two racing `replace` calls are
//! last-writer-wins with no ordering guarantee beyond atomicity of each
//! individual value.

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Global runtime-mutable configuration. Replace-only: fields are never
/// updated in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Artificial delay applied to every stub-path response before write-out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_delay_ms: Option<u64>,
    /// Uniform random jitter added on top of the fixed delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_jitter_ms: Option<u64>,
}

/// Lock-free holder for [`Settings`].
pub struct SharedSettings {
    cell: ArcSwap<Settings>,
}

impl SharedSettings {
    pub fn new(initial: Settings) -> Self {
        Self {
            cell: ArcSwap::from_pointee(initial),
        }
    }

    pub fn get(&self) -> Arc<Settings> {
        self.cell.load_full()
    }

    /// Single atomic swap of the whole value.
    pub fn replace(&self, settings: Settings) {
        self.cell.store(Arc::new(settings));
    }
}

impl Default for SharedSettings {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_replace_then_get() {
        let shared = SharedSettings::default();
        assert_eq!(shared.get().fixed_delay_ms, None);
        shared.replace(Settings {
            fixed_delay_ms: Some(250),
            delay_jitter_ms: None,
        });
        assert_eq!(shared.get().fixed_delay_ms, Some(250));
    }

    #[test]
    fn test_racing_replaces_yield_whole_values() {
        let shared = Arc::new(SharedSettings::default());
        let a = Settings {
            fixed_delay_ms: Some(1),
            delay_jitter_ms: Some(10),
        };
        let b = Settings {
            fixed_delay_ms: Some(2),
            delay_jitter_ms: Some(20),
        };

        let mut writers = Vec::new();
        for value in [a.clone(), b.clone()] {
            let shared = Arc::clone(&shared);
            writers.push(thread::spawn(move || {
                for _ in 0..1000 {
                    shared.replace(value.clone());
                }
            }));
        }
        let reader = {
            let shared = Arc::clone(&shared);
            let (a, b) = (a.clone(), b.clone());
            thread::spawn(move || {
                for _ in 0..1000 {
                    let seen = shared.get();
                    // Always one of the full values, never a mix of fields.
                    assert!(
                        *seen == Settings::default() || *seen == a || *seen == b,
                        "observed torn settings value: {seen:?}"
                    );
                }
            })
        };
        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
    }

    #[test]
    fn test_settings_wire_format() {
        let parsed: Settings = serde_json::from_str(r#"{"fixedDelayMs": 50}"#).unwrap();
        assert_eq!(parsed.fixed_delay_ms, Some(50));
        assert_eq!(parsed.delay_jitter_ms, None);
    }
}
