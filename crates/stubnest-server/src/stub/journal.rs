//! Record of served stub-path requests.
//!
//! Control-plane traffic is not journaled. Capacity is bounded; the oldest
//! entries are evicted first.

use crate::exchange::Fault;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    pub request_id: u64,
    pub method: String,
    pub path: String,
    /// Id of the matched stub, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_stub: Option<String>,
    /// A deliberately applied fault is recorded here, not logged as an error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<Fault>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

pub struct Journal {
    entries: RwLock<VecDeque<JournalEntry>>,
    capacity: usize,
}

impl Journal {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn record(&self, entry: JournalEntry) {
        // Capacity zero means recording is disabled.
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
