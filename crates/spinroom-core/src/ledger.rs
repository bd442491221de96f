use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// How many applied event ids the duplicate-detection window keeps.
pub const PROCESSED_ID_WINDOW: usize = 1000;

/// Per-room at-most-once bookkeeping: the highest applied sequence per
/// client plus a bounded FIFO window of recently applied event ids.
/// Sequence entries survive disconnects so a reconnecting client
/// replaying its last unacknowledged event cannot double-apply.
#[derive(Debug, Default)]
pub struct IdempotencyLedger {
    client_seqs: HashMap<String, u64>,
    processed_ids: HashSet<String>,
    processed_order: VecDeque<String>,
}

impl IdempotencyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when this (client_seq, event_id) pair was already applied.
    pub fn is_duplicate(&self, client_id: &str, client_seq: u64, event_id: Option<&str>) -> bool {
        if let Some(&last) = self.client_seqs.get(client_id) {
            if client_seq <= last {
                return true;
            }
        }
        if let Some(id) = event_id {
            if self.processed_ids.contains(id) {
                return true;
            }
        }
        false
    }

    /// Record an accepted event. Once the window is full the oldest id
    /// is evicted from both the queue and the set, keeping memory
    /// bounded while preserving a meaningful detection window.
    pub fn record(&mut self, client_id: &str, client_seq: u64, event_id: &str) {
        self.client_seqs.insert(client_id.to_string(), client_seq);
        if self.processed_ids.insert(event_id.to_string()) {
            self.processed_order.push_back(event_id.to_string());
            if self.processed_order.len() > PROCESSED_ID_WINDOW {
                if let Some(evicted) = self.processed_order.pop_front() {
                    self.processed_ids.remove(&evicted);
                }
            }
        }
    }

    pub fn last_seq(&self, client_id: &str) -> Option<u64> {
        self.client_seqs.get(client_id).copied()
    }

    /// Point-in-time export for the snapshot store.
    pub fn export(&self) -> LedgerExport {
        LedgerExport {
            client_seqs: self
                .client_seqs
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            processed_ids: self.processed_order.iter().cloned().collect(),
        }
    }

    /// Rebuild dedup state from a persisted export, oldest id first.
    pub fn import(export: LedgerExport) -> Self {
        let mut ledger = Self::new();
        ledger.client_seqs = export.client_seqs.into_iter().collect();
        for id in export.processed_ids {
            if ledger.processed_ids.insert(id.clone()) {
                ledger.processed_order.push_back(id);
            }
        }
        while ledger.processed_order.len() > PROCESSED_ID_WINDOW {
            if let Some(evicted) = ledger.processed_order.pop_front() {
                ledger.processed_ids.remove(&evicted);
            }
        }
        ledger
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerExport {
    pub client_seqs: Vec<(String, u64)>,
    pub processed_ids: Vec<String>,
}
