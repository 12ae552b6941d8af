//! Traffic counters for the shadow client.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ClientStats {
    bytes_in: AtomicU64,
    packets_in: AtomicU64,
    messages_in: AtomicU64,
    packets_out: AtomicU64,
    messages_out: AtomicU64,
    foreign_state_changes_in: AtomicU64,
    statuses_in: AtomicU64,
}

/// Point-in-time copy of [`ClientStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatsSnapshot {
    pub bytes_in: u64,
    pub packets_in: u64,
    pub messages_in: u64,
    pub packets_out: u64,
    pub messages_out: u64,
    pub foreign_state_changes_in: u64,
    pub statuses_in: u64,
}

impl ClientStats {
    pub fn record_packet_in(&self, bytes: usize) {
        self.packets_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_packet_out(&self) {
        self.packets_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_in(&self) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_out(&self) {
        self.messages_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_foreign_state_change(&self) {
        self.foreign_state_changes_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status(&self) {
        self.statuses_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ClientStatsSnapshot {
        ClientStatsSnapshot {
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            packets_in: self.packets_in.load(Ordering::Relaxed),
            messages_in: self.messages_in.load(Ordering::Relaxed),
            packets_out: self.packets_out.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            foreign_state_changes_in: self.foreign_state_changes_in.load(Ordering::Relaxed),
            statuses_in: self.statuses_in.load(Ordering::Relaxed),
        }
    }
}
