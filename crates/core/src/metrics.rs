use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub uploads_allowed: u64,
    pub uploads_blocked: u64,
    pub policy_changes: u64,
    pub rejected_changes: u64,
}

#[derive(Debug)]
pub struct MetricsStore {
    start_time: Instant,
    uploads_allowed: AtomicU64,
    uploads_blocked: AtomicU64,
    policy_changes: AtomicU64,
    rejected_changes: AtomicU64,
}

impl MetricsStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_time: Instant::now(),
            uploads_allowed: AtomicU64::new(0),
            uploads_blocked: AtomicU64::new(0),
            policy_changes: AtomicU64::new(0),
            rejected_changes: AtomicU64::new(0),
        })
    }

    pub fn observe_upload(&self, allowed: bool) {
        if allowed {
            self.uploads_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.uploads_blocked.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn inc_policy_changes(&self) {
        self.policy_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rejected_changes(&self) {
        self.rejected_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            uploads_allowed: self.uploads_allowed.load(Ordering::Relaxed),
            uploads_blocked: self.uploads_blocked.load(Ordering::Relaxed),
            policy_changes: self.policy_changes.load(Ordering::Relaxed),
            rejected_changes: self.rejected_changes.load(Ordering::Relaxed),
        }
    }
}
