use async_trait::async_trait;
use extguard_core::{HistoryStore, PolicyError, UploadRecord};
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Bounded in-process history for the local-only variant. Oldest records
/// fall off once `capacity` is reached.
pub struct MemoryHistory {
    capacity: usize,
    records: Mutex<VecDeque<UploadRecord>>,
}

impl MemoryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn record(&self, record: &UploadRecord) -> Result<(), PolicyError> {
        let mut records = self.records.lock().await;
        records.push_front(record.clone());
        records.truncate(self.capacity);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<UploadRecord>, PolicyError> {
        let records = self.records.lock().await;
        Ok(records.iter().take(limit).cloned().collect())
    }
}
