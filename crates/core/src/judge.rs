use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::audit::log_audit;
use crate::error::PolicyError;
use crate::metrics::MetricsStore;
use crate::store::{HistoryStore, PolicyStore, UploadJudge};
use crate::types::{UploadRecord, UploadRequest};

/// Judges uploads in-process against the current policy and records history.
pub struct LocalJudge {
    policy: Arc<dyn PolicyStore>,
    history: Arc<dyn HistoryStore>,
    history_limit: usize,
    metrics: Option<Arc<MetricsStore>>,
}

impl LocalJudge {
    pub fn new(
        policy: Arc<dyn PolicyStore>,
        history: Arc<dyn HistoryStore>,
        history_limit: usize,
    ) -> Self {
        Self {
            policy,
            history,
            history_limit,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsStore>) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl UploadJudge for LocalJudge {
    async fn judge(&self, upload: &UploadRequest) -> Result<UploadRecord, PolicyError> {
        let policy = self.policy.snapshot().await?;
        let classification = policy.classify(&upload.file_name);
        let record = UploadRecord::new(&upload.file_name, classification);

        if record.allowed {
            debug!("Upload allowed: {} (extension: {:?})", record.file_name, record.extension);
        } else {
            info!("Upload blocked: {} (extension: {})", record.file_name, record.extension);
        }

        // History is best effort; the verdict stands without it.
        if let Err(e) = self.history.record(&record).await {
            warn!("Failed to record upload attempt for {}: {}", record.file_name, e);
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_upload(record.allowed);
        }

        log_audit(
            "upload_judged",
            &record.file_name,
            json!({
                "title": upload.title,
                "extension": record.extension,
                "allowed": record.allowed,
                "size_bytes": upload.bytes.len(),
            }),
        );

        Ok(record)
    }

    async fn recent(&self) -> Result<Vec<UploadRecord>, PolicyError> {
        self.history.recent(self.history_limit).await
    }
}
