use async_trait::async_trait;

use crate::error::PolicyError;
use crate::types::{FixedExtension, Policy, PolicyLimits, UploadRecord, UploadRequest};

/// Owner of the fixed and custom blocklists.
///
/// Implementations are the validation authority: `add_custom` re-runs the
/// validator even when the caller already did. Writes are last-write-wins.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn limits(&self) -> Result<PolicyLimits, PolicyError>;

    /// Fixed extensions ordered by name.
    async fn fixed_state(&self) -> Result<Vec<FixedExtension>, PolicyError>;

    /// Fails with `UnknownFixed` for names outside the fixed set; the stored
    /// state is untouched on any failure.
    async fn set_fixed_blocked(&self, extension: &str, blocked: bool) -> Result<(), PolicyError>;

    /// Custom extensions in insertion order.
    async fn list_custom(&self) -> Result<Vec<String>, PolicyError>;

    /// Returns the normalized extension that was stored.
    async fn add_custom(&self, extension: &str) -> Result<String, PolicyError>;

    /// Removing an absent extension is `NotFound`, not a no-op.
    async fn remove_custom(&self, extension: &str) -> Result<(), PolicyError>;

    async fn snapshot(&self) -> Result<Policy, PolicyError> {
        Ok(Policy {
            fixed: self.fixed_state().await?,
            custom: self.list_custom().await?,
            limits: self.limits().await?,
        })
    }
}

/// Append-only log of judged uploads.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record(&self, record: &UploadRecord) -> Result<(), PolicyError>;

    /// Most recent first.
    async fn recent(&self, limit: usize) -> Result<Vec<UploadRecord>, PolicyError>;
}

/// Something that can classify an uploaded file and report recent judgments,
/// either in-process or through a remote endpoint.
#[async_trait]
pub trait UploadJudge: Send + Sync {
    async fn judge(&self, upload: &UploadRequest) -> Result<UploadRecord, PolicyError>;

    async fn recent(&self) -> Result<Vec<UploadRecord>, PolicyError>;
}
