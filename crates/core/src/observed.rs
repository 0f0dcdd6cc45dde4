use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::audit::log_audit;
use crate::error::PolicyError;
use crate::metrics::MetricsStore;
use crate::store::PolicyStore;
use crate::types::{FixedExtension, PolicyLimits};

/// Wraps a [`PolicyStore`] so every mutation is audited and counted,
/// whichever front end made it.
pub struct ObservedPolicyStore {
    inner: Arc<dyn PolicyStore>,
    metrics: Option<Arc<MetricsStore>>,
}

impl ObservedPolicyStore {
    pub fn new(inner: Arc<dyn PolicyStore>) -> Self {
        Self {
            inner,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsStore>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn observe<T>(
        &self,
        event_type: &str,
        subject: &str,
        result: Result<T, PolicyError>,
    ) -> Result<T, PolicyError> {
        match &result {
            Ok(_) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_policy_changes();
                }
            }
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_rejected_changes();
                }
                warn!("Rejected {} for {}: {}", event_type, subject, err);
                log_audit(
                    &format!("{}_rejected", event_type),
                    subject,
                    json!({ "code": err.code(), "message": err.to_string() }),
                );
            }
        }
        result
    }
}

#[async_trait]
impl PolicyStore for ObservedPolicyStore {
    async fn limits(&self) -> Result<PolicyLimits, PolicyError> {
        self.inner.limits().await
    }

    async fn fixed_state(&self) -> Result<Vec<FixedExtension>, PolicyError> {
        self.inner.fixed_state().await
    }

    async fn set_fixed_blocked(&self, extension: &str, blocked: bool) -> Result<(), PolicyError> {
        let result = self.inner.set_fixed_blocked(extension, blocked).await;
        self.observe("fixed_toggled", extension, result)?;

        info!(
            "Fixed extension {} -> {}",
            extension,
            if blocked { "blocked" } else { "allowed" }
        );
        log_audit("fixed_toggled", extension, json!({ "blocked": blocked }));
        Ok(())
    }

    async fn list_custom(&self) -> Result<Vec<String>, PolicyError> {
        self.inner.list_custom().await
    }

    async fn add_custom(&self, extension: &str) -> Result<String, PolicyError> {
        let result = self.inner.add_custom(extension).await;
        let stored = self.observe("custom_added", extension, result)?;

        info!("Custom extension added: {}", stored);
        log_audit("custom_added", &stored, json!({}));
        Ok(stored)
    }

    async fn remove_custom(&self, extension: &str) -> Result<(), PolicyError> {
        let result = self.inner.remove_custom(extension).await;
        self.observe("custom_removed", extension, result)?;

        info!("Custom extension removed: {}", extension);
        log_audit("custom_removed", extension, json!({}));
        Ok(())
    }
}
