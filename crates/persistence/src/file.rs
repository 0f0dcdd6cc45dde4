use async_trait::async_trait;
use extguard_core::config::PolicyConfig;
use extguard_core::types::FixedExtension;
use extguard_core::{validator, PolicyError, PolicyLimits, PolicyStore};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::reservation_policy;

/// The single record persisted by the local-only variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPolicy {
    /// Fixed extensions currently blocked.
    #[serde(default)]
    pub fixed: Vec<String>,
    /// Custom extensions in insertion order.
    #[serde(default)]
    pub custom: Vec<String>,
}

/// Local key-value store: one JSON file holding records by key, with the
/// policy stored wholesale under a single key.
///
/// Every mutation is read-modify-write of the whole record, serialized by
/// an internal lock. A failed write leaves the previous file in place.
pub struct FilePolicyStore {
    path: PathBuf,
    key: String,
    fixed: Vec<String>,
    limits: PolicyLimits,
    lock: Mutex<()>,
}

impl FilePolicyStore {
    pub fn new(path: impl Into<PathBuf>, key: &str, policy: &PolicyConfig) -> Self {
        let path = path.into();
        info!("FilePolicyStore using {} (key: {})", path.display(), key);
        Self {
            path,
            key: key.to_string(),
            fixed: policy.fixed_extensions.clone(),
            limits: policy.limits(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Map<String, Value>, PolicyError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) if data.trim().is_empty() => Ok(Map::new()),
            Ok(data) => serde_json::from_str(&data).map_err(PolicyError::storage),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(PolicyError::storage(e)),
        }
    }

    pub async fn load(&self) -> Result<StoredPolicy, PolicyError> {
        let mut all = self.read_all().await?;
        let record = match all.remove(&self.key) {
            Some(value) => serde_json::from_value(value).map_err(PolicyError::storage)?,
            None => StoredPolicy::default(),
        };
        Ok(record)
    }

    async fn save(&self, record: &StoredPolicy) -> Result<(), PolicyError> {
        let mut all = self.read_all().await?;
        all.insert(
            self.key.clone(),
            serde_json::to_value(record).map_err(PolicyError::storage)?,
        );
        let data = serde_json::to_string_pretty(&all).map_err(PolicyError::storage)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(PolicyError::storage)?;
        }
        // Write then rename so readers never observe a half-written record.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .map_err(PolicyError::storage)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(PolicyError::storage)?;
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for FilePolicyStore {
    async fn limits(&self) -> Result<PolicyLimits, PolicyError> {
        Ok(self.limits)
    }

    async fn fixed_state(&self) -> Result<Vec<FixedExtension>, PolicyError> {
        let record = self.load().await?;
        let mut fixed: Vec<FixedExtension> = self
            .fixed
            .iter()
            .map(|name| FixedExtension {
                extension: name.clone(),
                blocked: record.fixed.contains(name),
            })
            .collect();
        fixed.sort_by(|a, b| a.extension.cmp(&b.extension));
        Ok(fixed)
    }

    #[instrument(skip(self))]
    async fn set_fixed_blocked(&self, extension: &str, blocked: bool) -> Result<(), PolicyError> {
        let extension = validator::normalize(extension);
        if !self.fixed.contains(&extension) {
            warn!("Rejected toggle of unknown fixed extension: {}", extension);
            return Err(PolicyError::UnknownFixed { extension });
        }

        let _guard = self.lock.lock().await;
        let mut record = self.load().await?;
        record.fixed.retain(|name| name != &extension);
        if blocked {
            record.fixed.push(extension);
        }
        self.save(&record).await
    }

    async fn list_custom(&self) -> Result<Vec<String>, PolicyError> {
        Ok(self.load().await?.custom)
    }

    #[instrument(skip(self))]
    async fn add_custom(&self, extension: &str) -> Result<String, PolicyError> {
        let _guard = self.lock.lock().await;
        let mut record = self.load().await?;

        let policy = reservation_policy(&self.fixed, record.custom.clone(), self.limits);
        let normalized = validator::validate(extension, &policy)?;

        record.custom.push(normalized.clone());
        self.save(&record).await?;
        Ok(normalized)
    }

    #[instrument(skip(self))]
    async fn remove_custom(&self, extension: &str) -> Result<(), PolicyError> {
        let extension = validator::normalize(extension);
        let _guard = self.lock.lock().await;
        let mut record = self.load().await?;

        let before = record.custom.len();
        record.custom.retain(|c| c != &extension);
        if record.custom.len() == before {
            return Err(PolicyError::NotFound { extension });
        }
        self.save(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> FilePolicyStore {
        FilePolicyStore::new(
            dir.path().join("policy.json"),
            "extension-policy",
            &PolicyConfig::default(),
        )
    }

    #[tokio::test]
    async fn empty_file_means_nothing_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        assert!(store.fixed_state().await.unwrap().iter().all(|f| !f.blocked));
        assert!(store.list_custom().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persists_single_record_under_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.set_fixed_blocked("exe", true).await.unwrap();
        store.set_fixed_blocked("bat", true).await.unwrap();
        store.set_fixed_blocked("bat", false).await.unwrap();
        store.add_custom("php").await.unwrap();
        store.add_custom("sh").await.unwrap();

        let raw: Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(
            raw["extension-policy"],
            serde_json::json!({ "fixed": ["exe"], "custom": ["php", "sh"] })
        );
    }

    #[tokio::test]
    async fn other_keys_in_file_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.json");
        std::fs::write(&path, r#"{ "theme": "dark" }"#).unwrap();

        let store = FilePolicyStore::new(&path, "extension-policy", &PolicyConfig::default());
        store.add_custom("php").await.unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
    }

    #[tokio::test]
    async fn validation_and_not_found_match_sqlite_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.add_custom("php").await.unwrap();

        assert!(matches!(
            store.add_custom("php").await,
            Err(PolicyError::Duplicate { .. })
        ));
        assert!(matches!(
            store.add_custom("cmd").await,
            Err(PolicyError::ReservedName { .. })
        ));
        assert!(matches!(
            store.remove_custom("zip").await,
            Err(PolicyError::NotFound { .. })
        ));
        assert!(matches!(
            store.set_fixed_blocked("zip", true).await,
            Err(PolicyError::UnknownFixed { .. })
        ));
        assert_eq!(store.list_custom().await.unwrap(), vec!["php"]);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        std::fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(
            store.list_custom().await,
            Err(PolicyError::Storage { .. })
        ));
    }
}
