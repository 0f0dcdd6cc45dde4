use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use extguard_core::config::PolicyConfig;
use extguard_core::types::FixedExtension;
use extguard_core::{validator, HistoryStore, PolicyError, PolicyLimits, PolicyStore, UploadRecord};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::reservation_policy;

/// Server-side store backed by SQLite.
#[derive(Clone)]
pub struct SqlitePolicyStore {
    pool: SqlitePool,
    fixed: Arc<Vec<String>>,
    limits: PolicyLimits,
}

fn db_err(e: sqlx::Error) -> PolicyError {
    PolicyError::storage(e)
}

impl SqlitePolicyStore {
    pub async fn new(database_url: &str, policy: &PolicyConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to SQLite database")?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        let store = Self {
            pool,
            fixed: Arc::new(policy.fixed_extensions.clone()),
            limits: policy.limits(),
        };
        let created = store.seed_fixed().await?;
        info!(
            "SqlitePolicyStore initialized ({} fixed extensions, {} newly seeded)",
            store.fixed.len(),
            created
        );
        Ok(store)
    }

    /// Insert configured fixed extensions that are missing, as not blocked.
    /// Rows that already exist keep their state.
    async fn seed_fixed(&self) -> Result<u64> {
        let mut created = 0;
        for name in self.fixed.iter() {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO fixed_extensions (extension, blocked)
                VALUES (?, 0)
                "#,
            )
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to seed fixed extension {}", name))?;
            if result.rows_affected() > 0 {
                debug!("Seeded fixed extension: {}", name);
            }
            created += result.rows_affected();
        }
        Ok(created)
    }
}

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn limits(&self) -> Result<PolicyLimits, PolicyError> {
        Ok(self.limits)
    }

    #[instrument(skip(self))]
    async fn fixed_state(&self) -> Result<Vec<FixedExtension>, PolicyError> {
        let rows = sqlx::query_as::<_, (String, bool)>(
            "SELECT extension, blocked FROM fixed_extensions ORDER BY extension ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        // Rows for names dropped from configuration are kept but not exposed.
        Ok(rows
            .into_iter()
            .filter(|(extension, _)| self.fixed.contains(extension))
            .map(|(extension, blocked)| FixedExtension { extension, blocked })
            .collect())
    }

    #[instrument(skip(self))]
    async fn set_fixed_blocked(&self, extension: &str, blocked: bool) -> Result<(), PolicyError> {
        let extension = validator::normalize(extension);
        if !self.fixed.contains(&extension) {
            warn!("Rejected toggle of unknown fixed extension: {}", extension);
            return Err(PolicyError::UnknownFixed { extension });
        }

        sqlx::query(
            r#"
            INSERT INTO fixed_extensions (extension, blocked, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(extension) DO UPDATE SET
                blocked = excluded.blocked,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&extension)
        .bind(blocked)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_custom(&self) -> Result<Vec<String>, PolicyError> {
        sqlx::query_scalar::<_, String>("SELECT extension FROM custom_extensions ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    #[instrument(skip(self))]
    async fn add_custom(&self, extension: &str) -> Result<String, PolicyError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let current = sqlx::query_scalar::<_, String>(
            "SELECT extension FROM custom_extensions ORDER BY id ASC",
        )
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        let policy = reservation_policy(&self.fixed, current, self.limits);
        let normalized = validator::validate(extension, &policy)?;

        let inserted = sqlx::query("INSERT INTO custom_extensions (extension) VALUES (?)")
            .bind(&normalized)
            .execute(&mut *tx)
            .await;
        if let Err(e) = inserted {
            let unique = e
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation());
            return Err(if unique {
                PolicyError::Duplicate {
                    extension: normalized,
                }
            } else {
                db_err(e)
            });
        }

        tx.commit().await.map_err(db_err)?;
        Ok(normalized)
    }

    #[instrument(skip(self))]
    async fn remove_custom(&self, extension: &str) -> Result<(), PolicyError> {
        let extension = validator::normalize(extension);
        let result = sqlx::query("DELETE FROM custom_extensions WHERE extension = ?")
            .bind(&extension)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(PolicyError::NotFound { extension });
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqlitePolicyStore {
    #[instrument(skip(self, record), fields(file_name = %record.file_name))]
    async fn record(&self, record: &UploadRecord) -> Result<(), PolicyError> {
        sqlx::query(
            r#"
            INSERT INTO upload_history (file_name, extension, allowed, upload_time)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&record.file_name)
        .bind(&record.extension)
        .bind(record.allowed)
        .bind(record.upload_time)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn recent(&self, limit: usize) -> Result<Vec<UploadRecord>, PolicyError> {
        let rows = sqlx::query_as::<_, (String, String, bool, DateTime<Utc>)>(
            r#"
            SELECT file_name, extension, allowed, upload_time
            FROM upload_history
            ORDER BY upload_time DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .map(|(file_name, extension, allowed, upload_time)| UploadRecord {
                file_name,
                extension,
                allowed,
                upload_time,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use extguard_core::Classification;
    use tempfile::TempDir;

    async fn open(dir: &TempDir, policy: &PolicyConfig) -> SqlitePolicyStore {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        SqlitePolicyStore::new(&url, policy).await.unwrap()
    }

    fn small_policy(max_custom: usize) -> PolicyConfig {
        PolicyConfig {
            max_custom_extensions: max_custom,
            ..PolicyConfig::default()
        }
    }

    #[tokio::test]
    async fn seeds_fixed_extensions_unblocked_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, &PolicyConfig::default()).await;

        let fixed = store.fixed_state().await.unwrap();
        let names: Vec<_> = fixed.iter().map(|f| f.extension.as_str()).collect();
        assert_eq!(names, vec!["bat", "cmd", "com", "cpl", "exe", "js", "scr"]);
        assert!(fixed.iter().all(|f| !f.blocked));
    }

    #[tokio::test]
    async fn toggle_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(&dir, &PolicyConfig::default()).await;
            store.set_fixed_blocked("EXE", true).await.unwrap();
        }
        let store = open(&dir, &PolicyConfig::default()).await;
        let exe = store
            .fixed_state()
            .await
            .unwrap()
            .into_iter()
            .find(|f| f.extension == "exe")
            .unwrap();
        assert!(exe.blocked);
    }

    #[tokio::test]
    async fn toggle_unknown_fixed_fails_without_change() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, &PolicyConfig::default()).await;
        let before = store.fixed_state().await.unwrap();

        let err = store.set_fixed_blocked("pdf", true).await.unwrap_err();
        assert_eq!(err, PolicyError::UnknownFixed { extension: "pdf".into() });
        assert_eq!(store.fixed_state().await.unwrap(), before);
    }

    #[tokio::test]
    async fn custom_add_keeps_insertion_order_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, &PolicyConfig::default()).await;

        assert_eq!(store.add_custom(" .SH ").await.unwrap(), "sh");
        store.add_custom("php").await.unwrap();
        store.add_custom("asp").await.unwrap();
        assert_eq!(store.list_custom().await.unwrap(), vec!["sh", "php", "asp"]);

        assert_eq!(
            store.add_custom("PHP").await.unwrap_err(),
            PolicyError::Duplicate { extension: "php".into() }
        );
        assert_eq!(
            store.add_custom("exe").await.unwrap_err(),
            PolicyError::ReservedName { extension: "exe".into() }
        );
        assert!(matches!(
            store.add_custom("tar.gz").await.unwrap_err(),
            PolicyError::BadFormat { .. }
        ));
    }

    #[tokio::test]
    async fn custom_limit_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, &small_policy(2)).await;
        store.add_custom("a").await.unwrap();
        store.add_custom("b").await.unwrap();

        assert_eq!(
            store.add_custom("c").await.unwrap_err(),
            PolicyError::LimitReached { max: 2 }
        );
        // Reserved wins over the limit.
        assert!(matches!(
            store.add_custom("bat").await.unwrap_err(),
            PolicyError::ReservedName { .. }
        ));
        assert_eq!(store.list_custom().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn removing_absent_custom_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, &PolicyConfig::default()).await;
        store.add_custom("php").await.unwrap();

        assert_eq!(
            store.remove_custom("sh").await.unwrap_err(),
            PolicyError::NotFound { extension: "sh".into() }
        );
        assert_eq!(store.list_custom().await.unwrap(), vec!["php"]);

        store.remove_custom("PHP").await.unwrap();
        assert!(store.list_custom().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(&dir, &PolicyConfig::default()).await;
        let base = Utc::now();

        for i in 0..12 {
            let mut record = UploadRecord::new(
                &format!("file{}.txt", i),
                Classification { extension: "txt".into(), allowed: true },
            );
            record.upload_time = base + Duration::seconds(i);
            store.record(&record).await.unwrap();
        }

        let recent = store.recent(10).await.unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].file_name, "file11.txt");
        assert_eq!(recent[9].file_name, "file2.txt");
    }
}
