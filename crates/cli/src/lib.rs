use anyhow::Context;
use extguard_console::RemoteClient;
use extguard_core::config::{default_config_dir, AppConfig, StorageBackend};
use extguard_core::judge::LocalJudge;
use extguard_core::metrics::{MetricsSnapshot, MetricsStore};
use extguard_core::{HistoryStore, ObservedPolicyStore, PolicyStore, UploadJudge};
use extguard_persistence::{FilePolicyStore, MemoryHistory, SqlitePolicyStore};
use extguard_server::{AppState, Gateway};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub fn get_config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".extguard"))
        .unwrap_or_else(default_config_dir)
}

/// Policy store and upload judge a command runs against.
#[derive(Clone)]
pub struct Services {
    pub policy: Arc<dyn PolicyStore>,
    pub judge: Arc<dyn UploadJudge>,
    pub metrics: Option<Arc<MetricsStore>>,
    remote: Option<Arc<RemoteClient>>,
}

impl Services {
    /// Open the configured storage backend in-process. Mutations are
    /// audited and counted the same way the server does it.
    pub async fn local(config: &AppConfig) -> anyhow::Result<Self> {
        let (policy, history): (Arc<dyn PolicyStore>, Arc<dyn HistoryStore>) =
            match config.storage.backend {
                StorageBackend::Sqlite => {
                    let store = Arc::new(
                        SqlitePolicyStore::new(&config.storage.database_url, &config.policy)
                            .await?,
                    );
                    (store.clone(), store)
                }
                StorageBackend::File => {
                    let store = Arc::new(FilePolicyStore::new(
                        config.storage.file_path.clone(),
                        &config.storage.key,
                        &config.policy,
                    ));
                    (store, Arc::new(MemoryHistory::new(config.history.limit)))
                }
            };

        let metrics = MetricsStore::new();
        let policy: Arc<dyn PolicyStore> =
            Arc::new(ObservedPolicyStore::new(policy).with_metrics(metrics.clone()));
        let judge = LocalJudge::new(policy.clone(), history, config.history.limit)
            .with_metrics(metrics.clone());
        Ok(Self {
            policy,
            judge: Arc::new(judge),
            metrics: Some(metrics),
            remote: None,
        })
    }

    /// Talk to a running policy server.
    pub fn remote(server_url: &str, auth_token: Option<String>) -> anyhow::Result<Self> {
        let client = Arc::new(
            RemoteClient::new(server_url, auth_token)
                .with_context(|| format!("invalid server url {}", server_url))?,
        );
        Ok(Self {
            policy: client.clone(),
            judge: client.clone(),
            metrics: None,
            remote: Some(client),
        })
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn metrics_snapshot(&self) -> anyhow::Result<MetricsSnapshot> {
        if let Some(client) = &self.remote {
            return Ok(client.metrics().await?);
        }
        self.metrics
            .as_ref()
            .map(|m| m.snapshot())
            .context("no metrics available")
    }
}

/// Make sure the directories the storage backend writes into exist.
pub async fn prepare_storage(config: &AppConfig) -> anyhow::Result<()> {
    let dir = match config.storage.backend {
        StorageBackend::File => config.storage.file_path.parent().map(PathBuf::from),
        StorageBackend::Sqlite => sqlite_file(&config.storage.database_url)
            .and_then(|p| p.parent().map(PathBuf::from)),
    };
    if let Some(dir) = dir.filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

fn sqlite_file(url: &str) -> Option<PathBuf> {
    let path = url.strip_prefix("sqlite://")?;
    let path = path.split('?').next()?;
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(PathBuf::from(path))
}

/// Run the HTTP server until Ctrl-C.
pub async fn serve(config: &AppConfig, port: Option<u16>) -> anyhow::Result<()> {
    prepare_storage(config).await?;
    let services = Services::local(config).await?;
    let metrics = services.metrics.clone().unwrap_or_else(MetricsStore::new);

    let state = AppState {
        policy: services.policy,
        judge: services.judge,
        fixed_configured: Arc::new(config.policy.fixed_extensions.clone()),
        auth_token: config.server.auth_token.clone(),
        metrics,
    };
    let port = port.unwrap_or(config.server.port);
    info!(
        "Starting extension policy server ({:?} storage, {} fixed extensions)",
        config.storage.backend,
        config.policy.fixed_extensions.len()
    );
    Gateway::new(state, port, config.server.max_upload_bytes)
        .start()
        .await
}
