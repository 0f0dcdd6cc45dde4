use async_trait::async_trait;
use chrono::Utc;
use extguard_core::metrics::MetricsSnapshot;
use extguard_core::types::{
    CustomAddRequest, CustomExtension, FixedExtension, FixedToggleRequest, PolicyInfo,
    UploadVerdict,
};
use extguard_core::{
    ApiResponse, PolicyError, PolicyLimits, PolicyStore, UploadJudge, UploadRecord,
    UploadRequest,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// HTTP client for the policy server. Implements both [`PolicyStore`] and
/// [`UploadJudge`], so the views can run against a remote server unchanged.
#[derive(Clone)]
pub struct RemoteClient {
    http: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl RemoteClient {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, PolicyError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(PolicyError::network)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and unwrap the response envelope.
    async fn call<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Option<T>, PolicyError> {
        let req = match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req.send().await.map_err(PolicyError::network)?;
        let status = resp.status();
        debug!("Policy server responded {}", status);

        let envelope: ApiResponse<T> = resp.json().await.map_err(|e| {
            PolicyError::server(Some(format!("unexpected response ({}): {}", status, e)))
        })?;
        envelope.into_result()
    }

    async fn call_data<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, PolicyError> {
        self.call(req)
            .await?
            .ok_or_else(|| PolicyError::server(Some("response carried no data".to_string())))
    }

    pub async fn policy_info(&self) -> Result<PolicyInfo, PolicyError> {
        self.call_data(self.http.get(self.url("/api/policy"))).await
    }

    /// Server counters. This endpoint answers with a bare snapshot, not an envelope.
    pub async fn metrics(&self) -> Result<MetricsSnapshot, PolicyError> {
        let mut req = self.http.get(self.url("/api/monitor/metrics"));
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.map_err(PolicyError::network)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PolicyError::server(Some(format!(
                "metrics request failed ({})",
                status
            ))));
        }
        resp.json().await.map_err(PolicyError::network)
    }
}

#[async_trait]
impl PolicyStore for RemoteClient {
    async fn limits(&self) -> Result<PolicyLimits, PolicyError> {
        Ok(self.policy_info().await?.limits())
    }

    #[instrument(skip(self))]
    async fn fixed_state(&self) -> Result<Vec<FixedExtension>, PolicyError> {
        self.call_data(self.http.get(self.url("/api/fixed"))).await
    }

    #[instrument(skip(self))]
    async fn set_fixed_blocked(&self, extension: &str, blocked: bool) -> Result<(), PolicyError> {
        let body = FixedToggleRequest {
            extension: extension.to_string(),
            blocked,
        };
        self.call::<serde_json::Value>(self.http.patch(self.url("/api/fixed/toggle")).json(&body))
            .await
            .map(|_| ())
    }

    #[instrument(skip(self))]
    async fn list_custom(&self) -> Result<Vec<String>, PolicyError> {
        let list: Vec<CustomExtension> = self.call_data(self.http.get(self.url("/api/custom"))).await?;
        Ok(list.into_iter().map(|c| c.extension).collect())
    }

    #[instrument(skip(self))]
    async fn add_custom(&self, extension: &str) -> Result<String, PolicyError> {
        let body = CustomAddRequest {
            extension: extension.to_string(),
        };
        let added: CustomExtension = self
            .call_data(self.http.post(self.url("/api/custom")).json(&body))
            .await?;
        Ok(added.extension)
    }

    #[instrument(skip(self))]
    async fn remove_custom(&self, extension: &str) -> Result<(), PolicyError> {
        let url = self.url(&format!("/api/custom/{}", urlencoding::encode(extension)));
        self.call::<serde_json::Value>(self.http.delete(url))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl UploadJudge for RemoteClient {
    #[instrument(skip(self, upload), fields(file_name = %upload.file_name))]
    async fn judge(&self, upload: &UploadRequest) -> Result<UploadRecord, PolicyError> {
        let form = Form::new().text("title", upload.title.clone()).part(
            "file",
            Part::bytes(upload.bytes.clone()).file_name(upload.file_name.clone()),
        );
        let verdict: UploadVerdict = self
            .call_data(self.http.post(self.url("/api/upload-test")).multipart(form))
            .await?;

        Ok(UploadRecord {
            file_name: verdict.file_name,
            extension: verdict.extension,
            allowed: verdict.allowed,
            upload_time: Utc::now(),
        })
    }

    async fn recent(&self) -> Result<Vec<UploadRecord>, PolicyError> {
        self.call_data(self.http.get(self.url("/api/upload-history")))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extguard_core::config::PolicyConfig;
    use extguard_core::judge::LocalJudge;
    use extguard_core::metrics::MetricsStore;
    use extguard_persistence::{FilePolicyStore, MemoryHistory};
    use extguard_server::AppState;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn spawn_server(dir: &TempDir) -> String {
        let config = PolicyConfig {
            max_custom_extensions: 2,
            ..PolicyConfig::default()
        };
        let policy: Arc<dyn PolicyStore> = Arc::new(FilePolicyStore::new(
            dir.path().join("policy.json"),
            "extension-policy",
            &config,
        ));
        let judge = LocalJudge::new(policy.clone(), Arc::new(MemoryHistory::new(10)), 10);
        let state = AppState {
            policy,
            judge: Arc::new(judge),
            fixed_configured: Arc::new(config.fixed_extensions.clone()),
            auth_token: None,
            metrics: MetricsStore::new(),
        };
        let app = extguard_server::router(state, 1024 * 1024);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn remote_store_round_trips_policy_and_errors() {
        let dir = tempfile::tempdir().unwrap();
        let client = RemoteClient::new(&spawn_server(&dir).await, None).unwrap();

        assert_eq!(client.limits().await.unwrap().max_custom_extensions, 2);

        client.set_fixed_blocked("exe", true).await.unwrap();
        let fixed = client.fixed_state().await.unwrap();
        assert!(fixed.iter().any(|f| f.extension == "exe" && f.blocked));

        assert_eq!(client.add_custom(".PHP").await.unwrap(), "php");
        client.add_custom("sh").await.unwrap();
        assert_eq!(
            client.add_custom("asp").await.unwrap_err(),
            PolicyError::LimitReached { max: 2 }
        );
        assert_eq!(
            client.add_custom("exe").await.unwrap_err(),
            PolicyError::ReservedName { extension: "exe".into() }
        );
        assert_eq!(client.list_custom().await.unwrap(), vec!["php", "sh"]);

        assert_eq!(
            client.remove_custom("zip").await.unwrap_err(),
            PolicyError::NotFound { extension: "zip".into() }
        );
        client.remove_custom("php").await.unwrap();
        assert_eq!(client.list_custom().await.unwrap(), vec!["sh"]);
    }

    #[tokio::test]
    async fn removal_path_survives_reserved_characters() {
        let dir = tempfile::tempdir().unwrap();
        let client = RemoteClient::new(&spawn_server(&dir).await, None).unwrap();

        assert_eq!(
            client.remove_custom("a/b c").await.unwrap_err(),
            PolicyError::NotFound { extension: "a/b c".into() }
        );
        assert_eq!(
            client.remove_custom("x?y#z").await.unwrap_err(),
            PolicyError::NotFound { extension: "x?y#z".into() }
        );
    }

    #[tokio::test]
    async fn remote_judge_classifies_and_lists_history() {
        let dir = tempfile::tempdir().unwrap();
        let client = RemoteClient::new(&spawn_server(&dir).await, None).unwrap();
        client.set_fixed_blocked("exe", true).await.unwrap();

        let record = client
            .judge(&UploadRequest {
                title: "t".into(),
                file_name: "setup.exe".into(),
                bytes: b"MZ".to_vec(),
            })
            .await
            .unwrap();
        assert!(!record.allowed);
        assert_eq!(record.extension, "exe");

        let recent = UploadJudge::recent(&client).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].file_name, "setup.exe");
    }

    #[tokio::test]
    async fn unreachable_server_is_network_error() {
        let client = RemoteClient::new("http://127.0.0.1:9", None).unwrap();
        assert!(matches!(
            client.list_custom().await,
            Err(PolicyError::Network { .. })
        ));
    }
}
