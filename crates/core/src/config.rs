use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{
    PolicyLimits, DEFAULT_FIXED_EXTENSIONS, DEFAULT_MAX_CUSTOM_EXTENSIONS,
    DEFAULT_MAX_EXTENSION_LENGTH,
};
use crate::validator;

/// Upper bound accepted for `policy.max_extension_length`.
const MAX_EXTENSION_LENGTH_CEILING: usize = 64;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub policy: PolicyConfig,
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// If set, mutating endpoints require `Authorization: Bearer <token>`
    /// and the server binds all interfaces.
    pub auth_token: Option<String>,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            max_upload_bytes: 10 * 1024 * 1024, // 10MB
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct PolicyConfig {
    pub fixed_extensions: Vec<String>,
    pub max_custom_extensions: usize,
    pub max_extension_length: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            fixed_extensions: DEFAULT_FIXED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_custom_extensions: DEFAULT_MAX_CUSTOM_EXTENSIONS,
            max_extension_length: DEFAULT_MAX_EXTENSION_LENGTH,
        }
    }
}

impl PolicyConfig {
    pub fn limits(&self) -> PolicyLimits {
        PolicyLimits {
            max_extension_length: self.max_extension_length,
            max_custom_extensions: self.max_custom_extensions,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    File,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: String,
    pub file_path: PathBuf,
    /// Key the local record is stored under inside `file_path`.
    pub key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let dir = default_config_dir();
        Self {
            backend: StorageBackend::Sqlite,
            database_url: format!("sqlite://{}?mode=rwc", dir.join("extguard.db").display()),
            file_path: dir.join("policy.json"),
            key: "extension-policy".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: 10 }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub auth_token: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            auth_token: None,
        }
    }
}

pub fn default_config_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".extguard")
}

impl AppConfig {
    /// Defaults, then the JSON file, then `EXTGUARD_*` environment variables.
    ///
    /// The file is optional unless `custom_path` names one explicitly.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let required = custom_path.is_some();
        let config_path = custom_path.unwrap_or_else(|| default_config_dir().join("config.json"));

        let s = Config::builder()
            .add_source(File::from(config_path).required(required))
            // EXTGUARD_SERVER__PORT=9000, EXTGUARD_POLICY__FIXED_EXTENSIONS=exe,bat
            .add_source(
                Environment::with_prefix("EXTGUARD")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("policy.fixed_extensions")
                    .try_parsing(true),
            )
            .build()?;

        let mut cfg: AppConfig = s.try_deserialize()?;
        cfg.normalize()?;
        Ok(cfg)
    }

    /// Normalize fixed names and enforce the limits' sanity bounds.
    pub fn normalize(&mut self) -> Result<(), ConfigError> {
        let policy = &mut self.policy;

        if policy.max_custom_extensions == 0 {
            return Err(ConfigError::Message(
                "policy.max_custom_extensions must be at least 1".to_string(),
            ));
        }
        if policy.max_extension_length == 0
            || policy.max_extension_length > MAX_EXTENSION_LENGTH_CEILING
        {
            return Err(ConfigError::Message(format!(
                "policy.max_extension_length must be between 1 and {}",
                MAX_EXTENSION_LENGTH_CEILING
            )));
        }

        let mut fixed: Vec<String> = Vec::with_capacity(policy.fixed_extensions.len());
        for raw in &policy.fixed_extensions {
            let name = validator::normalize(raw);
            validator::check_format(&name, policy.max_extension_length)
                .map_err(|e| ConfigError::Message(format!("policy.fixed_extensions: {}", e)))?;
            if !fixed.contains(&name) {
                fixed.push(name);
            }
        }
        if fixed.is_empty() {
            return Err(ConfigError::Message(
                "policy.fixed_extensions must not be empty".to_string(),
            ));
        }
        policy.fixed_extensions = fixed;

        if self.history.limit == 0 {
            self.history.limit = HistoryConfig::default().limit;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_shipped_policy() {
        let mut cfg = AppConfig::default();
        cfg.normalize().unwrap();
        assert_eq!(cfg.policy.fixed_extensions, DEFAULT_FIXED_EXTENSIONS.to_vec());
        assert_eq!(cfg.policy.limits(), PolicyLimits::default());
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.storage.backend, StorageBackend::Sqlite);
        assert_eq!(cfg.history.limit, 10);
    }

    #[test]
    fn loads_partial_json_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "server": {{ "port": 9090 }},
                "policy": {{ "fixed_extensions": [".EXE", "bat", "exe"], "max_custom_extensions": 5 }},
                "storage": {{ "backend": "file" }}
            }}"#
        )
        .unwrap();

        let cfg = AppConfig::load(Some(path)).unwrap();
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.policy.fixed_extensions, vec!["exe", "bat"]);
        assert_eq!(cfg.policy.max_custom_extensions, 5);
        assert_eq!(cfg.policy.max_extension_length, 20);
        assert_eq!(cfg.storage.backend, StorageBackend::File);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(dir.path().join("absent.json"))).is_err());
    }

    #[test]
    fn rejects_invalid_fixed_names_and_limits() {
        let mut cfg = AppConfig::default();
        cfg.policy.fixed_extensions = vec!["tar.gz".into()];
        assert!(cfg.normalize().is_err());

        let mut cfg = AppConfig::default();
        cfg.policy.max_custom_extensions = 0;
        assert!(cfg.normalize().is_err());

        let mut cfg = AppConfig::default();
        cfg.policy.fixed_extensions.clear();
        assert!(cfg.normalize().is_err());
    }
}
