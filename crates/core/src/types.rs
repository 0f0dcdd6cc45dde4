use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier;
use crate::error::PolicyError;

/// System-defined extensions shipped with the default configuration.
pub const DEFAULT_FIXED_EXTENSIONS: [&str; 7] = ["bat", "cmd", "com", "cpl", "exe", "scr", "js"];

pub const DEFAULT_MAX_CUSTOM_EXTENSIONS: usize = 200;
pub const DEFAULT_MAX_EXTENSION_LENGTH: usize = 20;

/// A fixed extension. The name never changes, only `blocked` does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedExtension {
    pub extension: String,
    pub blocked: bool,
}

/// Wire shape of one custom extension in `GET /api/custom`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomExtension {
    pub extension: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyLimits {
    pub max_extension_length: usize,
    pub max_custom_extensions: usize,
}

impl Default for PolicyLimits {
    fn default() -> Self {
        Self {
            max_extension_length: DEFAULT_MAX_EXTENSION_LENGTH,
            max_custom_extensions: DEFAULT_MAX_CUSTOM_EXTENSIONS,
        }
    }
}

/// Fixed and custom blocklists plus the limits that bound them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    pub fixed: Vec<FixedExtension>,
    /// Insertion order.
    pub custom: Vec<String>,
    pub limits: PolicyLimits,
}

impl Policy {
    pub fn new(fixed: Vec<FixedExtension>, custom: Vec<String>, limits: PolicyLimits) -> Self {
        Self {
            fixed,
            custom,
            limits,
        }
    }

    pub fn is_fixed(&self, extension: &str) -> bool {
        self.fixed.iter().any(|f| f.extension == extension)
    }

    pub fn is_custom(&self, extension: &str) -> bool {
        self.custom.iter().any(|c| c == extension)
    }

    pub fn is_blocked(&self, extension: &str) -> bool {
        self.fixed
            .iter()
            .any(|f| f.blocked && f.extension == extension)
            || self.is_custom(extension)
    }

    pub fn classify(&self, filename: &str) -> Classification {
        classifier::classify(filename, self)
    }
}

/// Outcome of judging one filename against a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub extension: String,
    pub allowed: bool,
}

/// A file submitted to the upload test.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub title: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// One judged upload attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub file_name: String,
    pub extension: String,
    pub allowed: bool,
    pub upload_time: DateTime<Utc>,
}

impl UploadRecord {
    pub fn new(file_name: &str, classification: Classification) -> Self {
        Self {
            file_name: file_name.to_string(),
            extension: classification.extension,
            allowed: classification.allowed,
            upload_time: Utc::now(),
        }
    }
}

/// `data` payload of `POST /api/upload-test`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadVerdict {
    pub file_name: String,
    pub extension: String,
    pub allowed: bool,
}

impl From<&UploadRecord> for UploadVerdict {
    fn from(record: &UploadRecord) -> Self {
        Self {
            file_name: record.file_name.clone(),
            extension: record.extension.clone(),
            allowed: record.allowed,
        }
    }
}

/// `data` payload of `GET /api/policy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInfo {
    pub max_extension_length: usize,
    pub max_custom_extensions: usize,
    #[serde(default)]
    pub fixed_configured: Vec<String>,
}

impl PolicyInfo {
    pub fn limits(&self) -> PolicyLimits {
        PolicyLimits {
            max_extension_length: self.max_extension_length,
            max_custom_extensions: self.max_custom_extensions,
        }
    }
}

/// Request body of `PATCH /api/fixed/toggle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedToggleRequest {
    pub extension: String,
    pub blocked: bool,
}

/// Request body of `POST /api/custom`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomAddRequest {
    pub extension: String,
}

/// Envelope wrapping every JSON API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PolicyError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: &str, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: PolicyError) -> Self {
        Self {
            success: false,
            message: Some(error.to_string()),
            data: None,
            error: Some(error),
        }
    }

    /// Collapse the envelope into a `Result`, reconstructing the error variant when present.
    pub fn into_result(self) -> Result<Option<T>, PolicyError> {
        if self.success {
            return Ok(self.data);
        }
        Err(self
            .error
            .unwrap_or_else(|| PolicyError::server(self.message)))
    }
}

impl ApiResponse<()> {
    pub fn done(message: &str) -> Self {
        Self {
            success: true,
            message: Some(message.to_string()),
            data: None,
            error: None,
        }
    }
}
