use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every way a policy operation can fail.
///
/// The enum is serialized into the `error` field of failed API responses
/// (tagged by `code`), so a remote client recovers the exact variant the
/// server produced.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum PolicyError {
    #[error("extension must not be empty")]
    EmptyInput,

    #[error("'{extension}' is not a valid extension: use 1-{max_length} lowercase letters, digits, '-' or '_', starting with a letter or digit")]
    BadFormat { extension: String, max_length: usize },

    #[error("'{extension}' is a fixed extension and cannot be added as a custom one")]
    ReservedName { extension: String },

    #[error("'{extension}' is already in the custom list")]
    Duplicate { extension: String },

    #[error("custom extensions are limited to {max}")]
    LimitReached { max: usize },

    #[error("custom extension '{extension}' does not exist")]
    NotFound { extension: String },

    #[error("'{extension}' is not a configured fixed extension")]
    UnknownFixed { extension: String },

    #[error("network error: {message}")]
    Network { message: String },

    #[error("{message}")]
    Server { message: String },

    #[error("storage error: {message}")]
    Storage { message: String },
}

/// Message shown when the server failed without saying why.
pub const GENERIC_SERVER_ERROR: &str = "a server error occurred";

impl PolicyError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        PolicyError::Storage {
            message: err.to_string(),
        }
    }

    pub fn network(err: impl std::fmt::Display) -> Self {
        PolicyError::Network {
            message: err.to_string(),
        }
    }

    /// Remote failure, falling back to the generic text when the server sent none.
    pub fn server(message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| GENERIC_SERVER_ERROR.to_string());
        PolicyError::Server { message }
    }

    /// Stable wire code, identical to the serde tag.
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::EmptyInput => "empty_input",
            PolicyError::BadFormat { .. } => "bad_format",
            PolicyError::ReservedName { .. } => "reserved_name",
            PolicyError::Duplicate { .. } => "duplicate",
            PolicyError::LimitReached { .. } => "limit_reached",
            PolicyError::NotFound { .. } => "not_found",
            PolicyError::UnknownFixed { .. } => "unknown_fixed",
            PolicyError::Network { .. } => "network",
            PolicyError::Server { .. } => "server",
            PolicyError::Storage { .. } => "storage",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            PolicyError::EmptyInput
            | PolicyError::BadFormat { .. }
            | PolicyError::ReservedName { .. }
            | PolicyError::Duplicate { .. }
            | PolicyError::LimitReached { .. } => 400,
            PolicyError::NotFound { .. } | PolicyError::UnknownFixed { .. } => 404,
            PolicyError::Storage { .. } => 500,
            PolicyError::Network { .. } | PolicyError::Server { .. } => 502,
        }
    }

    /// Whether the failure came from validating user input rather than from I/O.
    pub fn is_validation(&self) -> bool {
        self.http_status() == 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_tag_matches_code() {
        let err = PolicyError::LimitReached { max: 200 };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["code"], err.code());
        assert_eq!(value["max"], 200);

        let back: PolicyError = serde_json::from_value(value).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn unit_variant_serializes_as_code_only() {
        let value = serde_json::to_value(PolicyError::EmptyInput).unwrap();
        assert_eq!(value, serde_json::json!({ "code": "empty_input" }));
    }

    #[test]
    fn server_error_falls_back_to_generic_message() {
        assert_eq!(PolicyError::server(None).to_string(), GENERIC_SERVER_ERROR);
        assert_eq!(PolicyError::server(Some("  ".into())).to_string(), GENERIC_SERVER_ERROR);
        assert_eq!(PolicyError::server(Some("db down".into())).to_string(), "db down");
    }

    #[test]
    fn status_groups() {
        assert!(PolicyError::Duplicate { extension: "php".into() }.is_validation());
        assert_eq!(PolicyError::NotFound { extension: "php".into() }.http_status(), 404);
        assert_eq!(PolicyError::storage("locked").http_status(), 500);
    }
}
