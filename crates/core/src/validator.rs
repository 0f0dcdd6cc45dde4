//! Syntactic and policy checks for candidate custom extensions.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::PolicyError;
use crate::types::Policy;

/// Lowercase letters, digits, '-' and '_', starting with a letter or digit.
/// Dots are excluded: the classifier only ever extracts a dot-free final segment.
static EXTENSION_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9_-]*$").expect("extension pattern compiles"));

/// Trim, lowercase and strip a single leading '.'.
pub fn normalize(candidate: &str) -> String {
    let lowered = candidate.trim().to_lowercase();
    match lowered.strip_prefix('.') {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}

/// Length and charset rule, applied to an already normalized extension.
pub fn check_format(extension: &str, max_length: usize) -> Result<(), PolicyError> {
    let length = extension.chars().count();
    if length == 0 || length > max_length || !EXTENSION_CHARSET.is_match(extension) {
        return Err(PolicyError::BadFormat {
            extension: extension.to_string(),
            max_length,
        });
    }
    Ok(())
}

/// Validate a candidate custom extension against `policy`.
///
/// Checks run in a fixed order: empty, reserved, format, duplicate, limit.
/// A fixed name is therefore always reported as `ReservedName`, even when
/// the custom list is full.
pub fn validate(candidate: &str, policy: &Policy) -> Result<String, PolicyError> {
    let extension = normalize(candidate);

    if extension.is_empty() {
        return Err(PolicyError::EmptyInput);
    }
    if policy.is_fixed(&extension) {
        return Err(PolicyError::ReservedName { extension });
    }
    check_format(&extension, policy.limits.max_extension_length)?;
    if policy.is_custom(&extension) {
        return Err(PolicyError::Duplicate { extension });
    }
    if policy.custom.len() >= policy.limits.max_custom_extensions {
        return Err(PolicyError::LimitReached {
            max: policy.limits.max_custom_extensions,
        });
    }

    Ok(extension)
}
