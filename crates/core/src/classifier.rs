//! Upload classification: extension extraction and policy lookup.

use crate::types::{Classification, Policy};

/// Extension of the final path segment, lowercased.
///
/// A name without a dot, with only a leading dot (`.bashrc`) or with a
/// trailing dot yields the empty string.
pub fn extract_extension(filename: &str) -> String {
    let base = filename.rsplit(&['/', '\\'][..]).next().unwrap_or("");
    match base.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < base.len() => base[idx + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// Decide whether `filename` may be uploaded under `policy`.
///
/// Allowed unless the extension is a blocked fixed extension or a custom one.
/// The empty extension goes through the same lookup and matches nothing.
pub fn classify(filename: &str, policy: &Policy) -> Classification {
    let extension = extract_extension(filename);
    let allowed = !policy.is_blocked(&extension);
    Classification { extension, allowed }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FixedExtension, PolicyLimits};

    fn policy() -> Policy {
        Policy::new(
            vec![
                FixedExtension { extension: "exe".into(), blocked: true },
                FixedExtension { extension: "js".into(), blocked: false },
            ],
            vec!["gz".into()],
            PolicyLimits::default(),
        )
    }

    #[test]
    fn unknown_extension_is_allowed_and_lowercased() {
        let c = classify("report.PDF", &policy());
        assert_eq!(c, Classification { extension: "pdf".into(), allowed: true });
    }

    #[test]
    fn blocked_fixed_extension_is_rejected() {
        let c = classify("installer.exe", &policy());
        assert_eq!(c, Classification { extension: "exe".into(), allowed: false });
    }

    #[test]
    fn disabled_fixed_extension_is_allowed() {
        assert!(classify("app.js", &policy()).allowed);
    }

    #[test]
    fn only_last_segment_counts() {
        let c = classify("archive.tar.gz", &policy());
        assert_eq!(c.extension, "gz");
        assert!(!c.allowed);
    }

    #[test]
    fn missing_extension_is_allowed() {
        let c = classify("noext", &policy());
        assert_eq!(c, Classification { extension: String::new(), allowed: true });
    }

    #[test]
    fn path_separators_and_dot_edges() {
        assert_eq!(extract_extension("C:\\tmp\\setup.EXE"), "exe");
        assert_eq!(extract_extension("dir.d/noext"), "");
        assert_eq!(extract_extension(".bashrc"), "");
        assert_eq!(extract_extension("trailing."), "");
        assert_eq!(extract_extension(""), "");
    }
}
