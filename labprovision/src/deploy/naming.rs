//! Deployment and resource naming across attempts.

use uuid::Uuid;

/// Prefix used for generated deployment names.
pub const DEFAULT_DEPLOYMENT_PREFIX: &str = "Dtl";

/// Generates a fresh deployment name: `prefix` followed by a simple UUID v4.
#[must_use]
pub fn deployment_name(prefix: &str) -> String {
    format!("{prefix}{}", Uuid::new_v4().simple())
}

/// Returns the resource name to use for `attempt`.
///
/// If `name` ends with the digits of the previous attempt number, exactly
/// that suffix is replaced; otherwise the attempt number is appended. Names
/// therefore never accumulate suffixes (`vm` → `vm2` → `vm3`).
#[must_use]
pub fn suffix_for_attempt(name: &str, attempt: u32) -> String {
    let previous = attempt.saturating_sub(1).to_string();
    let stem = name.strip_suffix(previous.as_str()).unwrap_or(name);
    format!("{stem}{attempt}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_names_are_unique_and_prefixed() {
        let a = deployment_name(DEFAULT_DEPLOYMENT_PREFIX);
        let b = deployment_name(DEFAULT_DEPLOYMENT_PREFIX);

        assert!(a.starts_with("Dtl"));
        assert_eq!(a.len(), 3 + 32);
        assert!(!a.contains('-'));
        assert_ne!(a, b);
    }

    #[test]
    fn test_suffix_appends_to_plain_name() {
        assert_eq!(suffix_for_attempt("vm", 2), "vm2");
    }

    #[test]
    fn test_suffix_replaces_previous_attempt() {
        assert_eq!(suffix_for_attempt("vm2", 3), "vm3");
        assert_eq!(suffix_for_attempt("vm9", 10), "vm10");
        assert_eq!(suffix_for_attempt("vm10", 11), "vm11");
    }

    #[test]
    fn test_suffix_chain_never_accumulates() {
        let mut name = "build-agent".to_string();
        for attempt in 2..=4 {
            name = suffix_for_attempt(&name, attempt);
        }
        assert_eq!(name, "build-agent4");
    }

    #[test]
    fn test_suffix_keeps_unrelated_digits() {
        assert_eq!(suffix_for_attempt("win10", 3), "win103");
    }
}
