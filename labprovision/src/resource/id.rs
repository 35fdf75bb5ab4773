//! Hierarchical resource identifiers.

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{ProvisionError, ProvisionResult};

/// Segment index of the type keyword that marks a lab-scoped identifier.
const LAB_KEYWORD_INDEX: usize = 6;

/// Type keyword for labs.
pub const LABS: &str = "labs";
/// Type keyword for resource groups.
pub const RESOURCE_GROUPS: &str = "resourcegroups";
/// Type keyword for lab virtual machines.
pub const VIRTUAL_MACHINES: &str = "virtualmachines";

/// A parsed resource identifier.
///
/// The identifier is a slash-delimited path of alternating
/// `(type keyword, name)` pairs, e.g.
/// `/subscriptions/S/resourceGroups/G/providers/P/labs/L/virtualmachines/V`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId {
    raw: String,
    parts: Vec<String>,
}

impl ResourceId {
    /// Parses an identifier, requiring an even segment count of at least 4.
    pub fn parse(raw: impl Into<String>) -> ProvisionResult<Self> {
        let raw = raw.into();
        let parts = split_parts(&raw);

        if parts.len() < 4 {
            return Err(ProvisionError::malformed(
                &raw,
                format!("too few segments ({})", parts.len()),
            ));
        }
        if parts.len() % 2 != 0 {
            return Err(ProvisionError::malformed(
                &raw,
                format!("odd segment count ({})", parts.len()),
            ));
        }

        Ok(Self { raw, parts })
    }

    /// Returns the identifier as originally given.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the decoded, non-empty segments.
    #[must_use]
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// Returns the name paired with `type_keyword`, scanning from the tail.
    ///
    /// Scanning backwards makes child-resource ids resolve to the innermost
    /// occurrence of a keyword.
    pub fn resolve(&self, type_keyword: &str) -> ProvisionResult<&str> {
        self.parts
            .chunks_exact(2)
            .rev()
            .find(|pair| pair[0].eq_ignore_ascii_case(type_keyword))
            .map(|pair| pair[1].as_str())
            .ok_or_else(|| ProvisionError::type_not_found(&self.raw, type_keyword))
    }

    /// Like [`resolve`](Self::resolve), but first requires the identifier to
    /// be a lab or a child of a lab.
    pub fn resolve_lab_scoped(&self, type_keyword: &str) -> ProvisionResult<&str> {
        let is_lab_scoped = self
            .parts
            .get(LAB_KEYWORD_INDEX)
            .is_some_and(|key| key.eq_ignore_ascii_case(LABS));

        if !is_lab_scoped {
            return Err(ProvisionError::malformed(
                &self.raw,
                "not a lab-scoped resource identifier",
            ));
        }

        self.resolve(type_keyword)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = ProvisionError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.raw
    }
}

impl std::str::FromStr for ResourceId {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn split_parts(raw: &str) -> Vec<String> {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    decoded
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolves the name paired with `type_keyword` in a raw identifier.
pub fn resolve(id: &str, type_keyword: &str) -> ProvisionResult<String> {
    ResourceId::parse(id)?.resolve(type_keyword).map(str::to_string)
}

/// Resolves a name from an identifier that must be lab-scoped.
pub fn resolve_lab_scoped(id: &str, type_keyword: &str) -> ProvisionResult<String> {
    ResourceId::parse(id)?
        .resolve_lab_scoped(type_keyword)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VM_ID: &str =
        "/subscriptions/S/resourceGroups/G/providers/Microsoft.DevTestLab/labs/L/virtualmachines/V";

    #[test]
    fn test_resolve_virtual_machine() {
        assert_eq!(resolve(VM_ID, "virtualmachines").unwrap(), "V");
        assert_eq!(resolve(VM_ID, "labs").unwrap(), "L");
        assert_eq!(resolve(VM_ID, "subscriptions").unwrap(), "S");
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        assert_eq!(resolve(VM_ID, "RESOURCEGROUPS").unwrap(), "G");
        assert_eq!(resolve(VM_ID, "VirtualMachines").unwrap(), "V");
    }

    #[test]
    fn test_resolve_tolerates_slashes_and_escapes() {
        let id = "subscriptions/S/resourceGroups/G//labs/L/";
        assert_eq!(resolve(id, "labs").unwrap(), "L");

        let escaped = "%2Fsubscriptions%2FS%2FresourceGroups%2FG";
        assert_eq!(resolve(escaped, "resourcegroups").unwrap(), "G");
    }

    #[test]
    fn test_resolve_prefers_innermost_keyword() {
        let id = "/subscriptions/S/resourceGroups/G/providers/P/labs/outer/labs/inner";
        assert_eq!(resolve(id, "labs").unwrap(), "inner");
    }

    #[test]
    fn test_odd_segment_count_is_malformed() {
        let err = resolve("/subscriptions/S/resourceGroups/G/providers", "providers").unwrap_err();
        assert!(matches!(err, ProvisionError::MalformedIdentifier { .. }));
    }

    #[test]
    fn test_too_short_is_malformed() {
        let err = resolve("/subscriptions/S", "subscriptions").unwrap_err();
        assert!(matches!(err, ProvisionError::MalformedIdentifier { .. }));
    }

    #[test]
    fn test_absent_keyword_is_type_not_found() {
        let err = resolve(VM_ID, "environments").unwrap_err();
        match err {
            ProvisionError::TypeNotFound { type_keyword, .. } => {
                assert_eq!(type_keyword, "environments");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_lab_scoped_resolution() {
        assert_eq!(resolve_lab_scoped(VM_ID, "resourcegroups").unwrap(), "G");

        let not_a_lab =
            "/subscriptions/S/resourceGroups/G/providers/Microsoft.Compute/virtualMachines/V";
        let err = resolve_lab_scoped(not_a_lab, "virtualmachines").unwrap_err();
        assert!(matches!(err, ProvisionError::MalformedIdentifier { .. }));

        let short = "/subscriptions/S/resourceGroups/G";
        assert!(resolve_lab_scoped(short, "resourcegroups").is_err());
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let id: ResourceId = serde_json::from_value(serde_json::json!(VM_ID)).unwrap();
        assert_eq!(id.as_str(), VM_ID);
        assert!(serde_json::from_value::<ResourceId>(serde_json::json!("/a/b/c")).is_err());
    }
}
