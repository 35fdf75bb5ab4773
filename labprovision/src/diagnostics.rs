//! Best-effort decoding of remote diagnostic payloads.
//!
//! Remote services embed JSON documents inside error bodies and artifact
//! status messages. Decoding never fails: anything that does not parse is
//! surfaced verbatim as [`DecodedMessage::Raw`].

use serde_json::Value;
use std::fmt;

/// A diagnostic message after a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedMessage {
    /// A structured payload was found and reduced to readable text.
    Parsed(String),
    /// The payload was not structured; the original text is kept.
    Raw(String),
}

impl DecodedMessage {
    /// Returns the message text regardless of how it was obtained.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Parsed(s) | Self::Raw(s) => s,
        }
    }

    /// Returns true if the payload was structured.
    #[must_use]
    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Decodes an artifact status message.
///
/// Extension status messages are usually a JSON array of sub-statuses, each
/// with a `message`; deployment status messages may be a JSON object with a
/// `message` or `error.message`.
#[must_use]
pub fn decode_status_message(raw: &str) -> DecodedMessage {
    let Ok(value) = serde_json::from_str::<Value>(raw) else {
        return DecodedMessage::Raw(raw.to_string());
    };

    let parsed = match &value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("message").and_then(Value::as_str))
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .collect();
            (!messages.is_empty()).then(|| messages.join("; "))
        }
        Value::Object(_) => value
            .get("message")
            .or_else(|| value.pointer("/error/message"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };

    parsed.map_or_else(|| DecodedMessage::Raw(raw.to_string()), DecodedMessage::Parsed)
}

/// Decodes a remote deployment error body into `code`/`message` text.
///
/// Produces `Error => code: '<c>'; message: '<m>'` followed by one
/// ` InnerError => ...` segment per detail entry.
#[must_use]
pub fn decode_remote_error(body: &str) -> DecodedMessage {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return DecodedMessage::Raw(body.trim().to_string());
    };

    let Some(error) = locate_error(&value) else {
        return DecodedMessage::Raw(body.trim().to_string());
    };

    let code = string_field(error, "code");
    let message = string_field(error, "message");
    let mut out = format!("Error => code: '{code}'; message: '{message}'");

    if let Some(details) = error.get("details").and_then(Value::as_array) {
        for detail in details {
            out.push_str(&inner_error(detail));
        }
    }

    DecodedMessage::Parsed(out)
}

/// Convenience wrapper returning the decoded text.
#[must_use]
pub fn describe_remote_error(body: &str) -> String {
    decode_remote_error(body).text().to_string()
}

fn locate_error(value: &Value) -> Option<&Value> {
    let candidate = value
        .get("error")
        .or_else(|| value.pointer("/properties/error"))
        .or_else(|| value.pointer("/body/error"))
        .unwrap_or(value);

    let has_fields = candidate.get("code").is_some() || candidate.get("message").is_some();
    has_fields.then_some(candidate)
}

fn inner_error(detail: &Value) -> String {
    let code = string_field(detail, "code");
    let mut message = string_field(detail, "message");

    // Detail messages are sometimes a serialized error document of their own.
    if let Ok(nested) = serde_json::from_str::<Value>(&message) {
        if let Some(nested_details) = nested.pointer("/error/details").and_then(Value::as_array) {
            for nested_detail in nested_details {
                message.push_str(&inner_error(nested_detail));
            }
        }
    }

    format!(" InnerError => code: '{code}'; message: '{message}'")
}

fn string_field(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_message_array_of_substatuses() {
        let raw = r#"[{"code":"ComponentStatus/StdOut/succeeded","message":""},{"code":"ComponentStatus/StdErr/succeeded","message":"choco: not found"}]"#;
        assert_eq!(
            decode_status_message(raw),
            DecodedMessage::Parsed("choco: not found".to_string())
        );
    }

    #[test]
    fn test_status_message_object() {
        let raw = r#"{"status":"failed","message":"script exited with 3"}"#;
        let decoded = decode_status_message(raw);
        assert!(decoded.is_parsed());
        assert_eq!(decoded.text(), "script exited with 3");
    }

    #[test]
    fn test_status_message_raw_fallback() {
        let decoded = decode_status_message("plain failure text");
        assert_eq!(decoded, DecodedMessage::Raw("plain failure text".to_string()));
        assert_eq!(decoded.to_string(), "plain failure text");
    }

    #[test]
    fn test_remote_error_with_details() {
        let body = r#"{
            "error": {
                "code": "DeploymentFailed",
                "message": "At least one resource deployment operation failed.",
                "details": [
                    {"code": "Conflict", "message": "VM name already in use"}
                ]
            }
        }"#;

        assert_eq!(
            describe_remote_error(body),
            "Error => code: 'DeploymentFailed'; message: 'At least one resource deployment \
             operation failed.' InnerError => code: 'Conflict'; message: 'VM name already in use'"
        );
    }

    #[test]
    fn test_remote_error_nested_detail_document() {
        let nested = r#"{"error":{"details":[{"code":"QuotaExceeded","message":"cores"}]}}"#;
        let body = serde_json::json!({
            "error": {
                "code": "DeploymentFailed",
                "message": "failed",
                "details": [{"code": "BadRequest", "message": nested}]
            }
        })
        .to_string();

        let text = describe_remote_error(&body);
        assert!(text.contains("InnerError => code: 'BadRequest'"));
        assert!(text.contains(" InnerError => code: 'QuotaExceeded'; message: 'cores'"));
    }

    #[test]
    fn test_remote_error_from_provisioning_properties() {
        let body = r#"{"properties":{"provisioningState":"Failed","error":{"code":"VMStartTimedOut","message":"boot"}}}"#;
        assert_eq!(
            describe_remote_error(body),
            "Error => code: 'VMStartTimedOut'; message: 'boot'"
        );
    }

    #[test]
    fn test_remote_error_unstructured_body() {
        assert_eq!(
            decode_remote_error("  gateway timeout \n"),
            DecodedMessage::Raw("gateway timeout".to_string())
        );
        assert_eq!(
            decode_remote_error(r#"{"unrelated": true}"#),
            DecodedMessage::Raw(r#"{"unrelated": true}"#.to_string())
        );
    }
}
