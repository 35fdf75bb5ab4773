//! Parameters and template files.

use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use super::set::{ParameterSet, ParameterValue};
use crate::errors::{ProvisionError, ProvisionResult};

/// Loads a parameters file, treating any problem as an empty set.
///
/// A missing path, a non-existent file or an unparsable document is logged
/// as a warning; callers that need specific parameters validate downstream.
pub async fn load_parameters_file(path: Option<&Path>) -> ParameterSet {
    let Some(path) = path.filter(|p| !p.as_os_str().is_empty()) else {
        debug!("No parameters file provided");
        return ParameterSet::new();
    };

    match try_load_parameters_file(path).await {
        Ok(parameters) => {
            debug!(
                path = %path.display(),
                count = parameters.len(),
                "Loaded parameters file"
            );
            parameters
        }
        Err(e) => {
            warn!(error = %e, "Ignoring parameters file");
            ParameterSet::new()
        }
    }
}

/// Loads a parameters file of the form `{ "parameters": { name: { "value": v } } }`.
async fn try_load_parameters_file(path: &Path) -> ProvisionResult<ParameterSet> {
    let invalid = |reason: String| ProvisionError::InvalidParametersFile {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    if !metadata.is_file() {
        return Err(invalid("not a regular file".to_string()));
    }

    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    let document: Value = serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;

    parameters_from_document(&document).map_err(invalid)
}

/// Extracts the parameter set from a parsed parameters document.
fn parameters_from_document(document: &Value) -> Result<ParameterSet, String> {
    let entries = document
        .get("parameters")
        .and_then(Value::as_object)
        .ok_or_else(|| "missing top-level 'parameters' object".to_string())?;

    let mut parameters = ParameterSet::new();
    for (name, entry) in entries {
        match entry.get("value") {
            Some(value) => parameters.upsert(name.clone(), ParameterValue::from_json(value)),
            None => warn!(parameter = %name, "Skipping parameter without a 'value'"),
        }
    }
    Ok(parameters)
}

/// Loads a deployment template document.
pub async fn load_template(path: &Path) -> ProvisionResult<Value> {
    let invalid = |reason: String| ProvisionError::InvalidTemplate {
        path: path.to_path_buf(),
        reason,
    };

    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| invalid(e.to_string()))?;
    let template: Value = serde_json::from_str(&contents).map_err(|e| invalid(e.to_string()))?;

    if !template.is_object() {
        return Err(invalid("template must be a JSON object".to_string()));
    }
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_loads_parameters_in_file_order() {
        let file = write_temp(
            r#"{
                "$schema": "https://schema.management.azure.com/schemas/2015-01-01/deploymentParameters.json#",
                "parameters": {
                    "size": {"value": "Standard_A1"},
                    "allowClaim": {"value": false},
                    "count": {"value": 2},
                    "location": {"value": "westus"}
                }
            }"#,
        );

        let parameters = load_parameters_file(Some(file.path())).await;
        assert_eq!(parameters.names(), vec!["size", "allowClaim", "count", "location"]);
        assert_eq!(parameters.get("allowClaim"), Some(&ParameterValue::Bool(false)));
        assert_eq!(parameters.get("count"), Some(&ParameterValue::from("2")));
    }

    #[tokio::test]
    async fn test_missing_file_yields_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");

        assert!(load_parameters_file(Some(&missing)).await.is_empty());
        assert!(load_parameters_file(None).await.is_empty());
        assert!(load_parameters_file(Some(Path::new(""))).await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_file_yields_empty_set_but_reports_error() {
        let file = write_temp("{ not json");
        assert!(load_parameters_file(Some(file.path())).await.is_empty());

        let err = try_load_parameters_file(file.path()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidParametersFile { .. }));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_parameters_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = try_load_parameters_file(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not a regular file"));
    }

    #[test]
    fn test_entries_without_value_are_skipped() {
        let doc = serde_json::json!({
            "parameters": {
                "password": {"reference": {"keyVault": {"id": "x"}}},
                "name": {"value": "vm"}
            }
        });
        let parameters = parameters_from_document(&doc).unwrap();
        assert_eq!(parameters.names(), vec!["name"]);
    }

    #[tokio::test]
    async fn test_load_template() {
        let file = write_temp(r#"{"resources": []}"#);
        let template = load_template(file.path()).await.unwrap();
        assert!(template.get("resources").is_some());

        let bad = write_temp("[1, 2]");
        let err = load_template(bad.path()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidTemplate { .. }));
    }
}
