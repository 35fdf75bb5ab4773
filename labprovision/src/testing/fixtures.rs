//! Shared identifiers, templates and payloads for tests.

use serde_json::{json, Value};

use crate::services::{ArtifactRecord, ArtifactStatus, LabVirtualMachine};

/// Identifier of the lab used by fixtures.
pub const LAB_ID: &str =
    "/subscriptions/sub-1/resourceGroups/lab-rg/providers/Microsoft.DevTestLab/labs/lab1";

/// Returns the id of lab virtual machine `name` in [`LAB_ID`].
#[must_use]
pub fn vm_id(name: &str) -> String {
    format!("{LAB_ID}/virtualmachines/{name}")
}

/// A lab VM template declaring one artifact per entry of `artifacts`.
#[must_use]
pub fn lab_vm_template(artifacts: &[&str]) -> Value {
    let artifact_refs: Vec<Value> = artifacts
        .iter()
        .map(|name| {
            json!({
                "artifactId": format!("[resourceId('Microsoft.DevTestLab/labs/artifactSources/artifacts', parameters('labName'), 'public repo', '{name}')]")
            })
        })
        .collect();

    json!({
        "$schema": "https://schema.management.azure.com/schemas/2015-01-01/deploymentTemplate.json#",
        "contentVersion": "1.0.0.0",
        "parameters": {
            "newVMName": {"type": "string"},
            "labName": {"type": "string"},
            "size": {"type": "string", "defaultValue": "Standard_A1"}
        },
        "resources": [
            {
                "apiVersion": "2018-09-15",
                "type": "Microsoft.DevTestLab/labs/virtualmachines",
                "name": "[concat(parameters('labName'), '/', parameters('newVMName'))]",
                "properties": {
                    "size": "[parameters('size')]",
                    "artifacts": artifact_refs
                }
            }
        ]
    })
}

/// A deployment error body with one inner detail.
#[must_use]
pub fn failed_deployment_body(code: &str, message: &str) -> String {
    json!({
        "error": {
            "code": "DeploymentFailed",
            "message": "At least one resource deployment operation failed.",
            "details": [{"code": code, "message": message}]
        }
    })
    .to_string()
}

/// A lab VM snapshot whose artifacts all have `status`.
#[must_use]
pub fn lab_vm(name: &str, artifacts: &[(&str, ArtifactStatus)]) -> LabVirtualMachine {
    LabVirtualMachine {
        name: name.to_string(),
        provisioning_state: "Succeeded".to_string(),
        artifacts: artifacts
            .iter()
            .map(|(artifact, status)| ArtifactRecord::new(*artifact, *status))
            .collect(),
    }
}
