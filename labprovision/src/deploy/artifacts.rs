//! Artifact verification for a provisioned lab virtual machine.

use serde_json::Value;
use tracing::{info, warn};

use crate::diagnostics::decode_status_message;
use crate::errors::{ArtifactFailureLine, ProvisionError, ProvisionResult};
use crate::resource::{ResourceId, LABS, RESOURCE_GROUPS, VIRTUAL_MACHINES};
use crate::services::{ArtifactStatus, ArtifactSummary, LabService, LabVirtualMachine};

const VIRTUAL_MACHINE_TYPE_SUFFIX: &str = "virtualmachines";

/// Counts the artifacts the template declares for its virtual machine.
///
/// Looks for the first resource whose `type` ends with `virtualmachines`
/// (case-insensitive) and returns the length of its `properties.artifacts`.
/// Templates without such a resource declare no artifacts.
#[must_use]
pub fn expected_artifact_count(template: &Value) -> usize {
    template
        .get("resources")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .find(|resource| {
            resource
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|t| t.to_ascii_lowercase().ends_with(VIRTUAL_MACHINE_TYPE_SUFFIX))
        })
        .and_then(|resource| resource.pointer("/properties/artifacts"))
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

/// Checks a virtual machine snapshot against the expected artifact count.
///
/// Fails if any artifact reported `Failed` or fewer than `expected`
/// artifacts reported `Succeeded`.
pub fn check_artifacts(
    vm: &LabVirtualMachine,
    expected: usize,
    attempt: u32,
) -> ProvisionResult<ArtifactSummary> {
    let summary = ArtifactSummary::from_records(&vm.artifacts);
    if summary.failed == 0 && summary.succeeded >= expected {
        return Ok(summary);
    }

    let failures = vm
        .artifacts
        .iter()
        .filter(|record| record.status == ArtifactStatus::Failed)
        .map(|record| {
            let decoded: Vec<String> = record
                .messages()
                .map(|m| decode_status_message(m).text().to_string())
                .collect();
            ArtifactFailureLine {
                name: record.name.clone(),
                message: if decoded.is_empty() {
                    "no status message reported".to_string()
                } else {
                    decoded.join("; ")
                },
            }
        })
        .collect();

    Err(ProvisionError::ArtifactFailure {
        attempt,
        vm_name: vm.name.clone(),
        expected,
        succeeded: summary.succeeded,
        failures,
    })
}

/// Fetches the live virtual machine and verifies its artifacts.
pub async fn verify_artifacts(
    lab: &dyn LabService,
    resource_id: &ResourceId,
    template: &Value,
    attempt: u32,
) -> ProvisionResult<ArtifactSummary> {
    let resource_group = resource_id.resolve_lab_scoped(RESOURCE_GROUPS)?;
    let lab_name = resource_id.resolve_lab_scoped(LABS)?;
    let vm_name = resource_id.resolve_lab_scoped(VIRTUAL_MACHINES)?;
    let expected = expected_artifact_count(template);

    let vm = lab
        .get_virtual_machine(resource_group, lab_name, vm_name, true)
        .await?;

    match check_artifacts(&vm, expected, attempt) {
        Ok(summary) => {
            info!(vm_name = %vm_name, expected, summary = %summary, "Artifacts verified");
            Ok(summary)
        }
        Err(e) => {
            warn!(vm_name = %vm_name, attempt, "Artifact verification failed");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ArtifactRecord;
    use crate::testing::{lab_vm, lab_vm_template, vm_id, ScriptedLabService};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_expected_count_from_template() {
        assert_eq!(expected_artifact_count(&lab_vm_template(&["git", "node"])), 2);
        assert_eq!(expected_artifact_count(&lab_vm_template(&[])), 0);
    }

    #[test]
    fn test_expected_count_matches_type_case_insensitively() {
        let template = json!({
            "resources": [
                {"type": "Microsoft.Network/virtualNetworks", "properties": {"artifacts": [1, 2, 3]}},
                {"type": "Microsoft.DevTestLab/labs/VirtualMachines", "properties": {"artifacts": [{}]}}
            ]
        });
        assert_eq!(expected_artifact_count(&template), 1);
        assert_eq!(expected_artifact_count(&json!({})), 0);
    }

    #[test]
    fn test_all_succeeded_passes() {
        let vm = lab_vm(
            "vm1",
            &[("git", ArtifactStatus::Succeeded), ("node", ArtifactStatus::Succeeded)],
        );
        let summary = check_artifacts(&vm, 2, 1).unwrap();
        assert_eq!(summary.succeeded, 2);
    }

    #[test]
    fn test_failed_artifact_reports_decoded_messages() {
        let mut vm = lab_vm("vm1", &[("node", ArtifactStatus::Succeeded)]);
        vm.artifacts.push(
            ArtifactRecord::new("git", ArtifactStatus::Failed)
                .with_extension_message(r#"[{"code":"ComponentStatus/StdErr","message":"choco not found"}]"#),
        );
        vm.artifacts.push(
            ArtifactRecord::new("vs", ArtifactStatus::Failed).with_deployment_message("plain failure"),
        );

        let err = check_artifacts(&vm, 3, 2).unwrap_err();
        match &err {
            ProvisionError::ArtifactFailure {
                attempt,
                succeeded,
                failures,
                ..
            } => {
                assert_eq!(*attempt, 2);
                assert_eq!(*succeeded, 1);
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].message, "choco not found");
                assert_eq!(failures[1].message, "plain failure");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("Artifact 'git': choco not found"));
    }

    #[test]
    fn test_too_few_successes_fails() {
        let vm = lab_vm("vm1", &[("git", ArtifactStatus::Succeeded)]);
        let err = check_artifacts(&vm, 2, 1).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::ArtifactFailure { expected: 2, succeeded: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_verify_fetches_expanded_vm() {
        let lab = ScriptedLabService::new().then(lab_vm("vm1", &[("git", ArtifactStatus::Succeeded)]));
        let id = ResourceId::parse(vm_id("vm1")).unwrap();

        verify_artifacts(&lab, &id, &lab_vm_template(&["git"]), 1)
            .await
            .unwrap();

        assert_eq!(
            lab.requests(),
            vec![("lab-rg".to_string(), "lab1".to_string(), "vm1".to_string(), true)]
        );
    }
}
