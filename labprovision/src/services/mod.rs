//! External collaborators consumed by the orchestrator.
//!
//! These traits are the narrow seams to the remote deployment, resource and
//! lab APIs. Implementations own authentication and transport; the
//! orchestrator only sees the shapes defined here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[cfg(test)]
use mockall::automock;

use crate::errors::ServiceError;

/// Deployment mode for a template submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeploymentMode {
    /// Resources not in the template are left untouched.
    #[default]
    Incremental,
    /// Resources not in the template are deleted.
    Complete,
}

/// A template submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Deployment mode.
    pub mode: DeploymentMode,
    /// The template document.
    pub template: Value,
    /// The `{ name: { value } }` parameters object.
    pub parameters: Value,
}

/// Result of a create-or-update call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentResult {
    /// Remote provisioning state, e.g. `Succeeded` or `Failed`.
    pub provisioning_state: String,
    /// Identifiers of the resources the deployment produced.
    #[serde(default)]
    pub output_resources: Vec<String>,
    /// Template outputs by name.
    #[serde(default)]
    pub outputs: Map<String, Value>,
    /// The raw response body, kept for diagnostics.
    #[serde(default)]
    pub raw_body: String,
}

impl DeploymentResult {
    /// Creates a succeeded result producing `resource_id`.
    #[must_use]
    pub fn succeeded(resource_id: impl Into<String>) -> Self {
        Self {
            provisioning_state: "Succeeded".to_string(),
            output_resources: vec![resource_id.into()],
            ..Self::default()
        }
    }

    /// Creates a failed result carrying `raw_body`.
    #[must_use]
    pub fn failed(raw_body: impl Into<String>) -> Self {
        Self {
            provisioning_state: "Failed".to_string(),
            raw_body: raw_body.into(),
            ..Self::default()
        }
    }

    /// Returns true if the remote reported success.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.provisioning_state.eq_ignore_ascii_case("succeeded")
    }
}

/// Status of a single artifact on a lab virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactStatus {
    /// Queued, not yet started.
    Pending,
    /// Currently being applied.
    Installing,
    /// Applied successfully.
    Succeeded,
    /// Failed to apply.
    Failed,
}

impl ArtifactStatus {
    /// Returns true while the artifact has not reached a terminal state.
    #[must_use]
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::Pending | Self::Installing)
    }

    /// Returns the status name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Installing => "Installing",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An artifact applied to a lab virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    /// Artifact name.
    pub name: String,
    /// Current status.
    pub status: ArtifactStatus,
    /// Message reported by the artifact deployment, if any.
    #[serde(default)]
    pub deployment_status_message: Option<String>,
    /// Message reported by the VM extension running the artifact, if any.
    #[serde(default)]
    pub vm_extension_status_message: Option<String>,
}

impl ArtifactRecord {
    /// Creates a record with no diagnostic messages.
    #[must_use]
    pub fn new(name: impl Into<String>, status: ArtifactStatus) -> Self {
        Self {
            name: name.into(),
            status,
            deployment_status_message: None,
            vm_extension_status_message: None,
        }
    }

    /// Sets the VM extension status message.
    #[must_use]
    pub fn with_extension_message(mut self, message: impl Into<String>) -> Self {
        self.vm_extension_status_message = Some(message.into());
        self
    }

    /// Sets the deployment status message.
    #[must_use]
    pub fn with_deployment_message(mut self, message: impl Into<String>) -> Self {
        self.deployment_status_message = Some(message.into());
        self
    }

    /// Iterates over the non-empty diagnostic messages.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        [
            self.vm_extension_status_message.as_deref(),
            self.deployment_status_message.as_deref(),
        ]
        .into_iter()
        .flatten()
        .filter(|m| !m.trim().is_empty())
    }
}

/// Artifact counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactSummary {
    /// Artifacts not yet started.
    pub pending: usize,
    /// Artifacts being applied.
    pub installing: usize,
    /// Artifacts applied successfully.
    pub succeeded: usize,
    /// Artifacts that failed.
    pub failed: usize,
}

impl ArtifactSummary {
    /// Counts the statuses of `records`.
    #[must_use]
    pub fn from_records(records: &[ArtifactRecord]) -> Self {
        records.iter().fold(Self::default(), |mut acc, record| {
            match record.status {
                ArtifactStatus::Pending => acc.pending += 1,
                ArtifactStatus::Installing => acc.installing += 1,
                ArtifactStatus::Succeeded => acc.succeeded += 1,
                ArtifactStatus::Failed => acc.failed += 1,
            }
            acc
        })
    }

    /// Number of artifacts still in progress.
    #[must_use]
    pub fn in_progress(&self) -> usize {
        self.pending + self.installing
    }

    /// Total number of artifacts.
    #[must_use]
    pub fn total(&self) -> usize {
        self.in_progress() + self.succeeded + self.failed
    }
}

impl fmt::Display for ArtifactSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pending, {} installing, {} succeeded, {} failed",
            self.pending, self.installing, self.succeeded, self.failed
        )
    }
}

/// A lab virtual machine as observed through the lab API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabVirtualMachine {
    /// Virtual machine name.
    pub name: String,
    /// Remote provisioning state.
    pub provisioning_state: String,
    /// Artifacts in application order.
    #[serde(default)]
    pub artifacts: Vec<ArtifactRecord>,
}

/// Submits and removes template deployments.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DeploymentService: Send + Sync {
    /// Submits a deployment and waits for its provisioning result.
    async fn create_or_update(
        &self,
        resource_group: &str,
        deployment_name: &str,
        deployment: &Deployment,
    ) -> Result<DeploymentResult, ServiceError>;

    /// Deletes a deployment record.
    async fn delete(&self, resource_group: &str, deployment_name: &str) -> Result<(), ServiceError>;

    /// Returns the id of the resource a deployment targeted.
    async fn target_resource_id(
        &self,
        resource_group: &str,
        deployment_name: &str,
    ) -> Result<String, ServiceError>;
}

/// Deletes arbitrary resources by id.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceService: Send + Sync {
    /// Deletes the resource with the given id.
    async fn delete_by_id(&self, resource_id: &str) -> Result<(), ServiceError>;
}

/// Reads lab virtual machines.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LabService: Send + Sync {
    /// Fetches a lab virtual machine, optionally with its artifacts.
    async fn get_virtual_machine(
        &self,
        resource_group: &str,
        lab_name: &str,
        vm_name: &str,
        expand_artifacts: bool,
    ) -> Result<LabVirtualMachine, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_result_state() {
        assert!(DeploymentResult::succeeded("/x").is_succeeded());
        assert!(!DeploymentResult::failed("{}").is_succeeded());

        let lower = DeploymentResult {
            provisioning_state: "succeeded".to_string(),
            ..DeploymentResult::default()
        };
        assert!(lower.is_succeeded());
    }

    #[test]
    fn test_artifact_status_progress() {
        assert!(ArtifactStatus::Pending.is_in_progress());
        assert!(ArtifactStatus::Installing.is_in_progress());
        assert!(!ArtifactStatus::Succeeded.is_in_progress());
        assert!(!ArtifactStatus::Failed.is_in_progress());
    }

    #[test]
    fn test_artifact_record_deserializes() {
        let record: ArtifactRecord = serde_json::from_value(serde_json::json!({
            "name": "install-git",
            "status": "Failed",
            "vmExtensionStatusMessage": "[{\"message\":\"exit 1\"}]"
        }))
        .unwrap();

        assert_eq!(record.status, ArtifactStatus::Failed);
        assert_eq!(record.messages().collect::<Vec<_>>(), vec!["[{\"message\":\"exit 1\"}]"]);
    }

    #[test]
    fn test_artifact_summary_counts() {
        let records = vec![
            ArtifactRecord::new("a", ArtifactStatus::Pending),
            ArtifactRecord::new("b", ArtifactStatus::Installing),
            ArtifactRecord::new("c", ArtifactStatus::Succeeded),
            ArtifactRecord::new("d", ArtifactStatus::Succeeded),
            ArtifactRecord::new("e", ArtifactStatus::Failed),
        ];
        let summary = ArtifactSummary::from_records(&records);

        assert_eq!(summary.in_progress(), 2);
        assert_eq!(summary.total(), 5);
        assert_eq!(
            summary.to_string(),
            "1 pending, 1 installing, 2 succeeded, 1 failed"
        );
    }

    #[test]
    fn test_messages_skip_blank_entries() {
        let record = ArtifactRecord::new("a", ArtifactStatus::Failed)
            .with_extension_message("  ")
            .with_deployment_message("boom");
        assert_eq!(record.messages().collect::<Vec<_>>(), vec!["boom"]);
    }
}
