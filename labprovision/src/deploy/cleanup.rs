//! Best-effort removal of a failed attempt's deployment and resource.

use serde::Serialize;
use tracing::{info, warn};

use super::policy::RetryPolicy;
use crate::errors::ProvisionError;
use crate::services::{DeploymentService, ResourceService};

/// Result of a single cleanup step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CleanupOutcome {
    /// The step was disabled by policy.
    Skipped,
    /// The target was removed.
    Removed,
    /// Removal failed; the reason is kept for logging.
    Failed(String),
}

impl CleanupOutcome {
    /// Returns true if the step failed.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Outcomes of both cleanup steps for one failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Removal of the partially created resource.
    pub resource: CleanupOutcome,
    /// Removal of the deployment record.
    pub deployment: CleanupOutcome,
}

impl CleanupReport {
    /// Returns one [`ProvisionError::CleanupFailed`] per failed step.
    #[must_use]
    pub fn failures(&self) -> Vec<ProvisionError> {
        [("resource", &self.resource), ("deployment", &self.deployment)]
            .into_iter()
            .filter_map(|(target, outcome)| match outcome {
                CleanupOutcome::Failed(reason) => {
                    Some(ProvisionError::cleanup_failed(target, reason.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

/// Removes what a failed attempt left behind.
///
/// The target resource id is looked up through the deployment before the
/// deployment itself is deleted. Each step runs independently; failures are
/// logged and reported, never raised.
pub async fn cleanup_failed_attempt(
    deployments: &dyn DeploymentService,
    resources: &dyn ResourceService,
    policy: &RetryPolicy,
    resource_group: &str,
    deployment_name: &str,
) -> CleanupReport {
    let resource = if policy.cleanup_resource_on_failure {
        remove_target_resource(deployments, resources, resource_group, deployment_name).await
    } else {
        CleanupOutcome::Skipped
    };

    let deployment = if policy.cleanup_deployment_on_failure {
        match deployments.delete(resource_group, deployment_name).await {
            Ok(()) => {
                info!(deployment_name = %deployment_name, "Removed failed deployment");
                CleanupOutcome::Removed
            }
            Err(e) => {
                warn!(deployment_name = %deployment_name, error = %e, "Unable to remove failed deployment");
                CleanupOutcome::Failed(e.to_string())
            }
        }
    } else {
        CleanupOutcome::Skipped
    };

    CleanupReport {
        resource,
        deployment,
    }
}

async fn remove_target_resource(
    deployments: &dyn DeploymentService,
    resources: &dyn ResourceService,
    resource_group: &str,
    deployment_name: &str,
) -> CleanupOutcome {
    let resource_id = match deployments
        .target_resource_id(resource_group, deployment_name)
        .await
    {
        Ok(id) => id,
        Err(e) => {
            warn!(
                deployment_name = %deployment_name,
                error = %e,
                "Unable to look up resource created by failed deployment"
            );
            return CleanupOutcome::Failed(e.to_string());
        }
    };

    match resources.delete_by_id(&resource_id).await {
        Ok(()) => {
            info!(resource_id = %resource_id, "Removed failed resource");
            CleanupOutcome::Removed
        }
        Err(e) => {
            warn!(resource_id = %resource_id, error = %e, "Unable to remove failed resource");
            CleanupOutcome::Failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use crate::services::{MockDeploymentService, MockResourceService};
    use crate::testing::{vm_id, RecordingResourceService};
    use pretty_assertions::assert_eq;

    fn both() -> RetryPolicy {
        RetryPolicy::retrying(1)
    }

    #[tokio::test]
    async fn test_removes_resource_and_deployment() {
        let mut deployments = MockDeploymentService::new();
        deployments
            .expect_target_resource_id()
            .times(1)
            .returning(|_, _| Ok(vm_id("vm1")));
        deployments
            .expect_delete()
            .times(1)
            .returning(|_, _| Ok(()));
        let resources = RecordingResourceService::new();

        let report =
            cleanup_failed_attempt(&deployments, &resources, &both(), "lab-rg", "Dtl1").await;

        assert_eq!(report.resource, CleanupOutcome::Removed);
        assert_eq!(report.deployment, CleanupOutcome::Removed);
        assert_eq!(resources.deleted(), vec![vm_id("vm1")]);
        assert!(report.failures().is_empty());
    }

    #[tokio::test]
    async fn test_deployment_is_deleted_when_resource_removal_fails() {
        let mut deployments = MockDeploymentService::new();
        deployments
            .expect_target_resource_id()
            .returning(|_, _| Ok(vm_id("vm1")));
        deployments
            .expect_delete()
            .times(1)
            .returning(|_, _| Ok(()));
        let resources = RecordingResourceService::failing(ServiceError::remote(409, "conflict"));

        let report =
            cleanup_failed_attempt(&deployments, &resources, &both(), "lab-rg", "Dtl1").await;

        assert!(report.resource.is_failed());
        assert_eq!(report.deployment, CleanupOutcome::Removed);

        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind(), "cleanup_failed");
    }

    #[tokio::test]
    async fn test_lookup_failure_skips_resource_delete() {
        let mut deployments = MockDeploymentService::new();
        deployments
            .expect_target_resource_id()
            .returning(|_, name| Err(ServiceError::NotFound(name.to_string())));
        deployments
            .expect_delete()
            .times(1)
            .returning(|_, _| Err(ServiceError::transport("connection reset")));
        let mut resources = MockResourceService::new();
        resources.expect_delete_by_id().never();

        let report =
            cleanup_failed_attempt(&deployments, &resources, &both(), "lab-rg", "Dtl1").await;

        assert!(report.resource.is_failed());
        assert!(report.deployment.is_failed());
        assert_eq!(report.failures().len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_steps_are_skipped() {
        let mut deployments = MockDeploymentService::new();
        deployments.expect_target_resource_id().never();
        deployments.expect_delete().never();
        let mut resources = MockResourceService::new();
        resources.expect_delete_by_id().never();

        let policy = RetryPolicy::retrying(1)
            .with_deployment_cleanup(false)
            .with_resource_cleanup(false);
        let report =
            cleanup_failed_attempt(&deployments, &resources, &policy, "lab-rg", "Dtl1").await;

        assert_eq!(report.resource, CleanupOutcome::Skipped);
        assert_eq!(report.deployment, CleanupOutcome::Skipped);
    }

    #[test]
    fn test_report_serializes_outcomes() {
        let report = CleanupReport {
            resource: CleanupOutcome::Failed("gone".to_string()),
            deployment: CleanupOutcome::Removed,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["resource"]["status"], "failed");
        assert_eq!(value["resource"]["reason"], "gone");
        assert_eq!(value["deployment"]["status"], "removed");
    }
}
