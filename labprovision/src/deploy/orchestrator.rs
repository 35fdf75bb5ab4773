//! The deployment retry loop.
//!
//! A [`Provisioner`] submits one template deployment per attempt. Each
//! attempt gets a fresh deployment name and its own merged parameter set.
//! Retryable failures are cleaned up, the target resource is optionally
//! renamed, and the next attempt starts; anything else ends the run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{info, warn, Instrument};

use super::artifacts::verify_artifacts;
use super::cleanup::cleanup_failed_attempt;
use super::naming::{deployment_name, suffix_for_attempt, DEFAULT_DEPLOYMENT_PREFIX};
use super::policy::RetryPolicy;
use crate::diagnostics::describe_remote_error;
use crate::errors::{ProvisionError, ProvisionResult, ServiceError};
use crate::events::{EventSink, LoggingEventSink, ProvisionEvent};
use crate::parameters::{merge, ParameterSet};
use crate::resource::{ResourceId, LABS, RESOURCE_GROUPS, VIRTUAL_MACHINES};
use crate::services::{
    Deployment, DeploymentMode, DeploymentResult, DeploymentService, LabService, ResourceService,
};
use crate::wait::{ArtifactWaiter, WaitPolicy};

/// Template parameter that receives the lab name by default.
pub const DEFAULT_LAB_NAME_PARAMETER: &str = "labName";
/// Template parameter that receives the resource name by default.
pub const DEFAULT_RESOURCE_NAME_PARAMETER: &str = "newVMName";

/// Everything needed to provision one lab virtual machine.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// The deployment template document.
    pub template: Value,
    /// Parameters loaded from the parameters file.
    pub base_parameters: ParameterSet,
    /// Command-line style override string, e.g. `-size Standard_A1`.
    pub parameter_overrides: String,
    /// Name of the resource to create.
    pub resource_name: String,
    /// Identifier of the lab that will own the resource.
    pub lab_id: String,
    /// Retry behavior.
    pub retry: RetryPolicy,
    /// Post-provisioning wait.
    pub wait: WaitPolicy,
    /// Verify artifacts after the deployment succeeds.
    pub fail_on_artifact_error: bool,
    /// Template parameter forced to the lab name.
    pub lab_name_parameter: String,
    /// Template parameter forced to the resource name.
    pub resource_name_parameter: String,
    /// Prefix for generated deployment names.
    pub deployment_prefix: String,
}

impl ProvisionRequest {
    /// Creates a request with default policies.
    #[must_use]
    pub fn new(
        template: Value,
        resource_name: impl Into<String>,
        lab_id: impl Into<String>,
    ) -> Self {
        Self {
            template,
            base_parameters: ParameterSet::new(),
            parameter_overrides: String::new(),
            resource_name: resource_name.into(),
            lab_id: lab_id.into(),
            retry: RetryPolicy::default(),
            wait: WaitPolicy::disabled(),
            fail_on_artifact_error: false,
            lab_name_parameter: DEFAULT_LAB_NAME_PARAMETER.to_string(),
            resource_name_parameter: DEFAULT_RESOURCE_NAME_PARAMETER.to_string(),
            deployment_prefix: DEFAULT_DEPLOYMENT_PREFIX.to_string(),
        }
    }

    /// Sets the base parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: ParameterSet) -> Self {
        self.base_parameters = parameters;
        self
    }

    /// Sets the override string.
    #[must_use]
    pub fn with_overrides(mut self, overrides: impl Into<String>) -> Self {
        self.parameter_overrides = overrides.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the wait policy.
    #[must_use]
    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    /// Sets whether artifacts are verified.
    #[must_use]
    pub fn with_fail_on_artifact_error(mut self, enabled: bool) -> Self {
        self.fail_on_artifact_error = enabled;
        self
    }

    /// Sets the parameter names forced to the lab and resource names.
    #[must_use]
    pub fn with_forced_parameters(
        mut self,
        lab_name_parameter: impl Into<String>,
        resource_name_parameter: impl Into<String>,
    ) -> Self {
        self.lab_name_parameter = lab_name_parameter.into();
        self.resource_name_parameter = resource_name_parameter.into();
        self
    }

    /// Sets the deployment name prefix.
    #[must_use]
    pub fn with_deployment_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.deployment_prefix = prefix.into();
        self
    }
}

/// How an attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The attempt produced a verified resource.
    Succeeded,
    /// The attempt failed.
    Failed,
}

/// Record of a single deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentAttempt {
    /// Attempt number, starting at 1.
    pub number: u32,
    /// Unique deployment name used for the attempt.
    pub deployment_name: String,
    /// Resource name submitted with the attempt.
    pub resource_name: String,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// Resulting resource identifier, on success.
    pub resource_id: Option<String>,
    /// Error text, on failure.
    pub error: Option<String>,
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionOutcome {
    /// Identifier of the provisioned resource.
    pub resource_id: ResourceId,
    /// Final resource name, after any renames.
    pub resource_name: String,
    /// Name of the deployment that succeeded.
    pub deployment_name: String,
    /// Every attempt made, in order.
    pub attempts: Vec<DeploymentAttempt>,
    /// Template outputs of the successful deployment.
    pub outputs: Map<String, Value>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
}

impl ProvisionOutcome {
    /// Number of attempts made.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }
}

struct AttemptSuccess {
    resource_id: ResourceId,
    outputs: Map<String, Value>,
}

/// Where the lab lives.
struct LabScope {
    resource_group: String,
    lab_name: String,
}

/// Drives deployment attempts against the remote services.
pub struct Provisioner {
    deployments: Arc<dyn DeploymentService>,
    resources: Arc<dyn ResourceService>,
    lab: Arc<dyn LabService>,
    waiter: ArtifactWaiter,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("waiter", &self.waiter)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    /// Creates a provisioner over the given services.
    #[must_use]
    pub fn new(
        deployments: Arc<dyn DeploymentService>,
        resources: Arc<dyn ResourceService>,
        lab: Arc<dyn LabService>,
    ) -> Self {
        Self {
            deployments,
            resources,
            waiter: ArtifactWaiter::new(lab.clone()),
            lab,
            events: Arc::new(LoggingEventSink::debug()),
        }
    }

    /// Sets the event sink used by the provisioner and its waiter.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.waiter = self.waiter.with_event_sink(events.clone());
        self.events = events;
        self
    }

    /// Provisions the requested resource, retrying per the request's policy.
    ///
    /// Returns the last attempt's error once attempts are exhausted.
    /// Non-retryable errors end the run immediately.
    pub async fn provision(&self, request: &ProvisionRequest) -> ProvisionResult<ProvisionOutcome> {
        let span = tracing::info_span!(
            "provision",
            resource_name = %request.resource_name,
            lab_id = %request.lab_id,
        );
        self.run(request).instrument(span).await
    }

    async fn run(&self, request: &ProvisionRequest) -> ProvisionResult<ProvisionOutcome> {
        let started_at = Utc::now();
        let scope = lab_scope(&request.lab_id)?;
        let max_attempts = request.retry.max_attempts();
        let mut current_name = request.resource_name.clone();
        let mut attempts = Vec::new();

        info!(
            lab_name = %scope.lab_name,
            resource_group = %scope.resource_group,
            max_attempts,
            "Starting provisioning"
        );
        self.events.emit(&ProvisionEvent::Started {
            resource_name: current_name.clone(),
            lab_id: request.lab_id.clone(),
            max_attempts,
        });

        for attempt in 1..=max_attempts {
            let name = deployment_name(&request.deployment_prefix);
            info!(
                attempt,
                max_attempts,
                deployment_name = %name,
                resource_name = %current_name,
                "Submitting deployment"
            );
            self.events.emit(&ProvisionEvent::AttemptStarted {
                attempt,
                deployment_name: name.clone(),
                resource_name: current_name.clone(),
            });

            match self
                .run_attempt(request, &scope, &name, &current_name, attempt)
                .await
                .map_err(|e| e.during_attempt(attempt))
            {
                Ok(success) => {
                    attempts.push(DeploymentAttempt {
                        number: attempt,
                        deployment_name: name.clone(),
                        resource_name: current_name.clone(),
                        outcome: AttemptOutcome::Succeeded,
                        resource_id: Some(success.resource_id.to_string()),
                        error: None,
                    });
                    info!(
                        attempt,
                        resource_id = %success.resource_id,
                        "Provisioning succeeded"
                    );
                    self.events.emit(&ProvisionEvent::Succeeded {
                        attempt,
                        deployment_name: name.clone(),
                        resource_id: success.resource_id.to_string(),
                    });
                    return Ok(ProvisionOutcome {
                        resource_id: success.resource_id,
                        resource_name: current_name,
                        deployment_name: name,
                        attempts,
                        outputs: success.outputs,
                        started_at,
                        finished_at: Utc::now(),
                    });
                }
                Err(e) if !e.is_retryable() => {
                    warn!(attempt, error = %e, kind = e.kind(), "Provisioning aborted");
                    self.emit_failed(attempt, &e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(attempt, deployment_name = %name, error = %e, "Deployment attempt failed");
                    self.events.emit(&ProvisionEvent::AttemptFailed {
                        attempt,
                        deployment_name: name.clone(),
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                    attempts.push(DeploymentAttempt {
                        number: attempt,
                        deployment_name: name.clone(),
                        resource_name: current_name.clone(),
                        outcome: AttemptOutcome::Failed,
                        resource_id: None,
                        error: Some(e.to_string()),
                    });

                    let report = cleanup_failed_attempt(
                        self.deployments.as_ref(),
                        self.resources.as_ref(),
                        &request.retry,
                        &scope.resource_group,
                        &name,
                    )
                    .await;
                    for failure in report.failures() {
                        warn!(attempt, error = %failure, "Cleanup incomplete");
                    }
                    self.events.emit(&ProvisionEvent::CleanupCompleted {
                        attempt,
                        deployment_name: name.clone(),
                        report,
                    });

                    if !request.retry.has_remaining(attempt) {
                        warn!(attempts = attempt, "Retries exhausted");
                        self.emit_failed(attempt, &e);
                        return Err(e);
                    }

                    if request.retry.suffix_resource_name_on_retry {
                        let renamed = suffix_for_attempt(&current_name, attempt + 1);
                        info!(from = %current_name, to = %renamed, "Renaming resource for retry");
                        self.events.emit(&ProvisionEvent::Renamed {
                            attempt: attempt + 1,
                            from: current_name.clone(),
                            to: renamed.clone(),
                        });
                        current_name = renamed;
                    }
                }
            }
        }

        // max_attempts is always at least 1, so the loop returns before here.
        Err(ProvisionError::Config(
            "retry policy allowed no deployment attempts".to_string(),
        ))
    }

    async fn run_attempt(
        &self,
        request: &ProvisionRequest,
        scope: &LabScope,
        deployment_name: &str,
        resource_name: &str,
        attempt: u32,
    ) -> ProvisionResult<AttemptSuccess> {
        let mut parameters = merge(&request.base_parameters, &request.parameter_overrides);
        parameters.replace(&request.lab_name_parameter, scope.lab_name.as_str());
        parameters.replace(&request.resource_name_parameter, resource_name);

        let deployment = Deployment {
            mode: DeploymentMode::Incremental,
            template: request.template.clone(),
            parameters: parameters.to_deployment_parameters(),
        };

        let result = self
            .deployments
            .create_or_update(&scope.resource_group, deployment_name, &deployment)
            .await
            .map_err(|e| submission_error(attempt, deployment_name, &e))?;

        if !result.is_succeeded() {
            return Err(ProvisionError::deployment_failed(
                attempt,
                deployment_name,
                failure_message(&result),
            ));
        }

        let resource_id = select_output_resource(&result, attempt, deployment_name)?;

        self.waiter
            .wait_for_completion(&resource_id, &request.wait)
            .await?;

        if request.fail_on_artifact_error {
            verify_artifacts(self.lab.as_ref(), &resource_id, &request.template, attempt).await?;
        }

        Ok(AttemptSuccess {
            resource_id,
            outputs: result.outputs,
        })
    }

    fn emit_failed(&self, attempt: u32, error: &ProvisionError) {
        self.events.emit(&ProvisionEvent::Failed {
            attempt,
            kind: error.kind(),
            error: error.to_string(),
        });
    }
}

fn lab_scope(lab_id: &str) -> ProvisionResult<LabScope> {
    let id = ResourceId::parse(lab_id)?;
    Ok(LabScope {
        resource_group: id.resolve_lab_scoped(RESOURCE_GROUPS)?.to_string(),
        lab_name: id.resolve_lab_scoped(LABS)?.to_string(),
    })
}

fn submission_error(attempt: u32, deployment_name: &str, error: &ServiceError) -> ProvisionError {
    let message = match error.body() {
        Some(body) => describe_remote_error(body),
        None => error.to_string(),
    };
    ProvisionError::deployment_failed(attempt, deployment_name, message)
}

fn failure_message(result: &DeploymentResult) -> String {
    if result.raw_body.trim().is_empty() {
        format!("provisioning state '{}'", result.provisioning_state)
    } else {
        describe_remote_error(&result.raw_body)
    }
}

/// Picks the produced virtual machine, falling back to the first output.
fn select_output_resource(
    result: &DeploymentResult,
    attempt: u32,
    deployment_name: &str,
) -> ProvisionResult<ResourceId> {
    let virtual_machine = result
        .output_resources
        .iter()
        .filter_map(|raw| ResourceId::parse(raw.as_str()).ok())
        .find(|id| id.resolve(VIRTUAL_MACHINES).is_ok());
    if let Some(id) = virtual_machine {
        return Ok(id);
    }

    match result.output_resources.first() {
        Some(raw) => ResourceId::parse(raw.as_str()),
        None => Err(ProvisionError::deployment_failed(
            attempt,
            deployment_name,
            "deployment succeeded but reported no output resources",
        )),
    }
}
