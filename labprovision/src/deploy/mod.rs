//! Deployment retry orchestration.
//!
//! This module provides:
//! - [`Provisioner`], which submits deployments and retries failed attempts
//! - [`RetryPolicy`] for attempt counts, cleanup and renaming
//! - Best-effort cleanup of failed attempts
//! - Artifact verification against the template's declared artifacts

mod artifacts;
mod cleanup;
mod naming;
mod orchestrator;
mod policy;

pub use artifacts::{check_artifacts, expected_artifact_count, verify_artifacts};
pub use cleanup::{cleanup_failed_attempt, CleanupOutcome, CleanupReport};
pub use naming::{deployment_name, suffix_for_attempt, DEFAULT_DEPLOYMENT_PREFIX};
pub use orchestrator::{
    AttemptOutcome, DeploymentAttempt, ProvisionOutcome, ProvisionRequest, Provisioner,
    DEFAULT_LAB_NAME_PARAMETER, DEFAULT_RESOURCE_NAME_PARAMETER,
};
pub use policy::RetryPolicy;
