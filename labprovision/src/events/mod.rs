//! Provisioning lifecycle events.
//!
//! The orchestrator and the artifact waiter report progress as typed
//! [`ProvisionEvent`]s through an [`EventSink`].

mod sink;

pub use sink::{EventSink, LoggingEventSink};

use serde::Serialize;

use crate::deploy::CleanupReport;
use crate::services::ArtifactSummary;

/// A provisioning run started.
pub const PROVISION_STARTED: &str = "provision.started";
/// A deployment attempt is about to be submitted.
pub const ATTEMPT_STARTED: &str = "provision.attempt.started";
/// A deployment attempt failed.
pub const ATTEMPT_FAILED: &str = "provision.attempt.failed";
/// Cleanup after a failed attempt finished.
pub const CLEANUP_COMPLETED: &str = "provision.cleanup.completed";
/// The target resource was renamed for the next attempt.
pub const RESOURCE_RENAMED: &str = "provision.renamed";
/// The run produced a resource.
pub const PROVISION_SUCCEEDED: &str = "provision.succeeded";
/// The run gave up.
pub const PROVISION_FAILED: &str = "provision.failed";
/// The waiter observed artifact states.
pub const ARTIFACTS_POLLED: &str = "artifacts.polled";

/// Something that happened during a provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvisionEvent {
    /// The run started.
    Started {
        /// Requested resource name.
        resource_name: String,
        /// Owning lab.
        lab_id: String,
        /// Attempts the retry policy allows.
        max_attempts: u32,
    },
    /// An attempt is about to be submitted.
    AttemptStarted {
        /// Attempt number.
        attempt: u32,
        /// Deployment name for the attempt.
        deployment_name: String,
        /// Resource name for the attempt.
        resource_name: String,
    },
    /// An attempt failed with a retryable error.
    AttemptFailed {
        /// Attempt number.
        attempt: u32,
        /// Deployment name for the attempt.
        deployment_name: String,
        /// Error kind, see [`crate::errors::ProvisionError::kind`].
        kind: &'static str,
        /// Error text.
        error: String,
    },
    /// Cleanup after a failed attempt finished.
    CleanupCompleted {
        /// Attempt that was cleaned up.
        attempt: u32,
        /// Deployment that was cleaned up.
        deployment_name: String,
        /// Outcome of each cleanup step.
        report: CleanupReport,
    },
    /// The resource was renamed for the next attempt.
    Renamed {
        /// Attempt that will use the new name.
        attempt: u32,
        /// Previous name.
        from: String,
        /// New name.
        to: String,
    },
    /// The run produced a resource.
    Succeeded {
        /// Successful attempt.
        attempt: u32,
        /// Successful deployment.
        deployment_name: String,
        /// Identifier of the produced resource.
        resource_id: String,
    },
    /// The run gave up.
    Failed {
        /// Last attempt reached.
        attempt: u32,
        /// Error kind.
        kind: &'static str,
        /// Error text.
        error: String,
    },
    /// The waiter observed artifact states.
    ArtifactsPolled {
        /// Virtual machine being polled.
        vm_name: String,
        /// Seconds since the wait started.
        elapsed_secs: u64,
        /// Artifact counts by status.
        summary: ArtifactSummary,
    },
}

impl ProvisionEvent {
    /// Dotted event type name.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => PROVISION_STARTED,
            Self::AttemptStarted { .. } => ATTEMPT_STARTED,
            Self::AttemptFailed { .. } => ATTEMPT_FAILED,
            Self::CleanupCompleted { .. } => CLEANUP_COMPLETED,
            Self::Renamed { .. } => RESOURCE_RENAMED,
            Self::Succeeded { .. } => PROVISION_SUCCEEDED,
            Self::Failed { .. } => PROVISION_FAILED,
            Self::ArtifactsPolled { .. } => ARTIFACTS_POLLED,
        }
    }
}
