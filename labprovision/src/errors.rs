//! Error types for the provisioning orchestrator.
//!
//! `ProvisionError` is the single error type surfaced to callers. External
//! collaborators report failures as [`ServiceError`], which the orchestrator
//! folds into the matching provisioning error kind.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// The main error type for provisioning operations.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A resource identifier could not be parsed.
    #[error("Malformed resource identifier '{id}': {reason}")]
    MalformedIdentifier {
        /// The offending identifier.
        id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The requested type keyword is not present in the identifier.
    #[error("Resource type '{type_keyword}' is not present in resource identifier '{id}'")]
    TypeNotFound {
        /// The identifier that was searched.
        id: String,
        /// The keyword that was requested.
        type_keyword: String,
    },

    /// A parameters file could not be read or parsed.
    ///
    /// Loaders downgrade this to a warning and an empty parameter set.
    #[error("Invalid parameters file '{}': {reason}", path.display())]
    InvalidParametersFile {
        /// Path of the file.
        path: PathBuf,
        /// Why it could not be used.
        reason: String,
    },

    /// A deployment template could not be read or parsed.
    #[error("Invalid template file '{}': {reason}", path.display())]
    InvalidTemplate {
        /// Path of the file.
        path: PathBuf,
        /// Why it could not be used.
        reason: String,
    },

    /// The remote deployment did not succeed or could not be submitted.
    #[error("Deployment '{deployment_name}' failed on attempt {attempt}: {message}")]
    DeploymentFailed {
        /// Attempt number (1-based) that failed.
        attempt: u32,
        /// Name of the failed deployment.
        deployment_name: String,
        /// Decoded remote error payload.
        message: String,
    },

    /// A cleanup step failed. Never fatal; reported through logs and events.
    #[error("Cleanup of {target} failed: {reason}")]
    CleanupFailed {
        /// What was being removed.
        target: String,
        /// Why removal failed.
        reason: String,
    },

    /// One or more artifacts failed to apply to the provisioned resource.
    #[error("{}", format_artifact_failure(*attempt, vm_name, *expected, *succeeded, failures))]
    ArtifactFailure {
        /// Attempt number (1-based) whose resource was verified.
        attempt: u32,
        /// Name of the virtual machine.
        vm_name: String,
        /// Number of artifacts declared by the template.
        expected: usize,
        /// Number of artifacts that reported success.
        succeeded: usize,
        /// One line per failed artifact.
        failures: Vec<ArtifactFailureLine>,
    },

    /// Artifacts were still in progress when the wait window elapsed.
    #[error(
        "Timed out after {}s waiting for artifacts on '{resource_id}' (window {}s); last state: {last_state}",
        elapsed.as_secs(),
        window.as_secs()
    )]
    Timeout {
        /// Attempt whose resource was being polled, once known.
        attempt: Option<u32>,
        /// The resource being polled.
        resource_id: String,
        /// Wall-clock time spent waiting.
        elapsed: Duration,
        /// The configured wait window.
        window: Duration,
        /// Summary of the last observed artifact states.
        last_state: String,
    },

    /// Task settings are missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An external service call failed and could not be retried.
    #[error("{source}")]
    Service {
        /// Attempt during which the call failed, once known.
        attempt: Option<u32>,
        /// The underlying service error.
        #[source]
        source: ServiceError,
    },
}

impl From<ServiceError> for ProvisionError {
    fn from(source: ServiceError) -> Self {
        Self::Service {
            attempt: None,
            source,
        }
    }
}

/// A single failed artifact with its decoded diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactFailureLine {
    /// Artifact name.
    pub name: String,
    /// Decoded status message.
    pub message: String,
}

impl std::fmt::Display for ArtifactFailureLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Artifact '{}': {}", self.name, self.message)
    }
}

fn format_artifact_failure(
    attempt: u32,
    vm_name: &str,
    expected: usize,
    succeeded: usize,
    failures: &[ArtifactFailureLine],
) -> String {
    let mut out = format!(
        "Artifact verification failed for '{vm_name}' on attempt {attempt} \
         ({succeeded}/{expected} succeeded)"
    );
    for line in failures {
        out.push('\n');
        out.push_str(&line.to_string());
    }
    out
}

impl ProvisionError {
    /// Creates a malformed identifier error.
    #[must_use]
    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedIdentifier {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a type-not-found error.
    #[must_use]
    pub fn type_not_found(id: impl Into<String>, type_keyword: impl Into<String>) -> Self {
        Self::TypeNotFound {
            id: id.into(),
            type_keyword: type_keyword.into(),
        }
    }

    /// Creates a deployment failure.
    #[must_use]
    pub fn deployment_failed(
        attempt: u32,
        deployment_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DeploymentFailed {
            attempt,
            deployment_name: deployment_name.into(),
            message: message.into(),
        }
    }

    /// Creates a cleanup failure.
    #[must_use]
    pub fn cleanup_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CleanupFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the retry loop may recover from this error.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DeploymentFailed { .. } | Self::ArtifactFailure { .. }
        )
    }

    /// Returns the attempt number carried by the error, if any.
    #[must_use]
    pub fn attempt(&self) -> Option<u32> {
        match self {
            Self::DeploymentFailed { attempt, .. } | Self::ArtifactFailure { attempt, .. } => {
                Some(*attempt)
            }
            Self::Timeout { attempt, .. } | Self::Service { attempt, .. } => *attempt,
            _ => None,
        }
    }

    /// Records the attempt during which the error was raised.
    ///
    /// Kinds that already carry an attempt, or that are never raised inside
    /// an attempt, are returned unchanged.
    #[must_use]
    pub fn during_attempt(mut self, number: u32) -> Self {
        if let Self::Timeout { attempt, .. } | Self::Service { attempt, .. } = &mut self {
            attempt.get_or_insert(number);
        }
        self
    }

    /// Returns a short machine-friendly name for the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedIdentifier { .. } => "malformed_identifier",
            Self::TypeNotFound { .. } => "type_not_found",
            Self::InvalidParametersFile { .. } => "invalid_parameters_file",
            Self::InvalidTemplate { .. } => "invalid_template",
            Self::DeploymentFailed { .. } => "deployment_failed",
            Self::CleanupFailed { .. } => "cleanup_failed",
            Self::ArtifactFailure { .. } => "artifact_failure",
            Self::Timeout { .. } => "timeout",
            Self::Config(_) => "config",
            Self::Service { .. } => "service",
        }
    }
}

/// Errors reported by external services.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The remote service answered with an error payload.
    #[error("Remote error (status {status}): {body}")]
    Remote {
        /// HTTP-like status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The call never produced a response.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ServiceError {
    /// Creates a remote error.
    #[must_use]
    pub fn remote(status: u16, body: impl Into<String>) -> Self {
        Self::Remote {
            status,
            body: body.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Returns the remote body if one was received.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Remote { body, .. } => Some(body),
            _ => None,
        }
    }
}
