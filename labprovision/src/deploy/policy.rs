//! Retry policy for deployment attempts.

use serde::{Deserialize, Serialize};

/// Controls how failed deployment attempts are retried and cleaned up.
///
/// Attempts are counted from 1. With retries enabled the orchestrator makes
/// up to `retry_count + 1` attempts; with retries disabled it makes exactly
/// one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Whether failed attempts are retried.
    #[serde(default)]
    pub enabled: bool,
    /// Number of retries after the first attempt.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Delete the failed deployment record before retrying.
    #[serde(default = "default_true")]
    pub cleanup_deployment_on_failure: bool,
    /// Delete the partially created resource before retrying.
    #[serde(default = "default_true")]
    pub cleanup_resource_on_failure: bool,
    /// Append the attempt number to the resource name on retry.
    #[serde(default)]
    pub suffix_resource_name_on_retry: bool,
}

fn default_retry_count() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            retry_count: default_retry_count(),
            cleanup_deployment_on_failure: true,
            cleanup_resource_on_failure: true,
            suffix_resource_name_on_retry: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy that never retries.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy retrying up to `retry_count` times.
    #[must_use]
    pub fn retrying(retry_count: u32) -> Self {
        Self {
            enabled: true,
            retry_count,
            ..Self::default()
        }
    }

    /// Sets whether retries are enabled.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets whether failed deployments are deleted.
    #[must_use]
    pub fn with_deployment_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup_deployment_on_failure = enabled;
        self
    }

    /// Sets whether partially created resources are deleted.
    #[must_use]
    pub fn with_resource_cleanup(mut self, enabled: bool) -> Self {
        self.cleanup_resource_on_failure = enabled;
        self
    }

    /// Sets whether the resource name is suffixed on retry.
    #[must_use]
    pub fn with_name_suffix(mut self, enabled: bool) -> Self {
        self.suffix_resource_name_on_retry = enabled;
        self
    }

    /// Total number of attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        if self.enabled {
            self.retry_count.saturating_add(1)
        } else {
            1
        }
    }

    /// Returns true if another attempt may follow `attempt`.
    #[must_use]
    pub fn has_remaining(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_policy_makes_one_attempt() {
        let policy = RetryPolicy::new().with_retry_count(5);
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.has_remaining(1));
    }

    #[test]
    fn test_enabled_policy_counts_first_attempt() {
        let policy = RetryPolicy::retrying(2);
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.has_remaining(2));
        assert!(!policy.has_remaining(3));
        assert_eq!(RetryPolicy::retrying(0).max_attempts(), 1);
    }

    #[test]
    fn test_policy_builder() {
        let policy = RetryPolicy::new()
            .with_enabled(true)
            .with_retry_count(4)
            .with_deployment_cleanup(false)
            .with_resource_cleanup(false)
            .with_name_suffix(true);

        assert!(policy.enabled);
        assert_eq!(policy.max_attempts(), 5);
        assert!(!policy.cleanup_deployment_on_failure);
        assert!(!policy.cleanup_resource_on_failure);
        assert!(policy.suffix_resource_name_on_retry);
    }

    #[test]
    fn test_policy_serde_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{"enabled": true}"#).unwrap();
        assert_eq!(policy.retry_count, 1);
        assert!(policy.cleanup_deployment_on_failure);
        assert!(!policy.suffix_resource_name_on_retry);
        assert_eq!(policy.max_attempts(), 2);
    }
}
