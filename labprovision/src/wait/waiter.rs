//! Polling loop that waits for artifacts to finish applying.

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::policy::WaitPolicy;
use crate::errors::{ProvisionError, ProvisionResult};
use crate::events::{EventSink, LoggingEventSink, ProvisionEvent};
use crate::resource::{ResourceId, LABS, RESOURCE_GROUPS, VIRTUAL_MACHINES};
use crate::services::{ArtifactSummary, LabService};

/// Polls a lab virtual machine until none of its artifacts are in progress.
pub struct ArtifactWaiter {
    lab: Arc<dyn LabService>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ArtifactWaiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactWaiter").finish_non_exhaustive()
    }
}

impl ArtifactWaiter {
    /// Creates a waiter reading from `lab`.
    #[must_use]
    pub fn new(lab: Arc<dyn LabService>) -> Self {
        Self {
            lab,
            events: Arc::new(LoggingEventSink::debug()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Waits until no artifact on `resource_id` is pending or installing.
    ///
    /// Returns immediately when the policy is disabled. Polls every
    /// [`WaitPolicy::poll_interval`], shortening the final pause so the last
    /// check happens when the window ends, and raises
    /// [`ProvisionError::Timeout`] if artifacts are still in progress then. Failed artifacts end the wait
    /// normally; verification is a separate step.
    pub async fn wait_for_completion(
        &self,
        resource_id: &ResourceId,
        policy: &WaitPolicy,
    ) -> ProvisionResult<()> {
        if !policy.is_enabled() {
            debug!(resource_id = %resource_id, "Artifact wait disabled");
            return Ok(());
        }

        let resource_group = resource_id.resolve_lab_scoped(RESOURCE_GROUPS)?;
        let lab_name = resource_id.resolve_lab_scoped(LABS)?;
        let vm_name = resource_id.resolve_lab_scoped(VIRTUAL_MACHINES)?;

        let window = policy.window();
        let interval = policy.poll_interval();
        let started = Instant::now();

        info!(
            vm_name = %vm_name,
            window_secs = window.as_secs(),
            "Waiting for artifacts to complete"
        );

        loop {
            let vm = self
                .lab
                .get_virtual_machine(resource_group, lab_name, vm_name, true)
                .await?;
            let summary = ArtifactSummary::from_records(&vm.artifacts);
            let elapsed = started.elapsed();

            self.events.emit(&ProvisionEvent::ArtifactsPolled {
                vm_name: vm_name.to_string(),
                elapsed_secs: elapsed.as_secs(),
                summary,
            });

            if summary.in_progress() == 0 {
                info!(vm_name = %vm_name, summary = %summary, "Artifacts finished");
                return Ok(());
            }

            if elapsed >= window {
                return Err(ProvisionError::Timeout {
                    attempt: None,
                    resource_id: resource_id.to_string(),
                    elapsed,
                    window,
                    last_state: summary.to_string(),
                });
            }

            // The last check lands on the window boundary.
            let pause = interval.min(window.saturating_sub(elapsed));
            info!(
                vm_name = %vm_name,
                summary = %summary,
                next_poll_secs = pause.as_secs(),
                "Artifacts still in progress"
            );
            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ARTIFACTS_POLLED;
    use crate::services::{ArtifactStatus, MockLabService};
    use crate::testing::{lab_vm, vm_id, CollectingEventSink, ScriptedLabService};
    use std::time::Duration;

    fn target() -> ResourceId {
        ResourceId::parse(vm_id("vm1")).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_policy_never_polls() {
        let mut lab = MockLabService::new();
        lab.expect_get_virtual_machine().never();

        let waiter = ArtifactWaiter::new(Arc::new(lab));
        waiter
            .wait_for_completion(&target(), &WaitPolicy::minutes(0))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_when_artifacts_finish_within_window() {
        let lab = Arc::new(
            ScriptedLabService::new()
                .then(lab_vm("vm1", &[("git", ArtifactStatus::Installing)]))
                .then(lab_vm("vm1", &[("git", ArtifactStatus::Installing)]))
                .then(lab_vm("vm1", &[("git", ArtifactStatus::Succeeded)])),
        );
        let sink = Arc::new(CollectingEventSink::new());
        let waiter = ArtifactWaiter::new(lab.clone()).with_event_sink(sink.clone());

        let started = Instant::now();
        waiter
            .wait_for_completion(&target(), &WaitPolicy::minutes(15))
            .await
            .unwrap();

        assert_eq!(lab.fetch_count(), 3);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(600) && waited < Duration::from_secs(601));
        assert_eq!(sink.of_type(ARTIFACTS_POLLED).len(), 3);
        assert_eq!(
            lab.requests()[0],
            ("lab-rg".to_string(), "lab1".to_string(), "vm1".to_string(), true)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_when_artifacts_stay_installing() {
        let lab = Arc::new(
            ScriptedLabService::new().then(lab_vm("vm1", &[("git", ArtifactStatus::Installing)])),
        );
        let waiter = ArtifactWaiter::new(lab.clone());

        let err = waiter
            .wait_for_completion(&target(), &WaitPolicy::minutes(10))
            .await
            .unwrap_err();

        match err {
            ProvisionError::Timeout {
                elapsed,
                window,
                last_state,
                ..
            } => {
                assert_eq!(window, Duration::from_secs(600));
                assert!(elapsed >= window);
                assert!(last_state.contains("1 installing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(lab.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uneven_window_times_out_at_boundary() {
        let lab = Arc::new(
            ScriptedLabService::new().then(lab_vm("vm1", &[("git", ArtifactStatus::Installing)])),
        );
        let waiter = ArtifactWaiter::new(lab.clone());

        let started = Instant::now();
        let err = waiter
            .wait_for_completion(&target(), &WaitPolicy::minutes(7))
            .await
            .unwrap_err();

        match err {
            ProvisionError::Timeout {
                elapsed, window, ..
            } => {
                assert_eq!(window, Duration::from_secs(420));
                assert!(elapsed >= window && elapsed < Duration::from_secs(421));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // Polls at 0, 5 and 7 minutes.
        assert_eq!(lab.fetch_count(), 3);
        assert!(started.elapsed() < Duration::from_secs(421));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_window_polls_at_window_interval() {
        let lab = Arc::new(
            ScriptedLabService::new().then(lab_vm("vm1", &[("git", ArtifactStatus::Pending)])),
        );
        let waiter = ArtifactWaiter::new(lab.clone());

        let err = waiter
            .wait_for_completion(&target(), &WaitPolicy::minutes(1))
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Timeout { .. }));
        assert_eq!(lab.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_artifacts_end_the_wait() {
        let lab = Arc::new(
            ScriptedLabService::new().then(lab_vm(
                "vm1",
                &[("git", ArtifactStatus::Failed), ("node", ArtifactStatus::Succeeded)],
            )),
        );
        let waiter = ArtifactWaiter::new(lab.clone());

        waiter
            .wait_for_completion(&target(), &WaitPolicy::minutes(5))
            .await
            .unwrap();
        assert_eq!(lab.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_non_lab_identifier_is_rejected() {
        let waiter = ArtifactWaiter::new(Arc::new(ScriptedLabService::new()));
        let id = ResourceId::parse(
            "/subscriptions/S/resourceGroups/G/providers/Microsoft.Compute/virtualMachines/V",
        )
        .unwrap();

        let err = waiter
            .wait_for_completion(&id, &WaitPolicy::minutes(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::MalformedIdentifier { .. }));
    }
}
