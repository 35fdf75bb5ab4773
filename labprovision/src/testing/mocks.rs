//! In-memory service doubles that record calls and replay scripted results.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use super::fixtures::vm_id;
use crate::errors::ServiceError;
use crate::events::{EventSink, ProvisionEvent};
use crate::services::{
    Deployment, DeploymentResult, DeploymentService, LabService, LabVirtualMachine,
    ResourceService,
};

/// A deployment submission captured by [`ScriptedDeploymentService`].
#[derive(Debug, Clone)]
pub struct SubmittedDeployment {
    /// Resource group the deployment targeted.
    pub resource_group: String,
    /// Deployment name.
    pub deployment_name: String,
    /// The submitted deployment.
    pub deployment: Deployment,
}

impl SubmittedDeployment {
    /// Returns the submitted string value of `parameter`, if any.
    #[must_use]
    pub fn parameter(&self, parameter: &str) -> Option<String> {
        self.deployment
            .parameters
            .get(parameter)
            .and_then(|p| p.get("value"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
    }

    /// Returns the submitted parameter names in order.
    #[must_use]
    pub fn parameter_names(&self) -> Vec<String> {
        self.deployment
            .parameters
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// A deployment service that replays scripted create-or-update results.
///
/// The target-resource lookup derives the lab VM id from the `newVMName`
/// parameter of the matching submission.
#[derive(Debug, Default)]
pub struct ScriptedDeploymentService {
    results: Mutex<VecDeque<Result<DeploymentResult, ServiceError>>>,
    submissions: Mutex<Vec<SubmittedDeployment>>,
    deleted: Mutex<Vec<String>>,
    delete_error: Mutex<Option<ServiceError>>,
    lookup_error: Mutex<Option<ServiceError>>,
}

impl ScriptedDeploymentService {
    /// Creates a service with no scripted results.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the result of the next create-or-update call.
    #[must_use]
    pub fn then(self, result: Result<DeploymentResult, ServiceError>) -> Self {
        self.results.lock().push_back(result);
        self
    }

    /// Queues a successful deployment producing the VM `vm_name`.
    #[must_use]
    pub fn then_succeed(self, vm_name: &str) -> Self {
        self.then(Ok(DeploymentResult::succeeded(vm_id(vm_name))))
    }

    /// Queues a deployment that finishes in the `Failed` state.
    #[must_use]
    pub fn then_fail(self, raw_body: &str) -> Self {
        self.then(Ok(DeploymentResult::failed(raw_body)))
    }

    /// Makes every deployment deletion fail.
    #[must_use]
    pub fn failing_deletes(self, error: ServiceError) -> Self {
        *self.delete_error.lock() = Some(error);
        self
    }

    /// Makes every target-resource lookup fail.
    #[must_use]
    pub fn failing_lookups(self, error: ServiceError) -> Self {
        *self.lookup_error.lock() = Some(error);
        self
    }

    /// Returns every submission in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<SubmittedDeployment> {
        self.submissions.lock().clone()
    }

    /// Returns the number of create-or-update calls.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    /// Returns the names of deployments whose deletion was requested.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl DeploymentService for ScriptedDeploymentService {
    async fn create_or_update(
        &self,
        resource_group: &str,
        deployment_name: &str,
        deployment: &Deployment,
    ) -> Result<DeploymentResult, ServiceError> {
        self.submissions.lock().push(SubmittedDeployment {
            resource_group: resource_group.to_string(),
            deployment_name: deployment_name.to_string(),
            deployment: deployment.clone(),
        });
        self.results
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::transport("no scripted deployment result")))
    }

    async fn delete(&self, _resource_group: &str, deployment_name: &str) -> Result<(), ServiceError> {
        self.deleted.lock().push(deployment_name.to_string());
        match self.delete_error.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn target_resource_id(
        &self,
        _resource_group: &str,
        deployment_name: &str,
    ) -> Result<String, ServiceError> {
        if let Some(e) = self.lookup_error.lock().clone() {
            return Err(e);
        }
        self.submissions
            .lock()
            .iter()
            .find(|s| s.deployment_name == deployment_name)
            .and_then(|s| s.parameter("newVMName"))
            .map(|name| vm_id(&name))
            .ok_or_else(|| ServiceError::NotFound(deployment_name.to_string()))
    }
}

/// A resource service that records deletions.
#[derive(Debug, Default)]
pub struct RecordingResourceService {
    deleted: Mutex<Vec<String>>,
    error: Mutex<Option<ServiceError>>,
}

impl RecordingResourceService {
    /// Creates a service whose deletions succeed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a service whose deletions always fail with `error`.
    #[must_use]
    pub fn failing(error: ServiceError) -> Self {
        Self {
            deleted: Mutex::new(Vec::new()),
            error: Mutex::new(Some(error)),
        }
    }

    /// Returns the ids whose deletion was requested.
    #[must_use]
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().clone()
    }
}

#[async_trait]
impl ResourceService for RecordingResourceService {
    async fn delete_by_id(&self, resource_id: &str) -> Result<(), ServiceError> {
        self.deleted.lock().push(resource_id.to_string());
        match self.error.lock().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// A lab service that replays virtual machine snapshots.
///
/// Snapshots are returned in order; the last one repeats once the queue is
/// drained.
#[derive(Debug, Default)]
pub struct ScriptedLabService {
    snapshots: Mutex<VecDeque<LabVirtualMachine>>,
    last: Mutex<Option<LabVirtualMachine>>,
    requests: Mutex<Vec<(String, String, String, bool)>>,
}

impl ScriptedLabService {
    /// Creates a service with no snapshots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a snapshot.
    #[must_use]
    pub fn then(self, vm: LabVirtualMachine) -> Self {
        self.snapshots.lock().push_back(vm);
        self
    }

    /// Returns the number of fetches.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Returns every `(resource group, lab, vm, expand)` request.
    #[must_use]
    pub fn requests(&self) -> Vec<(String, String, String, bool)> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl LabService for ScriptedLabService {
    async fn get_virtual_machine(
        &self,
        resource_group: &str,
        lab_name: &str,
        vm_name: &str,
        expand_artifacts: bool,
    ) -> Result<LabVirtualMachine, ServiceError> {
        self.requests.lock().push((
            resource_group.to_string(),
            lab_name.to_string(),
            vm_name.to_string(),
            expand_artifacts,
        ));

        let next = self.snapshots.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(vm) = next {
            *last = Some(vm);
        }
        last.clone()
            .ok_or_else(|| ServiceError::NotFound(format!("virtual machine '{vm_name}'")))
    }
}

/// An event sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<ProvisionEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events in order.
    #[must_use]
    pub fn events(&self) -> Vec<ProvisionEvent> {
        self.events.lock().clone()
    }

    /// Returns the collected event type names in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ProvisionEvent::event_type).collect()
    }

    /// Returns the events of type `event_type`.
    #[must_use]
    pub fn of_type(&self, event_type: &str) -> Vec<ProvisionEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: &ProvisionEvent) {
        self.events.lock().push(event.clone());
    }
}
