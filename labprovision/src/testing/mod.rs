//! Testing utilities for provisioning runs.
//!
//! This module provides:
//! - Scripted in-memory doubles for the deployment, resource and lab services
//! - An in-memory event sink
//! - Fixture identifiers, templates and remote payloads

mod fixtures;
mod mocks;

pub use fixtures::{failed_deployment_body, lab_vm, lab_vm_template, vm_id, LAB_ID};
pub use mocks::{
    CollectingEventSink, RecordingResourceService, ScriptedDeploymentService, ScriptedLabService,
    SubmittedDeployment,
};
