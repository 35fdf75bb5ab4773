//! # Labprovision
//!
//! A provisioning orchestrator for lab virtual machines.
//!
//! Labprovision creates a virtual machine from a deployment template and
//! recovers from partial failures:
//!
//! - **Parameter merging**: parameters file plus a compact override string
//! - **Bounded retries**: fresh deployment names, cleanup and deterministic
//!   renaming between attempts
//! - **Artifact waiting**: polls the lab until artifacts finish, with a
//!   wall-clock timeout
//! - **Artifact verification**: decoded diagnostics for each failed artifact
//! - **Event-driven observability**: lifecycle events alongside `tracing` logs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use labprovision::prelude::*;
//!
//! let settings = ProvisionSettings::from_file(Path::new("task.json")).await?;
//! init_logging(&settings.logging)?;
//!
//! let request = ProvisionRequest::from_settings(&settings).await?;
//! let outcome = Provisioner::new(deployments, resources, lab)
//!     .with_event_sink(Arc::new(LoggingEventSink::default()))
//!     .provision(&request)
//!     .await?;
//!
//! println!("created {}", outcome.resource_id);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod deploy;
pub mod diagnostics;
pub mod errors;
pub mod events;
pub mod observability;
pub mod parameters;
pub mod resource;
pub mod services;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wait;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ProvisionSettings;
    pub use crate::deploy::{
        DeploymentAttempt, ProvisionOutcome, ProvisionRequest, Provisioner, RetryPolicy,
    };
    pub use crate::diagnostics::{describe_remote_error, DecodedMessage};
    pub use crate::errors::{ProvisionError, ProvisionResult, ServiceError};
    pub use crate::events::{EventSink, LoggingEventSink, ProvisionEvent};
    pub use crate::observability::{init_logging, LogFormat, LoggingConfig};
    pub use crate::parameters::{merge, Parameter, ParameterSet, ParameterValue};
    pub use crate::resource::{resolve, resolve_lab_scoped, ResourceId};
    pub use crate::services::{
        ArtifactRecord, ArtifactStatus, Deployment, DeploymentResult, DeploymentService,
        LabService, LabVirtualMachine, ResourceService,
    };
    pub use crate::wait::{ArtifactWaiter, WaitPolicy};
}
