//! Post-provisioning wait for artifact completion.

mod policy;
mod waiter;

pub use policy::{WaitPolicy, MAX_POLL_INTERVAL_MINUTES};
pub use waiter::ArtifactWaiter;
