//! Resource identifier parsing and name resolution.

mod id;

pub use id::{
    resolve, resolve_lab_scoped, ResourceId, LABS, RESOURCE_GROUPS, VIRTUAL_MACHINES,
};
