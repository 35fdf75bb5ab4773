//! Deployment parameters: ordered sets, file loading and override merging.

mod file;
mod overrides;
mod set;

pub use file::{load_parameters_file, load_template};
pub use overrides::merge;
pub use set::{Parameter, ParameterSet, ParameterValue};
