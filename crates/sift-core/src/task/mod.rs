//! Analysis task tracking.

pub mod registry;

pub use registry::{RegistryError, SweepResult, TaskRegistry, TaskSnapshot, TaskStatus};
