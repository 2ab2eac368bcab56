//! Crate backend implementations.
//!
//! - [`simulation`] - Software crate producing randomized list-mode frames
//! - [`offline`] - Placeholder crate with no hardware attached
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `ModulePort` trait from `poll_common::hal::port`
//! 3. Register the backend in [`register_all_ports`]

pub mod offline;
pub mod simulation;

use crate::registry::PortRegistry;

/// Register all built-in backends.
pub fn register_all_ports(registry: &mut PortRegistry) {
    registry.register("simulation", simulation::create_port);
    registry.register("offline", offline::create_port);
}
