//! # Poll HAL Library
//!
//! Hardware backends for the crate poller.
//!
//! Backends implement the `ModulePort` trait defined in
//! `poll_common::hal::port` and are created by name through a
//! [`PortRegistry`].
//!
//! # Module Structure
//!
//! - [`registry`] - Port factory registration
//! - [`drivers`] - Backend implementations (simulation, offline)
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                       poll_hal                            │
//! │  ┌────────────────┐        ┌───────────────────────────┐  │
//! │  │  PortRegistry  │──────► │  Box<dyn ModulePort>      │  │
//! │  │  (by name)     │        │  simulation │ offline     │  │
//! │  └────────────────┘        └───────────────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod drivers;
pub mod registry;

pub use crate::drivers::register_all_ports;
pub use crate::registry::PortRegistry;
