//! Hardware module port contract, crate configuration and constants.
//!
//! This module contains the trait every hardware backend implements and the
//! configuration types describing the modules in a crate.

pub mod config;
pub mod consts;
pub mod port;
