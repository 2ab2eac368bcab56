//! Poll Common Library
//!
//! This crate provides shared constants, configuration loading utilities and
//! the hardware module port contract for all poll workspace crates.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Acquisition-wide constants and defaults
//! - [`frame`] - Event frame header layout
//! - [`hal`] - Hardware module port trait, crate configuration and constants
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use poll_common::frame::FrameHeader;
//! use poll_common::hal::port::ModulePort;
//! use poll_common::config::{ConfigLoader, LogLevel};
//! ```

pub mod config;
pub mod consts;
pub mod frame;
pub mod hal;
pub mod prelude;

/// A single 32-bit word as transferred from a module FIFO.
pub type Word = u32;

/// Index of a module within the crate, `0..module_count`.
pub type ModuleIndex = usize;
