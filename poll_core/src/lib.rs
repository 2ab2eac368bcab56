//! # Poll Core Library
//!
//! Spill acquisition for a crate of digitizer modules: FIFO draining, frame
//! decoding with carryover, file output with rollover, network broadcast and
//! the run-control loop driven by operator commands.
//!
//! # Module Structure
//!
//! - [`decoder`] - Frame header validation and segment decoding
//! - [`carryover`] - Partial frames kept between drains
//! - [`spill`] - Drain cycle and spill layout
//! - [`sink`] - Output files and rollover
//! - [`broadcast`] - Spill broadcast and lifecycle notices
//! - [`stats`] - Per-module event and byte counters
//! - [`flags`] - Flags shared with the command context
//! - [`state`] - Acquisition state machine
//! - [`histogram`] - Histogram run collaborator
//! - [`control`] - Run-control loop
//! - [`command`] - Text command dispatcher
//! - [`status`] - Published status summary
//! - [`config`] - `poll.toml` layout
//! - [`error`] - Acquisition errors
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  SharedFlags   ┌──────────────────────────────────────┐
//! │   command    │ ─────────────► │             RunControl               │
//! │  dispatcher  │ ◄───────────── │  SpillBuilder ─► OutputSink          │
//! └──────────────┘  StatusBoard   │       │      └─► BroadcastEncoder    │
//!                                 │       ▼                              │
//!                                 │  dyn ModulePort (poll_hal)           │
//!                                 └──────────────────────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod broadcast;
pub mod carryover;
pub mod command;
pub mod config;
pub mod control;
pub mod decoder;
pub mod error;
pub mod flags;
pub mod histogram;
pub mod sink;
pub mod spill;
pub mod state;
pub mod stats;
pub mod status;

pub use crate::command::{Command, CommandDispatcher};
pub use crate::control::{ControlSettings, RunControl};
pub use crate::error::AcqError;
pub use crate::flags::{CommandHandle, SharedFlags};
