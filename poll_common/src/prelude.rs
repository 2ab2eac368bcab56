//! Prelude module for common re-exports.
//!
//! Consumers can do `use poll_common::prelude::*;` and get the most
//! important types without listing individual paths.
//!
//! # Usage
//!
//! ```rust
//! use poll_common::prelude::*;
//! ```

// ─── Words ──────────────────────────────────────────────────────────
pub use crate::{ModuleIndex, Word};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};
pub use crate::hal::config::{CrateConfig, SimulationConfig};

// ─── Framing ────────────────────────────────────────────────────────
pub use crate::frame::FrameHeader;

// ─── Hardware port ──────────────────────────────────────────────────
pub use crate::hal::port::{ModulePort, PortError, PortFactory, RunMode};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{SEGMENT_HEADER_WORDS, WORD_BYTES};
pub use crate::hal::consts::{EXTERNAL_FIFO_LENGTH, MIN_FIFO_READ};
