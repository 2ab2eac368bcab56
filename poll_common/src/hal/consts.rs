//! Hardware constants for digitizer modules.
//!
//! Limits reported by, or assumed about, the modules in a crate.

/// Canonical name of the default hardware backend.
pub const DEFAULT_DRIVER: &str = "simulation";

/// Capacity of a module's external FIFO in words.
pub const EXTERNAL_FIFO_LENGTH: usize = 131_072;

/// Smallest word count worth reading from a FIFO.
pub const MIN_FIFO_READ: usize = 9;

/// Maximum number of modules in one crate.
pub const MAX_MODULES: usize = 14;

/// Number of channels per module.
pub const CHANNELS_PER_MODULE: usize = 16;

/// Slot occupied by the first module when slots are assigned sequentially.
pub const FIRST_SLOT: u8 = 2;

/// Highest slot number the 4-bit header field can carry.
pub const MAX_SLOT: u8 = 15;
