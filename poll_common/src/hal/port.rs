//! Module port trait and error types.
//!
//! This module defines:
//! - `ModulePort` trait - Interface for pluggable hardware backends
//! - `PortError` enum - Error types for port operations
//! - `PortFactory` type alias - Factory function type
//! - `RunMode` - Which kind of run the modules should start
//! - `PortDiagnostics` struct - Optional backend diagnostics

use crate::hal::config::CrateConfig;
use crate::{ModuleIndex, Word};
use thiserror::Error;

/// Error types for port operations.
#[derive(Debug, Clone, Error)]
pub enum PortError {
    /// Backend initialization failed
    #[error("Initialization failed: {0}")]
    InitFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Hardware communication error
    #[error("Hardware communication error: {0}")]
    CommunicationError(String),

    /// Backend not found
    #[error("Driver not found: {0}")]
    DriverNotFound(String),

    /// Module index outside `0..module_count`
    #[error("Invalid module index {0}")]
    InvalidModule(ModuleIndex),

    /// Operation the backend cannot perform
    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

/// Factory function type for creating port instances.
pub type PortFactory = fn() -> Box<dyn ModulePort>;

/// Kind of run started on every module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// List-mode run: events are streamed into the external FIFO.
    ListMode,
    /// Histogram (MCA) run: spectra are accumulated on the module.
    Histogram,
}

/// Optional backend diagnostics.
#[derive(Debug, Clone, Default)]
pub struct PortDiagnostics {
    /// Number of bulk FIFO reads performed
    pub fifo_reads: u64,
    /// Total words handed out by bulk reads
    pub words_read: u64,
    /// Number of runs started
    pub runs_started: u64,
}

/// Trait defining the interface for hardware backends.
///
/// The run controller drives modules exclusively through this trait, so a
/// simulated crate and an offline placeholder are interchangeable.
///
/// # Lifecycle
///
/// 1. `init()` - Called once before the control loop starts
/// 2. `start_run()` / `fifo_word_count()` / `read_fifo_words()` / `end_run()`
///    - Called from the control loop
/// 3. `shutdown()` - Called when the process is stopping
///
/// No call carries a timeout; a backend must return once the hardware answers.
pub trait ModulePort: Send {
    /// Returns the backend's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the backend's semantic version.
    fn version(&self) -> &'static str;

    /// Initialize the backend with the crate configuration.
    ///
    /// # Errors
    /// Return `PortError::InitFailed` if initialization cannot complete.
    fn init(&mut self, config: &CrateConfig) -> Result<(), PortError>;

    /// Number of modules found during initialization.
    fn module_count(&self) -> usize;

    /// Slot number every frame header of `module` must carry.
    fn expected_slot(&self, module: ModuleIndex) -> u8;

    /// Number of words currently waiting in the module's external FIFO.
    fn fifo_word_count(&mut self, module: ModuleIndex) -> Result<usize, PortError>;

    /// Read exactly `buf.len()` words from the module's external FIFO.
    ///
    /// Callers never ask for more words than `fifo_word_count` reported.
    fn read_fifo_words(&mut self, buf: &mut [Word], module: ModuleIndex)
    -> Result<(), PortError>;

    /// Start a run of the given kind on all modules.
    fn start_run(&mut self, mode: RunMode) -> Result<(), PortError>;

    /// Instruct all modules to end the current run.
    fn end_run(&mut self) -> Result<(), PortError>;

    /// Whether the module still reports an active run.
    fn check_run_status(&mut self, module: ModuleIndex) -> Result<bool, PortError>;

    /// Reboot all modules in the crate.
    fn boot(&mut self) -> Result<(), PortError>;

    /// Graceful shutdown of the backend.
    fn shutdown(&mut self) -> Result<(), PortError>;

    /// Get backend-specific diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<PortDiagnostics> {
        None
    }
}
