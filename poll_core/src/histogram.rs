//! Histogram (MCA) run collaborator.
//!
//! While a histogram run is active the run controller calls
//! [`HistogramRecorder::step`] at a fixed cadence. Spectrum readout lives
//! outside this crate; the built-in [`RunStatusMonitor`] only checks that
//! every module keeps its run alive.

use crate::error::AcqError;
use poll_common::hal::port::ModulePort;
use std::time::{Duration, Instant};
use tracing::info;

/// Collaborator driven during a histogram run.
pub trait HistogramRecorder: Send {
    /// Called once after the modules started the histogram run.
    fn begin(&mut self, port: &mut dyn ModulePort) -> Result<(), AcqError>;

    /// Called at every cadence tick. An error ends the run.
    fn step(&mut self, port: &mut dyn ModulePort) -> Result<(), AcqError>;

    /// Called once after the modules ended the run.
    fn finish(&mut self, port: &mut dyn ModulePort) -> Result<(), AcqError>;

    /// Time since `begin`.
    fn run_time(&self) -> Duration;
}

/// Recorder that fails as soon as a module drops out of the run.
#[derive(Debug, Default)]
pub struct RunStatusMonitor {
    started: Option<Instant>,
    steps: u64,
}

impl RunStatusMonitor {
    /// Create an idle monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps taken in the current run.
    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl HistogramRecorder for RunStatusMonitor {
    fn begin(&mut self, _port: &mut dyn ModulePort) -> Result<(), AcqError> {
        self.started = Some(Instant::now());
        self.steps = 0;
        Ok(())
    }

    fn step(&mut self, port: &mut dyn ModulePort) -> Result<(), AcqError> {
        for module in 0..port.module_count() {
            if !port.check_run_status(module)? {
                return Err(AcqError::HistogramFailure(format!(
                    "module {module} is no longer running"
                )));
            }
        }
        self.steps += 1;
        Ok(())
    }

    fn finish(&mut self, _port: &mut dyn ModulePort) -> Result<(), AcqError> {
        info!(
            "Histogram run ended after {:.1} s ({} steps)",
            self.run_time().as_secs_f64(),
            self.steps
        );
        self.started = None;
        Ok(())
    }

    fn run_time(&self) -> Duration {
        self.started.map_or(Duration::ZERO, |t| t.elapsed())
    }
}
