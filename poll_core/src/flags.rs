//! Cross-context coordination flags.
//!
//! The command context and the run controller share one [`SharedFlags`]
//! and nothing else. Every field has a fixed owner:
//!
//! | Field                              | Set by                 | Cleared by         |
//! |------------------------------------|------------------------|--------------------|
//! | `kill`                             | command                | never              |
//! | `start`, `record`, `run_time`      | command                | run control        |
//! | `stop`                             | command, run control   | run control        |
//! | `force_spill`                      | command, run control   | run control        |
//! | `histogram`, `histogram_duration`  | command                | run control        |
//! | `reboot`                           | command                | run control        |
//! | `running`                          | run control            | run control        |
//! | `had_error`                        | run control            | command            |
//! | `shm_mode`                         | command                | command            |
//!
//! The command side goes through [`CommandHandle`]; the run controller uses
//! the crate-private consume methods.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Atomic flag set shared by both execution contexts.
#[derive(Debug, Default)]
pub struct SharedFlags {
    kill: AtomicBool,
    start: AtomicBool,
    record: AtomicBool,
    run_time_ms: AtomicU64,
    stop: AtomicBool,
    force_spill: AtomicBool,
    running: AtomicBool,
    had_error: AtomicBool,
    reboot: AtomicBool,
    histogram: AtomicBool,
    histogram_duration_ms: AtomicU64,
    shm_mode: AtomicBool,
}

/// A start request as consumed by the run controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartRequest {
    /// Persist spills to disk.
    pub record: bool,
    /// Stop automatically after this long.
    pub run_time: Option<Duration>,
}

fn to_ms(duration: Option<Duration>) -> u64 {
    duration.map_or(0, |d| d.as_millis().min(u64::MAX as u128) as u64)
}

fn from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl SharedFlags {
    /// Create a flag set with everything cleared.
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Read side ──────────────────────────────────────────────────

    /// A list-mode run is active.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The last operation failed.
    pub fn had_error(&self) -> bool {
        self.had_error.load(Ordering::Acquire)
    }

    /// The process has been told to exit.
    pub fn kill_requested(&self) -> bool {
        self.kill.load(Ordering::Acquire)
    }

    /// A run start is pending.
    pub fn start_requested(&self) -> bool {
        self.start.load(Ordering::Acquire)
    }

    /// A stop is pending.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// A histogram run is requested or active.
    pub fn histogram_requested(&self) -> bool {
        self.histogram.load(Ordering::Acquire)
    }

    /// Requested histogram length, `None` for unbounded.
    pub fn histogram_duration(&self) -> Option<Duration> {
        from_ms(self.histogram_duration_ms.load(Ordering::Acquire))
    }

    /// A crate reboot is pending.
    pub fn reboot_requested(&self) -> bool {
        self.reboot.load(Ordering::Acquire)
    }

    /// Spills are broadcast in full rather than as notices.
    pub fn shm_mode(&self) -> bool {
        self.shm_mode.load(Ordering::Acquire)
    }

    // ─── Run-control side ───────────────────────────────────────────

    pub(crate) fn take_start(&self) -> Option<StartRequest> {
        if !self.start.swap(false, Ordering::AcqRel) {
            return None;
        }
        Some(StartRequest {
            record: self.record.swap(false, Ordering::AcqRel),
            run_time: from_ms(self.run_time_ms.swap(0, Ordering::AcqRel)),
        })
    }

    pub(crate) fn take_stop(&self) -> bool {
        self.stop.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_force_spill(&self) -> bool {
        self.force_spill.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn clear_stop(&self) {
        self.stop.store(false, Ordering::Release);
    }

    pub(crate) fn request_force_spill(&self) {
        self.force_spill.store(true, Ordering::Release);
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn set_error(&self) {
        self.had_error.store(true, Ordering::Release);
    }

    pub(crate) fn clear_histogram(&self) {
        self.histogram.store(false, Ordering::Release);
        self.histogram_duration_ms.store(0, Ordering::Release);
    }

    pub(crate) fn clear_reboot(&self) {
        self.reboot.store(false, Ordering::Release);
    }
}

/// Why the command surface refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandRejected {
    /// A list-mode run is already active or pending.
    #[error("Acquisition is already running")]
    AlreadyRunning,
    /// Nothing is running.
    #[error("Acquisition is not running")]
    NotRunning,
    /// A histogram run is active.
    #[error("Cannot do that while a histogram run is active")]
    HistogramActive,
    /// A list-mode run is active.
    #[error("Cannot do that while acquisition is running")]
    RunActive,
    /// The poller is shutting down.
    #[error("Shutdown in progress")]
    ShuttingDown,
}

/// Command-context view of the shared flags.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    flags: Arc<SharedFlags>,
}

impl CommandHandle {
    /// Wrap a flag set.
    pub fn new(flags: Arc<SharedFlags>) -> Self {
        Self { flags }
    }

    /// Read-only access to the flags.
    pub fn flags(&self) -> &SharedFlags {
        &self.flags
    }

    fn check_alive(&self) -> Result<(), CommandRejected> {
        if self.flags.kill_requested() {
            return Err(CommandRejected::ShuttingDown);
        }
        Ok(())
    }

    /// Clear the error flag; done on every new command.
    pub fn clear_error(&self) {
        self.flags.had_error.store(false, Ordering::Release);
    }

    /// Request a list-mode run.
    pub fn start_run(&self, record: bool, run_time: Option<Duration>) -> Result<(), CommandRejected> {
        self.check_alive()?;
        if self.flags.histogram_requested() {
            return Err(CommandRejected::HistogramActive);
        }
        if self.flags.is_running() || self.flags.start_requested() {
            return Err(CommandRejected::AlreadyRunning);
        }
        self.flags.record.store(record, Ordering::Release);
        self.flags.run_time_ms.store(to_ms(run_time), Ordering::Release);
        self.flags.start.store(true, Ordering::Release);
        Ok(())
    }

    /// Request the active run (list-mode or histogram) to stop.
    pub fn stop_run(&self) -> Result<(), CommandRejected> {
        if !self.flags.is_running() && !self.flags.histogram_requested() {
            return Err(CommandRejected::NotRunning);
        }
        self.flags.request_stop();
        Ok(())
    }

    /// Request an immediate drain regardless of the threshold.
    pub fn force_spill(&self) -> Result<(), CommandRejected> {
        if !self.flags.is_running() {
            return Err(CommandRejected::NotRunning);
        }
        self.flags.request_force_spill();
        Ok(())
    }

    /// Flip between passive and shared-memory broadcast. Returns the new mode.
    pub fn toggle_shm_mode(&self) -> bool {
        !self.flags.shm_mode.fetch_xor(true, Ordering::AcqRel)
    }

    /// Set the broadcast mode.
    pub fn set_shm_mode(&self, enabled: bool) {
        self.flags.shm_mode.store(enabled, Ordering::Release);
    }

    /// Request a histogram run; `None` runs until stopped.
    pub fn start_histogram(&self, duration: Option<Duration>) -> Result<(), CommandRejected> {
        self.check_alive()?;
        if self.flags.histogram_requested() {
            return Err(CommandRejected::HistogramActive);
        }
        if self.flags.is_running() || self.flags.start_requested() {
            return Err(CommandRejected::RunActive);
        }
        self.flags
            .histogram_duration_ms
            .store(to_ms(duration), Ordering::Release);
        self.flags.histogram.store(true, Ordering::Release);
        Ok(())
    }

    /// Request a crate reboot. An active list-mode run is stopped first.
    pub fn reboot(&self) -> Result<(), CommandRejected> {
        self.check_alive()?;
        if self.flags.histogram_requested() {
            return Err(CommandRejected::HistogramActive);
        }
        self.flags.reboot.store(true, Ordering::Release);
        Ok(())
    }

    /// Exit, refused while anything is running.
    pub fn quit(&self) -> Result<(), CommandRejected> {
        if self.flags.histogram_requested() {
            return Err(CommandRejected::HistogramActive);
        }
        if self.flags.is_running() {
            return Err(CommandRejected::RunActive);
        }
        self.flags.kill.store(true, Ordering::Release);
        Ok(())
    }

    /// Exit unconditionally; active runs are stopped first.
    pub fn kill(&self) {
        if self.flags.is_running() || self.flags.histogram_requested() {
            self.flags.request_stop();
        }
        self.flags.kill.store(true, Ordering::Release);
    }
}
