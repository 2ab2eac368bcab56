//! Run control loop.
//!
//! `RunControl` owns the module port, the spill builder, the output sink,
//! the broadcaster and the statistics. Each [`iterate`](RunControl::iterate)
//! reads the shared flags once, performs at most one lifecycle step plus one
//! drain cycle, and republishes the status summary.
//!
//! Priority of flags within one iteration:
//!
//! 1. kill (stops active runs first, then exits)
//! 2. reboot (stops a list-mode run first)
//! 3. histogram (stops a list-mode run first)
//! 4. start
//! 5. stop / timed-run deadline / drain

use crate::broadcast::{BroadcastEncoder, BroadcastMode, Notice};
use crate::carryover::CarryoverBuffers;
use crate::config::PollConfig;
use crate::error::AcqError;
use crate::flags::{SharedFlags, StartRequest};
use crate::histogram::{HistogramRecorder, RunStatusMonitor};
use crate::sink::OutputSinkCoordinator;
use crate::spill::{DrainSettings, Spill, SpillBuilder};
use crate::state::{AcqEvent, AcquisitionMachine, AcquisitionState, TransitionResult};
use crate::stats::RunStatistics;
use crate::status::{StatusBoard, StatusSummary};
use poll_common::ModuleIndex;
use poll_common::hal::port::{ModulePort, RunMode};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Timing of the run-control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlSettings {
    /// Sleep per iteration while no list-mode run is active.
    pub idle_sleep: Duration,
    /// Wait before re-draining a module still reporting an active run.
    pub end_run_delay: Duration,
    /// Forced drains per module before it counts as failed to end its run.
    /// 0 keeps flushing until the module stops or a drain fails.
    pub end_run_retries: u32,
    /// Cadence of histogram steps.
    pub histogram_step: Duration,
    /// Statistics dump interval.
    pub stats_interval: Option<Duration>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self::from_config(&PollConfig::default())
    }
}

impl ControlSettings {
    /// Derive loop timing from the configuration.
    pub fn from_config(config: &PollConfig) -> Self {
        Self {
            idle_sleep: Duration::from_millis(config.acquisition.idle_sleep_ms),
            end_run_delay: Duration::from_millis(config.acquisition.end_run_delay_ms),
            end_run_retries: config.acquisition.end_run_retries,
            histogram_step: Duration::from_millis(config.histogram.step_interval_ms),
            stats_interval: config.acquisition.stats_interval(),
        }
    }
}

/// Operator acknowledgement of a crate reboot.
pub trait RebootAck: Send {
    /// Block until the operator confirms the crate is back.
    fn wait_for_ack(&mut self);
}

/// Acknowledges immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateAck;

impl RebootAck for ImmediateAck {
    fn wait_for_ack(&mut self) {}
}

/// Waits for a message from the command context.
///
/// A disconnected sender counts as an acknowledgement.
pub struct ChannelAck {
    rx: Receiver<()>,
}

impl ChannelAck {
    /// Wait on `rx`.
    pub fn new(rx: Receiver<()>) -> Self {
        Self { rx }
    }
}

impl RebootAck for ChannelAck {
    fn wait_for_ack(&mut self) {
        info!("Waiting for reboot acknowledgement");
        let _ = self.rx.recv();
    }
}

/// Whether the loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Iteration {
    /// Call `iterate` again.
    Continue,
    /// Shutdown finished.
    Exit,
}

#[derive(Debug, Clone, Copy)]
struct ActiveRun {
    started: Instant,
    deadline: Option<Duration>,
    recording: bool,
}

#[derive(Debug, Clone, Copy)]
struct HistogramRun {
    duration: Option<Duration>,
    last_step: Instant,
}

/// Acquisition run controller.
pub struct RunControl {
    port: Box<dyn ModulePort>,
    flags: Arc<SharedFlags>,
    status: StatusBoard,
    machine: AcquisitionMachine,
    builder: SpillBuilder,
    sink: OutputSinkCoordinator,
    broadcaster: Option<BroadcastEncoder>,
    stats: RunStatistics,
    histogram: Box<dyn HistogramRecorder>,
    reboot_ack: Box<dyn RebootAck>,
    settings: ControlSettings,
    run: Option<ActiveRun>,
    histogram_run: Option<HistogramRun>,
    last_error: Option<String>,
}

impl RunControl {
    /// Create a controller around an initialized port.
    pub fn new(
        port: Box<dyn ModulePort>,
        drain: DrainSettings,
        sink: OutputSinkCoordinator,
        broadcaster: Option<BroadcastEncoder>,
        flags: Arc<SharedFlags>,
        settings: ControlSettings,
    ) -> Self {
        let modules = port.module_count();
        Self {
            builder: SpillBuilder::new(drain, modules),
            stats: RunStatistics::new(modules, settings.stats_interval),
            port,
            flags,
            status: StatusBoard::new(),
            machine: AcquisitionMachine::new(),
            sink,
            broadcaster,
            histogram: Box::new(RunStatusMonitor::new()),
            reboot_ack: Box::new(ImmediateAck),
            settings,
            run: None,
            histogram_run: None,
            last_error: None,
        }
    }

    /// Replace the histogram collaborator.
    pub fn with_histogram(mut self, recorder: Box<dyn HistogramRecorder>) -> Self {
        self.histogram = recorder;
        self
    }

    /// Replace the reboot acknowledgement.
    pub fn with_reboot_ack(mut self, ack: Box<dyn RebootAck>) -> Self {
        self.reboot_ack = ack;
        self
    }

    /// Board the status summary is published on.
    pub fn status_board(&self) -> StatusBoard {
        self.status.clone()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AcquisitionState {
        self.machine.state()
    }

    /// Run statistics.
    pub fn stats(&self) -> &RunStatistics {
        &self.stats
    }

    /// Output sink, for inspection.
    pub fn sink(&self) -> &OutputSinkCoordinator {
        &self.sink
    }

    /// Partial frames waiting for the next drain.
    pub fn carryover(&self) -> &CarryoverBuffers {
        self.builder.carryover()
    }

    /// Module port.
    pub fn port(&self) -> &dyn ModulePort {
        self.port.as_ref()
    }

    /// Iterate until shutdown.
    pub fn run(mut self) {
        info!(
            "Run control started with {} modules on '{}'",
            self.port.module_count(),
            self.port.name()
        );
        while self.iterate() == Iteration::Continue {}
        info!("Run control exited");
    }

    /// One pass of the control loop.
    pub fn iterate(&mut self) -> Iteration {
        let flags = Arc::clone(&self.flags);

        if flags.kill_requested() {
            if self.machine.is_active() {
                flags.request_stop();
            } else {
                self.shutdown();
                return Iteration::Exit;
            }
        }

        if flags.reboot_requested() {
            match self.machine.state() {
                AcquisitionState::Running => flags.request_stop(),
                AcquisitionState::Idle => self.reboot(),
                _ => {}
            }
        }

        if flags.histogram_requested() {
            match self.machine.state() {
                AcquisitionState::Running => flags.request_stop(),
                AcquisitionState::Idle => self.begin_histogram(),
                AcquisitionState::HistogramRunning => self.histogram_tick(),
                _ => {}
            }
        }

        if let Some(request) = flags.take_start() {
            if self.machine.state() == AcquisitionState::Idle {
                self.start_run(request);
            } else {
                warn!("Start ignored: acquisition is {}", self.machine.state());
            }
        }

        match self.machine.state() {
            AcquisitionState::Running => {
                if self.deadline_reached() && !flags.stop_requested() {
                    info!("Requested run time reached");
                    flags.request_stop();
                }
                if flags.take_stop() {
                    self.stop_run();
                } else {
                    self.drain_once();
                }
            }
            AcquisitionState::Idle => {
                if flags.take_stop() {
                    debug!("Stop ignored: acquisition is not running");
                }
            }
            _ => {}
        }

        self.publish_status();
        if self.machine.state() != AcquisitionState::Running {
            thread::sleep(self.settings.idle_sleep);
        }
        Iteration::Continue
    }

    // ─── Transitions ────────────────────────────────────────────────

    fn transition(&mut self, event: AcqEvent) {
        match self.machine.handle_event(event) {
            TransitionResult::Ok(state) => debug!("Acquisition state: {}", state),
            TransitionResult::Rejected(reason) => {
                warn!("Transition {:?} rejected: {}", event, reason)
            }
        }
    }

    /// Log and flag an error without stopping.
    fn record_error(&mut self, err: AcqError) {
        match &err {
            AcqError::CorruptedStream { module, report } => {
                error!("Corrupted stream on module {}: {:#}", module, report)
            }
            other => error!("{}", other),
        }
        self.last_error = Some(err.to_string());
        self.flags.set_error();
    }

    /// Flag an error and request a stop.
    fn fail(&mut self, err: AcqError) {
        self.record_error(err);
        self.flags.request_stop();
    }

    fn notify(&mut self, notice: Notice) {
        if let Some(broadcaster) = &mut self.broadcaster {
            broadcaster.notify(notice);
        }
    }

    fn close_file(&mut self) {
        if !self.sink.is_open() {
            return;
        }
        if let Err(e) = self.sink.close_run() {
            self.record_error(e);
        }
        self.notify(Notice::CloseFile);
    }

    fn deadline_reached(&self) -> bool {
        self.run
            .and_then(|run| run.deadline.map(|d| run.started.elapsed() >= d))
            .unwrap_or(false)
    }

    // ─── List-mode runs ─────────────────────────────────────────────

    fn start_run(&mut self, request: StartRequest) {
        if request.record {
            if self.sink.is_open() {
                warn!("Unexpected output file open, closing it");
                self.close_file();
            }
            if let Err(e) = self.sink.open_run(&mut self.stats) {
                self.record_error(e);
                return;
            }
            self.notify(Notice::OpenFile);
        }

        if let Err(e) = self.port.start_run(RunMode::ListMode) {
            self.record_error(AcqError::RunStartFailure(e));
            self.close_file();
            return;
        }

        self.builder.reset();
        self.run = Some(ActiveRun {
            started: Instant::now(),
            deadline: request.run_time,
            recording: request.record,
        });
        self.flags.set_running(true);
        self.transition(AcqEvent::RunStarted);

        match (request.record, request.run_time) {
            (true, Some(t)) => info!(
                "Run {} started for {:.0} s",
                self.sink.run_number(),
                t.as_secs_f64()
            ),
            (true, None) => info!("Run {} started", self.sink.run_number()),
            (false, Some(t)) => info!("Acquisition started for {:.0} s", t.as_secs_f64()),
            (false, None) => info!("Acquisition started"),
        }
    }

    /// Returns false when the drain failed.
    fn drain_once(&mut self) -> bool {
        let force = self.flags.take_force_spill();
        match self.builder.drain(self.port.as_mut(), &mut self.stats, force) {
            Ok(Some(spill)) => {
                self.handle_spill(&spill);
                true
            }
            Ok(None) => true,
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    fn handle_spill(&mut self, spill: &Spill) {
        let recording = self.run.is_some_and(|run| run.recording);
        if recording {
            match self.sink.write_spill(spill) {
                Ok(outcome) if outcome.rolled_over => {
                    self.notify(Notice::CloseFile);
                    self.notify(Notice::OpenFile);
                }
                Ok(_) => {}
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }

        let mode = if self.flags.shm_mode() {
            BroadcastMode::SharedMemory
        } else {
            BroadcastMode::Passive
        };
        let spill_number = self.builder.spill_count();
        if let Some(broadcaster) = &mut self.broadcaster {
            let report = broadcaster.broadcast(spill, mode, spill_number);
            if report.failures > 0 {
                debug!(
                    "Spill {}: {} of {} datagrams failed",
                    spill_number,
                    report.failures,
                    report.failures + report.chunks_sent
                );
            }
        }
    }

    fn stop_run(&mut self) {
        self.transition(AcqEvent::StopBegin);

        let errored_before_stop = self.flags.had_error();
        if !errored_before_stop {
            self.flags.request_force_spill();
            self.drain_once();
        }

        if let Err(e) = self.port.end_run() {
            self.record_error(e.into());
        }

        for module in 0..self.port.module_count() {
            self.confirm_end_of_run(module, errored_before_stop);
        }
        self.builder.discard_carryover();

        self.stats.clear_rates();
        self.stats.dump();
        self.stats.clear_totals();

        let elapsed = self.run.map_or(0.0, |run| run.started.elapsed().as_secs_f64());
        if self.sink.is_open() {
            info!(
                "Run {} stopped after {:.1} s",
                self.sink.run_number(),
                elapsed
            );
        } else {
            info!("Acquisition stopped after {:.1} s", elapsed);
        }
        self.close_file();

        self.run = None;
        self.flags.set_running(false);
        self.flags.clear_stop();
        self.transition(AcqEvent::StopComplete);
    }

    fn may_retry_flush(&self, attempts: u32) -> bool {
        let limit = self.settings.end_run_retries;
        limit == 0 || attempts < limit
    }

    /// Failures of other modules during this check never cut a module's
    /// flushes short; only an error from before the stop or a failed flush
    /// of this module does.
    fn confirm_end_of_run(&mut self, module: ModuleIndex, errored_before_stop: bool) {
        let mut attempts = 0;
        let mut flush_failed = errored_before_stop;
        loop {
            match self.port.check_run_status(module) {
                Ok(false) => {
                    debug!("Module {} ended its run", module);
                    return;
                }
                Ok(true) if !flush_failed && self.may_retry_flush(attempts) => {
                    attempts += 1;
                    info!(
                        "Module {} still running with {} words in its FIFO, flushing",
                        module,
                        self.port.fifo_word_count(module).unwrap_or(0)
                    );
                    self.flags.request_force_spill();
                    thread::sleep(self.settings.end_run_delay);
                    flush_failed = !self.drain_once();
                }
                Ok(true) => {
                    self.record_error(AcqError::ModuleEndRunFailure { module });
                    return;
                }
                Err(e) => {
                    warn!("Run status of module {} unavailable: {}", module, e);
                    self.record_error(AcqError::ModuleEndRunFailure { module });
                    return;
                }
            }
        }
    }

    // ─── Histogram runs ─────────────────────────────────────────────

    fn begin_histogram(&mut self) {
        let duration = self.flags.histogram_duration();
        match duration {
            Some(d) => info!("Histogram run for {:.0} s", d.as_secs_f64()),
            None => info!("Unbounded histogram run, stop to end it"),
        }

        if let Err(e) = self.port.start_run(RunMode::Histogram) {
            self.record_error(AcqError::RunStartFailure(e));
            self.flags.clear_histogram();
            return;
        }
        if let Err(e) = self.histogram.begin(self.port.as_mut()) {
            if let Err(end) = self.port.end_run() {
                warn!("Failed to end histogram run: {}", end);
            }
            self.record_error(e);
            self.flags.clear_histogram();
            return;
        }

        self.histogram_run = Some(HistogramRun {
            duration,
            last_step: Instant::now(),
        });
        self.transition(AcqEvent::HistogramStarted);
    }

    fn histogram_tick(&mut self) {
        let Some(run) = self.histogram_run else {
            return;
        };

        let stop = self.flags.take_stop();
        let expired = run
            .duration
            .is_some_and(|d| self.histogram.run_time() >= d);
        if stop || expired {
            self.end_histogram(None);
            return;
        }

        if run.last_step.elapsed() >= self.settings.histogram_step {
            self.histogram_run = Some(HistogramRun {
                last_step: Instant::now(),
                ..run
            });
            if let Err(e) = self.histogram.step(self.port.as_mut()) {
                self.end_histogram(Some(e));
            }
        }
    }

    fn end_histogram(&mut self, failure: Option<AcqError>) {
        if let Err(e) = self.port.end_run() {
            warn!("Failed to end histogram run: {}", e);
        }
        if let Err(e) = self.histogram.finish(self.port.as_mut()) {
            warn!("Histogram finish failed: {}", e);
        }
        if let Some(err) = failure {
            error!("Histogram run terminated");
            self.record_error(err);
        }
        self.histogram_run = None;
        self.flags.clear_histogram();
        self.flags.clear_stop();
        self.transition(AcqEvent::HistogramEnded);
    }

    // ─── Reboot and shutdown ────────────────────────────────────────

    fn reboot(&mut self) {
        self.transition(AcqEvent::RebootBegin);
        self.publish_status();

        info!("Attempting crate reboot");
        if let Err(e) = self.port.boot() {
            self.record_error(e.into());
        }
        self.reboot_ack.wait_for_ack();

        self.flags.clear_reboot();
        self.transition(AcqEvent::RebootComplete);
    }

    fn shutdown(&mut self) {
        self.transition(AcqEvent::Kill);
        self.close_file();
        self.notify(Notice::KillSocket);

        if let Some(diag) = self.port.diagnostics() {
            info!(
                "Port '{}': {} runs, {} FIFO reads, {} words",
                self.port.name(),
                diag.runs_started,
                diag.fifo_reads,
                diag.words_read
            );
        }
        if let Err(e) = self.port.shutdown() {
            warn!("Port shutdown failed: {}", e);
        }
        self.publish_status();
    }

    // ─── Status ─────────────────────────────────────────────────────

    fn publish_status(&self) {
        let state = self.machine.state();
        let histogram = self.histogram_run.map(|run| {
            (
                self.histogram.run_time().as_secs_f64(),
                run.duration.map(|d| d.as_secs_f64()),
            )
        });
        let had_error = self.flags.had_error();

        self.status.publish(StatusSummary {
            state,
            had_error,
            recording: self.run.is_some_and(|run| run.recording),
            elapsed_secs: self
                .run
                .map_or(0.0, |run| run.started.elapsed().as_secs_f64()),
            data_rate: self.stats.total_data_rate(),
            filename: self.sink.current_filename(),
            file_size: self.sink.current_size(),
            run_number: self.sink.run_number(),
            spills: self.builder.spill_count(),
            histogram_elapsed_secs: histogram.map(|(elapsed, _)| elapsed),
            histogram_duration_secs: histogram.and_then(|(_, total)| total),
            last_error: if had_error {
                self.last_error.clone()
            } else {
                None
            },
        });
    }
}
