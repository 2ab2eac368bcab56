//! Simulated crate implementing `ModulePort`.

use super::generator::FrameGenerator;
use poll_common::hal::config::{CrateConfig, SimulationConfig};
use poll_common::hal::port::{ModulePort, PortDiagnostics, PortError, RunMode};
use poll_common::{ModuleIndex, Word};
use std::collections::VecDeque;
use std::time::Instant;
use tracing::{debug, info, warn};

/// One simulated digitizer module.
struct SimModule {
    slot: u8,
    fifo: VecDeque<Word>,
    generator: FrameGenerator,
    /// Fractional words owed from the last fill.
    backlog: f64,
    last_fill: Instant,
    /// Status polls left before the module reports its run as ended.
    end_polls_left: u32,
}

impl SimModule {
    fn push_words(&mut self, count: usize, capacity: usize) -> usize {
        let room = capacity.saturating_sub(self.fifo.len());
        let count = count.min(room);
        for _ in 0..count {
            let word = self.generator.next_word();
            self.fifo.push_back(word);
        }
        count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Stopped,
    Active(RunMode),
    Ending,
}

/// Software crate producing list-mode data at a configured rate.
///
/// While a list-mode run is active every `fifo_word_count` call tops up the
/// module FIFO with `word_rate * elapsed` words, capped at the FIFO capacity.
/// Ending a run completes each module's frame in progress so the final
/// drain sees whole frames.
pub struct SimulatedCrate {
    name: &'static str,
    version: &'static str,
    initialized: bool,
    modules: Vec<SimModule>,
    fifo_capacity: usize,
    settings: SimulationConfig,
    phase: RunPhase,
    diagnostics: PortDiagnostics,
}

impl SimulatedCrate {
    /// Create an uninitialized simulated crate.
    pub fn new() -> Self {
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            initialized: false,
            modules: Vec::new(),
            fifo_capacity: 0,
            settings: SimulationConfig::default(),
            phase: RunPhase::Stopped,
            diagnostics: PortDiagnostics::default(),
        }
    }

    /// Immediately queue `count` generated words in a module FIFO.
    ///
    /// Returns the number of words actually queued (the FIFO never holds
    /// more than its capacity).
    pub fn preload(&mut self, module: ModuleIndex, count: usize) -> Result<usize, PortError> {
        let capacity = self.fifo_capacity;
        let m = self.module_mut(module)?;
        Ok(m.push_words(count, capacity))
    }

    /// Whether a run (of either kind) is currently active.
    pub fn is_running(&self) -> bool {
        matches!(self.phase, RunPhase::Active(_))
    }

    fn module_mut(&mut self, module: ModuleIndex) -> Result<&mut SimModule, PortError> {
        self.modules
            .get_mut(module)
            .ok_or(PortError::InvalidModule(module))
    }

    fn fill(&mut self, module: ModuleIndex) -> Result<(), PortError> {
        let rate = self.settings.word_rate;
        let capacity = self.fifo_capacity;
        let m = self.module_mut(module)?;

        let now = Instant::now();
        m.backlog += now.duration_since(m.last_fill).as_secs_f64() * rate;
        m.last_fill = now;

        let due = m.backlog.floor();
        m.backlog -= due;
        let pushed = m.push_words(due as usize, capacity);
        if pushed < due as usize {
            warn!("Module {} FIFO full ({} words)", module, m.fifo.len());
        }
        Ok(())
    }
}

impl Default for SimulatedCrate {
    fn default() -> Self {
        Self::new()
    }
}

impl ModulePort for SimulatedCrate {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn init(&mut self, config: &CrateConfig) -> Result<(), PortError> {
        config
            .validate()
            .map_err(|e| PortError::ConfigError(e.to_string()))?;

        let settings = &config.simulation;
        let now = Instant::now();
        self.modules = config
            .slots
            .iter()
            .enumerate()
            .map(|(idx, &slot)| SimModule {
                slot,
                fifo: VecDeque::with_capacity(config.fifo_capacity),
                generator: FrameGenerator::new(
                    slot,
                    settings.min_frame_words,
                    settings.max_frame_words,
                    settings.seed.wrapping_add(idx as u64),
                ),
                backlog: 0.0,
                last_fill: now,
                end_polls_left: 0,
            })
            .collect();
        self.fifo_capacity = config.fifo_capacity;
        self.settings = settings.clone();
        self.phase = RunPhase::Stopped;
        self.initialized = true;

        info!(
            "Simulated crate initialized: {} modules in slots {:?}, {:.0} words/s",
            self.modules.len(),
            config.slots,
            settings.word_rate
        );
        Ok(())
    }

    fn module_count(&self) -> usize {
        self.modules.len()
    }

    fn expected_slot(&self, module: ModuleIndex) -> u8 {
        self.modules.get(module).map_or(0, |m| m.slot)
    }

    fn fifo_word_count(&mut self, module: ModuleIndex) -> Result<usize, PortError> {
        if self.phase == RunPhase::Active(RunMode::ListMode) {
            self.fill(module)?;
        }
        Ok(self.module_mut(module)?.fifo.len())
    }

    fn read_fifo_words(
        &mut self,
        buf: &mut [Word],
        module: ModuleIndex,
    ) -> Result<(), PortError> {
        let wanted = buf.len();
        let m = self.module_mut(module)?;
        if wanted > m.fifo.len() {
            return Err(PortError::CommunicationError(format!(
                "module {} holds {} words, {} requested",
                module,
                m.fifo.len(),
                wanted
            )));
        }
        for (dst, src) in buf.iter_mut().zip(m.fifo.drain(..wanted)) {
            *dst = src;
        }
        self.diagnostics.fifo_reads += 1;
        self.diagnostics.words_read += wanted as u64;
        Ok(())
    }

    fn start_run(&mut self, mode: RunMode) -> Result<(), PortError> {
        if !self.initialized {
            return Err(PortError::InitFailed("crate not initialized".to_string()));
        }
        if self.is_running() {
            return Err(PortError::CommunicationError(
                "a run is already active".to_string(),
            ));
        }

        let now = Instant::now();
        for m in &mut self.modules {
            m.fifo.clear();
            m.generator.reset();
            m.backlog = 0.0;
            m.last_fill = now;
            m.end_polls_left = 0;
        }
        self.phase = RunPhase::Active(mode);
        self.diagnostics.runs_started += 1;
        info!("Simulated {:?} run started", mode);
        Ok(())
    }

    fn end_run(&mut self) -> Result<(), PortError> {
        if let RunPhase::Active(mode) = self.phase {
            let polls = self.settings.end_run_polls;
            for m in &mut self.modules {
                if mode == RunMode::ListMode {
                    let tail = m.generator.finish_frame();
                    m.fifo.extend(tail);
                }
                m.end_polls_left = polls;
            }
            self.phase = RunPhase::Ending;
            debug!("Simulated {:?} run ending", mode);
        }
        Ok(())
    }

    fn check_run_status(&mut self, module: ModuleIndex) -> Result<bool, PortError> {
        let phase = self.phase;
        let m = self.module_mut(module)?;
        let active = match phase {
            RunPhase::Stopped => false,
            RunPhase::Active(_) => true,
            RunPhase::Ending if m.end_polls_left > 0 => {
                m.end_polls_left -= 1;
                true
            }
            RunPhase::Ending => false,
        };

        if phase == RunPhase::Ending && self.modules.iter().all(|m| m.end_polls_left == 0) {
            self.phase = RunPhase::Stopped;
        }
        Ok(active)
    }

    fn boot(&mut self) -> Result<(), PortError> {
        info!("Rebooting {} simulated modules", self.modules.len());
        for m in &mut self.modules {
            m.fifo.clear();
            m.generator.reset();
            m.end_polls_left = 0;
        }
        self.phase = RunPhase::Stopped;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PortError> {
        info!(
            "Simulated crate shutting down after {} runs, {} words read",
            self.diagnostics.runs_started, self.diagnostics.words_read
        );
        self.phase = RunPhase::Stopped;
        self.initialized = false;
        Ok(())
    }

    fn diagnostics(&self) -> Option<PortDiagnostics> {
        Some(self.diagnostics.clone())
    }
}
