//! Poller configuration.
//!
//! One TOML document drives the whole process:
//!
//! ```toml
//! [shared]
//! log_level = "info"
//!
//! [crate_config]
//! driver = "simulation"
//! slots = [2, 3]
//!
//! [acquisition]
//! threshold_percent = 50.0
//!
//! [output]
//! directory = "/data"
//! prefix = "run"
//!
//! [broadcast]
//! address = "127.0.0.1:5555"
//!
//! [histogram]
//! step_interval_ms = 1000
//! ```
//!
//! Every section is optional and falls back to its defaults.

use crate::broadcast::BroadcastMode;
use crate::sink::{HEADER_WORDS, OutputSettings};
use crate::spill::DrainSettings;
use poll_common::config::{ConfigError, SharedConfig};
use poll_common::consts::{
    DEFAULT_BROADCAST_ADDR, DEFAULT_THRESHOLD_PERCENT, MAX_CHUNK_WORDS, MAX_FILE_SIZE, POLL_TRIES,
    RESERVED_TRAILER_BYTES, WORD_BYTES,
};
use poll_common::hal::config::CrateConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete poller configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    /// Logging.
    pub shared: SharedConfig,
    /// Crate layout and backend.
    pub crate_config: CrateConfig,
    /// Drain and run-control timing.
    pub acquisition: AcquisitionConfig,
    /// Output files.
    pub output: OutputConfig,
    /// Network broadcast.
    pub broadcast: BroadcastConfig,
    /// Histogram runs.
    pub histogram: HistogramConfig,
}

impl PollConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.crate_config.validate()?;
        self.acquisition.validate()?;
        self.output.validate()?;
        self.broadcast.validate()?;
        self.histogram.validate()
    }

    /// Drain parameters derived from the crate and acquisition sections.
    pub fn drain_settings(&self) -> DrainSettings {
        DrainSettings::new(
            self.crate_config.fifo_capacity,
            self.crate_config.min_fifo_read,
            self.acquisition.threshold_percent,
            self.acquisition.poll_tries,
        )
    }
}

/// `[acquisition]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AcquisitionConfig {
    /// FIFO fill level, in percent of capacity, that triggers a drain.
    pub threshold_percent: f64,
    /// Word-count polls per drain attempt.
    pub poll_tries: u32,
    /// Seconds of acquisition between statistics dumps (0 disables).
    pub stats_interval_secs: f64,
    /// Loop sleep while no list-mode run is active.
    pub idle_sleep_ms: u64,
    /// Wait before re-draining a module that has not ended its run.
    pub end_run_delay_ms: u64,
    /// Forced drains per module before it counts as failed to end its run
    /// (0 retries until the module stops).
    pub end_run_retries: u32,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
            poll_tries: POLL_TRIES,
            stats_interval_secs: 3.0,
            idle_sleep_ms: 10,
            end_run_delay_ms: 1000,
            end_run_retries: 0,
        }
    }
}

impl AcquisitionConfig {
    /// Validate the section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold_percent > 0.0 && self.threshold_percent <= 100.0) {
            return Err(ConfigError::ValidationError(format!(
                "acquisition.threshold_percent must be in (0, 100], got {}",
                self.threshold_percent
            )));
        }
        if self.poll_tries == 0 {
            return Err(ConfigError::ValidationError(
                "acquisition.poll_tries must be at least 1".to_string(),
            ));
        }
        if !(self.stats_interval_secs >= 0.0
            && Duration::try_from_secs_f64(self.stats_interval_secs).is_ok())
        {
            return Err(ConfigError::ValidationError(format!(
                "acquisition.stats_interval_secs must be a duration >= 0, got {}",
                self.stats_interval_secs
            )));
        }
        Ok(())
    }

    /// Statistics dump interval, `None` when disabled.
    pub fn stats_interval(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.stats_interval_secs)
            .ok()
            .filter(|d| !d.is_zero())
    }
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Directory run files are written to.
    pub directory: PathBuf,
    /// File name prefix.
    pub prefix: String,
    /// Run title stored in each file header.
    pub title: String,
    /// First run number to try.
    pub run_number: u32,
    /// Maximum size of a single file in bytes.
    pub max_file_size: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let defaults = OutputSettings::default();
        Self {
            directory: defaults.directory,
            prefix: defaults.prefix,
            title: defaults.title,
            run_number: defaults.run_number,
            max_file_size: MAX_FILE_SIZE,
        }
    }
}

impl OutputConfig {
    /// Validate the section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefix.is_empty() || self.prefix.contains('/') {
            return Err(ConfigError::ValidationError(format!(
                "output.prefix must be a non-empty file name, got '{}'",
                self.prefix
            )));
        }
        let minimum = RESERVED_TRAILER_BYTES + (HEADER_WORDS * WORD_BYTES) as u64;
        if self.max_file_size <= minimum {
            return Err(ConfigError::ValidationError(format!(
                "output.max_file_size must exceed {} bytes, got {}",
                minimum, self.max_file_size
            )));
        }
        Ok(())
    }

    /// Settings handed to the output sink coordinator.
    pub fn settings(&self) -> OutputSettings {
        OutputSettings {
            directory: self.directory.clone(),
            prefix: self.prefix.clone(),
            title: self.title.clone(),
            run_number: self.run_number,
            max_file_size: self.max_file_size,
        }
    }
}

/// `[broadcast]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BroadcastConfig {
    /// Send spills and notices to the listener.
    pub enabled: bool,
    /// Listener address.
    pub address: String,
    /// Start in shared-memory (full data) mode.
    pub shm_mode: bool,
    /// Words per datagram in shared-memory mode.
    pub max_chunk_words: usize,
    /// Pause between datagrams of one spill.
    pub chunk_pause_us: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: DEFAULT_BROADCAST_ADDR.to_string(),
            shm_mode: false,
            max_chunk_words: MAX_CHUNK_WORDS,
            chunk_pause_us: 1,
        }
    }
}

impl BroadcastConfig {
    /// Validate the section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.address.is_empty() {
            return Err(ConfigError::ValidationError(
                "broadcast.address cannot be empty".to_string(),
            ));
        }
        if self.max_chunk_words == 0 || self.max_chunk_words > MAX_CHUNK_WORDS {
            return Err(ConfigError::ValidationError(format!(
                "broadcast.max_chunk_words must be in 1..={}, got {}",
                MAX_CHUNK_WORDS, self.max_chunk_words
            )));
        }
        Ok(())
    }

    /// Initial broadcast mode.
    pub fn mode(&self) -> BroadcastMode {
        if self.shm_mode {
            BroadcastMode::SharedMemory
        } else {
            BroadcastMode::Passive
        }
    }
}

/// `[histogram]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistogramConfig {
    /// Cadence of histogram steps.
    pub step_interval_ms: u64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            step_interval_ms: 1000,
        }
    }
}

impl HistogramConfig {
    /// Validate the section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "histogram.step_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
