//! Crate configuration types.
//!
//! This module contains configuration types for the hardware backends:
//! - `CrateConfig` - Which backend to use and which modules are in the crate
//! - `SimulationConfig` - Parameters of the simulated crate

use crate::config::ConfigError;
use crate::frame::MAX_FRAME_WORDS;
use crate::hal::consts::{
    DEFAULT_DRIVER, EXTERNAL_FIFO_LENGTH, FIRST_SLOT, MAX_MODULES, MAX_SLOT, MIN_FIFO_READ,
};
use serde::{Deserialize, Serialize};

/// Default function for driver
fn default_driver() -> String {
    DEFAULT_DRIVER.to_string()
}

/// Default function for slots: two modules in slots 2 and 3
fn default_slots() -> Vec<u8> {
    vec![FIRST_SLOT, FIRST_SLOT + 1]
}

/// Default function for fifo_capacity
fn default_fifo_capacity() -> usize {
    EXTERNAL_FIFO_LENGTH
}

/// Default function for min_fifo_read
fn default_min_fifo_read() -> usize {
    MIN_FIFO_READ
}

/// Crate layout, loaded from the `[crate_config]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrateConfig {
    /// Backend name (e.g., "simulation", "offline").
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Slot of every module, indexed by module number.
    #[serde(default = "default_slots")]
    pub slots: Vec<u8>,

    /// External FIFO capacity in words.
    #[serde(default = "default_fifo_capacity")]
    pub fifo_capacity: usize,

    /// FIFOs holding fewer words than this are not read.
    #[serde(default = "default_min_fifo_read")]
    pub min_fifo_read: usize,

    /// Simulated crate parameters (ignored by other backends).
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for CrateConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            slots: default_slots(),
            fifo_capacity: default_fifo_capacity(),
            min_fifo_read: default_min_fifo_read(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl CrateConfig {
    /// Number of modules described by the configuration.
    pub fn module_count(&self) -> usize {
        self.slots.len()
    }

    /// Validate the crate configuration.
    ///
    /// # Validation Rules
    /// 1. `driver` is not empty
    /// 2. 1 ≤ `slots.len()` ≤ MAX_MODULES, every slot ≤ MAX_SLOT, no duplicates
    /// 3. `min_fifo_read` ≥ 1 and below `fifo_capacity`
    /// 4. simulation parameters are consistent
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "crate_config.driver cannot be empty".to_string(),
            ));
        }

        if self.slots.is_empty() || self.slots.len() > MAX_MODULES {
            return Err(ConfigError::ValidationError(format!(
                "crate_config.slots must list 1..={} modules, got {}",
                MAX_MODULES,
                self.slots.len()
            )));
        }

        for (idx, &slot) in self.slots.iter().enumerate() {
            if slot > MAX_SLOT {
                return Err(ConfigError::ValidationError(format!(
                    "Module {idx}: slot {slot} exceeds {MAX_SLOT}"
                )));
            }
            if self.slots[..idx].contains(&slot) {
                return Err(ConfigError::ValidationError(format!(
                    "Module {idx}: slot {slot} assigned twice"
                )));
            }
        }

        if self.min_fifo_read == 0 || self.min_fifo_read >= self.fifo_capacity {
            return Err(ConfigError::ValidationError(format!(
                "crate_config.min_fifo_read must be in 1..{}, got {}",
                self.fifo_capacity, self.min_fifo_read
            )));
        }

        self.simulation.validate()
    }
}

/// Parameters of the simulated crate, loaded from `[crate_config.simulation]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Words produced per second by every module while a run is active.
    pub word_rate: f64,
    /// Smallest generated frame in words.
    pub min_frame_words: u32,
    /// Largest generated frame in words.
    pub max_frame_words: u32,
    /// RNG seed, so simulated streams are reproducible.
    pub seed: u64,
    /// Run-status polls a module keeps reporting an active run after `end_run`.
    pub end_run_polls: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            word_rate: 200_000.0,
            min_frame_words: 4,
            max_frame_words: 64,
            seed: 0x5eed,
            end_run_polls: 1,
        }
    }
}

impl SimulationConfig {
    /// Validate simulation parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.word_rate.is_finite() && self.word_rate >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "simulation.word_rate must be a non-negative number, got {}",
                self.word_rate
            )));
        }
        if self.min_frame_words == 0
            || self.min_frame_words > self.max_frame_words
            || self.max_frame_words > MAX_FRAME_WORDS
        {
            return Err(ConfigError::ValidationError(format!(
                "simulation frame sizes must satisfy 1 <= min ({}) <= max ({}) <= {}",
                self.min_frame_words, self.max_frame_words, MAX_FRAME_WORDS
            )));
        }
        Ok(())
    }
}
