//! Offline backend.
//!
//! Stands in for a crate when no hardware is attached. Modules are
//! enumerated from the configuration and sit in consecutive slots starting
//! at slot 2. FIFOs are always empty and runs never start, so the command
//! surface and output handling can be exercised without data.

use poll_common::hal::config::CrateConfig;
use poll_common::hal::consts::FIRST_SLOT;
use poll_common::hal::port::{ModulePort, PortError, RunMode};
use poll_common::{ModuleIndex, Word};
use tracing::{info, warn};

/// Factory function to create an offline crate instance.
pub fn create_port() -> Box<dyn ModulePort> {
    Box::new(OfflineCrate::new())
}

/// Crate with no hardware behind it.
pub struct OfflineCrate {
    modules: usize,
}

impl OfflineCrate {
    /// Create an offline crate with no modules.
    pub fn new() -> Self {
        Self { modules: 0 }
    }
}

impl Default for OfflineCrate {
    fn default() -> Self {
        Self::new()
    }
}

impl ModulePort for OfflineCrate {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    fn init(&mut self, config: &CrateConfig) -> Result<(), PortError> {
        self.modules = config.module_count();
        info!("Offline crate with {} modules, no hardware attached", self.modules);
        Ok(())
    }

    fn module_count(&self) -> usize {
        self.modules
    }

    fn expected_slot(&self, module: ModuleIndex) -> u8 {
        FIRST_SLOT + module as u8
    }

    fn fifo_word_count(&mut self, module: ModuleIndex) -> Result<usize, PortError> {
        if module >= self.modules {
            return Err(PortError::InvalidModule(module));
        }
        Ok(0)
    }

    fn read_fifo_words(
        &mut self,
        _buf: &mut [Word],
        _module: ModuleIndex,
    ) -> Result<(), PortError> {
        Err(PortError::Unsupported("read_fifo_words"))
    }

    fn start_run(&mut self, mode: RunMode) -> Result<(), PortError> {
        warn!("Offline crate cannot start a {:?} run", mode);
        Err(PortError::Unsupported("start_run"))
    }

    fn end_run(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn check_run_status(&mut self, _module: ModuleIndex) -> Result<bool, PortError> {
        Ok(false)
    }

    fn boot(&mut self) -> Result<(), PortError> {
        info!("Offline crate: nothing to boot");
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), PortError> {
        Ok(())
    }
}
