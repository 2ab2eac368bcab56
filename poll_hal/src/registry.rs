//! Port registry for crate backends.
//!
//! Provides a `PortRegistry` struct for registering and retrieving backend
//! factories. Built at startup and handed to the binary by value.

use poll_common::hal::port::{ModulePort, PortError, PortFactory};
use std::collections::HashMap;

/// Registry of available crate backends.
pub struct PortRegistry {
    factories: HashMap<&'static str, PortFactory>,
}

impl PortRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding every built-in backend.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_ports(&mut registry);
        registry
    }

    /// Register a backend factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: PortFactory) {
        if self.factories.contains_key(name) {
            panic!("Port '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a backend factory by name.
    pub fn get_factory(&self, name: &str) -> Option<PortFactory> {
        self.factories.get(name).copied()
    }

    /// Create a backend instance by name.
    ///
    /// # Errors
    /// Returns `PortError::DriverNotFound` if no backend with the given name is registered.
    pub fn create_port(&self, name: &str) -> Result<Box<dyn ModulePort>, PortError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| PortError::DriverNotFound(name.to_string()))?;
        Ok(factory())
    }

    /// List all registered backend names, sorted.
    pub fn list_ports(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poll_common::hal::config::CrateConfig;
    use poll_common::hal::port::RunMode;
    use poll_common::{ModuleIndex, Word};

    struct TestPort;

    impl ModulePort for TestPort {
        fn name(&self) -> &'static str {
            "test"
        }

        fn version(&self) -> &'static str {
            "0.1.0"
        }

        fn init(&mut self, _config: &CrateConfig) -> Result<(), PortError> {
            Ok(())
        }

        fn module_count(&self) -> usize {
            1
        }

        fn expected_slot(&self, _module: ModuleIndex) -> u8 {
            2
        }

        fn fifo_word_count(&mut self, _module: ModuleIndex) -> Result<usize, PortError> {
            Ok(0)
        }

        fn read_fifo_words(
            &mut self,
            _buf: &mut [Word],
            _module: ModuleIndex,
        ) -> Result<(), PortError> {
            Ok(())
        }

        fn start_run(&mut self, _mode: RunMode) -> Result<(), PortError> {
            Ok(())
        }

        fn end_run(&mut self) -> Result<(), PortError> {
            Ok(())
        }

        fn check_run_status(&mut self, _module: ModuleIndex) -> Result<bool, PortError> {
            Ok(false)
        }

        fn boot(&mut self) -> Result<(), PortError> {
            Ok(())
        }

        fn shutdown(&mut self) -> Result<(), PortError> {
            Ok(())
        }
    }

    fn create_test_port() -> Box<dyn ModulePort> {
        Box::new(TestPort)
    }

    #[test]
    fn registry_register_and_create() {
        let mut reg = PortRegistry::new();
        reg.register("test_port", create_test_port);

        let port = reg.create_port("test_port").expect("should create");
        assert_eq!(port.name(), "test");
    }

    #[test]
    fn registry_port_not_found() {
        let reg = PortRegistry::new();
        let result = reg.create_port("nonexistent");
        assert!(matches!(result, Err(PortError::DriverNotFound(_))));
    }

    #[test]
    fn registry_lists_builtin_ports() {
        let reg = PortRegistry::with_builtin();
        assert_eq!(reg.list_ports(), vec!["offline", "simulation"]);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = PortRegistry::new();
        reg.register("dup", create_test_port);
        reg.register("dup", create_test_port);
    }
}
