//! Simulation backend.
//!
//! A software crate for development and testing without digitizer hardware.
//! Every module streams randomized event frames into a bounded FIFO at a
//! configured word rate, so reads naturally end in the middle of a frame.

mod generator;
mod port;

pub use generator::FrameGenerator;
pub use port::SimulatedCrate;

use poll_common::hal::port::ModulePort;

/// Factory function to create a simulated crate instance.
pub fn create_port() -> Box<dyn ModulePort> {
    Box::new(SimulatedCrate::new())
}
