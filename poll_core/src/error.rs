//! Acquisition error taxonomy.
//!
//! Every fatal condition raised while draining, writing or controlling a
//! run maps onto one `AcqError` variant. The run controller turns each of
//! them into `had_error` plus a stop request; none ends the process.
//! Truncated frames are not errors, they become carryover.

use crate::decoder::CorruptionReport;
use poll_common::ModuleIndex;
use poll_common::hal::port::PortError;
use thiserror::Error;

/// Errors raised by the acquisition engine.
#[derive(Debug, Error)]
pub enum AcqError {
    /// A module FIFO reached its capacity; data has been lost.
    #[error("Module {module} FIFO overflow: {words} words waiting, capacity {capacity}")]
    FifoOverflow {
        /// Module whose FIFO is full
        module: ModuleIndex,
        /// Reported word count
        words: usize,
        /// Configured FIFO capacity
        capacity: usize,
    },

    /// A frame header failed validation.
    #[error("Corrupted stream on module {module}: {report}")]
    CorruptedStream {
        /// Module whose stream is corrupted
        module: ModuleIndex,
        /// Diagnostic context around the failing frame
        report: Box<CorruptionReport>,
    },

    /// A spill arrived while recording with no output file open.
    #[error("No output file is open")]
    NoOpenFile,

    /// Bulk FIFO read failed.
    #[error("FIFO read failed on module {module}: {source}")]
    HardwareReadFailure {
        /// Module being read
        module: ModuleIndex,
        /// Port failure
        #[source]
        source: PortError,
    },

    /// A module kept reporting an active run after end-of-run.
    #[error("Module {module} failed to end its run")]
    ModuleEndRunFailure {
        /// Module that did not stop
        module: ModuleIndex,
    },

    /// The output file could not be opened.
    #[error("Failed to open output file: {0}")]
    FileOpenFailure(String),

    /// Output settings are immutable while a file is open.
    #[error("Cannot change {0} while an output file is open")]
    FileOpen(&'static str),

    /// Output file I/O failed.
    #[error("Output I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The modules refused to start a run.
    #[error("Failed to start run: {0}")]
    RunStartFailure(#[source] PortError),

    /// A histogram step failed.
    #[error("Histogram run failed: {0}")]
    HistogramFailure(String),

    /// Any other port failure.
    #[error(transparent)]
    Port(#[from] PortError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_message_names_module() {
        let err = AcqError::FifoOverflow {
            module: 3,
            words: 131_072,
            capacity: 131_072,
        };
        let msg = err.to_string();
        assert!(msg.contains("Module 3"));
        assert!(msg.contains("131072"));
    }

    #[test]
    fn port_errors_convert() {
        let err: AcqError = PortError::InvalidModule(9).into();
        assert!(matches!(err, AcqError::Port(PortError::InvalidModule(9))));
    }
}
