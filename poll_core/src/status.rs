//! Published status summary.
//!
//! The run controller republishes a [`StatusSummary`] every iteration; the
//! command context reads copies through a [`StatusBoard`].

use crate::state::AcquisitionState;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One-line view of the acquisition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSummary {
    /// Lifecycle state.
    pub state: AcquisitionState,
    /// The last operation failed.
    pub had_error: bool,
    /// Spills are persisted to disk.
    pub recording: bool,
    /// Seconds since the run started.
    pub elapsed_secs: f64,
    /// Average data rate of the run in bytes per second.
    pub data_rate: f64,
    /// Open output file.
    pub filename: Option<String>,
    /// Size of the open output file in bytes.
    pub file_size: u64,
    /// Current (or next) run number.
    pub run_number: u32,
    /// Spills drained in the current run.
    pub spills: u64,
    /// Seconds into the histogram run.
    pub histogram_elapsed_secs: Option<f64>,
    /// Requested histogram length in seconds.
    pub histogram_duration_secs: Option<f64>,
    /// Message of the last fatal error.
    pub last_error: Option<String>,
}

fn human_bytes(bytes: f64) -> String {
    const UNITS: [&str; 4] = ["B", "kB", "MB", "GB"];
    let mut value = bytes;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

impl fmt::Display for StatusSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.had_error {
            "ERROR"
        } else {
            match self.state {
                AcquisitionState::Running if self.recording => "REC",
                AcquisitionState::Running => "ACQ",
                AcquisitionState::HistogramRunning => "MCA",
                AcquisitionState::StopRequested => "STOP",
                AcquisitionState::RebootPending => "BOOT",
                AcquisitionState::ShuttingDown => "EXIT",
                AcquisitionState::Idle => "IDLE",
            }
        };
        write!(f, "[{tag}]")?;

        match self.state {
            AcquisitionState::Running | AcquisitionState::StopRequested => {
                write!(
                    f,
                    " {:.0}s {}/s",
                    self.elapsed_secs,
                    human_bytes(self.data_rate)
                )?;
                if let Some(name) = &self.filename {
                    write!(
                        f,
                        " run {} {} {}",
                        self.run_number,
                        name,
                        human_bytes(self.file_size as f64)
                    )?;
                }
            }
            AcquisitionState::HistogramRunning => {
                let elapsed = self.histogram_elapsed_secs.unwrap_or(0.0);
                match self.histogram_duration_secs {
                    Some(total) => write!(f, " {elapsed:.0}/{total:.0}s")?,
                    None => write!(f, " {elapsed:.0}s")?,
                }
            }
            _ => write!(f, " next run {}", self.run_number)?,
        }

        if let Some(err) = &self.last_error {
            write!(f, " ({err})")?;
        }
        Ok(())
    }
}

/// Lock-protected latest status.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<StatusSummary>>,
}

impl StatusBoard {
    /// Create a board holding the default summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the published summary.
    pub fn publish(&self, summary: StatusSummary) {
        *self.inner.write() = summary;
    }

    /// Copy of the latest summary.
    pub fn snapshot(&self) -> StatusSummary {
        self.inner.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_line_shows_next_run() {
        let status = StatusSummary {
            run_number: 12,
            ..Default::default()
        };
        assert_eq!(status.to_string(), "[IDLE] next run 12");
    }

    #[test]
    fn recording_line_shows_file() {
        let status = StatusSummary {
            state: AcquisitionState::Running,
            recording: true,
            elapsed_secs: 61.0,
            data_rate: 2_500_000.0,
            filename: Some("run_004.ldf".into()),
            file_size: 1_200,
            run_number: 4,
            ..Default::default()
        };
        assert_eq!(
            status.to_string(),
            "[REC] 61s 2.5 MB/s run 4 run_004.ldf 1.2 kB"
        );
    }

    #[test]
    fn error_takes_precedence() {
        let status = StatusSummary {
            had_error: true,
            last_error: Some("No output file is open".into()),
            ..Default::default()
        };
        assert!(status.to_string().starts_with("[ERROR]"));
        assert!(status.to_string().ends_with("(No output file is open)"));
    }

    #[test]
    fn board_publishes_snapshots() {
        let board = StatusBoard::new();
        let reader = board.clone();
        board.publish(StatusSummary {
            spills: 3,
            ..Default::default()
        });
        assert_eq!(reader.snapshot().spills, 3);
        let json = serde_json::to_string(&reader.snapshot()).unwrap();
        assert!(json.contains("\"state\":\"Idle\""));
    }
}
