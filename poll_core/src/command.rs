//! Text command surface.
//!
//! Lines typed by the operator are parsed into a [`Command`] and mapped onto
//! [`CommandHandle`] requests. Preconditions live in the handle; the
//! dispatcher only translates and formats replies.

use crate::flags::{CommandHandle, CommandRejected};
use crate::status::{StatusBoard, StatusSummary};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Operator command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Start a run recorded to disk.
    Run,
    /// Start acquisition without writing files.
    StartAcq,
    /// Stop the active run.
    Stop,
    /// Recorded run that stops after the given time.
    TimedRun(Duration),
    /// Drain every FIFO now.
    Spill,
    /// Toggle shared-memory broadcast.
    Shm,
    /// Histogram run; `None` runs until stopped.
    Mca(Option<Duration>),
    /// Reboot the crate.
    Reboot,
    /// Print the status line.
    Status,
    /// Exit, stopping active runs first.
    Kill,
    /// Exit, refused while running.
    Quit,
    /// List commands.
    Help,
}

/// Why a line could not be executed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// First word is not a known command.
    #[error("Unknown command '{0}', type 'help' for a list")]
    Unknown(String),
    /// Argument missing or malformed.
    #[error("{command}: {reason}")]
    InvalidArgument {
        /// Command name
        command: &'static str,
        /// What is wrong with the argument
        reason: String,
    },
    /// The request conflicts with the current state.
    #[error(transparent)]
    Rejected(#[from] CommandRejected),
}

fn parse_seconds(command: &'static str, arg: Option<&str>) -> Result<Option<Duration>, CommandError> {
    let Some(arg) = arg else {
        return Ok(None);
    };
    let secs: f64 = arg.parse().map_err(|_| CommandError::InvalidArgument {
        command,
        reason: format!("'{arg}' is not a number of seconds"),
    })?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(CommandError::InvalidArgument {
            command,
            reason: format!("run time must be non-negative, got {arg}"),
        });
    }
    if secs == 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .map(Some)
        .map_err(|_| CommandError::InvalidArgument {
            command,
            reason: format!("run time {arg} is out of range"),
        })
}

fn required_run_time(arg: Option<&str>) -> Result<Duration, CommandError> {
    parse_seconds("timedrun", arg)?.ok_or_else(|| CommandError::InvalidArgument {
        command: "timedrun",
        reason: "expected a positive run time in seconds".to_string(),
    })
}

/// Parse a positive run time in seconds, as taken by `timedrun`.
pub fn parse_run_time(arg: &str) -> Result<Duration, CommandError> {
    required_run_time(Some(arg))
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().unwrap_or_default().to_ascii_lowercase();
        let arg = words.next();

        let command = match name.as_str() {
            "run" => Command::Run,
            "startacq" | "startvme" => Command::StartAcq,
            "stop" | "stopacq" | "stopvme" => Command::Stop,
            "timedrun" => Command::TimedRun(required_run_time(arg)?),
            "spill" | "hup" => Command::Spill,
            "shm" => Command::Shm,
            "mca" => Command::Mca(parse_seconds("mca", arg)?),
            "reboot" => Command::Reboot,
            "status" => Command::Status,
            "kill" => Command::Kill,
            "quit" | "exit" => Command::Quit,
            "help" | "h" => Command::Help,
            _ => return Err(CommandError::Unknown(name)),
        };
        Ok(command)
    }
}

const HELP: &str = "\
Commands:
  run             start a run recorded to disk
  startacq        start acquisition without recording
  stop            stop the active run
  timedrun <s>    recorded run stopping after <s> seconds
  spill           drain every FIFO now
  shm             toggle shared-memory broadcast
  mca [s]         histogram run, unbounded without <s>
  reboot          reboot the crate
  status          show the status line
  kill            stop any run and exit
  quit            exit (refused while running)
  help            this list";

/// Result of an accepted command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Request handed to the run controller.
    Accepted(&'static str),
    /// New broadcast mode.
    ShmMode(bool),
    /// Current status.
    Status(StatusSummary),
    /// Command list.
    Help,
    /// Reboot requested; the operator must acknowledge once the crate is back.
    RebootIssued,
    /// The command loop should end.
    Exit,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Accepted(what) => f.write_str(what),
            Reply::ShmMode(true) => f.write_str("Shared-memory broadcast on"),
            Reply::ShmMode(false) => f.write_str("Passive broadcast"),
            Reply::Status(status) => write!(f, "{status}"),
            Reply::Help => f.write_str(HELP),
            Reply::RebootIssued => f.write_str("Rebooting crate, press Enter when it is back"),
            Reply::Exit => f.write_str("Exiting"),
        }
    }
}

/// Executes operator commands against the shared flags.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    handle: CommandHandle,
    status: StatusBoard,
}

impl CommandDispatcher {
    /// Create a dispatcher.
    pub fn new(handle: CommandHandle, status: StatusBoard) -> Self {
        Self { handle, status }
    }

    /// Flag handle used by this dispatcher.
    pub fn handle(&self) -> &CommandHandle {
        &self.handle
    }

    /// Parse and execute one line.
    ///
    /// Blank lines return `Ok(None)`. Every other line clears the error flag
    /// before it is executed.
    pub fn execute(&self, line: &str) -> Result<Option<Reply>, CommandError> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        self.handle.clear_error();
        let command: Command = line.parse()?;
        self.dispatch(command).map(Some)
    }

    /// Execute a parsed command.
    pub fn dispatch(&self, command: Command) -> Result<Reply, CommandError> {
        let reply = match command {
            Command::Run => {
                self.handle.start_run(true, None)?;
                Reply::Accepted("Starting recorded run")
            }
            Command::StartAcq => {
                self.handle.start_run(false, None)?;
                Reply::Accepted("Starting acquisition without recording")
            }
            Command::TimedRun(t) => {
                self.handle.start_run(true, Some(t))?;
                Reply::Accepted("Starting timed run")
            }
            Command::Stop => {
                self.handle.stop_run()?;
                Reply::Accepted("Stopping")
            }
            Command::Spill => {
                self.handle.force_spill()?;
                Reply::Accepted("Forcing spill")
            }
            Command::Shm => Reply::ShmMode(self.handle.toggle_shm_mode()),
            Command::Mca(duration) => {
                self.handle.start_histogram(duration)?;
                Reply::Accepted("Starting histogram run")
            }
            Command::Reboot => {
                self.handle.reboot()?;
                Reply::RebootIssued
            }
            Command::Status => Reply::Status(self.status.snapshot()),
            Command::Kill => {
                self.handle.kill();
                Reply::Exit
            }
            Command::Quit => {
                self.handle.quit()?;
                Reply::Exit
            }
            Command::Help => Reply::Help,
        };
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::SharedFlags;
    use std::sync::Arc;

    fn dispatcher() -> CommandDispatcher {
        CommandDispatcher::new(
            CommandHandle::new(Arc::new(SharedFlags::new())),
            StatusBoard::new(),
        )
    }

    #[test]
    fn parses_aliases_and_arguments() {
        assert_eq!("startvme".parse::<Command>().unwrap(), Command::StartAcq);
        assert_eq!("STOPACQ".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!("hup".parse::<Command>().unwrap(), Command::Spill);
        assert_eq!(
            "timedrun 90".parse::<Command>().unwrap(),
            Command::TimedRun(Duration::from_secs(90))
        );
        assert_eq!("mca".parse::<Command>().unwrap(), Command::Mca(None));
        assert_eq!(
            "mca 2.5".parse::<Command>().unwrap(),
            Command::Mca(Some(Duration::from_millis(2500)))
        );
        assert_eq!("mca 0".parse::<Command>().unwrap(), Command::Mca(None));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            "launch".parse::<Command>(),
            Err(CommandError::Unknown(name)) if name == "launch"
        ));
        assert!(matches!(
            "timedrun".parse::<Command>(),
            Err(CommandError::InvalidArgument { command: "timedrun", .. })
        ));
        assert!(matches!(
            "mca soon".parse::<Command>(),
            Err(CommandError::InvalidArgument { command: "mca", .. })
        ));
        assert!("mca -3".parse::<Command>().is_err());
    }

    #[test]
    fn out_of_range_run_times_are_rejected() {
        for line in ["mca 1e30", "timedrun 1e30", "timedrun inf", "mca NaN"] {
            assert!(
                matches!(
                    line.parse::<Command>(),
                    Err(CommandError::InvalidArgument { .. })
                ),
                "{line} was accepted"
            );
        }
        assert!(matches!(
            parse_run_time("0"),
            Err(CommandError::InvalidArgument { command: "timedrun", .. })
        ));
        assert!(parse_run_time("-5").is_err());
        assert!(parse_run_time("1e30").is_err());
        assert_eq!(parse_run_time("1.5").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn run_requests_recorded_start() {
        let d = dispatcher();
        assert!(matches!(d.execute("run"), Ok(Some(Reply::Accepted(_)))));
        let flags = d.handle().flags();
        assert!(flags.start_requested());
        assert_eq!(
            d.execute("startacq"),
            Err(CommandError::Rejected(CommandRejected::AlreadyRunning))
        );
    }

    #[test]
    fn spill_and_stop_need_a_run() {
        let d = dispatcher();
        assert_eq!(
            d.execute("spill"),
            Err(CommandError::Rejected(CommandRejected::NotRunning))
        );
        assert_eq!(
            d.execute("stop"),
            Err(CommandError::Rejected(CommandRejected::NotRunning))
        );
    }

    #[test]
    fn quit_and_kill_exit() {
        let d = dispatcher();
        assert_eq!(d.execute("quit"), Ok(Some(Reply::Exit)));
        assert!(d.handle().flags().kill_requested());
        assert_eq!(
            d.execute("run"),
            Err(CommandError::Rejected(CommandRejected::ShuttingDown))
        );
    }

    #[test]
    fn blank_line_is_ignored() {
        let d = dispatcher();
        assert_eq!(d.execute("   "), Ok(None));
    }

    #[test]
    fn shm_toggles_and_status_reads_board() {
        let d = dispatcher();
        assert_eq!(d.execute("shm"), Ok(Some(Reply::ShmMode(true))));
        assert_eq!(d.execute("shm"), Ok(Some(Reply::ShmMode(false))));
        assert!(matches!(d.execute("status"), Ok(Some(Reply::Status(_)))));
        assert!(Reply::Help.to_string().contains("timedrun"));
    }
}
