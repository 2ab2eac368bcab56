//! # Crate Poller Binary
//!
//! Drains the module FIFOs of a crate into spills, records them to run files
//! and broadcasts them to online listeners. Runs are controlled by text
//! commands on stdin.
//!
//! # Usage
//!
//! ```bash
//! # Simulated crate, default poll.toml
//! poll --simulate
//!
//! # Start a 10 minute recorded run right away
//! poll --config /etc/poll/poll.toml --timed-run 600
//!
//! # Verbose JSON logs
//! poll -s -v --json
//! ```

use clap::Parser;
use poll_common::config::{ConfigError, ConfigLoader, LogLevel};
use poll_common::consts::DEFAULT_CONFIG_PATH;
use poll_core::broadcast::{BroadcastEncoder, UdpClient};
use poll_core::command::{CommandDispatcher, Reply, parse_run_time};
use poll_core::config::PollConfig;
use poll_core::control::{ChannelAck, ControlSettings, RunControl};
use poll_core::flags::{CommandHandle, SharedFlags};
use poll_core::sink::{OutputSinkCoordinator, RunFileWriter};
use poll_hal::PortRegistry;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Crate poller - spill acquisition and run control
#[derive(Parser, Debug)]
#[command(name = "poll")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Drains digitizer FIFOs into spills, records and broadcasts them")]
#[command(long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Backend to use instead of crate_config.driver
    #[arg(short, long)]
    driver: Option<String>,

    /// Force the simulation backend
    #[arg(short = 's', long)]
    simulate: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs (and status replies) in JSON format
    #[arg(long)]
    json: bool,

    /// Start a recorded run at startup
    #[arg(long)]
    run: bool,

    /// Start a recorded run at startup that stops after this many seconds
    #[arg(long, value_name = "SECS", conflicts_with = "run", value_parser = timed_run_arg)]
    timed_run: Option<Duration>,

    /// With --run, acquire without writing files
    #[arg(long)]
    no_record: bool,

    /// Start in shared-memory broadcast mode
    #[arg(long)]
    shm: bool,
}

fn timed_run_arg(arg: &str) -> Result<Duration, String> {
    parse_run_time(arg).map_err(|e| e.to_string())
}

fn main() {
    if let Err(e) = run() {
        error!("Poller failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = load_config(&args.config);
    let log_level = loaded
        .as_ref()
        .map(|c| c.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, log_level);
    let mut config = loaded?;

    info!("Crate poller v{} starting...", env!("CARGO_PKG_VERSION"));

    if args.simulate {
        info!("Simulation mode enabled");
        config.crate_config.driver = "simulation".to_string();
    } else if let Some(driver) = &args.driver {
        config.crate_config.driver = driver.clone();
    }
    config.validate()?;

    report_scheduler();

    let registry = PortRegistry::with_builtin();
    info!("Available backends: {:?}", registry.list_ports());
    let mut port = registry.create_port(&config.crate_config.driver)?;
    port.init(&config.crate_config)?;
    info!(
        "Backend '{}' v{} with {} modules",
        port.name(),
        port.version(),
        port.module_count()
    );

    let broadcaster = if config.broadcast.enabled {
        match UdpClient::connect(config.broadcast.address.as_str()) {
            Ok(client) => {
                info!("Broadcasting spills to {}", client.target());
                Some(BroadcastEncoder::with_chunking(
                    Box::new(client),
                    config.broadcast.max_chunk_words,
                    Duration::from_micros(config.broadcast.chunk_pause_us),
                ))
            }
            Err(e) => {
                warn!(
                    "Broadcast to {} unavailable: {}. Continuing without it.",
                    config.broadcast.address, e
                );
                None
            }
        }
    } else {
        None
    };

    let sink = OutputSinkCoordinator::new(Box::new(RunFileWriter::new()), config.output.settings());
    info!(
        "Output to {} as {}_NNN, next run {}",
        sink.settings().directory.display(),
        sink.settings().prefix,
        sink.run_number()
    );

    let flags = Arc::new(SharedFlags::new());
    let handle = CommandHandle::new(Arc::clone(&flags));
    handle.set_shm_mode(args.shm || config.broadcast.shm_mode);

    let (ack_tx, ack_rx) = mpsc::channel();
    let control = RunControl::new(
        port,
        config.drain_settings(),
        sink,
        broadcaster,
        Arc::clone(&flags),
        ControlSettings::from_config(&config),
    )
    .with_reboot_ack(Box::new(ChannelAck::new(ack_rx)));
    let dispatcher = CommandDispatcher::new(handle.clone(), control.status_board());

    let signal_handle = handle.clone();
    let signal_ack = ack_tx.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        signal_handle.kill();
        // release a pending reboot acknowledgement
        let _ = signal_ack.send(());
    })?;

    let worker = thread::Builder::new()
        .name("run-control".to_string())
        .spawn(move || control.run())?;

    if args.run || args.timed_run.is_some() {
        if let Err(e) = handle.start_run(!args.no_record, args.timed_run) {
            warn!("Startup run not started: {}", e);
        }
    }

    // Detached: a blocking stdin read must not hold up shutdown.
    let json = args.json;
    thread::Builder::new()
        .name("commands".to_string())
        .spawn(move || {
            command_loop(&dispatcher, &ack_tx, json);
            dispatcher.handle().kill();
        })?;

    if worker.join().is_err() {
        error!("Run-control thread panicked");
    }

    info!("Crate poller shutdown complete");
    Ok(())
}

/// Load the configuration file, falling back to defaults when it is absent.
fn load_config(path: &Path) -> Result<PollConfig, ConfigError> {
    match PollConfig::load(path) {
        Err(ConfigError::FileNotFound) => Ok(PollConfig::default()),
        other => other,
    }
}

/// Read commands from stdin until an exit command or end of input.
fn command_loop(dispatcher: &CommandDispatcher, ack: &mpsc::Sender<()>, json: bool) {
    let stdin = io::stdin();
    let mut awaiting_ack = false;

    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };

        if awaiting_ack {
            awaiting_ack = false;
            let _ = ack.send(());
            if line.trim().is_empty() {
                continue;
            }
        }

        match dispatcher.execute(&line) {
            Ok(Some(Reply::Status(status))) if json => {
                match serde_json::to_string(&status) {
                    Ok(text) => println!("{text}"),
                    Err(e) => warn!("Status serialization failed: {}", e),
                }
            }
            Ok(Some(Reply::Exit)) => {
                println!("{}", Reply::Exit);
                break;
            }
            Ok(Some(reply @ Reply::RebootIssued)) => {
                awaiting_ack = true;
                println!("{reply}");
            }
            Ok(Some(reply)) => println!("{reply}"),
            Ok(None) => {}
            Err(e) => println!("{e}"),
        }
        let _ = io::stdout().flush();

        if dispatcher.handle().flags().kill_requested() {
            break;
        }
    }
}

/// Log the scheduling policy the poller runs under.
fn report_scheduler() {
    #[cfg(target_os = "linux")]
    {
        use libc::{SCHED_FIFO, SCHED_RR, sched_getscheduler};
        let policy = unsafe { sched_getscheduler(0) };
        match policy {
            SCHED_FIFO => info!("Scheduler policy: SCHED_FIFO"),
            SCHED_RR => info!("Scheduler policy: SCHED_RR"),
            p if p < 0 => warn!("Scheduler policy unavailable"),
            _ => info!("Scheduler policy: normal (not real-time)"),
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        info!("Scheduler policy: unknown on this platform");
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, configured: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        configured.as_directive()
    };

    let filter = EnvFilter::from_default_env().add_directive(
        directive
            .parse()
            .unwrap_or_else(|_| tracing::Level::INFO.into()),
    );

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_run_needs_a_positive_time() {
        for bad in ["0", "-10", "1e30", "soon"] {
            assert!(
                Args::try_parse_from(["poll", "--timed-run", bad]).is_err(),
                "--timed-run {bad} was accepted"
            );
        }
        let args = Args::try_parse_from(["poll", "--timed-run", "2.5"]).unwrap();
        assert_eq!(args.timed_run, Some(Duration::from_millis(2500)));
    }
}
