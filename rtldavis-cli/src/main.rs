//! rtldavis Receiver Runner
//!
//! Command-line host for the rtldavis-decoder library. It:
//! - Starts the receiver and decodes its output continuously
//! - Prints loop packets and archive records as JSON lines on stdout
//! - Restarts the receiver session after fatal errors

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rtldavis_decoder::{Driver, FailureKind, LoopPacket};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

mod config;

use config::AppConfig;

/// rtldavis runner - decode Davis weather station telemetry
#[derive(Parser, Debug)]
#[command(name = "rtldavis")]
#[command(about = "Decode Davis weather station telemetry from the rtldavis receiver", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

/// How a receiver session ended
enum SessionEnd {
    Stopped,
    Failed(rtldavis_decoder::DecoderError),
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => AppConfig::default(),
    };

    // Initialize logging
    init_logging(args.verbose, args.quiet, config.rtldavis.debug_levels().any());

    log::info!("rtldavis runner v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using decoder library v{}", rtldavis_decoder::VERSION);
    if let Some(path) = &args.config {
        log::info!("Configuration loaded from: {:?}", path);
    }

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    run(&config, &stop)
}

/// Run sessions until stopped, applying the restart policy
fn run(config: &AppConfig, stop: &AtomicBool) -> Result<()> {
    let mut restarts = 0u32;

    loop {
        match run_session(config, stop) {
            SessionEnd::Stopped => {
                log::info!("stopped");
                return Ok(());
            }
            SessionEnd::Failed(e) if e.kind() == FailureKind::Configuration => {
                return Err(e).context("Invalid configuration");
            }
            SessionEnd::Failed(e) => {
                log::error!("receiver session ended: {}", e);
                if !config.restart.allows(restarts) {
                    anyhow::bail!("giving up after {} restarts: {}", restarts, e);
                }
                restarts += 1;
                log::info!(
                    "restarting receiver in {} s (restart {})",
                    config.restart.delay_secs,
                    restarts
                );
                if !sleep_unless_stopped(config.restart.delay(), stop) {
                    return Ok(());
                }
            }
        }
    }
}

fn run_session(config: &AppConfig, stop: &AtomicBool) -> SessionEnd {
    let mut driver = match Driver::start(&config.rtldavis) {
        Ok(driver) => driver,
        Err(e) => return SessionEnd::Failed(e),
    };
    log::info!("receiver command: {}", driver.command_line());

    let interval = config.archive.interval();
    // the first rollover only sets the baseline
    driver.new_archive_record(Utc::now());
    let mut next_archive = Instant::now() + interval;

    while !stop.load(Ordering::SeqCst) {
        match driver.poll() {
            Ok(packets) => {
                for packet in &packets {
                    emit("loop", packet);
                }
            }
            Err(e) => return SessionEnd::Failed(e),
        }

        if Instant::now() >= next_archive {
            let record = driver.new_archive_record(Utc::now());
            if !record.fields.is_empty() {
                emit("archive", &record);
            }
            next_archive = next_boundary(next_archive, Instant::now(), interval);
        }
    }

    driver.shutdown();
    SessionEnd::Stopped
}

/// First boundary after `now` on the grid that started at `previous`
///
/// Boundaries missed during a long poll are skipped, not replayed.
fn next_boundary(previous: Instant, now: Instant, interval: Duration) -> Instant {
    let mut next = previous + interval;
    while next <= now {
        next += interval;
    }
    next
}

/// Print one packet as a JSON line
fn emit(kind: &str, packet: &LoopPacket) {
    let line = serde_json::json!({ "type": kind, "packet": packet });
    let mut stdout = io::stdout().lock();
    if let Err(e) = writeln!(stdout, "{}", line).and_then(|_| stdout.flush()) {
        log::warn!("failed to write {} packet: {}", kind, e);
    }
}

/// Sleep for `duration`, returning false if a stop was requested meanwhile
fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) -> bool {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        thread::sleep(Duration::from_millis(200));
    }
    !stop.load(Ordering::SeqCst)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool, debug_knobs: bool) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 if debug_knobs => LevelFilter::Debug,
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_boundary_on_time() {
        let start = Instant::now();
        let interval = Duration::from_secs(300);
        let next = next_boundary(start, start + Duration::from_secs(1), interval);
        assert_eq!(next, start + interval);
    }

    #[test]
    fn test_next_boundary_skips_missed_periods() {
        let start = Instant::now();
        let interval = Duration::from_secs(300);
        // polled again only after 3.5 periods
        let now = start + Duration::from_secs(1050);
        let next = next_boundary(start, now, interval);
        assert_eq!(next, start + Duration::from_secs(1200));
        assert!(next > now);

        // exactly on a boundary moves past it
        let next = next_boundary(start, start + Duration::from_secs(600), interval);
        assert_eq!(next, start + Duration::from_secs(900));
    }
}
