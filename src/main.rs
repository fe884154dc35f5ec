use anyhow::{Context, Result};
use clap::Parser;
use ebeamd::calibration::CalibrationMatrix;
use ebeamd::catalog::DeviceCatalog;
use ebeamd::config::{Backend, Overrides, Settings};
use ebeamd::discovery::{CandidateSource, DeviceLocator};
use ebeamd::driver::{DriverLoop, LoopConfig, LoopExit};
use ebeamd::output::log_sink::LogSink;
use ebeamd::output::OutputSink;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ebeamd", about = "eBeam whiteboard driver")]
struct Cli {
    /// Receiver hidraw node; searched for when omitted
    #[arg(short, long)]
    device: Option<PathBuf>,

    /// Log more; repeat for per-frame tracing
    #[arg(short = 'D', long, action = clap::ArgAction::Count)]
    debug: u8,

    /// Stay in the foreground instead of detaching
    #[arg(short, long)]
    foreground: bool,

    /// Exit instead of waiting when the receiver is missing or unplugged
    #[arg(short, long)]
    no_retry: bool,

    /// TOML file holding the calibration matrix
    #[arg(short, long)]
    calibration: Option<PathBuf>,

    /// Settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// How to enumerate receivers
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Log pen state instead of creating a virtual input device
    #[arg(long)]
    dry_run: bool,

    /// Average successive pen positions
    #[arg(long)]
    smooth: bool,
}

fn init_logging(debug: u8) {
    let level = match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Relative paths stop working once the daemon changes to `/`.
fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    Ok(std::env::current_dir()
        .context("failed to read working directory")?
        .join(path))
}

#[cfg(target_os = "linux")]
fn daemonize() -> Result<()> {
    // stderr stays open so the caller can still redirect the log.
    if unsafe { libc::daemon(0, 1) } != 0 {
        return Err(std::io::Error::last_os_error()).context("failed to detach from terminal");
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn daemonize() -> Result<()> {
    anyhow::bail!("detaching is only supported on Linux, run with --foreground")
}

#[cfg(target_os = "linux")]
fn candidate_source(backend: Backend) -> Result<Box<dyn CandidateSource>> {
    use ebeamd::discovery::stream_discovery::StreamDiscovery;
    use ebeamd::discovery::udev_discovery::UdevDiscovery;

    Ok(match backend {
        Backend::Stream => Box::new(StreamDiscovery::default()),
        Backend::Udev => Box::new(UdevDiscovery),
    })
}

#[cfg(not(target_os = "linux"))]
fn candidate_source(_backend: Backend) -> Result<Box<dyn CandidateSource>> {
    anyhow::bail!("hidraw receivers are only supported on Linux")
}

#[cfg(target_os = "linux")]
fn host_sink() -> Result<Box<dyn OutputSink>> {
    let sink = ebeamd::output::uinput_sink::UinputSink::create()
        .context("is the uinput module loaded and /dev/uinput writable?")?;
    Ok(Box::new(sink))
}

#[cfg(not(target_os = "linux"))]
fn host_sink() -> Result<Box<dyn OutputSink>> {
    anyhow::bail!("input injection is only supported on Linux, try --dry-run")
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let file = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let mut settings = file.apply(Overrides {
        device: cli.device.clone(),
        backend: cli.backend,
        no_retry: cli.no_retry,
        calibration: cli.calibration.clone(),
        smooth: cli.smooth,
    });
    settings.device = settings.device.map(absolute).transpose()?;
    Ok(settings)
}

fn load_calibration(path: Option<&Path>) -> Result<CalibrationMatrix> {
    let Some(path) = path else {
        info!("no calibration given, using raw receiver coordinates");
        return Ok(CalibrationMatrix::IDENTITY);
    };
    Ok(CalibrationMatrix::load(path)?)
}

fn run(cli: Cli) -> Result<LoopExit> {
    let settings = load_settings(&cli)?;
    let calibration = load_calibration(settings.calibration.as_deref())?;
    let source = candidate_source(settings.backend)?;

    if !cli.foreground {
        daemonize()?;
    }

    // Installed after detaching: the handler thread would not survive fork.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
        })
        .context("failed to install signal handler")?;
    }

    let sink: Box<dyn OutputSink> = if cli.dry_run {
        Box::new(LogSink::new())
    } else {
        host_sink()?
    };

    let locator = DeviceLocator::new(source, DeviceCatalog::builtin())
        .with_explicit_path(settings.device.clone());
    let config = LoopConfig {
        retry: settings.retry,
        backoff: settings.backoff(),
        calibration,
        smoothing: settings.smoothing,
    };

    let exit = DriverLoop::new(locator, sink, config, stop).run()?;
    Ok(exit)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match run(cli) {
        Ok(LoopExit::Stopped) => {
            info!("stopped");
            ExitCode::SUCCESS
        }
        Ok(LoopExit::DeviceLost) => {
            info!("receiver lost, exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
