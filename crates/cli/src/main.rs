//! exposcan CLI - external security posture scanner

mod output;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use exposcan_core::{Config, JobStatus, LogFormat, LogLevel, NativeToolPolicy, ProgressEvent, ScanJob, ScanMode};
use exposcan_probes::default_orchestrator;
use output::{OutputFormat, OutputWriter};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// exposcan - external security posture scanner
#[derive(Parser, Debug)]
#[command(name = "exposcan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scan a host's exposed services and TLS setup and score its security posture")]
struct Cli {
    /// Target IP address or domain
    #[arg(value_name = "TARGET")]
    target: String,

    /// Scan mode; defaults to the configured mode
    #[arg(short = 'm', long = "mode", value_enum)]
    mode: Option<CliScanMode>,

    /// Configuration file (.json, .yaml, .toml)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Ports for custom mode (e.g. 22,80,443)
    #[arg(short = 'p', long = "ports", value_name = "PORTS", value_delimiter = ',')]
    ports: Vec<u16>,

    /// Never use the native port scanner
    #[arg(long = "no-native")]
    no_native: bool,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value = "human")]
    output_format: CliOutputFormat,

    /// Output file
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    output_file: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Log line format
    #[arg(long = "log-format", value_enum)]
    log_format: Option<CliLogFormat>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliScanMode {
    Quick,
    Full,
    Custom,
}

impl From<CliScanMode> for ScanMode {
    fn from(mode: CliScanMode) -> Self {
        match mode {
            CliScanMode::Quick => ScanMode::Quick,
            CliScanMode::Full => ScanMode::Full,
            CliScanMode::Custom => ScanMode::Custom,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliOutputFormat {
    Human,
    Json,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Human => OutputFormat::Human,
            CliOutputFormat::Json => OutputFormat::Json,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliLogFormat {
    Pretty,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let (config, mode) = load_config(&cli).context("Failed to load configuration")?;
    init_logging(&cli, &config).context("Failed to initialize logging")?;

    info!("exposcan {} starting", exposcan_core::VERSION);
    debug!("CLI arguments: {:?}", cli);

    let status = execute_scan(&cli, config, mode).await?;
    Ok(match status {
        JobStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

/// Config file (or mode defaults) with command line overrides applied
fn load_config(cli: &Cli) -> Result<(Config, ScanMode)> {
    let mut config = match &cli.config {
        Some(path) => {
            Config::from_file(path).with_context(|| format!("Failed to read config file: {}", path.display()))?
        }
        None => Config::for_mode(cli.mode.map(ScanMode::from).unwrap_or_default()),
    };

    let mode = match cli.mode {
        Some(mode) => mode.into(),
        None if !cli.ports.is_empty() => ScanMode::Custom,
        None => config.scan.mode,
    };

    if !cli.ports.is_empty() {
        config.scan.custom_ports = cli.ports.clone();
    }
    if cli.no_native {
        config.scan.native_tool = NativeToolPolicy::Disabled;
    }
    if let Some(format) = cli.log_format {
        config.logging.format = match format {
            CliLogFormat::Pretty => LogFormat::Pretty,
            CliLogFormat::Json => LogFormat::Json,
        };
    }

    config.validate().context("Invalid configuration")?;
    Ok((config, mode))
}

/// Initialize logging from CLI arguments, falling back to the config level
fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let log_level = if cli.quiet {
        LevelFilter::ERROR
    } else {
        match cli.verbose {
            0 => match config.logging.level {
                LogLevel::Error => LevelFilter::ERROR,
                // The progress lines already cover what info would say
                LogLevel::Warn | LogLevel::Info => LevelFilter::WARN,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            },
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };

    let layer = match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_level(true)
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(log_level)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .context("Logging already initialized")?;

    Ok(())
}

fn progress_line(event: &ProgressEvent) -> String {
    let status = if event.status == exposcan_core::ProbeStatus::Completed {
        "done".green()
    } else {
        "failed".red()
    };
    format!(
        "[{}/{}] {:>3}% {:<24} {}",
        event.completed,
        event.total,
        event.percent(),
        event.current_category.display_name(),
        status
    )
}

/// Run the job and write the report
async fn execute_scan(cli: &Cli, config: Config, mode: ScanMode) -> Result<JobStatus> {
    let quiet = cli.quiet;
    if !quiet {
        eprintln!(
            "{} {} ({} scan)",
            "Scanning".green().bold(),
            cli.target.cyan(),
            mode
        );
    }

    let orchestrator = default_orchestrator(config);
    let mut job = ScanJob::new(cli.target.clone(), mode);

    let on_progress = move |event: &ProgressEvent| {
        if !quiet {
            eprintln!("{}", progress_line(event));
        }
    };
    orchestrator
        .execute_job(&mut job, &on_progress)
        .await
        .context("Scan job could not be tracked")?;

    let mut writer = OutputWriter::new(cli.output_format.into());
    if let Some(path) = &cli.output_file {
        writer = writer.with_file(path);
    }
    writer.write_job(&job).context("Failed to write report")?;

    Ok(job.status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_ports_into_custom_mode() {
        let cli = Cli::parse_from(["exposcan", "example.com", "-p", "22,443", "--no-native"]);
        let (config, mode) = load_config(&cli).unwrap();
        assert_eq!(mode, ScanMode::Custom);
        assert_eq!(config.scan.custom_ports, vec![22, 443]);
        assert_eq!(config.scan.native_tool, NativeToolPolicy::Disabled);
    }

    #[test]
    fn test_quick_mode_tightens_timeouts() {
        let cli = Cli::parse_from(["exposcan", "example.com", "--mode", "quick", "--log-format", "json"]);
        let (config, mode) = load_config(&cli).unwrap();
        assert_eq!(mode, ScanMode::Quick);
        assert_eq!(config.timing.connect_timeout, std::time::Duration::from_secs(2));
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_config_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exposcan.json");
        let mut config = Config::default();
        config.scan.mode = ScanMode::Quick;
        config.to_file(&path).unwrap();

        let cli = Cli::parse_from(["exposcan", "example.com", "-c", path.to_str().unwrap()]);
        let (_, mode) = load_config(&cli).unwrap();
        assert_eq!(mode, ScanMode::Quick);
    }

    #[test]
    fn test_progress_line() {
        colored::control::set_override(false);
        let event = ProgressEvent {
            completed: 2,
            total: 8,
            current_category: exposcan_core::Category::TlsSecurity,
            status: exposcan_core::ProbeStatus::Failed,
        };
        let line = progress_line(&event);
        assert!(line.starts_with("[2/8]  25%"));
        assert!(line.ends_with("failed"));
    }
}
