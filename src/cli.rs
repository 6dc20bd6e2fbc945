use clap::Parser;
use anyhow::Result;
use std::path::PathBuf;

/// Replay a notification scenario against an in-process hub
#[derive(Parser, Debug)]
#[command(name = "notihub")]
#[command(about = "Replays a TOML scenario of handlers and publishes against an in-process notification hub and prints each dispatch report")]
#[command(version)]
pub struct Args {
    /// Scenario file describing handlers and steps
    #[arg(value_name = "SCENARIO")]
    pub scenario: PathBuf,

    /// Verbose output (debug level logging)
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet output (error level logging only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Debug output (trace level logging)
    #[arg(long)]
    pub debug: bool,

    /// Log format: text or json
    #[arg(long, value_name = "FORMAT")]
    pub log_format: Option<String>,

    /// Log file path for file output
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log level for file output (independent of console level)
    #[arg(long, value_name = "LEVEL")]
    pub log_file_level: Option<String>,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Configuration section name
    #[arg(long, value_name = "SECTION")]
    pub config_name: Option<String>,

    /// Report format: text or json
    #[arg(long, value_name = "FORMAT")]
    pub output: Option<String>,

    /// Dispatch through the async hub on a tokio runtime
    #[arg(long = "async")]
    pub use_async: bool,

    /// Disable coloured output
    #[arg(long)]
    pub no_color: bool,
}

/// Parse command line arguments
pub fn parse_args() -> Args {
    Args::parse()
}

/// Reject argument combinations clap cannot express
pub fn validate_args(args: &Args) -> Result<()> {
    if args.quiet && (args.verbose || args.debug) {
        anyhow::bail!("--quiet cannot be combined with --verbose or --debug");
    }

    if args.log_file_level.is_some() && args.log_file.is_none() {
        anyhow::bail!("--log-file-level requires --log-file");
    }

    if let Some(level) = &args.log_file_level {
        crate::logging::parse_log_level(level)?;
    }

    if let Some(format) = &args.log_format {
        format.parse::<crate::logging::LogFormat>().map_err(|e| anyhow::anyhow!(e))?;
    }

    if let Some(format) = &args.output {
        format.parse::<crate::display::OutputFormat>().map_err(|e| anyhow::anyhow!(e))?;
    }

    Ok(())
}
