//! Application initialization and configuration

use anyhow::Result;
use log::{debug, error, LevelFilter};
use crate::{cli, config, display, logging};

pub fn load_configuration(args: &cli::Args) -> Result<config::ConfigManager> {
    let mut manager = if let Some(config_file) = &args.config_file {
        debug!("Loading configuration from explicit file: {}", config_file.display());
        config::ConfigManager::load_from_file(config_file.clone())?
    } else {
        config::ConfigManager::load()?
    };

    if let Some(section_name) = &args.config_name {
        manager.select_section(section_name.clone());
    }

    Ok(manager)
}

pub fn configure_logging(args: &cli::Args, config: &config::ConfigManager) -> Result<logging::LogConfig> {
    let console_level = if args.debug {
        LevelFilter::Trace
    } else if args.verbose {
        LevelFilter::Debug
    } else if args.quiet {
        LevelFilter::Error
    } else {
        match config.get_log_level("base", "console-level") {
            Ok(Some(level)) => level,
            Ok(None) => LevelFilter::Info,
            Err(e) => {
                debug!("Invalid console-level in config, using default: {}", e);
                LevelFilter::Info
            }
        }
    };

    let format = match &args.log_format {
        Some(format_str) => format_str.parse::<logging::LogFormat>().map_err(|e| anyhow::anyhow!(e))?,
        None => config
            .get_value("base", "log-format")
            .and_then(|format_str| format_str.parse::<logging::LogFormat>().ok())
            .unwrap_or(logging::LogFormat::Text),
    };

    let log_file_path = args.log_file.clone()
        .or_else(|| config.get_path("base", "log-file"));

    let file_log_level = match &args.log_file_level {
        Some(level_str) => Some(logging::parse_log_level(level_str)?),
        None => match config.get_log_level("base", "file-log-level") {
            Ok(level) => level,
            Err(e) => {
                debug!("Invalid file-log-level in config, ignoring: {}", e);
                None
            }
        },
    };

    let (destination, file_level) = match (log_file_path, file_log_level) {
        (Some(file_path), Some(level)) => (logging::LogDestination::Both(file_path), Some(level)),
        (Some(file_path), None) => (logging::LogDestination::Both(file_path), Some(console_level)),
        (None, None) => (logging::LogDestination::Console, None),
        (None, Some(_)) => {
            error!("Log file level specified without log file");
            return Err(anyhow::anyhow!("Log file level specified without log file"));
        }
    };

    Ok(logging::LogConfig {
        console_level,
        file_level,
        format,
        destination,
    })
}

/// Resolve report output settings
///
/// Precedence: command line, then the `[output]` configuration section, then
/// defaults (which honour `NO_COLOR`).
pub fn resolve_output_config(args: &cli::Args, config: &config::ConfigManager) -> Result<display::OutputConfig> {
    let mut output = config.get_output_config()?;

    if let Some(format_str) = &args.output {
        output.format = format_str.parse::<display::OutputFormat>().map_err(|e| anyhow::anyhow!(e))?;
    }
    if args.no_color {
        output.color = false;
    }

    Ok(output)
}
