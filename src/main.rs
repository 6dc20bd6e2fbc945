use anyhow::Result;
use std::process;
use log::{debug, error};
use notihub::{app, cli, logging, notifications};

fn main() {
    // Handler panics are caught by the hub and reported; everything else
    // still goes through the default hook
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        if notifications::in_dispatch() {
            debug!("Handler panicked: {}", panic_info);
        } else {
            default_hook(panic_info);
        }
    }));

    if let Err(e) = run() {
        error!("Application error: {:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let args = cli::parse_args();

    cli::validate_args(&args)?;

    let config_manager = app::load_configuration(&args)?;

    let log_config = app::configure_logging(&args, &config_manager)?;
    logging::init_logger(log_config)?;

    debug!("{}", notifications::get_system_info());

    let output = app::resolve_output_config(&args, &config_manager)?;
    app::run_scenario(&args, output)
}
