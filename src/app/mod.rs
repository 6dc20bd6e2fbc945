//! Application orchestration module

pub mod initialization;
pub mod execution;

pub use initialization::{
    load_configuration,
    configure_logging,
    resolve_output_config,
};
pub use execution::{
    render_outcome,
    run_scenario,
};
