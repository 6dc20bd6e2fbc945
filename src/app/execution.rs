//! Scenario execution

use std::io::{self, Write};
use anyhow::{Context, Result};
use log::{debug, info};
use crate::{cli, display, scenario};

/// Load the scenario named on the command line, run it and print the reports
pub fn run_scenario(args: &cli::Args, output: display::OutputConfig) -> Result<()> {
    let scenario = scenario::Scenario::load(&args.scenario)?;
    let runner = scenario::ScenarioRunner::new(scenario);

    let outcome = if args.use_async {
        debug!("Running scenario on the async hub");
        // current_thread keeps handler order observable in the log
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;
        runtime.block_on(runner.run_async())
    } else {
        runner.run()
    };

    info!("Scenario finished: {} publishes, {} handler failures",
          outcome.stats.events_published, outcome.stats.handler_failures);

    let renderer = display::ReportRenderer::new(output);
    let mut stdout = io::stdout().lock();
    stdout.write_all(render_outcome(&outcome, &renderer).as_bytes())
        .context("Failed to write report")?;
    stdout.flush().context("Failed to write report")?;
    Ok(())
}

/// Render every publish step followed by the summary
pub fn render_outcome(outcome: &scenario::ScenarioOutcome, renderer: &display::ReportRenderer) -> String {
    let mut out = String::new();
    for publish in &outcome.publishes {
        out.push_str(&renderer.render_publish(publish.step, &publish.report, &publish.nested));
    }
    out.push_str(&renderer.render_summary(&outcome.log, &outcome.stats));
    out
}
