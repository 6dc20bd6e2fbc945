//! Report rendering for the command line
//!
//! Dispatch reports are rendered either as coloured text for people or as
//! JSON lines for other programs. Colour honours `NO_COLOR` and can be
//! turned off from the command line or the configuration file.

use colored::{ColoredString, Colorize};
use serde::Serialize;
use serde_json::json;

use crate::notifications::{DeliveryStats, DispatchReport, DispatchStatus, EventKind, HandlerOutcome};

/// Report output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid output format: {}. Valid options: text, json", s)),
        }
    }
}

/// Output settings resolved from configuration and arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub color: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            color: std::env::var_os("NO_COLOR").is_none(),
        }
    }
}

/// Renders dispatch reports and statistics
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    config: OutputConfig,
}

impl ReportRenderer {
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn format(&self) -> OutputFormat {
        self.config.format
    }

    fn paint(&self, text: &str, style: fn(&str) -> ColoredString) -> String {
        if self.config.color {
            style(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Render one publish step; `nested` are reports of publishes made by
    /// handlers while the step ran
    pub fn render_publish(&self, step: usize, report: &DispatchReport, nested: &[DispatchReport]) -> String {
        match self.config.format {
            OutputFormat::Text => {
                let mut out = self.render_report_text(&format!("step {}", step + 1), report, "");
                for inner in nested {
                    out.push_str(&self.render_report_text("nested", inner, "    "));
                }
                out
            }
            OutputFormat::Json => json_line(&json!({
                "step": step + 1,
                "report": report,
                "nested": nested,
            })),
        }
    }

    fn render_report_text(&self, label: &str, report: &DispatchReport, indent: &str) -> String {
        let mut out = format!(
            "{}{} publish {} ({} handler{})\n",
            indent,
            self.paint(label, |s| s.bold()),
            self.paint(report.kind().as_str(), |s| s.cyan()),
            report.len(),
            if report.len() == 1 { "" } else { "s" },
        );
        if report.is_empty() {
            out.push_str(&format!("{}  {}\n", indent, self.paint("no handlers registered", |s| s.dimmed())));
        }
        for outcome in report {
            out.push_str(indent);
            out.push_str(&self.render_outcome(outcome));
            out.push('\n');
        }
        out
    }

    fn render_outcome(&self, outcome: &HandlerOutcome<EventKind>) -> String {
        let status = match &outcome.status {
            DispatchStatus::Succeeded => self.paint("ok", |s| s.green()),
            DispatchStatus::Failed(failure) if failure.is_panic() => {
                format!("{} {}", self.paint("PANICKED", |s| s.red().bold()), failure.message())
            }
            DispatchStatus::Failed(failure) => {
                format!("{} {}", self.paint("FAILED", |s| s.red()), failure.message())
            }
        };
        format!("  [{}] {:<6} {:<20} {}", outcome.index, outcome.token.id().to_string(), outcome.handler, status)
    }

    /// Render the scenario's final log and hub statistics
    pub fn render_summary(&self, log: &[String], stats: &DeliveryStats) -> String {
        match self.config.format {
            OutputFormat::Text => {
                let failed = stats.handler_failures.to_string();
                let failed = if stats.handler_failures > 0 {
                    self.paint(&failed, |s| s.red())
                } else {
                    self.paint(&failed, |s| s.green())
                };
                let mut out = format!("{}\n", self.paint("summary", |s| s.bold()));
                out.push_str(&format!("  log: [{}]\n", log.join(", ")));
                out.push_str(&format!(
                    "  published: {} (empty: {}) | invoked: {} | failed: {} | panicked: {}\n",
                    stats.events_published,
                    stats.empty_publishes,
                    stats.handlers_invoked,
                    failed,
                    stats.handler_panics,
                ));
                out
            }
            OutputFormat::Json => json_line(&json!({ "log": log, "stats": stats })),
        }
    }
}

fn json_line<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(line) => format!("{}\n", line),
        Err(e) => format!("{{\"error\":\"failed to serialize report: {}\"}}\n", e),
    }
}
