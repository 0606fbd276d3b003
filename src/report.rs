//! Rendering of the final run summary.

use std::fmt::Write as _;

use clap::ValueEnum;
use console::style;
use serde::Deserialize;

use crate::model::RunReport;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

pub fn render(report: &RunReport, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Human => Ok(render_human(report)),
        OutputFormat::Json => serde_json::to_string_pretty(report),
    }
}

pub fn render_human(report: &RunReport) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Using {} (parallel) TCP connections (each {} req)",
        style(report.workers).bold(),
        style(report.requests_per_worker).bold()
    );
    let _ = writeln!(
        out,
        "Total time: {:.6} seconds",
        report.elapsed.as_secs_f64()
    );

    let sent = if report.sent == report.intended {
        style(report.sent.to_string()).green()
    } else {
        style(report.sent.to_string()).red()
    };
    let _ = writeln!(
        out,
        "Total requests: {} sent of {} intended",
        sent.bold(),
        report.intended
    );

    let rate = match report.client_send_rate {
        Some(rate) => format!("{rate:.2}"),
        None => "undefined".to_string(),
    };
    let _ = write!(
        out,
        "Requests per second (client-side send rate): {}",
        style(rate).bold()
    );

    if !report.is_success() {
        let _ = writeln!(out);
        let mut problems = Vec::new();
        if report.failed > 0 {
            problems.push(format!("{} FAILED", report.failed));
        }
        if report.partial > 0 {
            problems.push(format!("{} PARTIAL", report.partial));
        }
        if report.cancelled > 0 {
            problems.push(format!("{} CANCELLED", report.cancelled));
        }
        let _ = write!(
            out,
            "{} {}",
            style("Workers:").bold(),
            style(problems.join(", ")).bold().red()
        );
    }

    out
}
