//! Terminal rendering for build results.

use comfy_table::{presets::UTF8_FULL, Cell, Table};
use console::style;

use crate::domain::models::round_display;
use crate::services::cost_ledger::CostLedger;
use crate::services::report::BuildReport;

/// Render the per-model cost breakdown as a table.
pub fn cost_breakdown_table(ledger: &CostLedger) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Source", "Input tokens", "Output tokens", "Sessions", "Cost"]);

    for row in ledger.breakdown() {
        table.add_row(vec![
            Cell::new(&row.label),
            Cell::new(row.input_tokens),
            Cell::new(row.output_tokens),
            Cell::new(
                row.sessions
                    .map_or_else(|| "-".to_string(), |s| s.to_string()),
            ),
            Cell::new(format!("${:.4}", round_display(row.total_cost))),
        ]);
    }
    table
}

/// Render the phase outcome table.
pub fn phase_table(report: &BuildReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Phase", "Status", "Duration", "Retries", "Files"]);

    for phase in &report.phases {
        let status = match phase.status.as_str() {
            "success" => style(phase.status.clone()).green().to_string(),
            "failed" => style(phase.status.clone()).red().to_string(),
            "skipped" | "cancelled" => style(phase.status.clone()).yellow().to_string(),
            other => other.to_string(),
        };
        table.add_row(vec![
            Cell::new(&phase.name),
            Cell::new(status),
            Cell::new(
                phase
                    .duration_secs
                    .map_or_else(|| "-".to_string(), |d| format!("{d:.1}s")),
            ),
            Cell::new(phase.retry_count),
            Cell::new(phase.files_created),
        ]);
    }
    table
}

/// One-line build verdict.
pub fn verdict_line(report: &BuildReport) -> String {
    if report.success {
        format!(
            "{} {} phases, {} files, total cost ${:.4}",
            style("build succeeded:").green().bold(),
            report.phases.len(),
            report.created_files.len(),
            report.cost.display_total(),
        )
    } else {
        format!(
            "{} see the error log and the latest checkpoint",
            style("build failed:").red().bold(),
        )
    }
}
