//! Output formatting for CLI

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};

use suitewatch_common::{
    AggregatedTestResults, OverallStatus, Priority, SuiteStatus, TestExecutionResult,
    TestSuiteInfo,
};

/// Progress bar over the suite count
pub fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn status_cell(status: SuiteStatus) -> Cell {
    let color = match status {
        SuiteStatus::Passed => Color::Green,
        SuiteStatus::Failed => Color::Red,
        SuiteStatus::Timeout => Color::Yellow,
        SuiteStatus::Skipped => Color::Grey,
    };
    Cell::new(status.to_string()).fg(color)
}

pub fn print_suites(suites: &[TestSuiteInfo]) {
    let mut table = new_table();
    table.set_header(vec!["Suite", "Role", "File", "Estimate"]);
    for suite in suites {
        table.add_row(vec![
            Cell::new(&suite.name),
            Cell::new(&suite.role),
            Cell::new(&suite.file),
            Cell::new(format!("{}s", suite.estimated_duration_ms / 1000)),
        ]);
    }
    println!("{table}");
}

pub fn print_suite_results(results: &[TestExecutionResult]) {
    if results.is_empty() {
        println!("No suites were run.");
        return;
    }

    let mut table = new_table();
    table.set_header(vec![
        "Suite", "Role", "Status", "Passed", "Failed", "Skipped", "Errors", "Duration",
    ]);
    for result in results {
        table.add_row(vec![
            Cell::new(&result.suite),
            Cell::new(&result.role),
            status_cell(result.status),
            Cell::new(result.tests_passed),
            Cell::new(result.tests_failed),
            Cell::new(result.tests_skipped),
            Cell::new(result.errors),
            Cell::new(format!("{:.1}s", result.duration_ms as f64 / 1000.0)),
        ]);
    }
    println!("{table}");
}

pub fn print_executive_summary(aggregated: &AggregatedTestResults) {
    let summary = &aggregated.error_analysis.executive_summary;
    let status = summary.overall_status.to_string();
    let status = match summary.overall_status {
        OverallStatus::Critical => status.red().bold(),
        OverallStatus::NeedsAttention => status.yellow().bold(),
        OverallStatus::Stable => status.cyan().bold(),
        OverallStatus::Excellent => status.green().bold(),
    };

    println!();
    println!("{} {}", "Overall status:".bold(), status);
    println!(
        "  Stability score: {}/100   Risk: {}   Issues: {} ({} critical, {} high)",
        aggregated.quality_metrics.stability_score,
        summary.risk_level,
        summary.total_issues_found,
        summary.critical_issues,
        summary.high_priority_issues
    );
    println!("  {}", summary.business_impact.dimmed());

    if !summary.key_findings.is_empty() {
        println!();
        println!("{}", "Key findings".bold());
        for finding in &summary.key_findings {
            println!("  • {}", finding);
        }
    }

    if !aggregated.developer_tasks.is_empty() {
        println!();
        let mut table = new_table();
        table.set_header(vec!["Task", "Priority", "Category", "Hours", "Title"]);
        for task in &aggregated.developer_tasks {
            let priority = Cell::new(task.priority.to_string()).fg(match task.priority {
                Priority::P0 => Color::Red,
                Priority::P1 => Color::Yellow,
                Priority::P2 => Color::Cyan,
                Priority::P3 => Color::Grey,
            });
            table.add_row(vec![
                Cell::new(&task.id),
                priority,
                Cell::new(&task.category),
                Cell::new(task.estimated_hours),
                Cell::new(&task.title),
            ]);
        }
        println!("{table}");
    }
}

/// Print success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// Print error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

/// Print warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "!".yellow(), message);
}
