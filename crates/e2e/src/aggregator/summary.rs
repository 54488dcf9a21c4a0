//! Executive summary

use suitewatch_common::{
    ErrorPattern, ErrorSummary, ExecutionSummary, ExecutiveSummary, OverallStatus, RiskLevel,
};

use crate::config::ScoringThresholds;

/// Counts every rule below is keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCounts {
    pub critical: usize,
    pub high: usize,
    pub total: usize,
    pub failed_suites: usize,
}

impl HealthCounts {
    /// Whether anything at all went wrong in the run
    pub fn has_issues(&self, t: &ScoringThresholds) -> bool {
        self.total > 0 || (t.failed_suites_count_as_issues && self.failed_suites > 0)
    }

    pub fn new(errors: &ErrorSummary, execution: &ExecutionSummary) -> Self {
        Self {
            critical: errors.critical,
            high: errors.high,
            total: errors.total,
            failed_suites: execution.unsuccessful_suites(),
        }
    }
}

/// First match wins: critical, needs-attention, stable, excellent
pub fn overall_status(counts: &HealthCounts, t: &ScoringThresholds) -> OverallStatus {
    if counts.critical > 0 {
        OverallStatus::Critical
    } else if counts.high > t.needs_attention_high_errors
        || counts.failed_suites > t.needs_attention_failed_suites
    {
        OverallStatus::NeedsAttention
    } else if counts.has_issues(t) {
        OverallStatus::Stable
    } else {
        OverallStatus::Excellent
    }
}

pub fn risk_level(status: OverallStatus) -> RiskLevel {
    match status {
        OverallStatus::Critical => RiskLevel::High,
        OverallStatus::NeedsAttention => RiskLevel::Medium,
        OverallStatus::Stable | OverallStatus::Excellent => RiskLevel::Low,
    }
}

pub fn business_impact(counts: &HealthCounts, t: &ScoringThresholds) -> &'static str {
    if counts.critical > 0 {
        "Critical user journeys are broken. Release should be blocked until they are fixed."
    } else if counts.failed_suites > t.needs_attention_failed_suites
        || counts.high > t.needs_attention_high_errors
    {
        "Key workflows are degraded for some roles. User productivity and trust are at risk."
    } else if counts.total > t.minor_impact_total_errors {
        "Several minor issues add up to a noticeably rougher user experience."
    } else if counts.has_issues(t) {
        "Isolated issues with limited impact on users."
    } else {
        "No user-facing impact detected."
    }
}

pub fn recommended_actions(counts: &HealthCounts, t: &ScoringThresholds) -> Vec<String> {
    let mut actions = Vec::new();
    if counts.critical > 0 {
        actions.push("Fix all critical errors before the next release".to_string());
        actions.push("Add monitoring and alerting for the affected critical paths".to_string());
    }
    if counts.failed_suites > 0 {
        actions.push("Investigate and stabilize the failing test suites".to_string());
    }
    if counts.high > t.needs_attention_high_errors {
        actions.push("Schedule the high-priority fixes in the current iteration".to_string());
    }
    if counts.total > t.minor_impact_total_errors {
        actions.push("Review recurring error patterns for shared root causes".to_string());
    }
    if actions.is_empty() {
        actions.push("Keep the current coverage and run the suites on every change".to_string());
    }
    actions
}

fn key_findings(
    counts: &HealthCounts,
    execution: &ExecutionSummary,
    patterns: &[ErrorPattern],
) -> Vec<String> {
    let mut findings = Vec::new();

    if counts.critical > 0 {
        findings.push(format!(
            "{} critical issue(s) require immediate attention",
            counts.critical
        ));
    }
    if execution.failed_suites > 0 {
        findings.push(format!(
            "{} of {} suite(s) failed",
            execution.failed_suites, execution.total_suites
        ));
    }
    if execution.timed_out_suites > 0 {
        findings.push(format!(
            "{} suite(s) exceeded their time budget",
            execution.timed_out_suites
        ));
    }
    for pattern in patterns.iter().take(3) {
        findings.push(format!(
            "{} {} error seen {} time(s): {}",
            pattern.severity, pattern.error_type, pattern.occurrences, pattern.pattern
        ));
    }
    if let Some((role, count)) = execution
        .errors_by_role
        .iter()
        .filter(|(_, count)| **count > 0)
        .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
    {
        findings.push(format!("Role {} logged the most errors ({})", role, count));
    }
    if findings.is_empty() {
        findings.push(format!(
            "All {} suite(s) passed without detected errors",
            execution.total_suites
        ));
    }
    findings
}

pub fn executive_summary(
    errors: &ErrorSummary,
    execution: &ExecutionSummary,
    patterns: &[ErrorPattern],
    t: &ScoringThresholds,
) -> ExecutiveSummary {
    let counts = HealthCounts::new(errors, execution);
    let overall_status = overall_status(&counts, t);

    ExecutiveSummary {
        overall_status,
        risk_level: risk_level(overall_status),
        total_issues_found: errors.total,
        critical_issues: errors.critical,
        high_priority_issues: errors.high,
        failed_suites: counts.failed_suites,
        key_findings: key_findings(&counts, execution, patterns),
        business_impact: business_impact(&counts, t).to_string(),
        recommended_actions: recommended_actions(&counts, t),
    }
}
