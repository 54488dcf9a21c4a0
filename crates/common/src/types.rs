//! Core types for suite execution and error detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static descriptor of one launchable suite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteInfo {
    pub name: String,
    pub role: String,
    /// Spec file or target handed to the test runner
    pub file: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_estimated_duration_ms")]
    pub estimated_duration_ms: u64,
}

fn default_estimated_duration_ms() -> u64 {
    60_000
}

/// Outcome of a single suite run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteStatus {
    Passed,
    Failed,
    Skipped,
    Timeout,
}

impl std::fmt::Display for SuiteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuiteStatus::Passed => write!(f, "passed"),
            SuiteStatus::Failed => write!(f, "failed"),
            SuiteStatus::Skipped => write!(f, "skipped"),
            SuiteStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Diagnostic detail attached to a non-passing suite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionErrorDetail {
    pub message: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stack: Option<String>,
    /// Last lines of captured output
    #[serde(default)]
    pub output_tail: Vec<String>,
}

/// One record per suite run, never mutated once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExecutionResult {
    pub suite: String,
    pub role: String,
    pub status: SuiteStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub tests_skipped: u32,
    /// Error lines counted in the process output
    pub errors: u32,
    /// Warning lines counted in the process output
    pub warnings: u32,
    #[serde(default)]
    pub output: String,
    pub error_detail: Option<ExecutionErrorDetail>,
}

impl TestExecutionResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, SuiteStatus::Failed | SuiteStatus::Timeout)
    }
}

/// Orchestration lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Default for OrchestrationStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestrationStatus::Idle => write!(f, "idle"),
            OrchestrationStatus::Running => write!(f, "running"),
            OrchestrationStatus::Completed => write!(f, "completed"),
            OrchestrationStatus::Failed => write!(f, "failed"),
            OrchestrationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Snapshot recomputed at every suite boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
    pub current_suite: Option<String>,
    pub eta_ms: Option<u64>,
    pub errors: u64,
    pub warnings: u64,
    pub status: OrchestrationStatus,
}

/// Totals across every suite of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub total_suites: usize,
    pub passed_suites: usize,
    pub failed_suites: usize,
    pub skipped_suites: usize,
    pub timed_out_suites: usize,
    pub total_duration_ms: u64,
    pub total_errors: u64,
    pub total_warnings: u64,
    pub errors_by_role: BTreeMap<String, u64>,
}

impl ExecutionSummary {
    /// Summarise a list of suite results
    pub fn from_results(results: &[TestExecutionResult]) -> Self {
        let mut summary = Self {
            total_suites: results.len(),
            ..Default::default()
        };

        for result in results {
            match result.status {
                SuiteStatus::Passed => summary.passed_suites += 1,
                SuiteStatus::Failed => summary.failed_suites += 1,
                SuiteStatus::Skipped => summary.skipped_suites += 1,
                SuiteStatus::Timeout => summary.timed_out_suites += 1,
            }
            summary.total_duration_ms += result.duration_ms;
            summary.total_errors += u64::from(result.errors);
            summary.total_warnings += u64::from(result.warnings);
            *summary.errors_by_role.entry(result.role.clone()).or_insert(0) +=
                u64::from(result.errors);
        }

        summary
    }

    /// Suites that did not pass, timeouts included
    pub fn unsuccessful_suites(&self) -> usize {
        self.failed_suites + self.timed_out_suites
    }
}

/// Everything the orchestrator returns from one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComprehensiveTestResults {
    pub run_id: String,
    pub status: OrchestrationStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub summary: ExecutionSummary,
    pub suite_results: Vec<TestExecutionResult>,
    /// Errors detected while suites were streaming output
    pub detected_errors: Vec<DetectedError>,
}

/// Ordinal rank of an anomaly. Declaration order gives `Low < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Anomaly category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Runtime,
    Network,
    Rendering,
    Navigation,
    Import,
    Component,
    Api,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Runtime => "runtime",
            ErrorType::Network => "network",
            ErrorType::Rendering => "rendering",
            ErrorType::Navigation => "navigation",
            ErrorType::Import => "import",
            ErrorType::Component => "component",
            ErrorType::Api => "api",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Console message retained in the rolling history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleEntry {
    pub level: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Network exchange retained in the rolling history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkEntry {
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub failure: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Type-specific detail for some error kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorDetails {
    Component {
        component: Option<String>,
        lifecycle: Option<String>,
    },
    Import {
        module: String,
    },
    Api {
        endpoint: String,
        method: String,
        status: Option<u16>,
        duration_ms: Option<u64>,
    },
    Rendering {
        selector: String,
        issue: String,
    },
}

/// One classified anomaly. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedError {
    pub id: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub severity: Severity,
    pub message: String,
    pub stack: Option<String>,
    pub url: String,
    pub role: Option<String>,
    pub user_id: Option<String>,
    pub suite: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub reproduction_steps: Vec<String>,
    #[serde(default)]
    pub recent_console: Vec<ConsoleEntry>,
    #[serde(default)]
    pub recent_network: Vec<NetworkEntry>,
    pub screenshot: Option<String>,
    pub dom_snapshot: Option<String>,
    pub details: Option<ErrorDetails>,
    /// Free-form tags, e.g. `effort:6` to override task estimates
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DetectedError {
    /// Hours requested through an `effort:<hours>` tag
    pub fn effort_override(&self) -> Option<f64> {
        self.tags.iter().find_map(|tag| {
            tag.strip_prefix("effort:")
                .map(|v| v.trim_end_matches('h'))
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|hours| *hours > 0.0)
        })
    }
}

/// Errors bucketed by severity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategorizedErrors {
    pub critical: Vec<DetectedError>,
    pub high: Vec<DetectedError>,
    pub medium: Vec<DetectedError>,
    pub low: Vec<DetectedError>,
}

impl CategorizedErrors {
    pub fn from_errors(errors: &[DetectedError]) -> Self {
        let mut buckets = Self::default();
        for error in errors {
            let bucket = match error.severity {
                Severity::Critical => &mut buckets.critical,
                Severity::High => &mut buckets.high,
                Severity::Medium => &mut buckets.medium,
                Severity::Low => &mut buckets.low,
            };
            bucket.push(error.clone());
        }
        buckets
    }
}

/// Error counts by severity and type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub by_type: BTreeMap<ErrorType, usize>,
}

impl ErrorSummary {
    pub fn from_errors(errors: &[DetectedError]) -> Self {
        let mut summary = Self {
            total: errors.len(),
            ..Default::default()
        };
        for error in errors {
            match error.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
            }
            *summary.by_type.entry(error.error_type).or_insert(0) += 1;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(role: &str, status: SuiteStatus, errors: u32) -> TestExecutionResult {
        let now = Utc::now();
        TestExecutionResult {
            suite: format!("{}-suite", role),
            role: role.to_string(),
            status,
            started_at: now,
            ended_at: now,
            duration_ms: 10,
            tests_passed: 0,
            tests_failed: 0,
            tests_skipped: 0,
            errors,
            warnings: 1,
            output: String::new(),
            error_detail: None,
        }
    }

    #[test]
    fn test_summary_errors_by_role_matches_total() {
        let results = vec![
            result("admin", SuiteStatus::Passed, 2),
            result("admin", SuiteStatus::Failed, 3),
            result("viewer", SuiteStatus::Timeout, 4),
        ];
        let summary = ExecutionSummary::from_results(&results);

        assert_eq!(summary.total_errors, 9);
        assert_eq!(summary.errors_by_role.values().sum::<u64>(), summary.total_errors);
        assert_eq!(summary.errors_by_role["admin"], 5);
        assert_eq!(summary.failed_suites, 1);
        assert_eq!(summary.timed_out_suites, 1);
        assert_eq!(summary.unsuccessful_suites(), 2);
        assert_eq!(summary.total_warnings, 3);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_detected_error_wire_names() {
        let json = serde_json::json!({
            "id": "err-1",
            "type": "network",
            "severity": "critical",
            "message": "500 on /api/auth/session",
            "stack": null,
            "url": "http://localhost:3000/login",
            "role": "admin",
            "userId": null,
            "suite": null,
            "timestamp": "2024-01-01T00:00:00Z",
            "screenshot": null,
            "domSnapshot": null,
            "details": null,
            "tags": ["effort:6h"]
        });
        let error: DetectedError = serde_json::from_value(json).unwrap();
        assert_eq!(error.error_type, ErrorType::Network);
        assert_eq!(error.severity, Severity::Critical);
        assert_eq!(error.effort_override(), Some(6.0));
        assert!(error.reproduction_steps.is_empty());
    }
}
