//! Aggregated run output
//!
//! These types are the hand-off to report renderers. They are produced once
//! per run by the aggregator and are read-only afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{
    CategorizedErrors, DetectedError, ErrorSummary, ErrorType, ExecutionSummary, Severity,
    TestExecutionResult,
};

/// Headline health of a run, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverallStatus {
    Critical,
    NeedsAttention,
    Stable,
    Excellent,
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverallStatus::Critical => write!(f, "critical"),
            OverallStatus::NeedsAttention => write!(f, "needs-attention"),
            OverallStatus::Stable => write!(f, "stable"),
            OverallStatus::Excellent => write!(f, "excellent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::Low => write!(f, "low"),
        }
    }
}

/// Task priority, `P0` sorts first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub fn for_severity(severity: Severity) -> Self {
        match severity {
            Severity::Critical => Priority::P0,
            Severity::High => Priority::P1,
            Severity::Medium => Priority::P2,
            Severity::Low => Priority::P3,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserExperienceImpact {
    Severe,
    Moderate,
    Minor,
    Minimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Stable,
}

/// Errors sharing a type and a normalised message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPattern {
    pub pattern: String,
    pub error_type: ErrorType,
    pub severity: Severity,
    pub occurrences: usize,
    pub error_ids: Vec<String>,
    pub affected_roles: Vec<String>,
    pub affected_urls: Vec<String>,
    pub suggested_fix: String,
}

/// A prioritised fix derived from one error pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub error_type: ErrorType,
    pub occurrences: usize,
    pub related_errors: Vec<String>,
    pub effort_hours_override: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutiveSummary {
    pub overall_status: OverallStatus,
    pub risk_level: RiskLevel,
    pub total_issues_found: usize,
    pub critical_issues: usize,
    pub high_priority_issues: usize,
    pub failed_suites: usize,
    pub key_findings: Vec<String>,
    pub business_impact: String,
    pub recommended_actions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAnalysis {
    /// Deduplicated by id
    pub errors: Vec<DetectedError>,
    pub categorized: CategorizedErrors,
    pub summary: ErrorSummary,
    pub patterns: Vec<ErrorPattern>,
    pub action_items: Vec<ActionItem>,
    pub executive_summary: ExecutiveSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperTask {
    pub id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub category: String,
    pub estimated_hours: f64,
    pub related_errors: Vec<String>,
    pub acceptance_criteria: Vec<String>,
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorTrend {
    pub error_type: ErrorType,
    pub occurrences: usize,
    pub direction: TrendDirection,
}

/// Single-run heuristics; there is no cross-run history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysis {
    pub error_trends: Vec<ErrorTrend>,
    pub regression_risk: RiskLevel,
    /// Detected error count per role, highest first
    pub most_affected_roles: Vec<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    /// 0..=100
    pub stability_score: u32,
    pub user_experience_impact: UserExperienceImpact,
    pub critical_error_rate: f64,
    pub suite_pass_rate: f64,
    pub average_suite_duration_ms: u64,
    pub errors_per_suite: f64,
    pub errors_by_type: BTreeMap<ErrorType, usize>,
}

/// Terminal artifact of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedTestResults {
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    pub suite_results: Vec<TestExecutionResult>,
    pub execution_summary: ExecutionSummary,
    pub error_analysis: ErrorAnalysis,
    pub developer_tasks: Vec<DeveloperTask>,
    pub trend_analysis: TrendAnalysis,
    pub quality_metrics: QualityMetrics,
}
