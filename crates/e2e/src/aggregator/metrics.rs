//! Quality metrics and single-run trend heuristics

use std::collections::BTreeMap;

use suitewatch_common::{
    DetectedError, ErrorSummary, ErrorTrend, ExecutionSummary, QualityMetrics, RiskLevel,
    TrendAnalysis, TrendDirection, UserExperienceImpact,
};

use crate::config::ScoringThresholds;

/// `100 - weighted(critical, high, medium, failed suites)`, clamped to `[0, 100]`
pub fn stability_score(
    errors: &ErrorSummary,
    failed_suites: usize,
    t: &ScoringThresholds,
) -> u32 {
    let penalty = errors.critical as u64 * u64::from(t.critical_weight)
        + errors.high as u64 * u64::from(t.high_weight)
        + errors.medium as u64 * u64::from(t.medium_weight)
        + failed_suites as u64 * u64::from(t.failed_suite_weight);
    100u64.saturating_sub(penalty) as u32
}

pub fn user_experience_impact(
    errors: &ErrorSummary,
    t: &ScoringThresholds,
) -> UserExperienceImpact {
    if errors.critical > 0 {
        UserExperienceImpact::Severe
    } else if errors.high > t.moderate_impact_high_errors {
        UserExperienceImpact::Moderate
    } else if errors.total > t.minor_impact_total_errors {
        UserExperienceImpact::Minor
    } else {
        UserExperienceImpact::Minimal
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

pub fn quality_metrics(
    errors: &ErrorSummary,
    execution: &ExecutionSummary,
    t: &ScoringThresholds,
) -> QualityMetrics {
    QualityMetrics {
        stability_score: stability_score(errors, execution.unsuccessful_suites(), t),
        user_experience_impact: user_experience_impact(errors, t),
        critical_error_rate: ratio(errors.critical, errors.total),
        suite_pass_rate: ratio(execution.passed_suites, execution.total_suites),
        average_suite_duration_ms: if execution.total_suites == 0 {
            0
        } else {
            execution.total_duration_ms / execution.total_suites as u64
        },
        errors_per_suite: ratio(errors.total, execution.total_suites),
        errors_by_type: errors.by_type.clone(),
    }
}

/// Error types with many occurrences in this run are flagged as increasing.
/// There is no history to compare against.
pub fn trend_analysis(
    errors: &[DetectedError],
    summary: &ErrorSummary,
    execution: &ExecutionSummary,
    t: &ScoringThresholds,
) -> TrendAnalysis {
    let mut error_trends: Vec<ErrorTrend> = summary
        .by_type
        .iter()
        .map(|(error_type, occurrences)| ErrorTrend {
            error_type: *error_type,
            occurrences: *occurrences,
            direction: if *occurrences > t.increasing_trend_occurrences {
                TrendDirection::Increasing
            } else {
                TrendDirection::Stable
            },
        })
        .collect();
    error_trends.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));

    let regression_risk = if summary.critical > 0
        || execution.unsuccessful_suites() > t.high_regression_failed_suites
    {
        RiskLevel::High
    } else if summary.total > t.medium_regression_total_errors {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let mut by_role: BTreeMap<String, usize> = BTreeMap::new();
    for error in errors {
        let role = error.role.clone().unwrap_or_else(|| "unknown".to_string());
        *by_role.entry(role).or_insert(0) += 1;
    }
    let mut most_affected_roles: Vec<(String, usize)> = by_role.into_iter().collect();
    most_affected_roles.sort_by(|a, b| b.1.cmp(&a.1));

    TrendAnalysis {
        error_trends,
        regression_risk,
        most_affected_roles,
    }
}
