//! Result aggregator
//!
//! Reduces suite outcomes and detected errors into the
//! [`AggregatedTestResults`] handed to report renderers. Aggregation is pure:
//! the same inputs always give the same output, apart from `generated_at`.

pub mod metrics;
pub mod patterns;
pub mod summary;
pub mod tasks;

use chrono::Utc;
use tracing::info;

use suitewatch_common::{
    AggregatedTestResults, CategorizedErrors, ComprehensiveTestResults, DetectedError,
    ErrorAnalysis, ErrorSummary, Severity,
};

use crate::collect::dedup_by_id;
use crate::config::ScoringThresholds;

#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    thresholds: ScoringThresholds,
}

impl Aggregator {
    pub fn new(thresholds: ScoringThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ScoringThresholds {
        &self.thresholds
    }

    /// Aggregate a run. `extra_errors` are merged with the run's own detected
    /// errors and everything is deduplicated by id.
    pub fn aggregate(
        &self,
        run: &ComprehensiveTestResults,
        extra_errors: &[DetectedError],
    ) -> AggregatedTestResults {
        let t = &self.thresholds;
        let errors = dedup_by_id(
            run.detected_errors
                .iter()
                .chain(extra_errors.iter())
                .cloned(),
        );

        let summary = ErrorSummary::from_errors(&errors);
        let patterns = patterns::group_patterns(&errors);
        let action_items = patterns::action_items(&patterns, &errors);
        let executive_summary =
            summary::executive_summary(&summary, &run.summary, &patterns, t);

        let critical_ids: Vec<String> = errors
            .iter()
            .filter(|e| e.severity == Severity::Critical)
            .map(|e| e.id.clone())
            .collect();
        let developer_tasks =
            tasks::developer_tasks(&action_items, &run.suite_results, &summary, critical_ids);

        let trend_analysis = metrics::trend_analysis(&errors, &summary, &run.summary, t);
        let quality_metrics = metrics::quality_metrics(&summary, &run.summary, t);

        info!(
            "Aggregated {}: {} issue(s), status {}, stability {}",
            run.run_id,
            summary.total,
            executive_summary.overall_status,
            quality_metrics.stability_score
        );

        AggregatedTestResults {
            run_id: run.run_id.clone(),
            generated_at: Utc::now(),
            suite_results: run.suite_results.clone(),
            execution_summary: run.summary.clone(),
            error_analysis: ErrorAnalysis {
                categorized: CategorizedErrors::from_errors(&errors),
                summary,
                patterns,
                action_items,
                executive_summary,
                errors,
            },
            developer_tasks,
            trend_analysis,
            quality_metrics,
        }
    }
}
