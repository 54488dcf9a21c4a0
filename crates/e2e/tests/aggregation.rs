//! Aggregation scenarios, from detector signals to the final aggregate

use chrono::Utc;

use suitewatch_common::{
    ComprehensiveTestResults, DetectedError, ExecutionSummary, OrchestrationStatus,
    OverallStatus, RiskLevel, Severity, SuiteStatus, TestExecutionResult,
};
use suitewatch_e2e::config::ObserverConfig;
use suitewatch_e2e::observer::session::{ConsoleLevel, PageSignal};
use suitewatch_e2e::{Aggregator, ErrorDetector};

fn result(suite: &str, role: &str, status: SuiteStatus, errors: u32) -> TestExecutionResult {
    let now = Utc::now();
    TestExecutionResult {
        suite: suite.to_string(),
        role: role.to_string(),
        status,
        started_at: now,
        ended_at: now,
        duration_ms: 2_000,
        tests_passed: 4,
        tests_failed: 0,
        tests_skipped: 0,
        errors,
        warnings: 0,
        output: String::new(),
        error_detail: None,
    }
}

fn run(results: Vec<TestExecutionResult>, errors: Vec<DetectedError>) -> ComprehensiveTestResults {
    let now = Utc::now();
    ComprehensiveTestResults {
        run_id: "run-scenario".to_string(),
        status: OrchestrationStatus::Completed,
        started_at: now,
        completed_at: now,
        summary: ExecutionSummary::from_results(&results),
        suite_results: results,
        detected_errors: errors,
    }
}

fn detector(role: &str) -> ErrorDetector {
    let mut detector = ErrorDetector::new(&ObserverConfig::default());
    detector.set_context(role, None);
    detector.set_url("http://127.0.0.1:3000/dashboard");
    detector
}

#[test]
fn clean_run_is_excellent() {
    let aggregated = Aggregator::default().aggregate(
        &run(
            vec![
                result("admin-workflows", "admin", SuiteStatus::Passed, 0),
                result("viewer-workflows", "viewer", SuiteStatus::Passed, 0),
            ],
            vec![],
        ),
        &[],
    );

    let summary = &aggregated.error_analysis.executive_summary;
    assert_eq!(summary.overall_status, OverallStatus::Excellent);
    assert_eq!(summary.risk_level, RiskLevel::Low);
    assert_eq!(summary.total_issues_found, 0);
    assert_eq!(aggregated.quality_metrics.stability_score, 100);
}

#[test]
fn auth_session_failure_makes_the_run_critical() {
    let mut detector = detector("admin");
    let error = detector
        .observe(&PageSignal::Response {
            url: "http://127.0.0.1:3000/api/auth/session".to_string(),
            method: "GET".to_string(),
            status: 500,
            duration_ms: None,
        })
        .unwrap();
    assert_eq!(error.severity, Severity::Critical);

    let aggregated = Aggregator::default().aggregate(
        &run(
            vec![result("admin-workflows", "admin", SuiteStatus::Passed, 0)],
            detector.take_errors(),
        ),
        &[],
    );

    let summary = &aggregated.error_analysis.executive_summary;
    assert_eq!(summary.overall_status, OverallStatus::Critical);
    assert_eq!(summary.risk_level, RiskLevel::High);
    assert_eq!(summary.critical_issues, 1);
    assert_eq!(aggregated.trend_analysis.regression_risk, RiskLevel::High);
    assert_eq!(aggregated.developer_tasks[0].estimated_hours, 8.0);
}

#[test]
fn aggregating_twice_gives_the_same_errors() {
    let mut detector = detector("viewer");
    for text in ["Warning: legacy prop", "Failed to fetch /api/reports", "x is undefined"] {
        detector.observe(&PageSignal::Console {
            level: ConsoleLevel::Error,
            text: text.to_string(),
        });
    }
    let errors = detector.errors().to_vec();
    assert_eq!(errors.len(), 3);

    let aggregator = Aggregator::default();
    let input = run(
        vec![result("viewer-workflows", "viewer", SuiteStatus::Passed, 3)],
        errors.clone(),
    );
    let once = aggregator.aggregate(&input, &errors);
    let twice = aggregator.aggregate(
        &run(input.suite_results.clone(), once.error_analysis.errors.clone()),
        &once.error_analysis.errors,
    );

    assert_eq!(once.error_analysis.errors, twice.error_analysis.errors);
    assert_eq!(once.error_analysis.executive_summary.total_issues_found, 3);
    assert_eq!(once.quality_metrics, twice.quality_metrics);
}

#[test]
fn stability_never_rises_as_things_get_worse() {
    let aggregator = Aggregator::default();
    let mut detector = detector("analyst");
    let mut results = vec![result("analyst-workflows", "analyst", SuiteStatus::Passed, 0)];
    let mut previous = 100;

    let signals = [
        "Deprecated API used",
        "Failed to fetch /api/chart-data",
        "Cannot read properties of null (reading 'id')",
        "Unhandled API error from /api/export",
        "TypeError: render is not a function",
    ];
    for (i, text) in signals.iter().enumerate() {
        detector.observe(&PageSignal::PageError {
            message: text.to_string(),
            stack: None,
        });
        if i % 2 == 1 {
            results.push(result(&format!("suite-{}", i), "analyst", SuiteStatus::Failed, 1));
        }

        let aggregated =
            aggregator.aggregate(&run(results.clone(), detector.errors().to_vec()), &[]);
        let score = aggregated.quality_metrics.stability_score;
        assert!(score <= previous, "score rose from {} to {}", previous, score);
        previous = score;
    }
    assert!(previous < 100);
}
