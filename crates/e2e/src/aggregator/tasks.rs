//! Developer task list

use suitewatch_common::{
    ActionItem, DeveloperTask, ErrorSummary, ErrorType, Priority, Severity, SuiteStatus,
    TestExecutionResult,
};

pub const STABILIZE_CATEGORY: &str = "Test Infrastructure";
pub const MONITORING_CATEGORY: &str = "Observability";

/// Effort by severity when no `effort:` tag says otherwise
pub fn estimated_hours(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 8.0,
        Severity::High => 4.0,
        Severity::Medium | Severity::Low => 2.0,
    }
}

pub fn category(error_type: ErrorType) -> &'static str {
    match error_type {
        ErrorType::Runtime => "Runtime Stability",
        ErrorType::Network => "Network",
        ErrorType::Api => "API Integration",
        ErrorType::Rendering => "UI Rendering",
        ErrorType::Navigation => "Navigation",
        ErrorType::Import => "Build & Modules",
        ErrorType::Component => "Component Architecture",
    }
}

fn acceptance_criteria(item: &ActionItem) -> Vec<String> {
    let mut criteria = vec![
        format!(
            "No {} errors matching this pattern in a full suite run",
            item.error_type
        ),
        "A regression test covers the failing scenario".to_string(),
    ];
    let extra = match item.error_type {
        ErrorType::Network | ErrorType::Api => "Failed responses are handled and surfaced to the user",
        ErrorType::Rendering => "Affected elements render correctly at the supported viewports",
        ErrorType::Component => "The component recovers from bad data without unmounting the page",
        ErrorType::Import => "The module loads in a production build",
        ErrorType::Navigation => "Every affected route is reachable for the intended roles",
        ErrorType::Runtime => "No uncaught exceptions are logged on the affected pages",
    };
    criteria.push(extra.to_string());
    criteria
}

fn task_from_item(item: &ActionItem) -> DeveloperTask {
    DeveloperTask {
        id: String::new(),
        title: item.title.clone(),
        description: item.description.clone(),
        priority: Priority::for_severity(item.severity),
        category: category(item.error_type).to_string(),
        estimated_hours: item
            .effort_hours_override
            .unwrap_or_else(|| estimated_hours(item.severity)),
        related_errors: item.related_errors.clone(),
        acceptance_criteria: acceptance_criteria(item),
        dependencies: Vec::new(),
    }
}

fn stabilize_task(failed: &[&TestExecutionResult]) -> DeveloperTask {
    let names: Vec<&str> = failed.iter().map(|r| r.suite.as_str()).collect();
    DeveloperTask {
        id: String::new(),
        title: "Stabilize test suite".to_string(),
        description: format!(
            "{} suite(s) did not pass: {}. Determine whether each failure is a product defect or a flaky test and fix accordingly.",
            names.len(),
            names.join(", ")
        ),
        priority: Priority::P1,
        category: STABILIZE_CATEGORY.to_string(),
        estimated_hours: 4.0,
        related_errors: Vec::new(),
        acceptance_criteria: vec![
            "All suites pass in three consecutive runs".to_string(),
            "No suite exceeds its time budget".to_string(),
        ],
        dependencies: Vec::new(),
    }
}

fn monitoring_task(critical_ids: Vec<String>) -> DeveloperTask {
    DeveloperTask {
        id: String::new(),
        title: "Add monitoring for critical paths".to_string(),
        description: "Critical errors reached the browser during testing. Add production \
                      error tracking and alerting for the affected flows."
            .to_string(),
        priority: Priority::P2,
        category: MONITORING_CATEGORY.to_string(),
        estimated_hours: 2.0,
        related_errors: critical_ids,
        acceptance_criteria: vec![
            "Errors on the affected pages are reported to the error tracker".to_string(),
            "An alert fires when the error rate on a critical path rises".to_string(),
        ],
        dependencies: Vec::new(),
    }
}

/// Build, order and link the task list.
///
/// Tasks are sorted by priority (stable, so equal priorities keep action
/// item order). A task depends on every `P0` task of its own category, and
/// the monitoring task depends on every `P0` fix.
pub fn developer_tasks(
    items: &[ActionItem],
    suite_results: &[TestExecutionResult],
    errors: &ErrorSummary,
    critical_ids: Vec<String>,
) -> Vec<DeveloperTask> {
    let mut tasks: Vec<DeveloperTask> = items.iter().map(task_from_item).collect();

    let failed: Vec<&TestExecutionResult> = suite_results
        .iter()
        .filter(|r| matches!(r.status, SuiteStatus::Failed | SuiteStatus::Timeout))
        .collect();
    if !failed.is_empty() {
        tasks.push(stabilize_task(&failed));
    }
    if errors.critical > 0 {
        tasks.push(monitoring_task(critical_ids));
    }

    tasks.sort_by_key(|task| task.priority);
    for (i, task) in tasks.iter_mut().enumerate() {
        task.id = format!("task-{:03}", i + 1);
    }

    let blockers: Vec<(String, String)> = tasks
        .iter()
        .filter(|t| t.priority == Priority::P0)
        .map(|t| (t.id.clone(), t.category.clone()))
        .collect();
    for task in tasks.iter_mut().filter(|t| t.priority != Priority::P0) {
        task.dependencies = blockers
            .iter()
            .filter(|(_, category)| {
                task.category == MONITORING_CATEGORY || *category == task.category
            })
            .map(|(id, _)| id.clone())
            .collect();
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::suite_result;

    fn item(severity: Severity, error_type: ErrorType, ids: &[&str]) -> ActionItem {
        ActionItem {
            title: format!("Fix {} error", error_type),
            description: String::new(),
            severity,
            error_type,
            occurrences: ids.len(),
            related_errors: ids.iter().map(|s| s.to_string()).collect(),
            effort_hours_override: None,
        }
    }

    #[test]
    fn test_hours_by_severity() {
        assert_eq!(estimated_hours(Severity::Critical), 8.0);
        assert_eq!(estimated_hours(Severity::High), 4.0);
        assert_eq!(estimated_hours(Severity::Medium), 2.0);
        assert_eq!(estimated_hours(Severity::Low), 2.0);
    }

    #[test]
    fn test_tasks_sorted_and_linked() {
        let items = vec![
            item(Severity::Medium, ErrorType::Rendering, &["r1"]),
            item(Severity::Critical, ErrorType::Runtime, &["c1"]),
            item(Severity::High, ErrorType::Runtime, &["h1", "h2"]),
        ];
        let results = vec![
            suite_result("admin-workflows", "admin", SuiteStatus::Passed),
            suite_result("viewer-workflows", "viewer", SuiteStatus::Failed),
        ];
        let summary = ErrorSummary {
            total: 4,
            critical: 1,
            high: 2,
            medium: 1,
            ..Default::default()
        };

        let tasks = developer_tasks(&items, &results, &summary, vec!["c1".to_string()]);
        let priorities: Vec<Priority> = tasks.iter().map(|t| t.priority).collect();
        assert_eq!(
            priorities,
            vec![Priority::P0, Priority::P1, Priority::P1, Priority::P2, Priority::P2]
        );

        assert_eq!(tasks[0].id, "task-001");
        assert_eq!(tasks[0].estimated_hours, 8.0);

        let stabilize = tasks.iter().find(|t| t.category == STABILIZE_CATEGORY).unwrap();
        assert_eq!(stabilize.priority, Priority::P1);
        assert!(stabilize.related_errors.is_empty());
        assert!(stabilize.description.contains("viewer-workflows"));

        let runtime_high = tasks
            .iter()
            .find(|t| t.related_errors == vec!["h1", "h2"])
            .unwrap();
        assert_eq!(runtime_high.dependencies, vec!["task-001"]);

        let monitoring = tasks.iter().find(|t| t.category == MONITORING_CATEGORY).unwrap();
        assert_eq!(monitoring.dependencies, vec!["task-001"]);
        assert_eq!(monitoring.estimated_hours, 2.0);
    }

    #[test]
    fn test_no_synthetic_tasks_for_clean_run() {
        let results = vec![suite_result("admin-workflows", "admin", SuiteStatus::Passed)];
        let tasks = developer_tasks(&[], &results, &ErrorSummary::default(), Vec::new());
        assert!(tasks.is_empty());
    }
}
