//! Orchestrator runs against real `sh` child processes
#![cfg(unix)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use suitewatch_common::{OrchestrationStatus, Severity, SuiteStatus, TestSuiteInfo};
use suitewatch_e2e::config::CleanupConfig;
use suitewatch_e2e::events::{EventKind, RunEvent};
use suitewatch_e2e::{
    Aggregator, E2eError, E2eResult, Orchestrator, RunnerConfig, SuiteCatalog, SuiteLauncher,
};
use tokio::process::Command;

/// Treats each suite's `file` as a shell script
struct ShellLauncher;

#[async_trait::async_trait]
impl SuiteLauncher for ShellLauncher {
    fn command(&self, suite: &TestSuiteInfo, config: &RunnerConfig) -> E2eResult<Command> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&suite.file)
            .env("ERROR_REPORT_DIR", config.error_reports_dir());
        Ok(cmd)
    }
}

const PASSING: &str = "echo '  ✓  1 [chromium] › app.spec.ts:3:1 › loads (5ms)'; echo '  1 passed (0.1s)'";

fn suite(name: &str, role: &str, script: &str) -> TestSuiteInfo {
    TestSuiteInfo {
        name: name.to_string(),
        role: role.to_string(),
        file: script.to_string(),
        description: String::new(),
        estimated_duration_ms: 100,
    }
}

fn config(output_dir: &Path) -> RunnerConfig {
    RunnerConfig {
        output_dir: output_dir.to_path_buf(),
        skip_reachability: true,
        required_paths: vec![],
        stabilization_delay_ms: 10,
        suite_timeout_ms: 10_000,
        kill_grace_ms: 200,
        cleanup: CleanupConfig {
            stray_process_patterns: vec![],
            transient_files: vec![],
            teardown_wait_ms: 0,
            artifact_sentinel: ".gitkeep".to_string(),
        },
        ..Default::default()
    }
}

fn orchestrator(config: RunnerConfig, suites: Vec<TestSuiteInfo>) -> Orchestrator {
    Orchestrator::new(config, SuiteCatalog { suites }, Arc::new(ShellLauncher))
}

#[tokio::test]
async fn failing_suite_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator(
        config(dir.path()),
        vec![
            suite("admin-workflows", "admin", PASSING),
            suite("manager-workflows", "manager", "echo 'Error: boom'; exit 1"),
            suite("analyst-workflows", "analyst", PASSING),
            suite("viewer-workflows", "viewer", PASSING),
        ],
    );
    let mut completed = orchestrator.subscribe(&[EventKind::SuiteCompleted, EventKind::Completed]);

    let results = orchestrator.execute_all_tests().await.unwrap();

    assert_eq!(results.status, OrchestrationStatus::Completed);
    assert_eq!(orchestrator.get_status(), OrchestrationStatus::Completed);
    assert_eq!(results.suite_results.len(), 4);
    assert_eq!(results.summary.failed_suites, 1);
    assert_eq!(results.summary.passed_suites, 3);

    let failed = &results.suite_results[1];
    assert_eq!(failed.suite, "manager-workflows");
    assert_eq!(failed.status, SuiteStatus::Failed);
    assert_eq!(failed.errors, 1);
    assert_eq!(failed.error_detail.as_ref().unwrap().exit_code, Some(1));
    assert_eq!(results.suite_results[0].tests_passed, 1);

    let role_total: u64 = results.summary.errors_by_role.values().sum();
    let suite_total: u64 = results.suite_results.iter().map(|r| u64::from(r.errors)).sum();
    assert_eq!(role_total, suite_total);

    let mut suite_events = 0;
    while let Some(event) = completed.try_recv() {
        match event {
            RunEvent::SuiteCompleted(_) => suite_events += 1,
            RunEvent::Completed(_) => break,
            _ => {}
        }
    }
    assert_eq!(suite_events, 4);
    assert!(dir.path().join("execution-summary.json").exists());
}

#[tokio::test]
async fn slow_suite_times_out_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.suite_timeout_ms = 300;

    let orchestrator = orchestrator(
        cfg,
        vec![
            suite("admin-workflows", "admin", "echo started; exec sleep 30"),
            suite("viewer-workflows", "viewer", PASSING),
        ],
    );

    let results = orchestrator.execute_all_tests().await.unwrap();

    let timed_out = &results.suite_results[0];
    assert_eq!(timed_out.status, SuiteStatus::Timeout);
    assert!(timed_out.duration_ms < 5_000);
    let detail = timed_out.error_detail.as_ref().unwrap();
    assert_eq!(detail.output_tail, vec!["started"]);

    assert_eq!(results.suite_results[1].status, SuiteStatus::Passed);
    assert_eq!(results.summary.timed_out_suites, 1);
    assert_eq!(results.summary.failed_suites, 0);
}

#[tokio::test]
async fn cancel_stops_launches_and_keeps_results() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Arc::new(orchestrator(
        config(dir.path()),
        vec![
            suite("admin-workflows", "admin", PASSING),
            suite("manager-workflows", "manager", "exec sleep 30"),
            suite("viewer-workflows", "viewer", PASSING),
        ],
    ));
    let mut started = orchestrator.subscribe(&[EventKind::SuiteStarted]);

    let runner = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.execute_all_tests().await })
    };

    loop {
        match started.recv().await {
            Some(RunEvent::SuiteStarted { suite, .. }) if suite == "manager-workflows" => break,
            Some(_) => continue,
            None => panic!("event bus closed"),
        }
    }
    let first = orchestrator.get_current_results();
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.cancel();
    orchestrator.cancel();

    let results = tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(results.status, OrchestrationStatus::Cancelled);
    assert_eq!(orchestrator.get_status(), OrchestrationStatus::Cancelled);
    assert_eq!(first.len(), 1);
    assert_eq!(results.suite_results[0], first[0]);
    assert_eq!(results.suite_results.len(), 2);
    assert_eq!(results.suite_results[1].status, SuiteStatus::Skipped);
    assert!(results
        .suite_results
        .iter()
        .all(|r| r.suite != "viewer-workflows"));
}

#[tokio::test]
async fn parallel_batches_complete_before_the_next_starts() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.parallel = true;
    cfg.max_concurrency = 2;

    let script = "sleep 0.2; echo '  1 passed (0.2s)'";
    let orchestrator = orchestrator(
        cfg,
        (1..=5)
            .map(|i| suite(&format!("suite-{}", i), "viewer", script))
            .collect(),
    );

    let results = orchestrator.execute_all_tests().await.unwrap();
    assert_eq!(results.suite_results.len(), 5);
    assert!(results
        .suite_results
        .iter()
        .all(|r| r.status == SuiteStatus::Passed));

    let batches: Vec<&[_]> = results.suite_results.chunks(2).collect();
    assert_eq!(
        batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );
    for pair in batches.windows(2) {
        let previous_end = pair[0].iter().map(|r| r.ended_at).max().unwrap();
        let next_start = pair[1].iter().map(|r| r.started_at).min().unwrap();
        assert!(next_start >= previous_end, "batch started before the previous one finished");
    }
}

#[tokio::test]
async fn batch_cleanup_never_kills_running_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let marker = format!("suitewatch-stray-{}", std::process::id());
    let lock = dir.path().join("browser.lock");

    let mut cfg = config(dir.path());
    cfg.parallel = true;
    cfg.max_concurrency = 2;
    cfg.cleanup.stray_process_patterns = vec![marker.clone()];
    cfg.cleanup.transient_files = vec![lock.clone()];

    let slow = format!("sleep 1; : {}", marker);
    let fast = format!("touch '{}'; sleep 0.2", lock.display());
    let orchestrator = orchestrator(
        cfg,
        vec![
            suite("slow-suite", "admin", &slow),
            suite("fast-suite", "viewer", &fast),
        ],
    );

    let results = orchestrator.execute_all_tests().await.unwrap();

    for result in &results.suite_results {
        assert_eq!(
            result.status,
            SuiteStatus::Passed,
            "{} was {:?}",
            result.suite,
            result.error_detail
        );
    }
    assert!(!lock.exists(), "transient files are removed after the batch");
}

#[tokio::test]
async fn monitor_lines_become_detected_errors() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"echo '[suitewatch:signal] {"signal":{"kind":"response","url":"http://app/api/auth/session","status":500},"role":"admin"}'; echo '[suitewatch:signal] {"signal":{"kind":"response","url":"http://app/api/auth/session","status":500},"role":"admin"}'"#;
    let orchestrator = orchestrator(
        config(dir.path()),
        vec![suite("admin-workflows", "admin", script)],
    );
    let mut realtime = orchestrator.subscribe(&[EventKind::RealTimeError]);

    let results = orchestrator.execute_all_tests().await.unwrap();

    assert_eq!(results.detected_errors.len(), 1);
    let error = &results.detected_errors[0];
    assert_eq!(error.severity, Severity::Critical);
    assert_eq!(error.suite.as_deref(), Some("admin-workflows"));
    assert!(matches!(realtime.try_recv(), Some(RunEvent::RealTimeError(_))));
    assert!(realtime.try_recv().is_none());

    // The suite passed, the error it surfaced is still critical
    assert_eq!(results.suite_results[0].status, SuiteStatus::Passed);
    assert_eq!(results.suite_results[0].errors, 0);

    let aggregated = Aggregator::default().aggregate(&results, &[]);
    assert_eq!(
        aggregated.error_analysis.executive_summary.overall_status,
        suitewatch_common::OverallStatus::Critical
    );
    assert_eq!(aggregated.error_analysis.executive_summary.total_issues_found, 1);

    let reports = std::fs::read_dir(dir.path().join("error-reports")).unwrap().count();
    assert_eq!(reports, 1);
}

#[tokio::test]
async fn suite_written_reports_are_collected() {
    let dir = tempfile::tempdir().unwrap();
    let script = r#"cat > "$ERROR_REPORT_DIR/from-suite.json" <<'EOF'
[{"id":"err-suite-1","type":"rendering","severity":"medium","message":"Broken image: /logo.png","stack":null,"url":"http://app/","role":"viewer","userId":null,"suite":"viewer-workflows","timestamp":"2026-01-01T00:00:00Z","screenshot":null,"domSnapshot":null,"details":null}]
EOF
echo 'not json' > "$ERROR_REPORT_DIR/broken.json""#;
    let orchestrator = orchestrator(
        config(dir.path()),
        vec![suite("viewer-workflows", "viewer", script)],
    );

    let results = orchestrator.execute_all_tests().await.unwrap();
    assert_eq!(results.detected_errors.len(), 1);
    assert_eq!(results.detected_errors[0].id, "err-suite-1");
}

#[tokio::test]
async fn preparation_failure_fails_the_run_and_writes_reports() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.required_paths = vec![dir.path().join("tests/e2e")];

    let orchestrator = orchestrator(cfg, vec![suite("admin-workflows", "admin", PASSING)]);
    let mut errors = orchestrator.subscribe(&[EventKind::Error]);

    let result = orchestrator.execute_all_tests().await;
    assert!(matches!(result, Err(E2eError::MissingPath(_))));
    assert_eq!(orchestrator.get_status(), OrchestrationStatus::Failed);
    assert!(matches!(errors.try_recv(), Some(RunEvent::Error { .. })));

    assert!(dir.path().join("execution-summary.json").exists());
    let error_files = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_string_lossy()
                .starts_with("orchestrator-error-")
        })
        .count();
    assert_eq!(error_files, 1);
}
