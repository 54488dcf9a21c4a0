//! Suite orchestrator
//!
//! Runs the catalog to completion, one supervised child process per suite,
//! and produces one [`TestExecutionResult`] per launched suite no matter how
//! that suite ended. Only preparation failures abort a run.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use suitewatch_common::{
    ComprehensiveTestResults, DetectedError, ExecutionErrorDetail, ExecutionSummary,
    OrchestrationStatus, ProgressReport, SuiteStatus, TestExecutionResult, TestSuiteInfo,
};

use crate::catalog::SuiteCatalog;
use crate::collect::{collect_error_reports, dedup_by_id, ErrorReportBatch};
use crate::config::RunnerConfig;
use crate::environment::{self, Janitor};
use crate::error::{E2eError, E2eResult};
use crate::events::{EventBus, EventKind, EventSubscription, RunEvent};
use crate::launcher::SuiteLauncher;
use crate::observer::ErrorDetector;
use crate::output::{OutputParser, ParsedLine};
use crate::supervisor::{
    OutputLine, ProcessOutcome, SupervisedProcess, SupervisionLimits, TerminationReason,
};

/// Where environment cleanup runs relative to a suite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cleanup {
    /// Before and after each suite (sequential mode)
    PerSuite,
    /// Around the whole batch; the suite itself does none
    PerBatch,
}

#[derive(Debug)]
struct RunState {
    status: OrchestrationStatus,
    run_id: Option<String>,
    results: Vec<TestExecutionResult>,
    errors: Vec<DetectedError>,
}

/// Written to disk when a run aborts before any suite starts
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrchestratorErrorReport<'a> {
    run_id: &'a str,
    timestamp: DateTime<Utc>,
    message: String,
    detail: String,
}

pub struct Orchestrator {
    config: RunnerConfig,
    suites: Vec<TestSuiteInfo>,
    launcher: Arc<dyn SuiteLauncher>,
    janitor: Janitor,
    events: EventBus,
    state: Mutex<RunState>,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: RunnerConfig,
        catalog: SuiteCatalog,
        launcher: Arc<dyn SuiteLauncher>,
    ) -> Self {
        let janitor = Janitor::new(config.cleanup.clone());
        Self {
            config,
            suites: catalog.suites,
            launcher,
            janitor,
            events: EventBus::default(),
            state: Mutex::new(RunState {
                status: OrchestrationStatus::Idle,
                run_id: None,
                results: Vec::new(),
                errors: Vec::new(),
            }),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self, kinds: &[EventKind]) -> EventSubscription {
        self.events.subscribe(kinds)
    }

    pub fn get_status(&self) -> OrchestrationStatus {
        self.state.lock().status
    }

    /// Id of the current or last run
    pub fn run_id(&self) -> Option<String> {
        self.state.lock().run_id.clone()
    }

    pub fn get_test_suites(&self) -> &[TestSuiteInfo] {
        &self.suites
    }

    /// Results recorded so far, in completion order
    pub fn get_current_results(&self) -> Vec<TestExecutionResult> {
        self.state.lock().results.clone()
    }

    /// Stop launching suites and terminate the ones in flight. Idempotent.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            info!("Cancelling run");
        }
        self.cancel.cancel();

        let mut state = self.state.lock();
        if state.status == OrchestrationStatus::Idle {
            state.status = OrchestrationStatus::Cancelled;
            drop(state);
            self.events.publish(RunEvent::Cancelled);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn transition(&self, to: OrchestrationStatus) -> E2eResult<()> {
        use OrchestrationStatus::*;

        let mut state = self.state.lock();
        let allowed = matches!(
            (state.status, to),
            (Idle, Running) | (Running, Completed) | (Running, Failed) | (Running, Cancelled)
        );
        if !allowed {
            return Err(E2eError::InvalidStateTransition {
                from: state.status.to_string(),
                to: to.to_string(),
            });
        }
        debug!("Orchestrator {} -> {}", state.status, to);
        state.status = to;
        Ok(())
    }

    /// Snapshot of where the run stands
    pub fn progress(&self, current_suite: Option<String>) -> ProgressReport {
        let state = self.state.lock();
        let completed = state.results.len();
        let total = self.suites.len();
        let remaining = total.saturating_sub(completed);

        let percent = if total == 0 {
            100.0
        } else {
            completed as f64 * 100.0 / total as f64
        };
        let eta_ms = if completed == 0 {
            None
        } else {
            let spent: u64 = state.results.iter().map(|r| r.duration_ms).sum();
            Some(spent / completed as u64 * remaining as u64)
        };

        ProgressReport {
            completed,
            total,
            percent,
            current_suite,
            eta_ms,
            errors: state.results.iter().map(|r| u64::from(r.errors)).sum(),
            warnings: state.results.iter().map(|r| u64::from(r.warnings)).sum(),
            status: state.status,
        }
    }

    /// Run every suite in the catalog.
    ///
    /// Returns `Err` only when preparation fails or the orchestrator is not
    /// idle. Suite failures, timeouts and cancellation all come back as `Ok`.
    pub async fn execute_all_tests(&self) -> E2eResult<ComprehensiveTestResults> {
        if self.get_status() == OrchestrationStatus::Cancelled {
            return Err(E2eError::Cancelled);
        }
        self.transition(OrchestrationStatus::Running)?;

        let started_at = Utc::now();
        let run_id = format!("run-{}", started_at.format("%Y%m%dT%H%M%S%3f"));
        self.state.lock().run_id = Some(run_id.clone());

        info!("Starting {} with {} suite(s)", run_id, self.suites.len());
        self.events.publish(RunEvent::Started {
            run_id: run_id.clone(),
            total_suites: self.suites.len(),
        });

        if let Err(e) = self.prepare().await {
            error!("Preparation failed: {}", e);
            self.write_run_failure(&run_id, started_at, &e);
            self.transition(OrchestrationStatus::Failed)?;
            self.events.publish(RunEvent::Error {
                message: e.to_string(),
            });
            return Err(e);
        }
        self.events.publish(RunEvent::Progress(self.progress(None)));

        if self.config.parallel {
            self.run_batches().await;
        } else {
            self.run_sequential().await;
        }

        let results = self.finish(run_id, started_at)?;
        match results.status {
            OrchestrationStatus::Cancelled => self.events.publish(RunEvent::Cancelled),
            _ => self
                .events
                .publish(RunEvent::Completed(Box::new(results.clone()))),
        }
        Ok(results)
    }

    async fn prepare(&self) -> E2eResult<()> {
        self.config.validate()?;
        if self.suites.is_empty() {
            return Err(E2eError::Catalog("no suites to run".to_string()));
        }
        environment::validate_paths(&self.config.required_paths)?;

        if self.config.skip_reachability {
            debug!("Reachability probe skipped");
        } else {
            environment::probe_reachability(
                &self.config.base_url,
                self.config.reachability_timeout(),
            )
            .await?;
        }

        self.launcher.preflight().await?;
        environment::prepare_layout(&self.config)
    }

    async fn run_sequential(&self) {
        let total = self.suites.len();
        for (index, suite) in self.suites.iter().enumerate() {
            let Some(result) = self.run_suite_guarded(suite, Cleanup::PerSuite).await else {
                break;
            };
            self.record(result);

            if index + 1 < total && !self.cancel.is_cancelled() {
                tokio::time::sleep(self.config.stabilization_delay()).await;
            }
        }
    }

    async fn run_batches(&self) {
        let size = self.config.max_concurrency.max(1);
        let batches: Vec<&[TestSuiteInfo]> = self.suites.chunks(size).collect();
        let total = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            info!("Batch {}/{}: {} suite(s)", index + 1, total, batch.len());

            // Never kill by name while a sibling suite is still running
            self.janitor.pre_suite().await;
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|suite| self.run_suite_guarded(suite, Cleanup::PerBatch)),
            )
            .await;

            let mut any_failure = false;
            for result in outcomes.into_iter().flatten() {
                any_failure |= result.is_failure();
                self.record(result);
            }
            if any_failure {
                self.janitor.recover().await;
            } else {
                self.janitor.post_suite().await;
            }

            if index + 1 < total && !self.cancel.is_cancelled() {
                tokio::time::sleep(self.config.stabilization_delay()).await;
            }
        }
    }

    /// Run one suite, turning any error or panic into a failed result.
    /// Returns `None` when the run was cancelled before launch.
    async fn run_suite_guarded(
        &self,
        suite: &TestSuiteInfo,
        cleanup: Cleanup,
    ) -> Option<TestExecutionResult> {
        if self.cancel.is_cancelled() {
            info!("Not launching {}: run cancelled", suite.name);
            return None;
        }

        let started_at = Utc::now();
        let start = Instant::now();
        let outcome = AssertUnwindSafe(self.run_suite(suite, cleanup))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                error!("Suite {} could not run: {}", suite.name, e);
                synthetic_failure(
                    suite,
                    started_at,
                    start.elapsed(),
                    e.to_string(),
                    format!("{:?}", e),
                )
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Suite {} panicked: {}", suite.name, message);
                synthetic_failure(suite, started_at, start.elapsed(), message, "panic".to_string())
            }
        };

        if cleanup == Cleanup::PerSuite && result.is_failure() {
            self.janitor.recover().await;
        }
        Some(result)
    }

    async fn run_suite(
        &self,
        suite: &TestSuiteInfo,
        cleanup: Cleanup,
    ) -> E2eResult<TestExecutionResult> {
        self.events.publish(RunEvent::SuiteStarted {
            suite: suite.name.clone(),
            role: suite.role.clone(),
        });
        self.events
            .publish(RunEvent::Progress(self.progress(Some(suite.name.clone()))));

        if cleanup == Cleanup::PerSuite {
            self.janitor.pre_suite().await;
        }

        let command = self.launcher.command(suite, &self.config)?;
        let limits = SupervisionLimits {
            timeout: self.config.suite_timeout(),
            grace: self.config.kill_grace(),
        };

        let mut detector = ErrorDetector::new(&self.config.observer)
            .with_artifacts_dir(self.config.artifacts_dir());
        detector.set_context(suite.role.clone(), None);
        detector.set_url(self.config.base_url.clone());
        detector.set_suite(Some(suite.name.clone()));

        let mut parser = OutputParser::new();
        let prefix = self.config.observer.signal_prefix.clone();
        let started_at = Utc::now();

        info!("Running suite {} ({})", suite.name, suite.role);
        let outcome = SupervisedProcess::run(command, limits, self.cancel.child_token(), |line| {
            self.handle_line(suite, &prefix, &mut parser, &mut detector, line)
        })
        .await?;
        let ended_at = Utc::now();

        let detected = detector.take_errors();
        if !detected.is_empty() {
            let batch = ErrorReportBatch::new(
                Some(suite.name.clone()),
                Some(suite.role.clone()),
                detected.clone(),
            );
            if let Err(e) = batch.write(&self.config.error_reports_dir(), &suite.name) {
                warn!("Could not persist error batch for {}: {}", suite.name, e);
            }
            self.state.lock().errors.extend(detected);
        }

        if cleanup == Cleanup::PerSuite {
            self.janitor.post_suite().await;
        }

        Ok(build_result(suite, started_at, ended_at, &parser, outcome))
    }

    fn handle_line(
        &self,
        suite: &TestSuiteInfo,
        prefix: &str,
        parser: &mut OutputParser,
        detector: &mut ErrorDetector,
        line: &OutputLine,
    ) {
        if line.text.contains(prefix) {
            for error in detector.observe_line(&line.text) {
                debug!("{}: {} {} error", suite.name, error.severity, error.error_type);
                self.events.publish(RunEvent::RealTimeError(error));
            }
            return;
        }

        let event = match parser.parse_line(&line.text) {
            ParsedLine::TestStarted { title } => RunEvent::TestStarted {
                suite: suite.name.clone(),
                title,
            },
            ParsedLine::TestPassed { title } => RunEvent::TestPassed {
                suite: suite.name.clone(),
                title,
            },
            ParsedLine::TestFailed { title } => RunEvent::TestFailed {
                suite: suite.name.clone(),
                title,
            },
            _ => return,
        };
        self.events.publish(event);
    }

    fn record(&self, result: TestExecutionResult) {
        match result.status {
            SuiteStatus::Passed => info!("✓ {} ({} ms)", result.suite, result.duration_ms),
            status => warn!("✗ {} {} ({} ms)", result.suite, status, result.duration_ms),
        }

        self.state.lock().results.push(result.clone());
        self.events.publish(RunEvent::SuiteCompleted(result));
        self.events.publish(RunEvent::Progress(self.progress(None)));
    }

    fn finish(
        &self,
        run_id: String,
        started_at: DateTime<Utc>,
    ) -> E2eResult<ComprehensiveTestResults> {
        let status = if self.cancel.is_cancelled() {
            OrchestrationStatus::Cancelled
        } else {
            OrchestrationStatus::Completed
        };

        let (suite_results, realtime) = {
            let state = self.state.lock();
            (state.results.clone(), state.errors.clone())
        };
        let collected = collect_error_reports(&self.config.error_reports_dir());
        let detected_errors = dedup_by_id(realtime.into_iter().chain(collected));

        let results = ComprehensiveTestResults {
            run_id,
            status,
            started_at,
            completed_at: Utc::now(),
            summary: ExecutionSummary::from_results(&suite_results),
            suite_results,
            detected_errors,
        };

        if let Err(e) = write_json(&self.config.execution_summary_path(), &results) {
            error!("Could not write execution summary: {}", e);
        }

        self.transition(status)?;
        info!(
            "Run {} {}: {} passed, {} failed, {} timed out",
            results.run_id,
            status,
            results.summary.passed_suites,
            results.summary.failed_suites,
            results.summary.timed_out_suites
        );
        Ok(results)
    }

    /// Persist the error report and an empty summary. Failures here are logged.
    fn write_run_failure(&self, run_id: &str, started_at: DateTime<Utc>, cause: &E2eError) {
        let now = Utc::now();
        let report = OrchestratorErrorReport {
            run_id,
            timestamp: now,
            message: cause.to_string(),
            detail: format!("{:?}", cause),
        };
        let path = self.config.output_dir.join(format!(
            "orchestrator-error-{}.json",
            now.format("%Y%m%dT%H%M%S")
        ));
        if let Err(e) = write_json(&path, &report) {
            warn!("Could not write {}: {}", path.display(), e);
        }

        let results = ComprehensiveTestResults {
            run_id: run_id.to_string(),
            status: OrchestrationStatus::Failed,
            started_at,
            completed_at: now,
            summary: ExecutionSummary::default(),
            suite_results: Vec::new(),
            detected_errors: Vec::new(),
        };
        if let Err(e) = write_json(&self.config.execution_summary_path(), &results) {
            warn!("Could not write execution summary: {}", e);
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> E2eResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

/// Map a finished process to its suite result
fn build_result(
    suite: &TestSuiteInfo,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
    parser: &OutputParser,
    outcome: ProcessOutcome,
) -> TestExecutionResult {
    let counts = parser.counts();
    let status = if outcome.success() {
        SuiteStatus::Passed
    } else if outcome.timed_out() {
        SuiteStatus::Timeout
    } else if outcome.termination == Some(TerminationReason::Cancelled) {
        SuiteStatus::Skipped
    } else {
        SuiteStatus::Failed
    };

    let error_detail = match status {
        SuiteStatus::Passed => None,
        _ => Some(ExecutionErrorDetail {
            message: failure_message(status, &outcome),
            exit_code: outcome.exit_code,
            signal: outcome.signal,
            stack: None,
            output_tail: outcome.tail.clone(),
        }),
    };

    TestExecutionResult {
        suite: suite.name.clone(),
        role: suite.role.clone(),
        status,
        started_at,
        ended_at,
        duration_ms: outcome.duration.as_millis() as u64,
        tests_passed: counts.passed,
        tests_failed: counts.failed,
        tests_skipped: counts.skipped,
        errors: counts.errors,
        warnings: counts.warnings,
        output: outcome.output.join("\n"),
        error_detail,
    }
}

fn failure_message(status: SuiteStatus, outcome: &ProcessOutcome) -> String {
    match status {
        SuiteStatus::Timeout => format!(
            "Suite exceeded its time budget and was stopped after {} ms",
            outcome.duration.as_millis()
        ),
        SuiteStatus::Skipped => "Suite interrupted by cancellation".to_string(),
        _ => match (outcome.exit_code, outcome.signal) {
            (Some(code), _) => format!("Test runner exited with code {}", code),
            (None, Some(signal)) => format!("Test runner terminated by signal {}", signal),
            (None, None) => "Test runner ended without an exit status".to_string(),
        },
    }
}

fn synthetic_failure(
    suite: &TestSuiteInfo,
    started_at: DateTime<Utc>,
    elapsed: Duration,
    message: String,
    stack: String,
) -> TestExecutionResult {
    TestExecutionResult {
        suite: suite.name.clone(),
        role: suite.role.clone(),
        status: SuiteStatus::Failed,
        started_at,
        ended_at: Utc::now(),
        duration_ms: elapsed.as_millis() as u64,
        tests_passed: 0,
        tests_failed: 0,
        tests_skipped: 0,
        errors: 1,
        warnings: 0,
        output: String::new(),
        error_detail: Some(ExecutionErrorDetail {
            message,
            exit_code: None,
            signal: None,
            stack: Some(stack),
            output_tail: Vec::new(),
        }),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
