//! Runner configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{E2eError, E2eResult};

/// Top-level runner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Base URL of the application under test
    pub base_url: String,

    /// Root of the persisted run layout
    pub output_dir: PathBuf,

    /// Run browsers without a window
    pub headless: bool,

    /// Run suites in fixed-size batches instead of one at a time
    pub parallel: bool,

    /// Batch size in parallel mode
    pub max_concurrency: usize,

    /// Wall-clock budget per suite
    pub suite_timeout_ms: u64,

    /// Time between the graceful terminate and the forced kill
    pub kill_grace_ms: u64,

    /// Pause between suites
    pub stabilization_delay_ms: u64,

    /// How long to wait for the application to answer the liveness probe
    pub reachability_timeout_ms: u64,

    /// Skip the liveness probe entirely
    pub skip_reachability: bool,

    /// Paths that must exist before any suite starts
    pub required_paths: Vec<PathBuf>,

    pub cleanup: CleanupConfig,
    pub launcher: LauncherConfig,
    pub observer: ObserverConfig,
    pub thresholds: ScoringThresholds,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000".to_string(),
            output_dir: PathBuf::from("test-results"),
            headless: true,
            parallel: false,
            max_concurrency: 2,
            suite_timeout_ms: 300_000,
            kill_grace_ms: 10_000,
            stabilization_delay_ms: 2_000,
            reachability_timeout_ms: 30_000,
            skip_reachability: false,
            required_paths: vec![PathBuf::from("tests/e2e")],
            cleanup: CleanupConfig::default(),
            launcher: LauncherConfig::default(),
            observer: ObserverConfig::default(),
            thresholds: ScoringThresholds::default(),
        }
    }
}

/// Inter-suite cleanup
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Process command-line patterns killed before and after each suite
    pub stray_process_patterns: Vec<String>,

    /// Transient files deleted between suites
    pub transient_files: Vec<PathBuf>,

    /// Wait after killing processes for teardown to settle
    pub teardown_wait_ms: u64,

    /// File kept when the artifacts directory is cleared
    pub artifact_sentinel: String,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            stray_process_patterns: vec![
                "chrome-headless-shell".to_string(),
                "ms-playwright/chromium".to_string(),
            ],
            transient_files: vec![
                PathBuf::from("test-results/.last-run.json"),
                PathBuf::from(".playwright.lock"),
            ],
            teardown_wait_ms: 1_000,
            artifact_sentinel: ".gitkeep".to_string(),
        }
    }
}

/// How a suite's child process is built
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    pub program: String,
    pub args: Vec<String>,
    pub reporter: String,
    /// Working directory for the child, defaults to the current one
    pub working_dir: Option<PathBuf>,
    pub extra_env: BTreeMap<String, String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            program: "npx".to_string(),
            args: vec!["playwright".to_string(), "test".to_string()],
            reporter: "list".to_string(),
            working_dir: None,
            extra_env: BTreeMap::new(),
        }
    }
}

/// Error detector settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    pub console_history: usize,
    pub network_history: usize,
    /// Prefix of structured lines emitted by the in-page monitor
    pub signal_prefix: String,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            console_history: 50,
            network_history: 50,
            signal_prefix: crate::observer::SIGNAL_PREFIX.to_string(),
        }
    }
}

/// Scoring and precedence thresholds used by the aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringThresholds {
    /// More high errors than this means `needs-attention`
    pub needs_attention_high_errors: usize,
    /// More failed suites than this means `needs-attention`
    pub needs_attention_failed_suites: usize,
    pub critical_weight: u32,
    pub high_weight: u32,
    pub medium_weight: u32,
    pub failed_suite_weight: u32,
    /// More occurrences than this marks an error type as increasing
    pub increasing_trend_occurrences: usize,
    pub moderate_impact_high_errors: usize,
    pub minor_impact_total_errors: usize,
    pub medium_regression_total_errors: usize,
    pub high_regression_failed_suites: usize,
    /// A failed suite with no detected errors reports `stable` instead of `excellent`
    pub failed_suites_count_as_issues: bool,
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            needs_attention_high_errors: 2,
            needs_attention_failed_suites: 1,
            critical_weight: 20,
            high_weight: 10,
            medium_weight: 5,
            failed_suite_weight: 15,
            increasing_trend_occurrences: 3,
            moderate_impact_high_errors: 3,
            minor_impact_total_errors: 5,
            medium_regression_total_errors: 5,
            high_regression_failed_suites: 1,
            failed_suites_count_as_issues: true,
        }
    }
}

impl RunnerConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.max_concurrency == 0 {
            return Err(E2eError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.suite_timeout_ms == 0 {
            return Err(E2eError::InvalidConfig(
                "suite_timeout_ms must be positive".to_string(),
            ));
        }
        if self.observer.console_history == 0 || self.observer.network_history == 0 {
            return Err(E2eError::InvalidConfig(
                "observer history capacities must be positive".to_string(),
            ));
        }
        if self.observer.signal_prefix.trim().is_empty() {
            return Err(E2eError::InvalidConfig("observer signal_prefix is empty".to_string()));
        }
        if self.launcher.program.trim().is_empty() {
            return Err(E2eError::InvalidConfig("launcher program is empty".to_string()));
        }
        Ok(())
    }

    pub fn suite_timeout(&self) -> Duration {
        Duration::from_millis(self.suite_timeout_ms)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub fn reachability_timeout(&self) -> Duration {
        Duration::from_millis(self.reachability_timeout_ms)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.output_dir.join("artifacts")
    }

    /// In-page monitor, rendering probe and the Playwright helper that loads them
    pub fn page_scripts_dir(&self) -> PathBuf {
        self.artifacts_dir().join("suitewatch")
    }

    pub fn monitor_script_path(&self) -> PathBuf {
        self.page_scripts_dir().join("monitor.js")
    }

    pub fn render_probe_script_path(&self) -> PathBuf {
        self.page_scripts_dir().join("render-probe.js")
    }

    pub fn page_fixture_path(&self) -> PathBuf {
        self.page_scripts_dir().join("fixture.cjs")
    }

    pub fn error_reports_dir(&self) -> PathBuf {
        self.output_dir.join("error-reports")
    }

    pub fn execution_summary_path(&self) -> PathBuf {
        self.output_dir.join("execution-summary.json")
    }
}
