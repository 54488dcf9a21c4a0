//! Run preparation and inter-suite cleanup

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::{CleanupConfig, RunnerConfig};
use crate::error::{E2eError, E2eResult};
use crate::observer::session::{
    MONITOR_SCRIPT, PAGE_FIXTURE_SCRIPT, RENDER_PROBE_SCRIPT, SIGNAL_PREFIX,
};

const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Wait until the application answers an HTTP request.
///
/// Any response below 500 counts as alive: a login redirect or a 404 on the
/// root still proves the server is up.
pub async fn probe_reachability(url: &str, timeout_duration: Duration) -> E2eResult<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()?;

    let start = Instant::now();
    let mut attempts = 0;

    loop {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if !resp.status().is_server_error() => {
                debug!("{} reachable after {} attempt(s)", url, attempts);
                return Ok(());
            }
            Ok(resp) => {
                warn!("Reachability probe returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} to respond...", url);
                }
                if !e.is_connect() && !e.is_timeout() {
                    warn!("Reachability probe error: {}", e);
                }
            }
        }

        if start.elapsed() >= timeout_duration {
            return Err(E2eError::Unreachable {
                url: url.to_string(),
                attempts,
            });
        }
        sleep(PROBE_INTERVAL).await;
    }
}

/// Fail on the first path that does not exist
pub fn validate_paths(paths: &[PathBuf]) -> E2eResult<()> {
    for path in paths {
        if !path.exists() {
            return Err(E2eError::MissingPath(path.clone()));
        }
    }
    Ok(())
}

/// Empty `dir` except for `sentinel`, creating both if needed
pub fn clear_artifacts(dir: &Path, sentinel: &str) -> E2eResult<()> {
    if dir.exists() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_name() == sentinel {
                continue;
            }
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)?;
            } else {
                std::fs::remove_file(&path)?;
            }
        }
    } else {
        std::fs::create_dir_all(dir)?;
    }

    let sentinel_path = dir.join(sentinel);
    if !sentinel.is_empty() && !sentinel_path.exists() {
        std::fs::write(&sentinel_path, b"")?;
    }
    Ok(())
}

/// Create the output layout and drop what a previous run left behind
pub fn prepare_layout(config: &RunnerConfig) -> E2eResult<()> {
    std::fs::create_dir_all(&config.output_dir)?;
    clear_artifacts(&config.artifacts_dir(), &config.cleanup.artifact_sentinel)?;
    install_page_scripts(config)?;

    let reports = config.error_reports_dir();
    if reports.exists() {
        std::fs::remove_dir_all(&reports)?;
    }
    std::fs::create_dir_all(&reports)?;

    let summary = config.execution_summary_path();
    if summary.exists() {
        std::fs::remove_file(&summary)?;
    }

    info!("Output layout ready at {}", config.output_dir.display());
    Ok(())
}

/// Write the in-page monitor, the rendering probe and the Playwright helper
/// that wires them to stdout. The monitor is rewritten to use the configured
/// signal prefix.
pub fn install_page_scripts(config: &RunnerConfig) -> E2eResult<()> {
    std::fs::create_dir_all(config.page_scripts_dir())?;

    let prefix = serde_json::to_string(&config.observer.signal_prefix)?;
    let monitor = MONITOR_SCRIPT.replace(&format!("'{}'", SIGNAL_PREFIX), &prefix);
    std::fs::write(config.monitor_script_path(), monitor)?;
    std::fs::write(config.render_probe_script_path(), RENDER_PROBE_SCRIPT)?;
    std::fs::write(config.page_fixture_path(), PAGE_FIXTURE_SCRIPT)?;

    debug!("Page scripts installed in {}", config.page_scripts_dir().display());
    Ok(())
}

/// Best-effort cleanup between suites. Nothing here returns an error.
#[derive(Debug, Clone)]
pub struct Janitor {
    config: CleanupConfig,
}

impl Janitor {
    pub fn new(config: CleanupConfig) -> Self {
        Self { config }
    }

    /// Kill leftover browser processes by command-line pattern
    pub async fn kill_stray_processes(&self) {
        for pattern in &self.config.stray_process_patterns {
            match Command::new("pkill").arg("-f").arg(pattern).status().await {
                // pkill exits 1 when nothing matched
                Ok(status) if status.success() => debug!("Killed processes matching {}", pattern),
                Ok(_) => {}
                Err(e) => warn!("pkill {} failed: {}", pattern, e),
            }
        }
    }

    pub fn remove_transient_files(&self) {
        for path in &self.config.transient_files {
            match std::fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Could not remove {}: {}", path.display(), e),
            }
        }
    }

    async fn settle(&self) {
        sleep(Duration::from_millis(self.config.teardown_wait_ms)).await;
    }

    pub async fn pre_suite(&self) {
        self.kill_stray_processes().await;
        self.remove_transient_files();
        self.settle().await;
    }

    pub async fn post_suite(&self) {
        self.kill_stray_processes().await;
        self.remove_transient_files();
    }

    /// Run after a failed suite before the next one starts
    pub async fn recover(&self) {
        info!("Recovering environment after suite failure");
        self.kill_stray_processes().await;
        self.remove_transient_files();
        self.settle().await;
    }
}
