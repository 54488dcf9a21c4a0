//! Building the child process for a suite

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use suitewatch_common::TestSuiteInfo;

use crate::config::{LauncherConfig, RunnerConfig};
use crate::error::{E2eError, E2eResult};

/// Produces the command that runs one suite
#[async_trait]
pub trait SuiteLauncher: Send + Sync {
    /// Check that the test runner is available before any suite starts
    async fn preflight(&self) -> E2eResult<()> {
        Ok(())
    }

    fn command(&self, suite: &TestSuiteInfo, config: &RunnerConfig) -> E2eResult<Command>;
}

/// Launches suites with the Playwright test runner
pub struct PlaywrightLauncher {
    config: LauncherConfig,
}

impl PlaywrightLauncher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }

    /// Arguments passed to the runner for `suite`
    pub fn args(&self, suite: &TestSuiteInfo, headless: bool) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.push(suite.file.clone());
        args.push(format!("--reporter={}", self.config.reporter));
        if !headless {
            args.push("--headed".to_string());
        }
        args
    }
}

#[async_trait]
impl SuiteLauncher for PlaywrightLauncher {
    async fn preflight(&self) -> E2eResult<()> {
        let mut version_args: Vec<String> = self.config.args.iter().take(1).cloned().collect();
        version_args.push("--version".to_string());

        let status = Command::new(&self.config.program)
            .args(&version_args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::RunnerNotFound(format!(
                "{} {} (install with: npx playwright install)",
                self.config.program,
                version_args.join(" ")
            ))),
        }
    }

    fn command(&self, suite: &TestSuiteInfo, config: &RunnerConfig) -> E2eResult<Command> {
        let args = self.args(suite, config.headless);
        debug!("Launching {}: {} {}", suite.name, self.config.program, args.join(" "));

        let mut cmd = Command::new(&self.config.program);
        cmd.args(&args)
            .env("BASE_URL", &config.base_url)
            .env("TEST_ROLE", &suite.role)
            .env("SUITEWATCH_SUITE", &suite.name)
            .env("SUITEWATCH_SIGNAL_PREFIX", &config.observer.signal_prefix)
            .env("SUITEWATCH_MONITOR_SCRIPT", config.monitor_script_path())
            .env("SUITEWATCH_RENDER_PROBE_SCRIPT", config.render_probe_script_path())
            .env("SUITEWATCH_FIXTURE", config.page_fixture_path())
            .env("ERROR_REPORT_DIR", config.error_reports_dir())
            .env("ARTIFACTS_DIR", config.artifacts_dir())
            .env("HEADLESS", if config.headless { "1" } else { "0" });

        for (key, value) in &self.config.extra_env {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        Ok(cmd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite() -> TestSuiteInfo {
        TestSuiteInfo {
            name: "viewer-workflows".to_string(),
            role: "viewer".to_string(),
            file: "tests/e2e/viewer-workflows.spec.ts".to_string(),
            description: String::new(),
            estimated_duration_ms: 1_000,
        }
    }

    #[test]
    fn test_headless_args() {
        let launcher = PlaywrightLauncher::new(LauncherConfig::default());
        assert_eq!(
            launcher.args(&suite(), true),
            vec![
                "playwright",
                "test",
                "tests/e2e/viewer-workflows.spec.ts",
                "--reporter=list",
            ]
        );
    }

    #[test]
    fn test_headed_adds_flag() {
        let launcher = PlaywrightLauncher::new(LauncherConfig::default());
        let args = launcher.args(&suite(), false);
        assert_eq!(args.last().map(String::as_str), Some("--headed"));
    }

    #[test]
    fn test_command_exports_page_scripts() {
        let config = RunnerConfig::default();
        let launcher = PlaywrightLauncher::new(config.launcher.clone());
        let cmd = launcher.command(&suite(), &config).unwrap();

        let env: std::collections::HashMap<_, _> = cmd
            .as_std()
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_str()?.to_string(), v?.to_str()?.to_string())))
            .collect();
        assert_eq!(
            env["SUITEWATCH_MONITOR_SCRIPT"],
            config.monitor_script_path().to_string_lossy()
        );
        assert_eq!(
            env["SUITEWATCH_FIXTURE"],
            config.page_fixture_path().to_string_lossy()
        );
        assert_eq!(env["SUITEWATCH_SIGNAL_PREFIX"], "[suitewatch:signal]");
        assert_eq!(env["TEST_ROLE"], "viewer");
    }

    #[tokio::test]
    async fn test_missing_runner_fails_preflight() {
        let launcher = PlaywrightLauncher::new(LauncherConfig {
            program: "definitely-not-a-real-binary-suitewatch".to_string(),
            ..Default::default()
        });
        assert!(matches!(
            launcher.preflight().await,
            Err(E2eError::RunnerNotFound(_))
        ));
    }
}
