//! Suitewatch CLI
//!
//! Runs the role-scoped suite catalog, streams progress while suites execute,
//! then aggregates the run into an executive summary and developer tasks.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use suitewatch_common::{ComprehensiveTestResults, OrchestrationStatus};
use suitewatch_e2e::report::render_all;
use suitewatch_e2e::{
    Aggregator, EventKind, JsonSnapshotRenderer, Orchestrator, PlaywrightLauncher,
    ReportRenderer, RunEvent, RunnerConfig, SuiteCatalog,
};

mod output;

const EXIT_FAILED: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "suitewatch")]
#[command(author, version, about = "Role-scoped E2E suite runner with error detection")]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "suitewatch.toml")]
    config: PathBuf,

    /// Suite catalog (YAML); the built-in role catalog is used when omitted
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Only run these suites (repeatable)
    #[arg(long = "suite")]
    suites: Vec<String>,

    /// Only run suites for these roles (repeatable)
    #[arg(long = "role")]
    roles: Vec<String>,

    /// Application base URL
    #[arg(long, env = "SUITEWATCH_BASE_URL")]
    base_url: Option<String>,

    /// Output directory for summaries and reports
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Run suites in parallel batches
    #[arg(long)]
    parallel: bool,

    /// Batch size when running in parallel
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-suite timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Do not probe the application before running
    #[arg(long)]
    skip_reachability: bool,

    /// List the selected suites and exit
    #[arg(long)]
    list: bool,

    /// Write the effective configuration to --config and exit
    #[arg(long)]
    write_config: bool,

    /// Print the aggregate as JSON instead of tables
    #[arg(long)]
    json: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut RunnerConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if self.parallel {
            config.parallel = true;
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.suite_timeout_ms = timeout * 1000;
        }
        if self.headed {
            config.headless = false;
        }
        if self.skip_reachability {
            config.skip_reachability = true;
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match cli.log_format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer().with_target(false))
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}

fn exit_code(results: &ComprehensiveTestResults) -> i32 {
    match results.status {
        OrchestrationStatus::Cancelled => EXIT_INTERRUPTED,
        OrchestrationStatus::Completed if results.summary.unsuccessful_suites() == 0 => 0,
        _ => EXIT_FAILED,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let code = run(cli).await?;
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = RunnerConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);
    config.validate()?;

    if cli.write_config {
        config.save(&cli.config)?;
        output::print_success(&format!("Configuration written to {}", cli.config.display()));
        return Ok(0);
    }

    let catalog = match &cli.catalog {
        Some(path) => SuiteCatalog::from_file(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?,
        None => SuiteCatalog::builtin(),
    };
    let catalog = catalog.filter(&cli.suites, &cli.roles)?;

    if cli.list {
        output::print_suites(&catalog.suites);
        return Ok(0);
    }

    info!(
        "Running {} suites against {} ({})",
        catalog.len(),
        config.base_url,
        if config.parallel { "parallel" } else { "sequential" }
    );

    let launcher = Arc::new(PlaywrightLauncher::new(config.launcher.clone()));
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), catalog, launcher));

    {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping the run");
                orchestrator.cancel();
            }
        });
    }

    let progress = output::progress_bar(orchestrator.get_test_suites().len() as u64);
    let mut events = orchestrator.subscribe(&[
        EventKind::SuiteStarted,
        EventKind::SuiteCompleted,
        EventKind::RealTimeError,
    ]);
    let progress_task = {
        let progress = progress.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    RunEvent::SuiteStarted { suite, role } => {
                        progress.set_message(format!("{} ({})", suite, role));
                    }
                    RunEvent::SuiteCompleted(result) => {
                        progress.println(format!("{} {}", result.status, result.suite));
                        progress.inc(1);
                    }
                    RunEvent::RealTimeError(error) => {
                        progress.println(format!(
                            "  [{}] {}: {}",
                            error.severity, error.error_type, error.message
                        ));
                    }
                    _ => {}
                }
            }
        })
    };

    let outcome = orchestrator.execute_all_tests().await;
    progress_task.abort();

    let results = match outcome {
        Ok(results) => {
            progress.finish_and_clear();
            results
        }
        Err(e) => {
            progress.abandon();
            output::print_error(&format!("Run failed: {}", e));
            return Ok(EXIT_FAILED);
        }
    };

    let aggregated = Aggregator::new(config.thresholds.clone()).aggregate(&results, &[]);
    let renderers: Vec<Box<dyn ReportRenderer>> = vec![Box::new(JsonSnapshotRenderer)];
    for path in render_all(&renderers, &aggregated, &config.output_dir)? {
        info!("Report written: {}", path.display());
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&aggregated)?);
    } else {
        output::print_suite_results(&aggregated.suite_results);
        output::print_executive_summary(&aggregated);
    }

    match results.status {
        OrchestrationStatus::Cancelled => output::print_warning("Run cancelled"),
        _ if results.summary.unsuccessful_suites() > 0 => output::print_error(&format!(
            "{} of {} suites did not pass",
            results.summary.unsuccessful_suites(),
            results.summary.total_suites
        )),
        _ => output::print_success("All suites passed"),
    }

    Ok(exit_code(&results))
}
