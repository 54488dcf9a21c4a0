//! Suitewatch E2E Orchestration
//!
//! This crate runs role-scoped end-to-end suites and turns what they see into
//! prioritised engineering output:
//! - Supervises one test-runner child process per suite, with timeouts,
//!   kill escalation, cancellation and cleanup between suites
//! - Classifies browser-side anomalies into a severity-ranked taxonomy
//! - Aggregates suite outcomes and detected errors into an executive
//!   summary, a developer task list, trends and a stability score
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Orchestrator                         │
//! │    ├── prepare()          reachability, paths, layout       │
//! │    ├── SuiteLauncher      -> tokio::process::Command        │
//! │    ├── SupervisedProcess  Escalation: term -> kill          │
//! │    ├── OutputParser       test started/passed/failed        │
//! │    ├── ErrorDetector      monitor lines -> DetectedError    │
//! │    └── EventBus           typed RunEvent stream             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ComprehensiveTestResults                                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │                         Aggregator                          │
//! │    ├── patterns           grouping, action items            │
//! │    ├── summary            overall status, risk, impact      │
//! │    ├── tasks              prioritised developer tasks       │
//! │    └── metrics            stability score, trends           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AggregatedTestResults -> ReportRenderer                    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod catalog;
pub mod collect;
pub mod config;
pub mod environment;
pub mod error;
pub mod events;
pub mod launcher;
pub mod observer;
pub mod orchestrator;
pub mod output;
pub mod report;
pub mod supervisor;

pub use aggregator::Aggregator;
pub use catalog::SuiteCatalog;
pub use config::{RunnerConfig, ScoringThresholds};
pub use error::{E2eError, E2eResult};
pub use events::{EventBus, EventKind, RunEvent};
pub use launcher::{PlaywrightLauncher, SuiteLauncher};
pub use observer::ErrorDetector;
pub use orchestrator::Orchestrator;
pub use report::{JsonSnapshotRenderer, ReportRenderer};
