//! Suitewatch Common Library
//!
//! The data model shared by the orchestrator, the error detector and the
//! aggregator. `AggregatedTestResults` is also the only contract an external
//! report renderer needs to depend on.

pub mod aggregate;
pub mod types;

pub use aggregate::*;
pub use types::*;

/// Suitewatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
