//! Report rendering seam
//!
//! Renderers only see [`AggregatedTestResults`]. The JSON snapshot renderer
//! ships with the crate; document renderers live elsewhere.

use std::path::{Path, PathBuf};
use tracing::info;

use suitewatch_common::AggregatedTestResults;

use crate::error::{E2eError, E2eResult};

pub trait ReportRenderer: Send + Sync {
    fn name(&self) -> &str;

    /// Write the report files under `output_dir` and return their paths
    fn render(&self, results: &AggregatedTestResults, output_dir: &Path)
        -> E2eResult<Vec<PathBuf>>;
}

/// Raw aggregate kept for audit as `aggregated-results-<timestamp>.json`
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSnapshotRenderer;

impl JsonSnapshotRenderer {
    pub fn file_name(results: &AggregatedTestResults) -> String {
        format!(
            "aggregated-results-{}.json",
            results.generated_at.format("%Y%m%dT%H%M%S")
        )
    }
}

impl ReportRenderer for JsonSnapshotRenderer {
    fn name(&self) -> &str {
        "json-snapshot"
    }

    fn render(
        &self,
        results: &AggregatedTestResults,
        output_dir: &Path,
    ) -> E2eResult<Vec<PathBuf>> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(Self::file_name(results));
        let json = serde_json::to_string_pretty(results).map_err(|e| E2eError::Render {
            renderer: self.name().to_string(),
            reason: e.to_string(),
        })?;
        std::fs::write(&path, json)?;

        info!("Aggregate snapshot written to: {}", path.display());
        Ok(vec![path])
    }
}

/// Run every renderer, stopping at the first failure
pub fn render_all(
    renderers: &[Box<dyn ReportRenderer>],
    results: &AggregatedTestResults,
    output_dir: &Path,
) -> E2eResult<Vec<PathBuf>> {
    let mut written = Vec::new();
    for renderer in renderers {
        written.extend(renderer.render(results, output_dir)?);
    }
    Ok(written)
}
