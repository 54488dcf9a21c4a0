//! Error-report batches on disk
//!
//! Suites (and the orchestrator itself) drop JSON batches into
//! `<output>/error-reports/`. After the run they are read back, merged with
//! the errors seen in real time and deduplicated by id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use suitewatch_common::DetectedError;

use crate::error::E2eResult;

/// One file in the error-reports directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReportBatch {
    pub suite: Option<String>,
    pub role: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub errors: Vec<DetectedError>,
}

/// Suites may also write a bare array of errors
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Batch(ErrorReportBatch),
    Bare(Vec<DetectedError>),
}

impl ErrorReportBatch {
    pub fn new(suite: Option<String>, role: Option<String>, errors: Vec<DetectedError>) -> Self {
        Self {
            suite,
            role,
            generated_at: Utc::now(),
            errors,
        }
    }

    /// Write the batch as `<dir>/<label>-<timestamp>.json`
    pub fn write(&self, dir: &Path, label: &str) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let file_name = format!(
            "{}-{}.json",
            sanitize(label),
            self.generated_at.format("%Y%m%dT%H%M%S%3f")
        );
        let path = dir.join(file_name);
        std::fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        debug!("Wrote {} error(s) to {}", self.errors.len(), path.display());
        Ok(path)
    }
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Read every `*.json` batch under `dir`. Unreadable or malformed files are
/// logged and skipped; a missing directory yields nothing.
pub fn collect_error_reports(dir: &Path) -> Vec<DetectedError> {
    if !dir.exists() {
        return Vec::new();
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    let mut errors = Vec::new();
    for path in paths {
        let content = match std::fs::read(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Cannot read {}: {}", path.display(), e);
                continue;
            }
        };
        match serde_json::from_slice::<BatchFile>(&content) {
            Ok(BatchFile::Batch(batch)) => errors.extend(batch.errors),
            Ok(BatchFile::Bare(list)) => errors.extend(list),
            Err(e) => warn!("Skipping malformed error report {}: {}", path.display(), e),
        }
    }
    errors
}

/// Keep the first occurrence of every id, preserving order
pub fn dedup_by_id(errors: impl IntoIterator<Item = DetectedError>) -> Vec<DetectedError> {
    let mut seen = HashSet::new();
    errors
        .into_iter()
        .filter(|error| seen.insert(error.id.clone()))
        .collect()
}
