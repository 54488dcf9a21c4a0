//! Error types for suite orchestration

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Application at {url} unreachable after {attempts} attempts")]
    Unreachable { url: String, attempts: usize },

    #[error("Required path missing: {0}")]
    MissingPath(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Suite catalog error: {0}")]
    Catalog(String),

    #[error("Test runner not found: {0}")]
    RunnerNotFound(String),

    #[error("Failed to launch suite {suite}: {reason}")]
    Launch { suite: String, reason: String },

    #[error("Supervision failed: {0}")]
    Supervision(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Report rendering failed in {renderer}: {reason}")]
    Render { renderer: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
