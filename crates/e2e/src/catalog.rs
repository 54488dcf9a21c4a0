//! Suite catalog
//!
//! The list of role-scoped suites a run executes. A built-in catalog covers
//! the standard roles; a YAML file can replace it.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use suitewatch_common::TestSuiteInfo;

use crate::error::{E2eError, E2eResult};

/// Ordered, validated list of suites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteCatalog {
    pub suites: Vec<TestSuiteInfo>,
}

impl SuiteCatalog {
    /// Built-in catalog, one suite per role plus a cross-role pass
    pub fn builtin() -> Self {
        let suite = |name: &str, role: &str, description: &str, minutes: u64| TestSuiteInfo {
            name: name.to_string(),
            role: role.to_string(),
            file: format!("tests/e2e/{}.spec.ts", name),
            description: description.to_string(),
            estimated_duration_ms: minutes * 60_000,
        };

        Self {
            suites: vec![
                suite(
                    "admin-workflows",
                    "admin",
                    "User management, settings and audit views",
                    4,
                ),
                suite(
                    "manager-workflows",
                    "manager",
                    "Team dashboards, approvals and reporting",
                    3,
                ),
                suite(
                    "analyst-workflows",
                    "analyst",
                    "Charts, filters, exports and saved queries",
                    3,
                ),
                suite(
                    "viewer-workflows",
                    "viewer",
                    "Read-only navigation and permission boundaries",
                    2,
                ),
                suite(
                    "cross-role-navigation",
                    "mixed",
                    "Session switching and deep links across roles",
                    3,
                ),
            ],
        }
    }

    /// Parse a catalog from YAML
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let catalog: Self = serde_yaml::from_str(yaml)?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a catalog from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.suites.is_empty() {
            return Err(E2eError::Catalog("catalog contains no suites".to_string()));
        }

        let mut seen = HashSet::new();
        for suite in &self.suites {
            if suite.name.trim().is_empty() {
                return Err(E2eError::Catalog("suite with empty name".to_string()));
            }
            if suite.file.trim().is_empty() {
                return Err(E2eError::Catalog(format!("suite {} has no file", suite.name)));
            }
            if !seen.insert(suite.name.as_str()) {
                return Err(E2eError::Catalog(format!("duplicate suite name: {}", suite.name)));
            }
        }
        Ok(())
    }

    /// Keep only suites matching the given names and roles. Empty filters match all.
    pub fn filter(self, names: &[String], roles: &[String]) -> E2eResult<Self> {
        let suites: Vec<TestSuiteInfo> = self
            .suites
            .into_iter()
            .filter(|s| names.is_empty() || names.contains(&s.name))
            .filter(|s| roles.is_empty() || roles.contains(&s.role))
            .collect();

        let filtered = Self { suites };
        filtered.validate()?;
        Ok(filtered)
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }
}
