//! Grouping errors into recurring patterns

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

use suitewatch_common::{ActionItem, DetectedError, ErrorPattern, ErrorType};

static QUOTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""[^"]*"|'[^']*'|`[^`]*`"#).expect("valid regex"));
static QUERY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\?[^\s'\x22)]+").expect("valid regex"));
static UUID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("valid regex")
});
static HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(0x[0-9a-f]+|[0-9a-f]{6,})\b").expect("valid regex"));
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(\.\d+)?").expect("valid regex"));
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

const MAX_PATTERN_LEN: usize = 160;

/// Strip the parts of a message that vary between occurrences
pub fn normalize_message(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or_default();
    let s = QUOTED.replace_all(first_line, "<str>");
    let s = QUERY.replace_all(&s, "?<query>");
    let s = UUID.replace_all(&s, "<uuid>");
    let s = HEX.replace_all(&s, |caps: &regex::Captures| {
        let m = &caps[0];
        let mixed = m.chars().any(|c| c.is_ascii_digit())
            && m.chars().any(|c| c.is_ascii_alphabetic());
        if mixed || m.starts_with("0x") || m.starts_with("0X") {
            "<hex>".to_string()
        } else {
            m.to_string()
        }
    });
    let s = NUMBER.replace_all(&s, "<n>");
    let s = SPACES.replace_all(s.trim(), " ");

    let mut normalized = s.into_owned();
    if normalized.len() > MAX_PATTERN_LEN {
        let mut cut = MAX_PATTERN_LEN;
        while !normalized.is_char_boundary(cut) {
            cut -= 1;
        }
        normalized.truncate(cut);
    }
    normalized
}

pub fn suggested_fix(error_type: ErrorType) -> &'static str {
    match error_type {
        ErrorType::Runtime => {
            "Guard against null or undefined values and add error handling around the failing call"
        }
        ErrorType::Network => {
            "Check the endpoint availability, handle failed responses and add retries where safe"
        }
        ErrorType::Api => "Validate request parameters and align the client with the API contract",
        ErrorType::Rendering => "Verify asset paths and layout styles for the affected elements",
        ErrorType::Navigation => "Check route definitions, redirects and access guards",
        ErrorType::Import => "Fix the module path or bundling configuration for the dynamic import",
        ErrorType::Component => {
            "Add an error boundary and validate props and state during component lifecycle"
        }
    }
}

/// Group errors by type and normalised message.
///
/// Patterns come out ordered by highest severity, then occurrence count,
/// then first appearance.
pub fn group_patterns(errors: &[DetectedError]) -> Vec<ErrorPattern> {
    let mut index: HashMap<(ErrorType, String), usize> = HashMap::new();
    let mut groups: Vec<(ErrorPattern, BTreeSet<String>, BTreeSet<String>)> = Vec::new();

    for error in errors {
        let key = (error.error_type, normalize_message(&error.message));
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push((
                ErrorPattern {
                    pattern: key.1.clone(),
                    error_type: error.error_type,
                    severity: error.severity,
                    occurrences: 0,
                    error_ids: Vec::new(),
                    affected_roles: Vec::new(),
                    affected_urls: Vec::new(),
                    suggested_fix: suggested_fix(error.error_type).to_string(),
                },
                BTreeSet::new(),
                BTreeSet::new(),
            ));
            groups.len() - 1
        });

        let (pattern, roles, urls) = &mut groups[slot];
        pattern.occurrences += 1;
        pattern.severity = pattern.severity.max(error.severity);
        pattern.error_ids.push(error.id.clone());
        if let Some(role) = &error.role {
            roles.insert(role.clone());
        }
        if !error.url.is_empty() {
            urls.insert(error.url.clone());
        }
    }

    let mut patterns: Vec<ErrorPattern> = groups
        .into_iter()
        .map(|(mut pattern, roles, urls)| {
            pattern.affected_roles = roles.into_iter().collect();
            pattern.affected_urls = urls.into_iter().collect();
            pattern
        })
        .collect();
    patterns.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.occurrences.cmp(&a.occurrences))
    });
    patterns
}

/// One action item per pattern, in pattern order
pub fn action_items(patterns: &[ErrorPattern], errors: &[DetectedError]) -> Vec<ActionItem> {
    let by_id: HashMap<&str, &DetectedError> =
        errors.iter().map(|e| (e.id.as_str(), e)).collect();

    patterns
        .iter()
        .map(|pattern| {
            let effort = pattern
                .error_ids
                .iter()
                .filter_map(|id| by_id.get(id.as_str()))
                .filter_map(|e| e.effort_override())
                .fold(None, |acc: Option<f64>, hours| {
                    Some(acc.map_or(hours, |a| a.max(hours)))
                });

            let roles = if pattern.affected_roles.is_empty() {
                "no specific role".to_string()
            } else {
                pattern.affected_roles.join(", ")
            };

            ActionItem {
                title: format!("Fix {} error: {}", pattern.error_type, short(&pattern.pattern)),
                description: format!(
                    "{} occurrence(s) affecting {} on {} page(s). {}.",
                    pattern.occurrences,
                    roles,
                    pattern.affected_urls.len(),
                    pattern.suggested_fix
                ),
                severity: pattern.severity,
                error_type: pattern.error_type,
                occurrences: pattern.occurrences,
                related_errors: pattern.error_ids.clone(),
                effort_hours_override: effort,
            }
        })
        .collect()
}

fn short(pattern: &str) -> String {
    const MAX: usize = 60;
    if pattern.chars().count() <= MAX {
        pattern.to_string()
    } else {
        let cut: String = pattern.chars().take(MAX).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::tests::error;
    use suitewatch_common::Severity;
    use test_case::test_case;

    #[test_case("Request failed with status 500", "Request failed with status <n>" ; "numbers")]
    #[test_case("Cannot read properties of undefined (reading 'map')", "Cannot read properties of undefined (reading <str>)" ; "quoted")]
    #[test_case("GET /api/users?page=2&sort=name failed", "GET /api/users?<query> failed" ; "query")]
    #[test_case("order 3f2c1a9e-1b2c-4d5e-8f90-123456789abc missing", "order <uuid> missing" ; "uuid")]
    #[test_case("chunk deadbeef42 failed to load", "chunk <hex> failed to load" ; "hex")]
    fn test_normalize_message(input: &str, expected: &str) {
        assert_eq!(normalize_message(input), expected);
    }

    #[test]
    fn test_normalize_keeps_first_line_only() {
        assert_eq!(
            normalize_message("TypeError: x is not a function\n    at foo (app.js:1:2)"),
            "TypeError: x is not a function"
        );
    }

    #[test]
    fn test_grouping_merges_variants() {
        let mut a =
            error("a", ErrorType::Network, Severity::Medium, "Request to /api/x failed with 502");
        a.role = Some("viewer".into());
        let mut b =
            error("b", ErrorType::Network, Severity::High, "Request to /api/x failed with 503");
        b.role = Some("admin".into());
        let c = error("c", ErrorType::Runtime, Severity::Critical, "x is undefined");

        let patterns = group_patterns(&[a, b, c]);
        assert_eq!(patterns.len(), 2);
        assert_eq!(patterns[0].error_type, ErrorType::Runtime);
        assert_eq!(patterns[1].occurrences, 2);
        assert_eq!(patterns[1].severity, Severity::High);
        assert_eq!(patterns[1].affected_roles, vec!["admin", "viewer"]);
        assert_eq!(patterns[1].error_ids, vec!["a", "b"]);
    }

    #[test]
    fn test_effort_tag_overrides() {
        let mut a = error("a", ErrorType::Api, Severity::High, "bad payload");
        a.tags = vec!["effort:6".into()];
        let errors = vec![a, error("b", ErrorType::Api, Severity::High, "bad payload")];

        let items = action_items(&group_patterns(&errors), &errors);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].effort_hours_override, Some(6.0));
        assert_eq!(items[0].related_errors, vec!["a", "b"]);
    }
}
