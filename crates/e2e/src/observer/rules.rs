//! Severity rule table
//!
//! Messages are matched against an ordered list of rules and the first
//! match wins. Network responses are ranked by status code first.

use once_cell::sync::Lazy;
use regex::Regex;

use suitewatch_common::{ErrorType, Severity};

/// One row of the table
pub struct Rule {
    pub name: &'static str,
    pattern: Regex,
    pub severity: Severity,
    /// Type assigned when the signal's own type is the generic `runtime`
    pub refines_runtime_to: Option<ErrorType>,
    /// Severity used instead of `severity` when the resulting type is `component`
    pub component_severity: Option<Severity>,
}

impl Rule {
    fn new(
        name: &'static str,
        pattern: &str,
        severity: Severity,
        refines_runtime_to: Option<ErrorType>,
    ) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("valid rule pattern"),
            severity,
            refines_runtime_to,
            component_severity: None,
        }
    }

    fn for_component(mut self, severity: Severity) -> Self {
        self.component_severity = Some(severity);
        self
    }

    /// Severity for a match whose resulting type is `error_type`
    pub fn severity_for(&self, error_type: ErrorType) -> Severity {
        match (error_type, self.component_severity) {
            (ErrorType::Component, Some(severity)) => severity,
            _ => self.severity,
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Result of running a message through the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub error_type: ErrorType,
    pub severity: Severity,
    /// Name of the matching rule, `None` when the default applied
    pub rule: Option<&'static str>,
}

static AUTH_MARKERS: &str = r"(?i)(/api/auth\b|/auth/session|/session\b|next-?auth|getsession|session (expired|invalid|missing)|auth(entication)? (failed|error))";

static DEFAULT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new("auth-session", AUTH_MARKERS, Severity::Critical, None),
        Rule::new(
            "null-access",
            r"(?i)(cannot read propert|of undefined|of null|undefined is not|null is not|is not a function|is not defined)",
            Severity::Critical,
            None,
        )
        .for_component(Severity::High),
        Rule::new(
            "component-lifecycle",
            r"(?i)(error ?boundary|componentdidcatch|the above error occurred|maximum update depth|rendered (more|fewer) hooks|invalid hook call|hydration|unmounted component|while rendering|render(ing)? error)",
            Severity::High,
            Some(ErrorType::Component),
        ),
        Rule::new(
            "network-api",
            r"(?i)(network|fetch|xmlhttprequest|\bxhr\b|/api/|\bapi\b|cors|econnrefused|net::err|websocket|timed? ?out)",
            Severity::High,
            None,
        ),
        Rule::new(
            "chart-data",
            r"(?i)(chart|canvas|dataset|\bdata\b|recharts|\bd3\b)",
            Severity::High,
            None,
        ),
        Rule::new(
            "warning-style",
            r"(?i)(warning|deprecat|stylesheet|\bstyle\b|\bcss\b|font)",
            Severity::Medium,
            None,
        ),
    ]
});

static AUTH_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(AUTH_MARKERS).expect("valid regex"));
static API_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(/api/|/graphql|/rest/|/v\d+/)").expect("valid regex"));

/// Ordered first-match-wins rule table
pub struct RuleTable {
    rules: &'static [Rule],
}

impl Default for RuleTable {
    fn default() -> Self {
        Self {
            rules: DEFAULT_RULES.as_slice(),
        }
    }
}

impl RuleTable {
    pub fn rules(&self) -> &[Rule] {
        self.rules
    }

    /// Classify free text. `base` is the type implied by the signal source and
    /// `fallback` the severity used when no rule matches.
    pub fn classify(&self, text: &str, base: ErrorType, fallback: Severity) -> Verdict {
        for rule in self.rules {
            if rule.matches(text) {
                let error_type = match (base, rule.refines_runtime_to) {
                    (ErrorType::Runtime, Some(refined)) => refined,
                    _ => base,
                };
                return Verdict {
                    error_type,
                    severity: rule.severity_for(error_type),
                    rule: Some(rule.name),
                };
            }
        }
        Verdict {
            error_type: base,
            severity: fallback,
            rule: None,
        }
    }

    /// Rank an HTTP error response. Statuses below 400 are not anomalies.
    pub fn classify_response(&self, url: &str, status: u16) -> Option<Verdict> {
        if status < 400 {
            return None;
        }
        let (severity, rule) = if is_auth_endpoint(url) {
            (Severity::Critical, "auth-endpoint")
        } else if status == 404 || status >= 500 {
            (Severity::High, "not-found-or-server")
        } else if is_api_path(url) {
            (Severity::High, "api-client-error")
        } else {
            (Severity::Medium, "client-error")
        };
        Some(Verdict {
            error_type: ErrorType::Network,
            severity,
            rule: Some(rule),
        })
    }
}

pub fn is_auth_endpoint(url: &str) -> bool {
    AUTH_PATH.is_match(url)
}

pub fn is_api_path(url: &str) -> bool {
    API_PATH.is_match(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Session expired, please sign in", Severity::Critical, ErrorType::Runtime ; "auth marker")]
    #[test_case("TypeError: Cannot read properties of undefined (reading 'map')", Severity::Critical, ErrorType::Runtime ; "undefined access")]
    #[test_case("TypeError: user.getName is not a function", Severity::Critical, ErrorType::Runtime ; "not a function")]
    #[test_case("The above error occurred in the <Sidebar> component", Severity::High, ErrorType::Component ; "lifecycle")]
    #[test_case("Failed to fetch", Severity::High, ErrorType::Runtime ; "fetch")]
    #[test_case("Chart render skipped: empty dataset", Severity::High, ErrorType::Runtime ; "chart")]
    #[test_case("Warning: componentWillMount has been renamed", Severity::Medium, ErrorType::Runtime ; "warning")]
    #[test_case("Something odd happened", Severity::Medium, ErrorType::Runtime ; "fallback")]
    fn test_runtime_classification(text: &str, severity: Severity, error_type: ErrorType) {
        let verdict = RuleTable::default().classify(text, ErrorType::Runtime, Severity::Medium);
        assert_eq!(verdict.severity, severity);
        assert_eq!(verdict.error_type, error_type);
    }

    #[test_case("Cannot read properties of undefined (reading 'rows') in <RevenueChart>", ErrorType::Component, Severity::High ; "component null access")]
    #[test_case("chart.update is not a function", ErrorType::Component, Severity::High ; "component not a function")]
    #[test_case("Cannot read properties of null (reading 'id')", ErrorType::Runtime, Severity::Critical ; "runtime null access")]
    fn test_null_access_severity_follows_type(text: &str, base: ErrorType, severity: Severity) {
        let verdict = RuleTable::default().classify(text, base, Severity::Medium);
        assert_eq!(verdict.rule, Some("null-access"));
        assert_eq!(verdict.error_type, base);
        assert_eq!(verdict.severity, severity);
    }

    #[test]
    fn test_first_match_wins() {
        // Matches both the auth and the network rule; auth is earlier.
        let verdict = RuleTable::default().classify(
            "fetch /api/auth/session failed",
            ErrorType::Api,
            Severity::Medium,
        );
        assert_eq!(verdict.severity, Severity::Critical);
        assert_eq!(verdict.rule, Some("auth-session"));
        assert_eq!(verdict.error_type, ErrorType::Api);
    }

    #[test]
    fn test_generic_console_defaults_low() {
        let verdict = RuleTable::default().classify("hello", ErrorType::Runtime, Severity::Low);
        assert_eq!(verdict.severity, Severity::Low);
        assert_eq!(verdict.rule, None);
    }

    #[test_case("http://app/api/auth/session", 500, Severity::Critical ; "auth 500")]
    #[test_case("http://app/api/auth/session", 401, Severity::Critical ; "auth 401")]
    #[test_case("http://app/static/logo.png", 404, Severity::High ; "not found")]
    #[test_case("http://app/dashboard", 503, Severity::High ; "server error")]
    #[test_case("http://app/api/reports?id=3", 422, Severity::High ; "api client error")]
    #[test_case("http://app/settings", 403, Severity::Medium ; "plain client error")]
    fn test_response_classification(url: &str, status: u16, severity: Severity) {
        let verdict = RuleTable::default().classify_response(url, status).unwrap();
        assert_eq!(verdict.severity, severity);
        assert_eq!(verdict.error_type, ErrorType::Network);
    }

    #[test]
    fn test_success_response_is_not_an_anomaly() {
        let table = RuleTable::default();
        assert!(table.classify_response("http://app/api/auth/session", 200).is_none());
        assert!(table.classify_response("http://app/", 304).is_none());
    }
}
