//! Browser session observer
//!
//! Turns page-level signals into typed, severity-ranked [`DetectedError`]s.
//! Classification is synchronous per signal; only the best-effort artifact
//! capture (screenshot, DOM snapshot) awaits the browser. A failing capture
//! never fails the detection.

pub mod buffer;
pub mod rendering;
pub mod rules;
pub mod session;

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

use suitewatch_common::{
    CategorizedErrors, ConsoleEntry, DetectedError, ErrorDetails, ErrorSummary, ErrorType,
    NetworkEntry, Severity,
};

use crate::config::ObserverConfig;
use buffer::BoundedQueue;
use rules::{is_api_path, is_auth_endpoint, RuleTable};
use session::{BrowserSession, ConsoleLevel, PageSignal, SignalEnvelope};

pub use session::SIGNAL_PREFIX;

/// Ambient state attached to every capture
#[derive(Debug, Clone)]
pub struct ObservationContext {
    pub url: String,
    pub role: Option<String>,
    pub user_id: Option<String>,
    pub suite: Option<String>,
    pub reproduction_steps: Vec<String>,
    pub console: BoundedQueue<ConsoleEntry>,
    pub network: BoundedQueue<NetworkEntry>,
}

impl ObservationContext {
    pub fn new(console_history: usize, network_history: usize) -> Self {
        Self {
            url: String::new(),
            role: None,
            user_id: None,
            suite: None,
            reproduction_steps: Vec::new(),
            console: BoundedQueue::new(console_history),
            network: BoundedQueue::new(network_history),
        }
    }

    /// Append the signal to the rolling histories
    pub fn record(&mut self, signal: &PageSignal) {
        let now = Utc::now();
        match signal {
            PageSignal::Console { level, text } => {
                self.console.push(ConsoleEntry {
                    level: level.as_str().to_string(),
                    text: text.clone(),
                    timestamp: now,
                });
            }
            PageSignal::PageError { message, .. } => {
                self.console.push(ConsoleEntry {
                    level: "pageerror".to_string(),
                    text: message.clone(),
                    timestamp: now,
                });
            }
            PageSignal::Response {
                url, method, status, ..
            } => {
                self.network.push(NetworkEntry {
                    method: method.clone(),
                    url: url.clone(),
                    status: Some(*status),
                    failure: None,
                    timestamp: now,
                });
            }
            PageSignal::RequestFailed {
                url,
                method,
                failure,
            } => {
                self.network.push(NetworkEntry {
                    method: method.clone(),
                    url: url.clone(),
                    status: None,
                    failure: Some(failure.clone()),
                    timestamp: now,
                });
            }
            _ => {}
        }
    }

    /// Copy with the page context carried by a monitor line applied
    fn with_envelope(&self, envelope: &SignalEnvelope) -> Self {
        let mut ctx = self.clone();
        if let Some(url) = &envelope.url {
            ctx.url = url.clone();
        }
        if envelope.role.is_some() {
            ctx.role = envelope.role.clone();
        }
        if envelope.user_id.is_some() {
            ctx.user_id = envelope.user_id.clone();
        }
        ctx
    }
}

/// A signal judged to be an anomaly, before context and artifacts are added
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub error_type: ErrorType,
    pub severity: Severity,
    pub message: String,
    pub stack: Option<String>,
    pub details: Option<ErrorDetails>,
}

#[derive(Debug, Clone, Default)]
struct Artifacts {
    screenshot: Option<String>,
    dom_snapshot: Option<String>,
}

/// Classify one signal. `None` means the signal is not an anomaly.
pub fn classify(rules: &RuleTable, signal: &PageSignal) -> Option<Classification> {
    match signal {
        PageSignal::PageError { message, stack } => {
            let text = format!("{} {}", message, stack.as_deref().unwrap_or(""));
            let verdict = rules.classify(&text, ErrorType::Runtime, Severity::Medium);
            let details = (verdict.error_type == ErrorType::Component).then(|| {
                ErrorDetails::Component {
                    component: None,
                    lifecycle: verdict.rule.map(str::to_string),
                }
            });
            Some(Classification {
                error_type: verdict.error_type,
                severity: verdict.severity,
                message: message.clone(),
                stack: stack.clone(),
                details,
            })
        }
        PageSignal::Console { level, text } => {
            if !matches!(level, ConsoleLevel::Error | ConsoleLevel::Warning) {
                return None;
            }
            let verdict = rules.classify(text, ErrorType::Runtime, Severity::Low);
            Some(Classification {
                error_type: verdict.error_type,
                severity: verdict.severity,
                message: text.clone(),
                stack: None,
                details: None,
            })
        }
        PageSignal::Response {
            url,
            method,
            status,
            duration_ms,
        } => {
            let verdict = rules.classify_response(url, *status)?;
            Some(Classification {
                error_type: verdict.error_type,
                severity: verdict.severity,
                message: format!("HTTP {} {} {}", status, method, url),
                stack: None,
                details: is_api_path(url).then(|| ErrorDetails::Api {
                    endpoint: url.clone(),
                    method: method.clone(),
                    status: Some(*status),
                    duration_ms: *duration_ms,
                }),
            })
        }
        PageSignal::RequestFailed {
            url,
            method,
            failure,
        } => {
            // Aborted requests are navigation noise.
            if failure.contains("ERR_ABORTED") || failure.contains("NS_BINDING_ABORTED") {
                return None;
            }
            let severity = if is_auth_endpoint(url) {
                Severity::Critical
            } else {
                let text = format!("{} {}", failure, url);
                rules
                    .classify(&text, ErrorType::Network, Severity::Medium)
                    .severity
            };
            Some(Classification {
                error_type: ErrorType::Network,
                severity,
                message: format!("{} {} failed: {}", method, url, failure),
                stack: None,
                details: None,
            })
        }
        PageSignal::NavigationFailed { url, message } => {
            let verdict = rules.classify(
                &format!("{} {}", message, url),
                ErrorType::Navigation,
                Severity::Medium,
            );
            Some(Classification {
                error_type: ErrorType::Navigation,
                severity: verdict.severity,
                message: format!("Navigation to {} failed: {}", url, message),
                stack: None,
                details: None,
            })
        }
        PageSignal::ImportFailure { module, message } => {
            let verdict = rules.classify(message, ErrorType::Import, Severity::Medium);
            Some(Classification {
                error_type: ErrorType::Import,
                severity: verdict.severity,
                message: message.clone(),
                stack: None,
                details: Some(ErrorDetails::Import {
                    module: module.clone(),
                }),
            })
        }
        PageSignal::ComponentError {
            message,
            component,
            stack,
        } => {
            let text = format!("{} {}", message, stack.as_deref().unwrap_or(""));
            let verdict = rules.classify(&text, ErrorType::Component, Severity::Medium);
            Some(Classification {
                error_type: ErrorType::Component,
                severity: verdict.severity,
                message: message.clone(),
                stack: stack.clone(),
                details: Some(ErrorDetails::Component {
                    component: component.clone(),
                    lifecycle: verdict.rule.map(str::to_string),
                }),
            })
        }
        // Expands to several errors; see `ErrorDetector::observe_line`
        PageSignal::RenderingProbe(_) => None,
        PageSignal::ApiFailure {
            url,
            method,
            status,
            message,
            duration_ms,
        } => {
            let severity = match status {
                Some(status) => rules.classify_response(url, *status)?.severity,
                None if is_auth_endpoint(url) => Severity::Critical,
                None => {
                    let text = format!("{} {}", message, url);
                    rules.classify(&text, ErrorType::Api, Severity::Medium).severity
                }
            };
            Some(Classification {
                error_type: ErrorType::Api,
                severity,
                message: format!("{} {}: {}", method, url, message),
                stack: None,
                details: Some(ErrorDetails::Api {
                    endpoint: url.clone(),
                    method: method.clone(),
                    status: *status,
                    duration_ms: *duration_ms,
                }),
            })
        }
    }
}

/// Stable id: same anomaly, same page, same role
pub fn error_id(classification: &Classification, ctx: &ObservationContext) -> String {
    let page = ctx.url.split('?').next().unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(classification.error_type.as_str());
    hasher.update([0]);
    hasher.update(classification.message.as_bytes());
    hasher.update([0]);
    hasher.update(page.as_bytes());
    hasher.update([0]);
    hasher.update(ctx.role.as_deref().unwrap_or_default().as_bytes());
    let digest = hasher.finalize();
    format!("err-{}", &hex::encode(digest)[..16])
}

fn build_error(
    ctx: &ObservationContext,
    classification: Classification,
    artifacts: Artifacts,
) -> DetectedError {
    DetectedError {
        id: error_id(&classification, ctx),
        error_type: classification.error_type,
        severity: classification.severity,
        message: classification.message,
        stack: classification.stack,
        url: ctx.url.clone(),
        role: ctx.role.clone(),
        user_id: ctx.user_id.clone(),
        suite: ctx.suite.clone(),
        timestamp: Utc::now(),
        reproduction_steps: ctx.reproduction_steps.clone(),
        recent_console: ctx.console.snapshot(),
        recent_network: ctx.network.snapshot(),
        screenshot: artifacts.screenshot,
        dom_snapshot: artifacts.dom_snapshot,
        details: classification.details,
        tags: Vec::new(),
    }
}

/// Accumulates classified errors for one session, deduplicated by id
pub struct ErrorDetector {
    context: ObservationContext,
    rules: RuleTable,
    errors: Vec<DetectedError>,
    seen: HashSet<String>,
    artifacts_dir: Option<PathBuf>,
    signal_prefix: String,
}

impl ErrorDetector {
    pub fn new(config: &ObserverConfig) -> Self {
        Self {
            context: ObservationContext::new(config.console_history, config.network_history),
            rules: RuleTable::default(),
            errors: Vec::new(),
            seen: HashSet::new(),
            artifacts_dir: None,
            signal_prefix: config.signal_prefix.clone(),
        }
    }

    /// Directory for screenshots and DOM snapshots
    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = Some(dir.into());
        self
    }

    pub fn context(&self) -> &ObservationContext {
        &self.context
    }

    /// Active role and synthetic user for subsequent captures
    pub fn set_context(&mut self, role: impl Into<String>, user_id: Option<String>) {
        self.context.role = Some(role.into());
        self.context.user_id = user_id;
    }

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.context.url = url.into();
    }

    pub fn set_suite(&mut self, suite: Option<String>) {
        self.context.suite = suite;
    }

    pub fn add_reproduction_step(&mut self, step: impl Into<String>) {
        self.context.reproduction_steps.push(step.into());
    }

    pub fn clear_reproduction_steps(&mut self) {
        self.context.reproduction_steps.clear();
    }

    /// Classify a signal without touching the browser
    pub fn observe(&mut self, signal: &PageSignal) -> Option<DetectedError> {
        if let Some(envelope) = self.decode_monitor_signal(signal) {
            return self.observe_envelope(&envelope);
        }

        self.context.record(signal);
        let classification = classify(&self.rules, signal)?;
        let error = build_error(&self.context, classification, Artifacts::default());
        self.record_error(error)
    }

    /// Handle a structured monitor line and return the new errors it produced.
    /// Lines without the prefix and lines that fail to decode yield nothing.
    pub fn observe_line(&mut self, line: &str) -> Vec<DetectedError> {
        let envelope = match SignalEnvelope::parse_line(line, &self.signal_prefix) {
            Some(Ok(envelope)) => envelope,
            Some(Err(e)) => {
                warn!("Discarding malformed monitor line: {}", e);
                return Vec::new();
            }
            None => return Vec::new(),
        };
        match &envelope.signal {
            PageSignal::RenderingProbe(probe) => {
                let ctx = self.context.with_envelope(&envelope);
                self.record_rendering(&ctx, probe)
            }
            _ => self.observe_envelope(&envelope).into_iter().collect(),
        }
    }

    /// Handle a signal decoded from a monitor line, in the page context it carried
    pub fn observe_envelope(&mut self, envelope: &SignalEnvelope) -> Option<DetectedError> {
        self.context.record(&envelope.signal);
        let classification = classify(&self.rules, &envelope.signal)?;
        let ctx = self.context.with_envelope(envelope);
        let error = build_error(&ctx, classification, Artifacts::default());
        self.record_error(error)
    }

    /// Classify a signal and attach a screenshot and DOM snapshot from the live page
    pub async fn observe_with_session(
        &mut self,
        session: &dyn BrowserSession,
        signal: &PageSignal,
    ) -> Option<DetectedError> {
        if let Some(envelope) = self.decode_monitor_signal(signal) {
            return self.observe_envelope(&envelope);
        }

        self.context.url = session.current_url();
        self.context.record(signal);
        let classification = classify(&self.rules, signal)?;
        let id = error_id(&classification, &self.context);
        if self.seen.contains(&id) {
            return None;
        }

        let artifacts = self.capture_artifacts(session, &id).await;
        let error = build_error(&self.context, classification, artifacts);
        self.record_error(error)
    }

    /// Run the rendering probe and record one error per problem found
    pub async fn check_rendering(&mut self, session: &dyn BrowserSession) -> Vec<DetectedError> {
        let probe = match session.probe_rendering().await {
            Ok(probe) => probe,
            Err(e) => {
                warn!("Rendering probe failed: {}", e);
                return Vec::new();
            }
        };
        self.context.url = session.current_url();
        let ctx = self.context.clone();
        self.record_rendering(&ctx, &probe)
    }

    fn record_rendering(
        &mut self,
        ctx: &ObservationContext,
        probe: &session::RenderingProbe,
    ) -> Vec<DetectedError> {
        let mut found = Vec::new();
        for issue in rendering::find_rendering_issues(probe) {
            let classification = Classification {
                error_type: ErrorType::Rendering,
                severity: issue.severity,
                message: issue.message,
                stack: None,
                details: Some(issue.details),
            };
            let error = build_error(ctx, classification, Artifacts::default());
            if let Some(error) = self.record_error(error) {
                found.push(error);
            }
        }
        found
    }

    pub fn errors(&self) -> &[DetectedError] {
        &self.errors
    }

    pub fn categorized_errors(&self) -> CategorizedErrors {
        CategorizedErrors::from_errors(&self.errors)
    }

    pub fn error_summary(&self) -> ErrorSummary {
        ErrorSummary::from_errors(&self.errors)
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
        self.seen.clear();
    }

    /// Hand over the accumulated errors, leaving the detector empty
    pub fn take_errors(&mut self) -> Vec<DetectedError> {
        self.seen.clear();
        std::mem::take(&mut self.errors)
    }

    fn decode_monitor_signal(&self, signal: &PageSignal) -> Option<SignalEnvelope> {
        let PageSignal::Console { text, .. } = signal else {
            return None;
        };
        match SignalEnvelope::parse_line(text, &self.signal_prefix)? {
            Ok(envelope) => Some(envelope),
            Err(e) => {
                warn!("Discarding malformed monitor console line: {}", e);
                None
            }
        }
    }

    fn record_error(&mut self, error: DetectedError) -> Option<DetectedError> {
        if !self.seen.insert(error.id.clone()) {
            debug!("Duplicate error {} ignored", error.id);
            return None;
        }
        debug!(
            "Detected {} {} error: {}",
            error.severity, error.error_type, error.message
        );
        self.errors.push(error.clone());
        Some(error)
    }

    async fn capture_artifacts(&self, session: &dyn BrowserSession, id: &str) -> Artifacts {
        let Some(dir) = &self.artifacts_dir else {
            return Artifacts::default();
        };
        let mut artifacts = Artifacts::default();

        let screenshot_dir = dir.join("screenshots");
        let screenshot_path = screenshot_dir.join(format!("{}.png", id));
        let screenshot = async {
            tokio::fs::create_dir_all(&screenshot_dir).await?;
            session.screenshot(&screenshot_path).await
        };
        match screenshot.await {
            Ok(()) => artifacts.screenshot = Some(screenshot_path.to_string_lossy().to_string()),
            Err(e) => warn!("Screenshot for {} failed: {}", id, e),
        }

        let dom_dir = dir.join("dom");
        let dom_path = dom_dir.join(format!("{}.html", id));
        let snapshot = async {
            let html = session.dom_snapshot().await?;
            tokio::fs::create_dir_all(&dom_dir).await?;
            tokio::fs::write(&dom_path, html).await?;
            Ok::<(), crate::error::E2eError>(())
        };
        match snapshot.await {
            Ok(()) => artifacts.dom_snapshot = Some(dom_path.to_string_lossy().to_string()),
            Err(e) => warn!("DOM snapshot for {} failed: {}", id, e),
        }

        artifacts
    }
}
