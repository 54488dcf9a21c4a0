//! Browser session seam
//!
//! The detector never drives a browser itself. It receives [`PageSignal`]s
//! from whatever is attached to the page (a Playwright fixture, a CDP client,
//! or the structured lines printed by the in-page monitor) and asks a
//! [`BrowserSession`] for screenshots, DOM snapshots and rendering probes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::E2eResult;

/// Prefix of structured monitor lines on the console and on stdout
pub const SIGNAL_PREFIX: &str = "[suitewatch:signal]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleLevel {
    Debug,
    Log,
    Info,
    Warning,
    Error,
}

impl ConsoleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Debug => "debug",
            ConsoleLevel::Log => "log",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warning => "warning",
            ConsoleLevel::Error => "error",
        }
    }
}

/// One page-level event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageSignal {
    /// Uncaught script exception
    PageError {
        message: String,
        #[serde(default)]
        stack: Option<String>,
    },
    Console {
        level: ConsoleLevel,
        text: String,
    },
    /// Completed network response
    Response {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        status: u16,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    /// Request that never got a response
    RequestFailed {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        failure: String,
    },
    /// Page navigation that did not complete
    NavigationFailed { url: String, message: String },
    /// Dynamic import rejected (reported by the monitor)
    ImportFailure {
        module: String,
        message: String,
    },
    /// Error-boundary style console pattern (reported by the monitor)
    ComponentError {
        message: String,
        #[serde(default)]
        component: Option<String>,
        #[serde(default)]
        stack: Option<String>,
    },
    /// Outbound fetch/XHR failure (reported by the monitor)
    ApiFailure {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        status: Option<u16>,
        message: String,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    /// Result of an on-demand rendering check run in the page
    RenderingProbe(RenderingProbe),
}

fn default_method() -> String {
    "GET".to_string()
}

/// A monitor line: the signal plus the context active in the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalEnvelope {
    pub signal: PageSignal,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl SignalEnvelope {
    /// Decode `line` if it carries `prefix`
    pub fn parse_line(line: &str, prefix: &str) -> Option<serde_json::Result<Self>> {
        let start = line.find(prefix)?;
        let payload = line[start + prefix.len()..].trim();
        Some(serde_json::from_str(payload))
    }

    pub fn to_line(&self, prefix: &str) -> serde_json::Result<String> {
        Ok(format!("{} {}", prefix, serde_json::to_string(self)?))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageProbe {
    pub selector: String,
    pub src: String,
    pub complete: bool,
    pub natural_width: u32,
    pub natural_height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StylesheetProbe {
    pub href: String,
    pub sheet_attached: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementProbe {
    pub selector: String,
    pub width: f64,
    pub height: f64,
    pub child_count: u32,
    pub text_length: u32,
    /// `display: none`, `visibility: hidden`, `hidden` or `aria-hidden`
    pub intentionally_hidden: bool,
}

/// Result of [`RENDER_PROBE_SCRIPT`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderingProbe {
    #[serde(default)]
    pub images: Vec<ImageProbe>,
    #[serde(default)]
    pub stylesheets: Vec<StylesheetProbe>,
    #[serde(default)]
    pub elements: Vec<ElementProbe>,
}

/// The page the detector is attached to
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn current_url(&self) -> String;

    /// Write a PNG screenshot to `path`
    async fn screenshot(&self, path: &Path) -> E2eResult<()>;

    /// Serialized DOM of the current page
    async fn dom_snapshot(&self) -> E2eResult<String>;

    /// Run [`RENDER_PROBE_SCRIPT`] and return its result
    async fn probe_rendering(&self) -> E2eResult<RenderingProbe>;
}

/// Client-side monitor injected before any page script runs. Re-emits
/// dynamic import failures, error-boundary console patterns and failed
/// fetch/XHR calls as prefixed console lines.
pub const MONITOR_SCRIPT: &str = r#"
(() => {
  if (window.__suitewatchMonitor) return;
  window.__suitewatchMonitor = true;
  const PREFIX = '[suitewatch:signal]';
  const emit = (signal) => {
    try {
      console.log(PREFIX + ' ' + JSON.stringify({ signal, url: location.href }));
    } catch (_) {}
  };

  window.addEventListener('unhandledrejection', (event) => {
    const message = String((event.reason && event.reason.message) || event.reason);
    if (/dynamically imported module|ChunkLoadError|Loading chunk/i.test(message)) {
      const match = message.match(/https?:\/\/\S+/);
      emit({ kind: 'import_failure', module: match ? match[0] : 'unknown', message });
    }
  });

  const originalError = console.error.bind(console);
  console.error = (...args) => {
    const text = args.map((a) => (a && a.message) || String(a)).join(' ');
    if (/The above error occurred|error boundary|componentDidCatch/i.test(text)) {
      const match = text.match(/in <?([A-Z][A-Za-z0-9]*)/);
      emit({ kind: 'component_error', message: text.slice(0, 2000), component: match ? match[1] : null });
    }
    originalError(...args);
  };

  const originalFetch = window.fetch;
  window.fetch = async (input, init) => {
    const started = performance.now();
    const url = typeof input === 'string' ? input : input.url;
    const method = (init && init.method) || 'GET';
    try {
      const response = await originalFetch(input, init);
      if (!response.ok) {
        emit({ kind: 'api_failure', url, method, status: response.status,
               message: 'HTTP ' + response.status, duration_ms: Math.round(performance.now() - started) });
      }
      return response;
    } catch (error) {
      emit({ kind: 'api_failure', url, method, status: null,
             message: String(error && error.message || error), duration_ms: Math.round(performance.now() - started) });
      throw error;
    }
  };

  const originalOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function (method, url, ...rest) {
    this.addEventListener('loadend', () => {
      if (this.status === 0 || this.status >= 400) {
        emit({ kind: 'api_failure', url: String(url), method, status: this.status || null,
               message: this.status ? 'HTTP ' + this.status : 'XHR failed' });
      }
    });
    return originalOpen.call(this, method, url, ...rest);
  };
})();
"#;

/// Playwright helper installed next to the page scripts. A suite calls
/// `attachSuitewatch(page)` once per page and `checkRendering(page)` when it
/// wants a rendering pass; both print envelope lines on the worker's stdout.
pub const PAGE_FIXTURE_SCRIPT: &str = r#"
const fs = require('fs');

const PREFIX = process.env.SUITEWATCH_SIGNAL_PREFIX || '[suitewatch:signal]';
const emit = (envelope) => process.stdout.write(PREFIX + ' ' + JSON.stringify(envelope) + '\n');

async function attachSuitewatch(page, context = {}) {
  const role = context.role || process.env.TEST_ROLE || null;
  const userId = context.userId || null;
  const send = (signal) => emit({ signal, url: page.url(), role, userId });

  if (process.env.SUITEWATCH_MONITOR_SCRIPT) {
    await page.addInitScript({ path: process.env.SUITEWATCH_MONITOR_SCRIPT });
  }

  page.on('pageerror', (error) => {
    send({ kind: 'page_error', message: error.message, stack: error.stack || null });
  });
  page.on('console', (message) => {
    const text = message.text();
    const at = text.indexOf(PREFIX);
    if (at >= 0) {
      try {
        emit({ role, userId, ...JSON.parse(text.slice(at + PREFIX.length)) });
      } catch (_) {}
      return;
    }
    const level = message.type();
    if (level === 'error' || level === 'warning') {
      send({ kind: 'console', level, text });
    }
  });
  page.on('response', (response) => {
    if (response.status() >= 400) {
      send({ kind: 'response', url: response.url(), method: response.request().method(),
             status: response.status() });
    }
  });
  page.on('requestfailed', (request) => {
    const failure = request.failure();
    send({ kind: 'request_failed', url: request.url(), method: request.method(),
           failure: (failure && failure.errorText) || 'unknown' });
  });
}

async function checkRendering(page, context = {}) {
  const script = fs.readFileSync(process.env.SUITEWATCH_RENDER_PROBE_SCRIPT, 'utf8');
  const probe = JSON.parse(await page.evaluate(script));
  emit({
    signal: { kind: 'rendering_probe', ...probe },
    url: page.url(),
    role: context.role || process.env.TEST_ROLE || null,
    userId: context.userId || null,
  });
}

module.exports = { attachSuitewatch, checkRendering };
"#;

/// Evaluated in the page; returns a JSON [`RenderingProbe`]
pub const RENDER_PROBE_SCRIPT: &str = r#"
(() => {
  const selectorOf = (el) => {
    if (el.id) return '#' + el.id;
    const testId = el.getAttribute('data-testid');
    if (testId) return '[data-testid="' + testId + '"]';
    const cls = (el.className && typeof el.className === 'string') ? '.' + el.className.trim().split(/\s+/).join('.') : '';
    return el.tagName.toLowerCase() + cls;
  };
  const hidden = (el) => {
    const style = getComputedStyle(el);
    return style.display === 'none' || style.visibility === 'hidden' || el.hidden ||
      el.getAttribute('aria-hidden') === 'true';
  };
  const images = Array.from(document.images).map((img) => ({
    selector: selectorOf(img), src: img.currentSrc || img.src, complete: img.complete,
    naturalWidth: img.naturalWidth, naturalHeight: img.naturalHeight,
  }));
  const stylesheets = Array.from(document.querySelectorAll('link[rel="stylesheet"]')).map((link) => ({
    href: link.href, sheetAttached: !!link.sheet,
  }));
  const elements = Array.from(document.querySelectorAll('main *, [data-testid]')).map((el) => {
    const rect = el.getBoundingClientRect();
    return {
      selector: selectorOf(el), width: rect.width, height: rect.height,
      childCount: el.children.length, textLength: (el.textContent || '').trim().length,
      intentionallyHidden: hidden(el),
    };
  });
  return JSON.stringify({ images, stylesheets, elements });
})()
"#;
