//! Incremental parsing of test runner output
//!
//! Understands the Playwright `list` and `line` reporters well enough to
//! follow test progress, and counts error and warning lines.

use once_cell::sync::Lazy;
use regex::Regex;

static STARTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[(\d+)/(\d+)\]\s+(.*)$").expect("valid regex"));
static PASSED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:✓|✔|ok)\s+\d+\s+(.*)$").expect("valid regex"));
static FAILED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:✘|✗|x)\s+\d+\s+(.*)$").expect("valid regex"));
static SKIPPED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*-\s+\d+\s+(.*)$").expect("valid regex"));
static SUMMARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(\d+)\s+(passed|failed|skipped|flaky|interrupted|did not run)\b")
        .expect("valid regex")
});
static DURATION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\(\d+(?:\.\d+)?m?s\)\s*$").expect("valid regex"));
static ERROR_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(error\b|uncaught|unhandled|exception\b)").expect("valid regex")
});
static WARNING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(warn|warning|deprecated)\b").expect("valid regex"));

/// What a single output line meant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    TestStarted { title: String },
    TestPassed { title: String },
    TestFailed { title: String },
    TestSkipped { title: String },
    Summary,
    Other,
}

/// Running counters for one suite's output
#[derive(Debug, Clone, Default)]
pub struct OutputParser {
    passed: u32,
    failed: u32,
    skipped: u32,
    running: u32,
    summary_passed: Option<u32>,
    summary_failed: Option<u32>,
    summary_skipped: Option<u32>,
    errors: u32,
    warnings: u32,
}

/// Final counts for a suite
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputCounts {
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub errors: u32,
    pub warnings: u32,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line of output
    pub fn parse_line(&mut self, line: &str) -> ParsedLine {
        let parsed = self.classify(line);

        if !matches!(parsed, ParsedLine::TestPassed { .. }) {
            if ERROR_LINE.is_match(line) {
                self.errors += 1;
            } else if WARNING_LINE.is_match(line) {
                self.warnings += 1;
            }
        }

        parsed
    }

    fn classify(&mut self, line: &str) -> ParsedLine {
        if let Some(caps) = SUMMARY.captures(line) {
            let count: u32 = caps[1].parse().unwrap_or(0);
            match &caps[2] {
                "passed" | "flaky" => {
                    *self.summary_passed.get_or_insert(0) += count;
                }
                "failed" | "interrupted" => {
                    *self.summary_failed.get_or_insert(0) += count;
                }
                _ => {
                    *self.summary_skipped.get_or_insert(0) += count;
                }
            }
            return ParsedLine::Summary;
        }
        if let Some(caps) = PASSED.captures(line) {
            self.passed += 1;
            self.running = self.running.saturating_sub(1);
            return ParsedLine::TestPassed {
                title: test_title(&caps[1]),
            };
        }
        if let Some(caps) = FAILED.captures(line) {
            self.failed += 1;
            self.running = self.running.saturating_sub(1);
            return ParsedLine::TestFailed {
                title: test_title(&caps[1]),
            };
        }
        if let Some(caps) = SKIPPED.captures(line) {
            self.skipped += 1;
            return ParsedLine::TestSkipped {
                title: test_title(&caps[1]),
            };
        }
        if let Some(caps) = STARTED.captures(line) {
            self.running += 1;
            return ParsedLine::TestStarted {
                title: test_title(&caps[3]),
            };
        }
        ParsedLine::Other
    }

    /// Tests started but not yet reported as finished
    pub fn running(&self) -> u32 {
        self.running
    }

    /// Counts so far; reporter summary lines win over per-test marks
    pub fn counts(&self) -> OutputCounts {
        OutputCounts {
            passed: self.summary_passed.unwrap_or(self.passed),
            failed: self.summary_failed.unwrap_or(self.failed),
            skipped: self.summary_skipped.unwrap_or(self.skipped),
            errors: self.errors,
            warnings: self.warnings,
        }
    }
}

/// Last `›` segment of a reporter line without its duration suffix
fn test_title(rest: &str) -> String {
    let last = rest.rsplit('›').next().unwrap_or(rest).trim();
    DURATION_SUFFIX.replace(last, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_reporter_lines() {
        let mut parser = OutputParser::new();
        let lines = [
            "Running 3 tests using 1 worker",
            "  ✓  1 [chromium] › admin.spec.ts:12:5 › Admin › can log in (1.2s)",
            "  ✘  2 [chromium] › admin.spec.ts:30:5 › Admin › can edit user (3.4s)",
            "  -  3 [chromium] › admin.spec.ts:44:5 › Admin › exports audit log",
            "    Error: expect(received).toBe(expected)",
            "  1 failed",
            "  1 skipped",
            "  1 passed (5.0s)",
        ];
        let parsed: Vec<ParsedLine> = lines.iter().map(|l| parser.parse_line(l)).collect();

        assert_eq!(
            parsed[1],
            ParsedLine::TestPassed {
                title: "can log in".to_string()
            }
        );
        assert_eq!(
            parsed[2],
            ParsedLine::TestFailed {
                title: "can edit user".to_string()
            }
        );
        assert!(matches!(parsed[3], ParsedLine::TestSkipped { .. }));
        assert_eq!(parsed[5], ParsedLine::Summary);

        let counts = parser.counts();
        assert_eq!(counts.passed, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.skipped, 1);
        assert_eq!(counts.errors, 1);
    }

    #[test]
    fn test_line_reporter_progress() {
        let mut parser = OutputParser::new();
        let parsed =
            parser.parse_line("[2/12] [chromium] › viewer.spec.ts:8:3 › Viewer › sees dashboard");
        assert_eq!(
            parsed,
            ParsedLine::TestStarted {
                title: "sees dashboard".to_string()
            }
        );
        assert_eq!(parser.running(), 1);
    }

    #[test]
    fn test_summary_overrides_marks() {
        let mut parser = OutputParser::new();
        parser.parse_line("  ✓  1 [chromium] › a.spec.ts:1:1 › one (1s)");
        assert_eq!(parser.counts().passed, 1);
        parser.parse_line("  4 passed (9.1s)");
        parser.parse_line("  1 flaky");
        assert_eq!(parser.counts().passed, 5);
    }

    #[test]
    fn test_warning_lines_counted() {
        let mut parser = OutputParser::new();
        parser.parse_line("Warning: React does not recognize the prop");
        parser.parse_line("DeprecationWarning: Buffer() is deprecated");
        parser.parse_line("TypeError: Cannot read properties of undefined");
        let counts = parser.counts();
        assert_eq!(counts.warnings, 2);
        assert_eq!(counts.errors, 1);
    }
}
