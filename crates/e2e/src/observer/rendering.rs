//! On-demand rendering checks

use suitewatch_common::{ErrorDetails, Severity};

use super::session::RenderingProbe;

/// One rendering problem found in a probe
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingIssue {
    pub severity: Severity,
    pub message: String,
    pub details: ErrorDetails,
}

/// Broken images, unattached stylesheets and collapsed elements that still
/// hold content. Elements hidden on purpose are ignored.
pub fn find_rendering_issues(probe: &RenderingProbe) -> Vec<RenderingIssue> {
    let mut issues = Vec::new();

    for image in &probe.images {
        if !image.complete || image.natural_width == 0 || image.natural_height == 0 {
            issues.push(RenderingIssue {
                severity: Severity::Medium,
                message: format!("Broken image: {}", image.src),
                details: ErrorDetails::Rendering {
                    selector: image.selector.clone(),
                    issue: "broken-image".to_string(),
                },
            });
        }
    }

    for sheet in &probe.stylesheets {
        if !sheet.sheet_attached {
            issues.push(RenderingIssue {
                severity: Severity::High,
                message: format!("Stylesheet failed to load: {}", sheet.href),
                details: ErrorDetails::Rendering {
                    selector: format!("link[href=\"{}\"]", sheet.href),
                    issue: "stylesheet-not-attached".to_string(),
                },
            });
        }
    }

    for element in &probe.elements {
        let collapsed = element.width <= 0.0 || element.height <= 0.0;
        let has_content = element.child_count > 0 || element.text_length > 0;
        if collapsed && has_content && !element.intentionally_hidden {
            issues.push(RenderingIssue {
                severity: Severity::Low,
                message: format!(
                    "Element {} has content but renders at {}x{}",
                    element.selector, element.width, element.height
                ),
                details: ErrorDetails::Rendering {
                    selector: element.selector.clone(),
                    issue: "zero-size-with-content".to_string(),
                },
            });
        }
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::session::{ElementProbe, ImageProbe, StylesheetProbe};

    #[test]
    fn test_each_problem_kind_detected() {
        let probe = RenderingProbe {
            images: vec![
                ImageProbe {
                    selector: "img.logo".to_string(),
                    src: "/logo.png".to_string(),
                    complete: true,
                    natural_width: 0,
                    natural_height: 0,
                },
                ImageProbe {
                    selector: "img.ok".to_string(),
                    src: "/ok.png".to_string(),
                    complete: true,
                    natural_width: 10,
                    natural_height: 10,
                },
            ],
            stylesheets: vec![StylesheetProbe {
                href: "/app.css".to_string(),
                sheet_attached: false,
            }],
            elements: vec![
                ElementProbe {
                    selector: "#chart".to_string(),
                    width: 0.0,
                    height: 240.0,
                    child_count: 3,
                    text_length: 0,
                    intentionally_hidden: false,
                },
                ElementProbe {
                    selector: "#drawer".to_string(),
                    width: 0.0,
                    height: 0.0,
                    child_count: 5,
                    text_length: 40,
                    intentionally_hidden: true,
                },
                ElementProbe {
                    selector: "#spacer".to_string(),
                    width: 0.0,
                    height: 0.0,
                    child_count: 0,
                    text_length: 0,
                    intentionally_hidden: false,
                },
            ],
        };

        let issues = find_rendering_issues(&probe);
        assert_eq!(issues.len(), 3);
        assert_eq!(issues[0].severity, Severity::Medium);
        assert_eq!(issues[1].severity, Severity::High);
        assert!(issues[2].message.contains("#chart"));
    }

    #[test]
    fn test_clean_probe_has_no_issues() {
        assert!(find_rendering_issues(&RenderingProbe::default()).is_empty());
    }
}
