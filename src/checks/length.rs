//! Length and format limits on text fields.
//!
//! Quoted and suggested text longer than `evidence_max_length` is verbose
//! (warning). Any text longer than `render_max_length`, or carrying control
//! characters other than newline and tab, breaks report rendering (error).

use crate::config::ThresholdConfig;
use crate::model::{CheckCode, CheckResult, FeedbackOutput, Severity};

/// A text field and whether the verbosity limit applies to it.
struct Field<'a> {
    path: String,
    text: &'a str,
    verbosity_limited: bool,
}

fn fields(output: &FeedbackOutput) -> Vec<Field<'_>> {
    let mut out = vec![Field {
        path: "summary".to_owned(),
        text: &output.summary,
        verbosity_limited: false,
    }];
    for (i, fix) in output.top_fixes.iter().enumerate() {
        out.push(Field {
            path: format!("top_fixes[{i}].title"),
            text: &fix.title,
            verbosity_limited: false,
        });
        out.push(Field {
            path: format!("top_fixes[{i}].detail"),
            text: &fix.detail,
            verbosity_limited: true,
        });
    }
    for (i, f) in output.findings.iter().enumerate() {
        out.push(Field {
            path: format!("findings[{i}].evidence"),
            text: &f.evidence,
            verbosity_limited: true,
        });
        for (name, text) in [("issue", &f.issue), ("suggestion", &f.suggestion)] {
            out.push(Field {
                path: format!("findings[{i}].{name}"),
                text,
                verbosity_limited: false,
            });
        }
    }
    for (i, r) in output.rewrites.iter().enumerate() {
        for (name, text) in [("original", &r.original), ("rewritten", &r.rewritten)] {
            out.push(Field {
                path: format!("rewrites[{i}].{name}"),
                text,
                verbosity_limited: true,
            });
        }
        if let Some(rationale) = &r.rationale {
            out.push(Field {
                path: format!("rewrites[{i}].rationale"),
                text: rationale,
                verbosity_limited: false,
            });
        }
    }
    out
}

fn has_control_chars(text: &str) -> bool {
    text.chars().any(|c| c.is_control() && c != '\n' && c != '\t')
}

/// Check every text field against the verbosity and render limits.
#[must_use]
pub fn check_length(output: &FeedbackOutput, t: &ThresholdConfig) -> Vec<CheckResult> {
    let mut verbose = Vec::new();
    let mut render = Vec::new();

    for field in fields(output) {
        let len = field.text.chars().count();
        if len > t.render_max_length {
            render.push(
                CheckResult::fail(
                    CheckCode::LengthRender,
                    Severity::Error,
                    format!(
                        "'{}' is {len} characters, over the render limit of {}",
                        field.path, t.render_max_length
                    ),
                )
                .at(field.path.clone())
                .with_value(field.text),
            );
        } else if field.verbosity_limited && len > t.evidence_max_length {
            verbose.push(
                CheckResult::fail(
                    CheckCode::LengthVerbose,
                    Severity::Warning,
                    format!(
                        "'{}' is {len} characters, over the limit of {}",
                        field.path, t.evidence_max_length
                    ),
                )
                .at(field.path.clone())
                .with_value(field.text),
            );
        }
        if has_control_chars(field.text) {
            render.push(
                CheckResult::fail(
                    CheckCode::LengthRender,
                    Severity::Error,
                    format!("'{}' contains control characters", field.path),
                )
                .at(field.path.clone()),
            );
        }
    }

    let mut out = Vec::with_capacity(2);
    if verbose.is_empty() {
        out.push(CheckResult::pass(
            CheckCode::LengthVerbose,
            Severity::Warning,
            "quoted and suggested text within length limit",
        ));
    } else {
        out.extend(verbose);
    }
    if render.is_empty() {
        out.push(CheckResult::pass(
            CheckCode::LengthRender,
            Severity::Error,
            "all text renders",
        ));
    } else {
        out.extend(render);
    }
    out
}
