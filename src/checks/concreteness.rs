//! Concreteness: quantitative rewrites should carry a number, percentage,
//! currency amount, multiplier or unit.
//!
//! Failures are warnings. Not every document supports a numeric claim, and
//! fixtures tagged `no-metrics` skip the check.

use crate::constants::{CONCRETE_PATTERNS, QUANTITATIVE_REWRITE_KINDS, TAG_NO_METRICS};
use crate::model::{CheckCode, CheckResult, FeedbackOutput, Fixture, Severity};

/// Whether `text` matches any of the concrete patterns.
#[must_use]
pub fn is_concrete(text: &str) -> bool {
    CONCRETE_PATTERNS.iter().any(|re| re.is_match(text))
}

fn is_quantitative_kind(kind: &str) -> bool {
    let kind = kind.trim().to_ascii_lowercase();
    QUANTITATIVE_REWRITE_KINDS.contains(&kind.as_str())
}

/// Check every quantitative rewrite for a concrete claim.
#[must_use]
pub fn check_concreteness(fixture: &Fixture, output: &FeedbackOutput) -> Vec<CheckResult> {
    if fixture.has_tag(TAG_NO_METRICS) {
        return vec![CheckResult::pass(
            CheckCode::ConcretenessQuantitativeRewrite,
            Severity::Warning,
            "skipped: fixture tagged no-metrics",
        )];
    }

    let failures: Vec<CheckResult> = output
        .rewrites
        .iter()
        .enumerate()
        .filter(|(_, r)| is_quantitative_kind(&r.kind) && !is_concrete(&r.rewritten))
        .map(|(i, r)| {
            CheckResult::fail(
                CheckCode::ConcretenessQuantitativeRewrite,
                Severity::Warning,
                format!(
                    "rewrites[{i}] is a '{}' rewrite without a concrete number or unit",
                    r.kind
                ),
            )
            .at(format!("rewrites[{i}].rewritten"))
            .with_value(&r.rewritten)
        })
        .collect();

    if failures.is_empty() {
        vec![CheckResult::pass(
            CheckCode::ConcretenessQuantitativeRewrite,
            Severity::Warning,
            "quantitative rewrites are concrete",
        )]
    } else {
        failures
    }
}
