//! Evidence grounding: quoted text must exist in the source document.
//!
//! A quote that cannot be found is hallucinated evidence and fails the
//! fixture.

use super::normalize::{normalize, split_elisions};
use crate::model::{CheckCode, CheckResult, FeedbackOutput, Fixture, Severity};

/// Check every `rewrites[].original` and `findings[].evidence`.
#[must_use]
pub fn check_grounding(fixture: &Fixture, output: &FeedbackOutput) -> Vec<CheckResult> {
    let source = normalize(&fixture.document);
    let mut out = Vec::new();

    let rewrites: Vec<CheckResult> = output
        .rewrites
        .iter()
        .enumerate()
        .filter(|(_, r)| !is_grounded(&source, &r.original))
        .map(|(i, r)| {
            CheckResult::fail(
                CheckCode::GroundingRewriteOriginal,
                Severity::Error,
                format!("rewrites[{i}].original is not present in the source document"),
            )
            .at(format!("rewrites[{i}].original"))
            .with_value(&r.original)
        })
        .collect();
    if rewrites.is_empty() {
        out.push(CheckResult::pass(
            CheckCode::GroundingRewriteOriginal,
            Severity::Error,
            "every rewrite quotes the source",
        ));
    } else {
        out.extend(rewrites);
    }

    let findings: Vec<CheckResult> = output
        .findings
        .iter()
        .enumerate()
        .filter(|(_, f)| !is_grounded(&source, &f.evidence))
        .map(|(i, f)| {
            CheckResult::fail(
                CheckCode::GroundingFindingEvidence,
                Severity::Error,
                format!("findings[{i}].evidence is not present in the source document"),
            )
            .at(format!("findings[{i}].evidence"))
            .with_value(&f.evidence)
        })
        .collect();
    if findings.is_empty() {
        out.push(CheckResult::pass(
            CheckCode::GroundingFindingEvidence,
            Severity::Error,
            "every finding quotes the source",
        ));
    } else {
        out.extend(findings);
    }

    out
}

/// Whether `quote` appears in the already-normalized `source`.
///
/// Elided quotes (`a ... b`) are grounded when every segment appears, in
/// order. A quote with no content left after trimming is not grounded.
#[must_use]
pub fn is_grounded(source: &str, quote: &str) -> bool {
    let quote = normalize(quote);
    let segments = split_elisions(&quote);
    if segments.is_empty() {
        return false;
    }
    let mut cursor = 0;
    for seg in segments {
        match source[cursor..].find(seg) {
            Some(pos) => cursor += pos + seg.len(),
            None => return false,
        }
    }
    true
}
