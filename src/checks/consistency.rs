//! Cross-field consistency between related parts of one output.

use super::normalize::normalize;
use crate::config::ThresholdConfig;
use crate::model::{CheckCode, CheckResult, FeedbackOutput, Severity};

/// The overall score must sit within the sub-score range, widened by
/// `score_consistency_slack` on both sides. A violation means the
/// aggregation in the generator is broken.
#[must_use]
pub fn check_score_range(output: &FeedbackOutput, t: &ThresholdConfig) -> CheckResult {
    let Some((lo, hi)) = output.subscore_range() else {
        // Empty subscores are already a shape error.
        return CheckResult::pass(
            CheckCode::ConsistencyScoreRange,
            Severity::Error,
            "no subscores to compare",
        );
    };
    let (min, max) = (lo - t.score_consistency_slack, hi + t.score_consistency_slack);
    if (min..=max).contains(&output.score) {
        CheckResult::pass(
            CheckCode::ConsistencyScoreRange,
            Severity::Error,
            format!("score {} consistent with subscores {lo}-{hi}", output.score),
        )
    } else {
        CheckResult::fail(
            CheckCode::ConsistencyScoreRange,
            Severity::Error,
            format!(
                "score {} is outside the subscore range {lo}-{hi} (±{})",
                output.score, t.score_consistency_slack
            ),
        )
        .at("score")
        .with_value(&output.score.to_string())
    }
}

/// A rewrite whose text is unchanged after normalization suggests nothing.
#[must_use]
pub fn check_noop_rewrites(output: &FeedbackOutput) -> Vec<CheckResult> {
    let failures: Vec<CheckResult> = output
        .rewrites
        .iter()
        .enumerate()
        .filter(|(_, r)| normalize(&r.original) == normalize(&r.rewritten))
        .map(|(i, r)| {
            CheckResult::fail(
                CheckCode::ConsistencyNoopRewrite,
                Severity::Warning,
                format!("rewrites[{i}] does not change the original text"),
            )
            .at(format!("rewrites[{i}].rewritten"))
            .with_value(&r.rewritten)
        })
        .collect();
    if failures.is_empty() {
        vec![CheckResult::pass(
            CheckCode::ConsistencyNoopRewrite,
            Severity::Warning,
            "every rewrite changes its original",
        )]
    } else {
        failures
    }
}

/// All consistency checks.
#[must_use]
pub fn check_consistency(output: &FeedbackOutput, t: &ThresholdConfig) -> Vec<CheckResult> {
    let mut out = vec![check_score_range(output, t)];
    out.extend(check_noop_rewrites(output));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::output::sample_output_json;

    fn output() -> FeedbackOutput {
        FeedbackOutput::from_value(&sample_output_json()).unwrap()
    }

    #[test]
    fn sample_is_consistent() {
        assert!(check_consistency(&output(), &ThresholdConfig::default())
            .iter()
            .all(|c| c.passed));
    }

    #[test]
    fn score_outside_subscore_range_is_error() {
        let mut o = output();
        // subscores span 65-80, slack 10 → 55..=90
        o.score = 95.0;
        let r = check_score_range(&o, &ThresholdConfig::default());
        assert!(r.is_error());
        o.score = 90.0;
        assert!(check_score_range(&o, &ThresholdConfig::default()).passed);
        o.score = 54.0;
        assert!(check_score_range(&o, &ThresholdConfig::default()).is_error());
    }

    #[test]
    fn slack_is_configurable() {
        let mut o = output();
        o.score = 95.0;
        let t = ThresholdConfig {
            score_consistency_slack: 20.0,
            ..ThresholdConfig::default()
        };
        assert!(check_score_range(&o, &t).passed);
    }

    #[test]
    fn noop_rewrite_warns() {
        let mut o = output();
        o.rewrites[0].rewritten = "  worked on the Payments API ".into();
        let r = check_noop_rewrites(&o);
        assert_eq!(r.len(), 1);
        assert!(r[0].is_warning());
    }
}
