//! Drift detection: compare a fixture's current scores with its baseline.
//!
//! Score deltas are absolute and classified against two thresholds:
//!
//! ```text
//! delta <= warn          → none
//! warn < delta <= error  → warn
//! delta > error          → error
//! ```
//!
//! Subscores are compared individually. Any subscore moving more than
//! `subscore_drift_warn`, or present in the baseline but missing from the
//! output, raises the status to at least `warn`; it never raises it to
//! `error` on its own.

use crate::config::ThresholdConfig;
use crate::model::{BaselineLookup, BaselineSkip, DriftReport, DriftStatus, FeedbackOutput};

/// Classify an absolute score delta.
#[must_use]
pub fn classify_delta(delta: f64, t: &ThresholdConfig) -> DriftStatus {
    if delta > t.score_drift_error {
        DriftStatus::Error
    } else if delta > t.score_drift_warn {
        DriftStatus::Warn
    } else {
        DriftStatus::None
    }
}

/// Compare `output` with the looked-up baseline entry.
///
/// `output` is `None` when the generated JSON failed typed parsing; there
/// is nothing to compare and the shape error already fails the fixture.
#[must_use]
pub fn classify_drift(
    output: Option<&FeedbackOutput>,
    lookup: &BaselineLookup<'_>,
    t: &ThresholdConfig,
) -> DriftReport {
    let Some(output) = output else {
        return DriftReport::skipped(BaselineSkip::UnparsedOutput);
    };
    let entry = match lookup {
        BaselineLookup::Usable(entry) => *entry,
        BaselineLookup::Skipped(reason) => {
            return DriftReport {
                current_score: Some(output.score),
                ..DriftReport::skipped(reason.clone())
            };
        }
    };

    let delta = (output.score - entry.score).abs();
    let mut status = classify_delta(delta, t);

    let mut subscore_deltas = std::collections::BTreeMap::new();
    let mut subscore_breaches = Vec::new();
    for (name, &base) in &entry.subscores {
        let Some(&current) = output.subscores.get(name) else {
            subscore_breaches.push(format!("subscore '{name}' missing from output (baseline {base})"));
            continue;
        };
        let d = current - base;
        subscore_deltas.insert(name.clone(), d);
        if d.abs() > t.subscore_drift_warn {
            subscore_breaches.push(format!(
                "subscore '{name}' moved {d:+} ({base} → {current}), over ±{}",
                t.subscore_drift_warn
            ));
        }
    }
    if !subscore_breaches.is_empty() {
        status = status.max(DriftStatus::Warn);
    }

    tracing::debug!(
        delta,
        ?status,
        breaches = subscore_breaches.len(),
        "drift classified"
    );

    DriftReport {
        status,
        delta: Some(delta),
        current_score: Some(output.score),
        baseline_score: Some(entry.score),
        subscore_deltas,
        subscore_breaches,
        skipped: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::output::sample_output_json;
    use crate::model::{BaselineFixture, FixtureId};
    use std::collections::BTreeMap;

    fn entry(score: f64) -> BaselineFixture {
        BaselineFixture {
            fixture_id: FixtureId::new("sample").unwrap(),
            score,
            subscores: BTreeMap::from([
                ("impact".to_owned(), 65.0),
                ("clarity".to_owned(), 80.0),
                ("structure".to_owned(), 74.0),
            ]),
            prompt_version: "v1".to_owned(),
            captured_at: "2026-01-01T00:00:00+00:00".to_owned(),
            content_hash: "abc".to_owned(),
        }
    }

    fn output(score: f64) -> FeedbackOutput {
        let mut o = FeedbackOutput::from_value(&sample_output_json()).unwrap();
        o.score = score;
        o
    }

    fn status(baseline: f64, current: f64) -> DriftReport {
        let e = entry(baseline);
        classify_drift(
            Some(&output(current)),
            &BaselineLookup::Usable(&e),
            &ThresholdConfig::default(),
        )
    }

    #[test]
    fn small_delta_is_none() {
        let r = status(80.0, 83.0);
        assert_eq!(r.status, DriftStatus::None);
        assert_eq!(r.delta, Some(3.0));
        assert_eq!(r.baseline_score, Some(80.0));
        assert_eq!(r.current_score, Some(83.0));
    }

    #[test]
    fn medium_delta_is_warn() {
        let r = status(80.0, 90.0);
        assert_eq!(r.status, DriftStatus::Warn);
        assert_eq!(r.delta, Some(10.0));
    }

    #[test]
    fn large_delta_is_error() {
        let r = status(80.0, 50.0);
        assert_eq!(r.status, DriftStatus::Error);
        assert_eq!(r.delta, Some(30.0));
    }

    #[test]
    fn thresholds_are_inclusive_upper_bounds() {
        let t = ThresholdConfig::default();
        assert_eq!(classify_delta(5.0, &t), DriftStatus::None);
        assert_eq!(classify_delta(15.0, &t), DriftStatus::Warn);
        assert_eq!(classify_delta(15.01, &t), DriftStatus::Error);
    }

    #[test]
    fn no_baseline_is_none_with_reason() {
        let r = classify_drift(
            Some(&output(10.0)),
            &BaselineLookup::Skipped(BaselineSkip::Missing),
            &ThresholdConfig::default(),
        );
        assert_eq!(r.status, DriftStatus::None);
        assert_eq!(r.skipped, Some(BaselineSkip::Missing));
        assert_eq!(r.delta, None);
    }

    #[test]
    fn hash_mismatch_is_none() {
        let reason = BaselineSkip::ContentHashMismatch {
            baseline: "aaa".into(),
            current: "bbb".into(),
        };
        let r = classify_drift(
            Some(&output(10.0)),
            &BaselineLookup::Skipped(reason.clone()),
            &ThresholdConfig::default(),
        );
        assert_eq!(r.status, DriftStatus::None);
        assert_eq!(r.skipped, Some(reason));
    }

    #[test]
    fn unparsed_output_is_none() {
        let e = entry(80.0);
        let r = classify_drift(None, &BaselineLookup::Usable(&e), &ThresholdConfig::default());
        assert_eq!(r.status, DriftStatus::None);
        assert_eq!(r.skipped, Some(BaselineSkip::UnparsedOutput));
    }

    #[test]
    fn subscore_breach_raises_to_warn() {
        let e = entry(72.0);
        let mut o = output(72.0);
        o.subscores.insert("impact".into(), 40.0);
        let r = classify_drift(Some(&o), &BaselineLookup::Usable(&e), &ThresholdConfig::default());
        assert_eq!(r.status, DriftStatus::Warn);
        assert_eq!(r.subscore_breaches.len(), 1);
        assert!(r.subscore_breaches[0].contains("impact"));
        assert_eq!(r.subscore_deltas.get("impact"), Some(&-25.0));
    }

    #[test]
    fn subscore_breach_does_not_lower_error() {
        let e = entry(80.0);
        let mut o = output(50.0);
        o.subscores.insert("impact".into(), 10.0);
        let r = classify_drift(Some(&o), &BaselineLookup::Usable(&e), &ThresholdConfig::default());
        assert_eq!(r.status, DriftStatus::Error);
    }

    #[test]
    fn missing_subscore_is_breach() {
        let e = entry(72.0);
        let mut o = output(72.0);
        o.subscores.remove("structure");
        let r = classify_drift(Some(&o), &BaselineLookup::Usable(&e), &ThresholdConfig::default());
        assert_eq!(r.status, DriftStatus::Warn);
        assert!(r.subscore_breaches[0].contains("missing"));
    }

    #[test]
    fn new_subscore_in_output_is_ignored() {
        let e = entry(72.0);
        let mut o = output(72.0);
        o.subscores.insert("tone".into(), 20.0);
        let r = classify_drift(Some(&o), &BaselineLookup::Usable(&e), &ThresholdConfig::default());
        assert_eq!(r.status, DriftStatus::None);
        assert!(!r.subscore_deltas.contains_key("tone"));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_monotonic_in_delta(a in 0.0f64..200.0, b in 0.0f64..200.0) {
            let t = ThresholdConfig::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(classify_delta(lo, &t) <= classify_delta(hi, &t));
        }

        #[test]
        fn prop_subscores_only_raise(baseline in 0.0f64..100.0, current in 0.0f64..100.0, impact in 0.0f64..100.0) {
            use crate::model::output::sample_output_json;
            use crate::model::{BaselineFixture, FixtureId};

            let t = ThresholdConfig::default();
            let entry = BaselineFixture {
                fixture_id: FixtureId::new("p").unwrap(),
                score: baseline,
                subscores: [("impact".to_owned(), 50.0)].into_iter().collect(),
                prompt_version: "v1".to_owned(),
                captured_at: "2026-01-01T00:00:00+00:00".to_owned(),
                content_hash: "h".to_owned(),
            };
            let mut out = FeedbackOutput::from_value(&sample_output_json()).unwrap();
            out.score = current;
            out.subscores.insert("impact".to_owned(), impact);
            let report = classify_drift(Some(&out), &BaselineLookup::Usable(&entry), &t);
            let from_score = classify_delta((current - baseline).abs(), &t);
            prop_assert!(report.status >= from_score);
            if report.subscore_breaches.is_empty() {
                prop_assert_eq!(report.status, from_score);
            }
        }

        #[test]
        fn prop_within_warn_is_none(delta in 0.0f64..=5.0) {
            prop_assert_eq!(classify_delta(delta, &ThresholdConfig::default()), DriftStatus::None);
        }
    }
}
