//! Validated structural type for the feedback JSON returned by the
//! generation service.
//!
//! The service hands back dynamic JSON. Shape checks run against the raw
//! [`serde_json::Value`] first; only then is it deserialized into
//! [`FeedbackOutput`], and a failure there becomes an error check result
//! instead of an exception escaping the check engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parsed feedback for one document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedbackOutput {
    /// Overall score, 0–100.
    pub score: f64,
    /// Named sub-scores, 0–100 each.
    pub subscores: BTreeMap<String, f64>,
    /// One-paragraph summary.
    pub summary: String,
    /// Prioritized fixes, highest priority first.
    pub top_fixes: Vec<TopFix>,
    /// Categorized findings with quoted evidence.
    pub findings: Vec<Finding>,
    /// Rewrite suggestions quoting the original text.
    #[serde(default)]
    pub rewrites: Vec<Rewrite>,
}

/// One prioritized fix.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopFix {
    /// Short imperative title.
    pub title: String,
    /// What to change and why.
    pub detail: String,
    /// 1 = most important.
    pub priority: u32,
}

/// One categorized finding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Finding category (e.g. `impact`, `clarity`, `formatting`).
    pub category: String,
    /// `high`, `medium` or `low`.
    pub severity: String,
    /// Text quoted from the source document.
    pub evidence: String,
    /// What is wrong.
    pub issue: String,
    /// How to fix it.
    pub suggestion: String,
}

/// One rewrite suggestion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewrite {
    /// Rewrite kind (e.g. `impact`, `clarity`).
    pub kind: String,
    /// Text quoted from the source document.
    pub original: String,
    /// Suggested replacement.
    pub rewritten: String,
    /// Why the rewrite is better.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl FeedbackOutput {
    /// Deserialize from an already shape-checked value.
    ///
    /// # Errors
    /// Returns the serde error message when the value does not fit the
    /// structural type.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, String> {
        Self::deserialize(value).map_err(|e| e.to_string())
    }

    /// Lowest and highest sub-score, `None` when there are no sub-scores.
    #[must_use]
    pub fn subscore_range(&self) -> Option<(f64, f64)> {
        self.subscores.values().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_output_json() -> serde_json::Value {
    serde_json::json!({
        "score": 72,
        "subscores": { "impact": 65, "clarity": 80, "structure": 74 },
        "summary": "Solid backend experience; impact statements lack numbers.",
        "top_fixes": [
            { "title": "Quantify impact", "detail": "Add metrics to the payments bullet.", "priority": 1 },
            { "title": "Tighten summary", "detail": "Cut the generic opening line.", "priority": 2 },
            { "title": "Group skills", "detail": "Split languages from tools.", "priority": 3 }
        ],
        "findings": [
            {
                "category": "impact",
                "severity": "high",
                "evidence": "Worked on the payments API",
                "issue": "No outcome is stated.",
                "suggestion": "State what changed because of the work."
            }
        ],
        "rewrites": [
            {
                "kind": "impact",
                "original": "Worked on the payments API",
                "rewritten": "Rebuilt the payments API, cutting checkout errors by 40%",
                "rationale": "Leads with the outcome."
            }
        ]
    })
}

#[cfg(test)]
pub(crate) const SAMPLE_DOCUMENT: &str = "Jane Doe\nBackend Engineer\n\
    Worked on the payments API for the checkout team.\n\
    Mentored two junior engineers and ran the on-call rotation.\n\
    Skills: Rust, Go, PostgreSQL, Kubernetes";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_parses() {
        let out = FeedbackOutput::from_value(&sample_output_json()).unwrap();
        assert!((out.score - 72.0).abs() < f64::EPSILON);
        assert_eq!(out.top_fixes.len(), 3);
        assert_eq!(out.rewrites[0].kind, "impact");
    }

    #[test]
    fn rewrites_default_to_empty() {
        let mut v = sample_output_json();
        v.as_object_mut().unwrap().remove("rewrites");
        let out = FeedbackOutput::from_value(&v).unwrap();
        assert!(out.rewrites.is_empty());
    }

    #[test]
    fn wrong_types_are_reported_not_panicked() {
        let v = serde_json::json!({ "score": "high" });
        assert!(FeedbackOutput::from_value(&v).is_err());
    }

    #[test]
    fn subscore_range_spans_values() {
        let out = FeedbackOutput::from_value(&sample_output_json()).unwrap();
        assert_eq!(out.subscore_range(), Some((65.0, 80.0)));
    }
}
