//! Verdict types: per-check results, drift classification, per-fixture
//! results and the whole-run output consumed by the reporter.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::fixture::FixtureId;

// ---------------------------------------------------------------------------
// Severity / CheckCode / CheckResult
// ---------------------------------------------------------------------------

/// How bad a failed check is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Degrades the fixture to WARN.
    Warning,
    /// Fails the fixture.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Stable names of every check the harness can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CheckCode {
    /// Output is not a JSON object.
    #[serde(rename = "shape.object")]
    ShapeObject,
    /// A required field is missing or has the wrong primitive type.
    #[serde(rename = "shape.required_field")]
    ShapeRequiredField,
    /// A required string is empty.
    #[serde(rename = "shape.empty_text")]
    ShapeEmptyText,
    /// A score or subscore is outside 0–100.
    #[serde(rename = "shape.score_range")]
    ShapeScoreRange,
    /// An array is shorter or longer than allowed.
    #[serde(rename = "shape.array_length")]
    ShapeArrayLength,
    /// A finding severity is outside the allowed set.
    #[serde(rename = "shape.enum_value")]
    ShapeEnumValue,
    /// Two top fixes share a priority.
    #[serde(rename = "shape.priority_unique")]
    ShapePriorityUnique,
    /// The value could not be deserialized into the structural type.
    #[serde(rename = "shape.parse")]
    ShapeParse,
    /// A rewrite quotes text that is not in the source document.
    #[serde(rename = "grounding.rewrite_original")]
    GroundingRewriteOriginal,
    /// A finding quotes evidence that is not in the source document.
    #[serde(rename = "grounding.finding_evidence")]
    GroundingFindingEvidence,
    /// A quantitative rewrite carries no concrete number or unit.
    #[serde(rename = "concreteness.quantitative_rewrite")]
    ConcretenessQuantitativeRewrite,
    /// A text field is verbose.
    #[serde(rename = "length.verbose")]
    LengthVerbose,
    /// A text field would break report rendering.
    #[serde(rename = "length.render")]
    LengthRender,
    /// The overall score is inconsistent with its sub-scores.
    #[serde(rename = "consistency.score_range")]
    ConsistencyScoreRange,
    /// A rewrite does not change the original text.
    #[serde(rename = "consistency.noop_rewrite")]
    ConsistencyNoopRewrite,
    /// The generation call failed after retries.
    #[serde(rename = "generation.call_failed")]
    GenerationCallFailed,
    /// The run was cancelled before the fixture finished.
    #[serde(rename = "run.cancelled")]
    RunCancelled,
    /// The fixture task crashed.
    #[serde(rename = "run.internal_error")]
    RunInternalError,
}

impl CheckCode {
    /// The dotted check name used in reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ShapeObject => "shape.object",
            Self::ShapeRequiredField => "shape.required_field",
            Self::ShapeEmptyText => "shape.empty_text",
            Self::ShapeScoreRange => "shape.score_range",
            Self::ShapeArrayLength => "shape.array_length",
            Self::ShapeEnumValue => "shape.enum_value",
            Self::ShapePriorityUnique => "shape.priority_unique",
            Self::ShapeParse => "shape.parse",
            Self::GroundingRewriteOriginal => "grounding.rewrite_original",
            Self::GroundingFindingEvidence => "grounding.finding_evidence",
            Self::ConcretenessQuantitativeRewrite => "concreteness.quantitative_rewrite",
            Self::LengthVerbose => "length.verbose",
            Self::LengthRender => "length.render",
            Self::ConsistencyScoreRange => "consistency.score_range",
            Self::ConsistencyNoopRewrite => "consistency.noop_rewrite",
            Self::GenerationCallFailed => "generation.call_failed",
            Self::RunCancelled => "run.cancelled",
            Self::RunInternalError => "run.internal_error",
        }
    }
}

impl fmt::Display for CheckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validator's verdict on one output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Which check produced this result.
    pub check_name: CheckCode,
    /// Severity if the check failed.
    pub severity: Severity,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable message.
    pub message: String,
    /// JSON path of the offending value (e.g. `rewrites[2].original`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// The offending value, possibly truncated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Longest offending value kept in a check result.
const VALUE_PREVIEW_CHARS: usize = 160;

impl CheckResult {
    /// A passing result.
    #[must_use]
    pub fn pass(check: CheckCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            check_name: check,
            severity,
            passed: true,
            message: message.into(),
            path: None,
            value: None,
        }
    }

    /// A failing result.
    #[must_use]
    pub fn fail(check: CheckCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            check_name: check,
            severity,
            passed: false,
            message: message.into(),
            path: None,
            value: None,
        }
    }

    /// Attach the JSON path of the offending value.
    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach a preview of the offending value.
    #[must_use]
    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(preview(value, VALUE_PREVIEW_CHARS));
        self
    }

    /// Failed with error severity.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.passed && self.severity == Severity::Error
    }

    /// Failed with warning severity.
    #[must_use]
    pub fn is_warning(&self) -> bool {
        !self.passed && self.severity == Severity::Warning
    }
}

/// Truncate `s` to at most `max` characters, marking the cut with `…`.
#[must_use]
pub fn preview(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_owned();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

// ---------------------------------------------------------------------------
// FixtureStatus
// ---------------------------------------------------------------------------

/// Rolled-up verdict for one fixture (or a partial signal feeding it).
///
/// Ordered so that `max` merges signals: error dominates warning dominates pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FixtureStatus {
    /// No errors, no warnings.
    Pass,
    /// Warnings only.
    Warn,
    /// At least one error.
    Fail,
}

impl FixtureStatus {
    /// Roll up check results and drift into one status.
    #[must_use]
    pub fn roll_up(checks: &[CheckResult], drift: DriftStatus) -> Self {
        let from_checks = checks.iter().fold(Self::Pass, |acc, c| {
            if c.is_error() {
                Self::Fail
            } else if c.is_warning() {
                acc.max(Self::Warn)
            } else {
                acc
            }
        });
        from_checks.max(drift.as_fixture_status())
    }

    /// Label used in console output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Warn => "WARN",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

/// Drift classification against the baseline.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DriftStatus {
    /// Within tolerance, or nothing to compare against.
    #[default]
    None,
    /// Moved more than noise.
    Warn,
    /// Moved enough to fail the fixture.
    Error,
}

impl DriftStatus {
    /// The fixture status this drift contributes.
    #[must_use]
    pub const fn as_fixture_status(self) -> FixtureStatus {
        match self {
            Self::None => FixtureStatus::Pass,
            Self::Warn => FixtureStatus::Warn,
            Self::Error => FixtureStatus::Fail,
        }
    }
}

impl fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Why no baseline comparison was made.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "reason")]
pub enum BaselineSkip {
    /// No baseline file was loaded for this run.
    NoBaselineFile,
    /// The baseline has no entry for this fixture.
    Missing,
    /// The fixture text changed since the baseline was captured.
    ContentHashMismatch {
        /// Hash stored in the baseline.
        baseline: String,
        /// Hash of the current fixture.
        current: String,
    },
    /// The baseline was captured with an incompatible prompt version.
    PromptVersionMismatch {
        /// Version stored in the baseline.
        baseline: String,
        /// Version under test.
        current: String,
    },
    /// The output could not be parsed, so there is no score to compare.
    UnparsedOutput,
}

impl fmt::Display for BaselineSkip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBaselineFile => write!(f, "no baseline file"),
            Self::Missing => write!(f, "no baseline entry"),
            Self::ContentHashMismatch { baseline, current } => write!(
                f,
                "fixture text changed (baseline {}, current {})",
                short_hash(baseline),
                short_hash(current)
            ),
            Self::PromptVersionMismatch { baseline, current } => write!(
                f,
                "prompt version mismatch (baseline {baseline}, current {current})"
            ),
            Self::UnparsedOutput => write!(f, "output not parsed"),
        }
    }
}

fn short_hash(h: &str) -> &str {
    h.get(..12).unwrap_or(h)
}

/// Drift classification for one fixture.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Merged drift status (score and subscores).
    pub status: DriftStatus,
    /// `|current - baseline|` of the overall score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
    /// Current overall score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_score: Option<f64>,
    /// Baseline overall score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_score: Option<f64>,
    /// Signed `current - baseline` per subscore.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subscore_deltas: BTreeMap<String, f64>,
    /// Human-readable notes for subscores that breached their threshold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscore_breaches: Vec<String>,
    /// Set when no comparison was made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<BaselineSkip>,
}

impl DriftReport {
    /// A report recording that no comparison was made.
    #[must_use]
    pub fn skipped(reason: BaselineSkip) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Judge
// ---------------------------------------------------------------------------

/// Structured rubric verdict from the judge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    /// Are quoted evidence and claims supported by the source? 0–10.
    pub evidence_quality: f64,
    /// Can the reader act on the feedback? 0–10.
    pub actionability: f64,
    /// Does the tone match the product voice? 0–10.
    pub tone_fidelity: f64,
    /// Does the feedback follow the review methodology? 0–10.
    pub methodology_alignment: f64,
    /// Overall judge score, 0–100.
    pub final_score: f64,
    /// Specific defects the judge observed.
    #[serde(default)]
    pub issues: Vec<JudgeIssue>,
}

/// One defect flagged by the judge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeIssue {
    /// Defect category (e.g. `invented_metric`).
    #[serde(rename = "type")]
    pub kind: String,
    /// What the judge observed.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// FixtureResult
// ---------------------------------------------------------------------------

/// Full verdict for one fixture in one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixtureResult {
    /// Which fixture.
    pub fixture_id: FixtureId,
    /// Content hash of the fixture as it was evaluated.
    pub content_hash: String,
    /// Rolled-up status.
    pub status: FixtureStatus,
    /// The raw generated output, kept for debugging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<serde_json::Value>,
    /// Every check result, in engine order.
    pub checks: Vec<CheckResult>,
    /// Drift classification.
    pub drift: DriftReport,
    /// Judge verdict, when the judge ran and answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeResult>,
    /// Advisory warning-level notes that do not affect `status`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    /// Generation attempts made (0 when the fixture never started).
    pub attempts: u32,
    /// Wall-clock time spent on the fixture.
    pub duration_ms: u64,
}

impl FixtureResult {
    /// A FAIL result carrying one error check and nothing else.
    #[must_use]
    pub fn failed(
        fixture_id: FixtureId,
        content_hash: String,
        check: CheckResult,
        attempts: u32,
        duration_ms: u64,
    ) -> Self {
        Self {
            fixture_id,
            content_hash,
            status: FixtureStatus::Fail,
            raw_output: None,
            checks: vec![check],
            drift: DriftReport::default(),
            judge: None,
            notes: Vec::new(),
            attempts,
            duration_ms,
        }
    }

    /// Failed checks, errors first, in engine order within a severity.
    #[must_use]
    pub fn failed_checks(&self) -> Vec<&CheckResult> {
        let mut out: Vec<&CheckResult> = self.checks.iter().filter(|c| c.is_error()).collect();
        out.extend(self.checks.iter().filter(|c| c.is_warning()));
        out
    }
}

// ---------------------------------------------------------------------------
// EvalRunOutput
// ---------------------------------------------------------------------------

/// Number of fixtures per status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    /// PASS fixtures.
    pub pass: usize,
    /// WARN fixtures.
    pub warn: usize,
    /// FAIL fixtures.
    pub fail: usize,
}

impl StatusCounts {
    /// Count statuses across results.
    #[must_use]
    pub fn tally(results: &[FixtureResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            match r.status {
                FixtureStatus::Pass => acc.pass += 1,
                FixtureStatus::Warn => acc.warn += 1,
                FixtureStatus::Fail => acc.fail += 1,
            }
            acc
        })
    }

    /// Total fixtures counted.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.pass + self.warn + self.fail
    }
}

/// Run-level judge statistics for trend-watching across runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JudgeSummary {
    /// Fixtures with a judge verdict.
    pub count: usize,
    /// Mean `final_score`.
    pub mean: f64,
    /// Lowest `final_score`.
    pub min: f64,
    /// Highest `final_score`.
    pub max: f64,
    /// Total judge issues across fixtures.
    pub issue_count: usize,
}

impl JudgeSummary {
    /// Aggregate judge scores, `None` when no fixture has a verdict.
    #[must_use]
    pub fn from_results(results: &[FixtureResult]) -> Option<Self> {
        let judged: Vec<&JudgeResult> = results.iter().filter_map(|r| r.judge.as_ref()).collect();
        if judged.is_empty() {
            return None;
        }
        let scores = judged.iter().map(|j| j.final_score);
        let sum: f64 = scores.clone().sum();
        let min = scores.clone().fold(f64::INFINITY, f64::min);
        let max = scores.fold(f64::NEG_INFINITY, f64::max);
        #[allow(clippy::cast_precision_loss)]
        let mean = sum / judged.len() as f64;
        Some(Self {
            count: judged.len(),
            mean,
            min,
            max,
            issue_count: judged.iter().map(|j| j.issues.len()).sum(),
        })
    }
}

/// Run-level metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Unique id for this run (timestamp-derived).
    pub run_id: String,
    /// RFC 3339 start time.
    pub started_at: String,
    /// RFC 3339 end time.
    pub finished_at: String,
    /// Prompt version under test.
    pub prompt_version: String,
    /// Model identifier, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Baseline file used for drift, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_path: Option<String>,
    /// Creation time of that baseline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_created_at: Option<String>,
    /// Whether the judge was enabled.
    pub judge_enabled: bool,
    /// Prompt-version compatibility policy in force.
    pub version_policy: String,
    /// Whether the run was cut short by a timeout or abort.
    pub aborted: bool,
}

/// The whole run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvalRunOutput {
    /// One result per selected fixture, sorted by fixture id.
    pub results: Vec<FixtureResult>,
    /// Status counts.
    pub counts: StatusCounts,
    /// Run metadata.
    pub metadata: RunMetadata,
    /// Judge aggregates, when any fixture was judged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_summary: Option<JudgeSummary>,
    /// `false` iff at least one fixture failed.
    pub ok: bool,
}

impl EvalRunOutput {
    /// Assemble the run output, sorting results and deriving counts and `ok`.
    #[must_use]
    pub fn assemble(mut results: Vec<FixtureResult>, metadata: RunMetadata) -> Self {
        results.sort_by(|a, b| a.fixture_id.cmp(&b.fixture_id));
        let counts = StatusCounts::tally(&results);
        let judge_summary = JudgeSummary::from_results(&results);
        Self {
            ok: counts.fail == 0,
            results,
            counts,
            metadata,
            judge_summary,
        }
    }
}
