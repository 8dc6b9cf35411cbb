//! Tunable thresholds and fixed vocabularies shared by the check engine,
//! the drift detector and the reporter.
//!
//! Every value here is a default: [`crate::config::ThresholdConfig`] can
//! override the numeric ones from `feval.toml`.

use std::sync::LazyLock;

use regex::Regex;

// ---------------------------------------------------------------------------
// Drift
// ---------------------------------------------------------------------------

/// Score deltas at or below this are noise.
pub const SCORE_DRIFT_WARN_THRESHOLD: f64 = 5.0;

/// Score deltas above this fail the fixture.
pub const SCORE_DRIFT_ERROR_THRESHOLD: f64 = 15.0;

/// Per-subscore delta above which a warning note is raised.
pub const SUBSCORE_DRIFT_WARN_THRESHOLD: f64 = 10.0;

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

/// Fewer prioritized fixes than this is an error.
pub const MIN_TOP_FIXES: usize = 3;

/// More prioritized fixes than this is a warning.
pub const MAX_TOP_FIXES: usize = 5;

/// Fewer findings than this is an error.
pub const MIN_FINDINGS: usize = 1;

/// More findings than this is a warning.
pub const MAX_FINDINGS: usize = 20;

/// More rewrite suggestions than this is a warning.
pub const MAX_REWRITES: usize = 10;

/// Lower bound of every score and subscore.
pub const SCORE_MIN: f64 = 0.0;

/// Upper bound of every score and subscore.
pub const SCORE_MAX: f64 = 100.0;

/// Allowed values for `findings[].severity`.
pub const FINDING_SEVERITIES: &[&str] = &["high", "medium", "low"];

// ---------------------------------------------------------------------------
// Length / format
// ---------------------------------------------------------------------------

/// Quoted evidence and rewrite text longer than this is verbose (warning).
pub const EVIDENCE_MAX_LENGTH: usize = 300;

/// Any text field longer than this breaks report rendering (error).
pub const RENDER_MAX_LENGTH: usize = 1000;

// ---------------------------------------------------------------------------
// Consistency
// ---------------------------------------------------------------------------

/// How far the overall score may sit outside the `[min, max]` subscore range.
pub const SCORE_CONSISTENCY_SLACK: f64 = 10.0;

// ---------------------------------------------------------------------------
// Concreteness
// ---------------------------------------------------------------------------

/// Rewrite kinds that are expected to carry a quantitative claim.
pub const QUANTITATIVE_REWRITE_KINDS: &[&str] = &["impact", "quantify", "metrics", "achievement"];

/// Fixture tag that disables the concreteness check.
pub const TAG_NO_METRICS: &str = "no-metrics";

/// Raw patterns recognised as a concrete, quantitative claim.
pub const CONCRETE_PATTERN_SOURCES: &[&str] = &[
    // percentages: 40%, 12.5 %, 30 percent
    r"(?i)\b\d+(?:[.,]\d+)?\s?(?:%|percent\b)",
    // currency: $2M, €300k, 1,200 USD
    r"(?i)(?:[$€£¥]\s?\d[\d,.]*\s?[kmb]?\b|\b\d[\d,.]*\s?(?:usd|eur|gbp|dollars)\b)",
    // multipliers: 3x, 10×
    r"(?i)\b\d+(?:\.\d+)?\s?[x×](?:\b|\s|$)",
    // magnitudes and units: 2M users, 500ms, 12 engineers, 3 months
    r"(?i)\b\d[\d,.]*\s?(?:k|m|b|ms|s|sec|seconds|minutes|hours|days|weeks|months|years|users|customers|requests|engineers|people|teams|projects|clients|transactions|tickets|releases|services|servers|rps|qps|tb|gb|mb)\b",
    // bare multi-digit numbers: 1,200 or 250
    r"\b\d{2,}(?:,\d{3})*(?:\.\d+)?\b",
];

/// Compiled [`CONCRETE_PATTERN_SOURCES`].
pub static CONCRETE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CONCRETE_PATTERN_SOURCES
        .iter()
        .filter_map(|src| Regex::new(src).ok())
        .collect()
});

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Attempts per generation call (first call included).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Judge calls are retried at most once.
pub const JUDGE_MAX_ATTEMPTS: u32 = 2;

/// First backoff delay.
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Backoff ceiling.
pub const DEFAULT_MAX_DELAY_MS: u64 = 8_000;

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Fixtures evaluated concurrently by default.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Per-call timeout for generation and judge calls.
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;

/// Format version written into new baseline files.
pub const BASELINE_FORMAT_VERSION: u32 = 1;
