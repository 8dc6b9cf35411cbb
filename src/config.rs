//! Harness configuration (`feval.toml`).
//!
//! Every section is optional. A missing file means all defaults; unknown
//! keys are rejected so typos surface instead of silently doing nothing.
//!
//! ```toml
//! [paths]
//! fixtures = "fixtures"
//! baseline = "baseline.json"
//! report = "eval-report.md"
//!
//! [thresholds]
//! score_drift_warn = 5
//! score_drift_error = 15
//!
//! [runner]
//! concurrency = 4
//! call_timeout_secs = 120
//!
//! [retry]
//! max_attempts = 3
//!
//! [baseline]
//! version_policy = "same-major"
//!
//! [generator]
//! command = ["python", "scripts/generate.py"]
//! prompt_version = "feedback-v3.2"
//!
//! [judge]
//! command = ["python", "scripts/judge.py"]
//! enabled = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::constants::{
    DEFAULT_BASE_DELAY_MS, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_MS, EVIDENCE_MAX_LENGTH, MAX_FINDINGS, MAX_REWRITES, MAX_TOP_FIXES,
    MIN_FINDINGS, MIN_TOP_FIXES, RENDER_MAX_LENGTH, SCORE_CONSISTENCY_SLACK,
    SCORE_DRIFT_ERROR_THRESHOLD, SCORE_DRIFT_WARN_THRESHOLD, SUBSCORE_DRIFT_WARN_THRESHOLD,
};
use crate::error::HarnessError;
use crate::model::VersionPolicy;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "feval.toml";

/// Prompt version recorded when none is configured.
pub const DEFAULT_PROMPT_VERSION: &str = "unversioned";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level harness configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvalConfig {
    /// Corpus, baseline and report locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Check and drift thresholds.
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Worker pool and timeouts.
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Backoff for generation calls.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Baseline compatibility rules.
    #[serde(default)]
    pub baseline: BaselineConfig,

    /// The feature under test.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Optional LLM judge.
    #[serde(default)]
    pub judge: JudgeConfig,
}

// ---------------------------------------------------------------------------
// PathsConfig
// ---------------------------------------------------------------------------

/// File locations. Relative paths resolve against the working directory.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    /// Fixture corpus directory.
    #[serde(default = "default_fixtures_dir")]
    pub fixtures: PathBuf,

    /// Baseline file read while grading and replaced by `capture`.
    #[serde(default = "default_baseline_path")]
    pub baseline: PathBuf,

    /// Markdown report written after every run.
    #[serde(default = "default_report_path")]
    pub report: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            fixtures: default_fixtures_dir(),
            baseline: default_baseline_path(),
            report: default_report_path(),
        }
    }
}

fn default_fixtures_dir() -> PathBuf {
    PathBuf::from("fixtures")
}

fn default_baseline_path() -> PathBuf {
    PathBuf::from("baseline.json")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("eval-report.md")
}

// ---------------------------------------------------------------------------
// ThresholdConfig
// ---------------------------------------------------------------------------

/// Numeric thresholds for the check engine and drift detector.
///
/// Defaults come from [`crate::constants`]; any subset may be overridden.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    /// Score delta above which drift is a warning.
    pub score_drift_warn: f64,
    /// Score delta above which drift fails the fixture.
    pub score_drift_error: f64,
    /// Per-subscore delta above which drift is at least a warning.
    pub subscore_drift_warn: f64,
    /// Minimum number of `top_fixes`.
    pub min_top_fixes: usize,
    /// Maximum number of `top_fixes` before a warning.
    pub max_top_fixes: usize,
    /// Minimum number of `findings`.
    pub min_findings: usize,
    /// Maximum number of `findings` before a warning.
    pub max_findings: usize,
    /// Maximum number of `rewrites` before a warning.
    pub max_rewrites: usize,
    /// Verbosity limit for quoted and suggested text, in characters.
    pub evidence_max_length: usize,
    /// Hard limit for any text field, in characters.
    pub render_max_length: usize,
    /// Slack around the subscore range for the overall score.
    pub score_consistency_slack: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            score_drift_warn: SCORE_DRIFT_WARN_THRESHOLD,
            score_drift_error: SCORE_DRIFT_ERROR_THRESHOLD,
            subscore_drift_warn: SUBSCORE_DRIFT_WARN_THRESHOLD,
            min_top_fixes: MIN_TOP_FIXES,
            max_top_fixes: MAX_TOP_FIXES,
            min_findings: MIN_FINDINGS,
            max_findings: MAX_FINDINGS,
            max_rewrites: MAX_REWRITES,
            evidence_max_length: EVIDENCE_MAX_LENGTH,
            render_max_length: RENDER_MAX_LENGTH,
            score_consistency_slack: SCORE_CONSISTENCY_SLACK,
        }
    }
}

// ---------------------------------------------------------------------------
// RunnerConfig / RetryConfig
// ---------------------------------------------------------------------------

/// Worker pool and timeout settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunnerConfig {
    /// Fixtures evaluated concurrently.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout applied to each generation or judge call attempt.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Deadline for the whole run. Unset means no limit.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            call_timeout_secs: default_call_timeout_secs(),
            run_timeout_secs: None,
        }
    }
}

const fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

const fn default_call_timeout_secs() -> u64 {
    DEFAULT_CALL_TIMEOUT_SECS
}

/// Exponential backoff for transient generation failures.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts, first call included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the second attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Growth factor between attempts.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Randomize each delay within `[delay/2, delay]`.
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

const fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

const fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}

const fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter() -> bool {
    true
}

// ---------------------------------------------------------------------------
// BaselineConfig
// ---------------------------------------------------------------------------

/// Baseline compatibility rules.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BaselineConfig {
    /// How a baseline's prompt version must relate to the current one.
    #[serde(default)]
    pub version_policy: VersionPolicy,
}

// ---------------------------------------------------------------------------
// GeneratorConfig / JudgeConfig
// ---------------------------------------------------------------------------

/// How to call the feature under test.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Program and arguments. Receives a JSON request on stdin and prints
    /// the generated JSON on stdout.
    #[serde(default)]
    pub command: Vec<String>,

    /// Directory of recorded outputs (`<fixture-id>.json`). Takes
    /// precedence over `command` when set.
    #[serde(default)]
    pub replay_dir: Option<PathBuf>,

    /// Prompt version under test, recorded in baselines and reports.
    #[serde(default = "default_prompt_version")]
    pub prompt_version: String,

    /// Model identifier, informational.
    #[serde(default)]
    pub model: Option<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            replay_dir: None,
            prompt_version: default_prompt_version(),
            model: None,
        }
    }
}

fn default_prompt_version() -> String {
    DEFAULT_PROMPT_VERSION.to_owned()
}

/// Optional rubric judge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JudgeConfig {
    /// Program and arguments. Receives the rubric messages on stdin and
    /// prints the judge's JSON on stdout.
    #[serde(default)]
    pub command: Vec<String>,

    /// Run the judge by default (`--judge`/`--no-judge` override).
    #[serde(default)]
    pub enabled: bool,
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl EvalConfig {
    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - Invalid TOML, unknown fields and inconsistent values are errors.
    ///
    /// # Errors
    /// Returns [`HarnessError::Config`] on I/O or parse errors and
    /// [`HarnessError::InvalidConfig`] when validation fails.
    pub fn load(path: &Path) -> Result<Self, HarnessError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(HarnessError::Config {
                    path: path.to_owned(),
                    detail: format!("could not read file: {e}"),
                });
            }
        };
        let config = Self::parse(&contents).map_err(|detail| HarnessError::Config {
            path: path.to_owned(),
            detail,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string. Does not validate.
    ///
    /// # Errors
    /// Returns a message with the line number on invalid TOML or unknown
    /// fields.
    pub fn parse(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| {
            let message = e.message().to_owned();
            match e.span() {
                Some(span) => {
                    let line = toml_str[..span.start]
                        .chars()
                        .filter(|&c| c == '\n')
                        .count()
                        + 1;
                    format!("line {line}: {message}")
                }
                None => message,
            }
        })
    }

    /// Reject values that would make a run meaningless.
    ///
    /// Called by [`load`](Self::load) and again by the CLI after flag
    /// overrides are applied.
    ///
    /// # Errors
    /// Returns [`HarnessError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let t = &self.thresholds;
        let invalid = |msg: String| Err(HarnessError::InvalidConfig(msg));

        if ![t.score_drift_warn, t.score_drift_error, t.subscore_drift_warn]
            .into_iter()
            .all(non_negative)
        {
            return invalid("drift thresholds must be non-negative numbers".to_owned());
        }
        if t.score_drift_warn > t.score_drift_error {
            return invalid(format!(
                "score_drift_warn ({}) must not exceed score_drift_error ({})",
                t.score_drift_warn, t.score_drift_error
            ));
        }
        if t.min_top_fixes > t.max_top_fixes {
            return invalid(format!(
                "min_top_fixes ({}) must not exceed max_top_fixes ({})",
                t.min_top_fixes, t.max_top_fixes
            ));
        }
        if t.min_findings > t.max_findings {
            return invalid(format!(
                "min_findings ({}) must not exceed max_findings ({})",
                t.min_findings, t.max_findings
            ));
        }
        if t.evidence_max_length > t.render_max_length {
            return invalid(format!(
                "evidence_max_length ({}) must not exceed render_max_length ({})",
                t.evidence_max_length, t.render_max_length
            ));
        }
        if !non_negative(t.score_consistency_slack) {
            return invalid("score_consistency_slack must be a non-negative number".to_owned());
        }
        if self.runner.concurrency == 0 {
            return invalid("runner.concurrency must be at least 1".to_owned());
        }
        if self.runner.call_timeout_secs == 0 {
            return invalid("runner.call_timeout_secs must be at least 1".to_owned());
        }
        if self.runner.run_timeout_secs == Some(0) {
            return invalid("runner.run_timeout_secs must be at least 1 when set".to_owned());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_owned());
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return invalid(format!(
                "retry.multiplier ({}) must be at least 1.0",
                self.retry.multiplier
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return invalid(format!(
                "retry.base_delay_ms ({}) must not exceed retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            ));
        }
        if self.generator.prompt_version.trim().is_empty() {
            return invalid("generator.prompt_version must not be empty".to_owned());
        }
        Ok(())
    }
}

fn non_negative(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
