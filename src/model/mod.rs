//! Data model for the evaluation harness.
//!
//! - [`fixture`]: evaluation inputs and their content hash.
//! - [`baseline`]: accepted scores, lookup validity, atomic persistence.
//! - [`output`]: structural type for the generated feedback JSON.
//! - [`result`]: check results, drift, per-fixture and per-run verdicts.

pub mod baseline;
pub mod fixture;
pub mod output;
pub mod result;

pub use baseline::{Baseline, BaselineFixture, BaselineLookup, VersionPolicy};
pub use fixture::{Fixture, FixtureId, FixtureMode};
pub use output::FeedbackOutput;
pub use result::{
    BaselineSkip, CheckCode, CheckResult, DriftReport, DriftStatus, EvalRunOutput, FixtureResult,
    FixtureStatus, JudgeIssue, JudgeResult, JudgeSummary, RunMetadata, Severity, StatusCounts,
};
