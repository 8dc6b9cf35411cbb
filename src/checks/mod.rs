//! Check engine: deterministic validators over one generated output and its
//! source fixture.
//!
//! [`run_all_checks`] is a pure function. The same fixture, output and
//! thresholds always produce the same list of results in the same order;
//! it is the only fully reliable signal the harness has.
//!
//! Order of evaluation:
//!
//! 1. [`shape`] on the raw JSON value.
//! 2. Typed deserialization into [`FeedbackOutput`] (failure is an error
//!    result, `shape.parse`, and stops here).
//! 3. [`grounding`], [`concreteness`], [`length`], [`consistency`] on the
//!    typed output.

pub mod concreteness;
pub mod consistency;
pub mod grounding;
pub mod length;
pub mod normalize;
pub mod shape;

use serde_json::Value;

use crate::config::ThresholdConfig;
use crate::model::{CheckCode, CheckResult, FeedbackOutput, Fixture, Severity};

/// Check results plus the typed output when it could be parsed.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckOutcome {
    /// Every result, in engine order.
    pub checks: Vec<CheckResult>,
    /// The typed output, `None` when deserialization failed.
    pub parsed: Option<FeedbackOutput>,
}

impl CheckOutcome {
    /// Whether any check failed with error severity.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.checks.iter().any(CheckResult::is_error)
    }
}

/// Run every check and keep the typed output for drift and judge.
#[must_use]
pub fn evaluate_output(fixture: &Fixture, output: &Value, t: &ThresholdConfig) -> CheckOutcome {
    let (mut checks, object_ok) = shape::check_shape(output, t);
    if !object_ok {
        return CheckOutcome {
            checks,
            parsed: None,
        };
    }

    let parsed = match FeedbackOutput::from_value(output) {
        Ok(parsed) => {
            checks.push(CheckResult::pass(
                CheckCode::ShapeParse,
                Severity::Error,
                "output parses into the feedback structure",
            ));
            parsed
        }
        Err(e) => {
            checks.push(
                CheckResult::fail(
                    CheckCode::ShapeParse,
                    Severity::Error,
                    format!("output does not parse into the feedback structure: {e}"),
                )
                .at("$"),
            );
            return CheckOutcome {
                checks,
                parsed: None,
            };
        }
    };

    checks.extend(grounding::check_grounding(fixture, &parsed));
    checks.extend(concreteness::check_concreteness(fixture, &parsed));
    checks.extend(length::check_length(&parsed, t));
    checks.extend(consistency::check_consistency(&parsed, t));

    CheckOutcome {
        checks,
        parsed: Some(parsed),
    }
}

/// Run every check against one output.
#[must_use]
pub fn run_all_checks(fixture: &Fixture, output: &Value, t: &ThresholdConfig) -> Vec<CheckResult> {
    evaluate_output(fixture, output, t).checks
}
