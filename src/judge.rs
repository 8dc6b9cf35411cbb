//! LLM-as-judge: a rubric verdict on one generated output.
//!
//! The judge is advisory. Its scores are reported and aggregated, but a
//! failing or unavailable judge never changes a fixture's status; the
//! runner records a note instead.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::client::{Completion, PromptMessage};
use crate::error::CallError;
use crate::model::{FeedbackOutput, JudgeResult};
use crate::retry::{RetryPolicy, retry};

const RUBRIC: &str = "\
You are reviewing automated feedback written about a document. Grade the \
feedback, not the document.

Score each dimension from 0 to 10:
- evidence_quality: every quoted snippet and claim is supported by the document; nothing is invented.
- actionability: a reader knows exactly what to change and in what order.
- tone_fidelity: direct, constructive and specific; no filler or flattery.
- methodology_alignment: findings are categorized, prioritized and tied to evidence.

Then give final_score from 0 to 100 for the feedback as a whole, and list \
specific defects as issues. Use issue types such as invented_metric, \
ungrounded_quote, vague_fix, tone, inconsistent_score.

Answer with a single JSON object and nothing else:
{\"evidence_quality\": n, \"actionability\": n, \"tone_fidelity\": n, \
\"methodology_alignment\": n, \"final_score\": n, \
\"issues\": [{\"type\": \"...\", \"detail\": \"...\"}]}";

/// Upper bound of each rubric dimension.
const DIMENSION_MAX: f64 = 10.0;

/// Upper bound of `final_score`.
const FINAL_MAX: f64 = 100.0;

/// Why a judge verdict could not be produced.
#[derive(Debug, Error, PartialEq)]
pub enum JudgeError {
    /// The completion call failed after retries.
    #[error("judge call failed: {0}")]
    Call(#[from] CallError),

    /// The response did not contain a usable JSON verdict.
    #[error("judge response unparsable: {0}")]
    Parse(String),

    /// The verdict parsed but a score is outside its range.
    #[error("judge score out of range: {0}")]
    OutOfRange(String),
}

/// Rubric judge over an injected [`Completion`] client.
#[derive(Clone)]
pub struct JudgeClient {
    completion: Arc<dyn Completion>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl std::fmt::Debug for JudgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JudgeClient")
            .field("retry", &self.retry)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl JudgeClient {
    /// Wrap `completion`. Judge calls use `retry`'s backoff with at most
    /// one retry, each attempt bounded by `call_timeout`.
    pub fn new(completion: Arc<dyn Completion>, retry: &RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            completion,
            retry: retry.for_judge(),
            call_timeout,
        }
    }

    /// Judge one output against its source document.
    ///
    /// # Errors
    /// Returns [`JudgeError`] when the call fails after retries, or when the
    /// response is not a valid verdict.
    pub async fn run_judge(
        &self,
        document: &str,
        output: &FeedbackOutput,
    ) -> Result<JudgeResult, JudgeError> {
        let messages = build_prompt(document, output);
        let completion = &*self.completion;
        let messages = messages.as_slice();
        let call_timeout = self.call_timeout;
        let attempted = retry(&self.retry, "judge", move |_| async move {
            match tokio::time::timeout(call_timeout, completion.complete(messages)).await {
                Ok(result) => result,
                Err(_) => Err(CallError::Timeout {
                    secs: call_timeout.as_secs().max(1),
                }),
            }
        })
        .await;
        let response = attempted.result?;
        let verdict = parse_response(&response)?;
        tracing::debug!(
            final_score = verdict.final_score,
            issues = verdict.issues.len(),
            attempts = attempted.attempts,
            "judge verdict"
        );
        Ok(verdict)
    }
}

/// The rubric conversation for one output.
#[must_use]
pub fn build_prompt(document: &str, output: &FeedbackOutput) -> Vec<PromptMessage> {
    let feedback = serde_json::to_string_pretty(output).unwrap_or_else(|_| format!("{output:?}"));
    vec![
        PromptMessage::system(RUBRIC),
        PromptMessage::user(format!(
            "<document>\n{document}\n</document>\n\n<feedback>\n{feedback}\n</feedback>"
        )),
    ]
}

/// Parse and validate a judge response.
///
/// Accepts a JSON object, or a string holding one (optionally inside a
/// Markdown code fence or surrounded by prose).
///
/// # Errors
/// [`JudgeError::Parse`] when no verdict can be extracted,
/// [`JudgeError::OutOfRange`] when a score is outside its range.
pub fn parse_response(response: &Value) -> Result<JudgeResult, JudgeError> {
    let verdict: JudgeResult = match response {
        Value::Object(_) => serde_json::from_value(response.clone())
            .map_err(|e| JudgeError::Parse(e.to_string()))?,
        Value::String(text) => {
            let body = extract_json_object(text)
                .ok_or_else(|| JudgeError::Parse("no JSON object in response text".to_owned()))?;
            serde_json::from_str(body).map_err(|e| JudgeError::Parse(e.to_string()))?
        }
        other => {
            return Err(JudgeError::Parse(format!(
                "expected an object or string, got {other}"
            )));
        }
    };
    validate(&verdict)?;
    Ok(verdict)
}

/// Locate the JSON object inside free text: the body of a code fence when
/// present, otherwise the span from the first `{` to the last `}`.
fn extract_json_object(text: &str) -> Option<&str> {
    let text = match text.find("```") {
        Some(start) => {
            let after = &text[start + 3..];
            // Skip the info string (`json`) up to the end of the line.
            let body_start = after.find('\n').map_or(0, |i| i + 1);
            let body = &after[body_start..];
            body.find("```").map_or(body, |end| &body[..end])
        }
        None => text,
    };
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn validate(v: &JudgeResult) -> Result<(), JudgeError> {
    for (name, value) in [
        ("evidence_quality", v.evidence_quality),
        ("actionability", v.actionability),
        ("tone_fidelity", v.tone_fidelity),
        ("methodology_alignment", v.methodology_alignment),
    ] {
        if !(0.0..=DIMENSION_MAX).contains(&value) {
            return Err(JudgeError::OutOfRange(format!(
                "{name} = {value}, expected 0-{DIMENSION_MAX}"
            )));
        }
    }
    if !(0.0..=FINAL_MAX).contains(&v.final_score) {
        return Err(JudgeError::OutOfRange(format!(
            "final_score = {}, expected 0-{FINAL_MAX}",
            v.final_score
        )));
    }
    Ok(())
}
