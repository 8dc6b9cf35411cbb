//! Client seams for the feature under test and the judge.
//!
//! The harness never talks to a model provider directly. It calls two
//! injectable traits:
//!
//! - [`Generator`]: produce the feedback JSON for one fixture.
//! - [`Completion`]: answer a list of chat messages (used by the judge).
//!
//! Two implementations ship with the crate. [`CommandClient`] runs a
//! configured program per call and speaks JSON over stdin/stdout, so any
//! language can host the real provider client. [`ReplayGenerator`] serves
//! previously recorded outputs from a directory.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::AsyncWriteExt as _;

use crate::error::CallError;
use crate::model::{Fixture, FixtureId, FixtureMode};

/// Exit status a command client uses to signal "rate limited, try later"
/// (`EX_TEMPFAIL` from `sysexits.h`).
pub const EXIT_TEMPFAIL: i32 = 75;

/// Longest stderr tail kept in error messages.
const STDERR_TAIL: usize = 400;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Everything the feature needs to produce feedback for one fixture.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Fixture being evaluated.
    pub fixture_id: FixtureId,
    /// Generation variant.
    pub mode: FixtureMode,
    /// Source document.
    pub document: String,
    /// Extra context such as a target role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Prompt version under test.
    pub prompt_version: String,
    /// Model identifier, when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl GenerationRequest {
    /// Build the request for `fixture`.
    #[must_use]
    pub fn for_fixture(fixture: &Fixture, prompt_version: &str, model: Option<&str>) -> Self {
        Self {
            fixture_id: fixture.id.clone(),
            mode: fixture.mode,
            document: fixture.document.clone(),
            context: fixture.context.clone(),
            prompt_version: prompt_version.to_owned(),
            model: model.map(str::to_owned),
        }
    }
}

/// Chat role of a prompt message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions.
    System,
    /// Content to act on.
    User,
}

/// One chat message sent to a [`Completion`] client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Who is speaking.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl PromptMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Produces the feature's structured feedback for one fixture.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate feedback. The returned JSON is validated by the check
    /// engine, not here.
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, CallError>;

    /// Short description for logs and report metadata.
    fn describe(&self) -> String;
}

/// Answers a chat prompt with JSON (or a JSON-bearing string).
#[async_trait]
pub trait Completion: Send + Sync {
    /// Complete the conversation.
    async fn complete(&self, messages: &[PromptMessage]) -> Result<Value, CallError>;
}

// ---------------------------------------------------------------------------
// CommandClient
// ---------------------------------------------------------------------------

/// Runs a program per call: JSON envelope on stdin, JSON on stdout.
///
/// Generation envelope: `{"kind": "generate", "request": {...}}`.
/// Completion envelope: `{"kind": "complete", "messages": [...]}`.
///
/// Exit code [`EXIT_TEMPFAIL`] maps to [`CallError::RateLimited`], any
/// other non-zero exit to [`CallError::Transport`], unparsable stdout to
/// [`CallError::Malformed`], and an elapsed call timeout to
/// [`CallError::Timeout`] (the child is killed).
#[derive(Clone, Debug)]
pub struct CommandClient {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClient {
    /// Build a client from an argv list. Returns `None` for an empty list.
    #[must_use]
    pub fn new(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    /// The command line, for display.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn call(&self, envelope: &Value) -> Result<Value, CallError> {
        let input = serde_json::to_vec(envelope)
            .map_err(|e| CallError::Rejected(format!("could not encode request: {e}")))?;

        match tokio::time::timeout(self.timeout, self.exchange(&input)).await {
            Ok(result) => result,
            Err(_) => Err(CallError::Timeout {
                secs: self.timeout.as_secs().max(1),
            }),
        }
    }

    async fn exchange(&self, input: &[u8]) -> Result<Value, CallError> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                    CallError::Rejected(format!("cannot run '{}': {e}", self.program))
                }
                _ => CallError::Transport(format!("failed to spawn '{}': {e}", self.program)),
            })?;

        // Feed stdin while stdout drains; a child may answer before it has
        // read the whole request. Dropping the handle closes the pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(input).await {
                // A child that exits without reading its input is judged by
                // its exit status and stdout, not by the broken pipe.
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output
            .map_err(|e| CallError::Transport(format!("failed to wait for '{}': {e}", self.program)))?;
        fed.map_err(|e| CallError::Transport(format!("failed to write request: {e}")))?;

        if !output.status.success() {
            let stderr = stderr_tail(&output.stderr);
            return Err(match output.status.code() {
                Some(EXIT_TEMPFAIL) => CallError::RateLimited(stderr),
                Some(code) => CallError::Transport(format!("exit code {code}: {stderr}")),
                None => CallError::Transport(format!("terminated by signal: {stderr}")),
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|e| {
            CallError::Malformed(format!(
                "stdout is not JSON ({e}): {}",
                crate::model::result::preview(&String::from_utf8_lossy(&output.stdout), 120)
            ))
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL {
        return text.to_owned();
    }
    let tail: String = text.chars().skip(count - STDERR_TAIL).collect();
    format!("…{tail}")
}

#[async_trait]
impl Generator for CommandClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, CallError> {
        self.call(&json!({ "kind": "generate", "request": request }))
            .await
    }

    fn describe(&self) -> String {
        format!("command: {}", self.command_line())
    }
}

#[async_trait]
impl Completion for CommandClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<Value, CallError> {
        self.call(&json!({ "kind": "complete", "messages": messages }))
            .await
    }
}

// ---------------------------------------------------------------------------
// ReplayGenerator
// ---------------------------------------------------------------------------

/// Serves recorded outputs from `<dir>/<fixture-id>.json`.
#[derive(Clone, Debug)]
pub struct ReplayGenerator {
    dir: PathBuf,
}

impl ReplayGenerator {
    /// Replay from `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Recording path for a fixture.
    #[must_use]
    pub fn path_for(&self, id: &FixtureId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// The replay directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Generator for ReplayGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, CallError> {
        let path = self.path_for(&request.fixture_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CallError::Rejected(format!(
                    "no recorded output at {}",
                    path.display()
                )));
            }
            Err(e) => {
                return Err(CallError::Transport(format!(
                    "could not read {}: {e}",
                    path.display()
                )));
            }
        };
        serde_json::from_str(&text)
            .map_err(|e| CallError::Malformed(format!("{} is not JSON: {e}", path.display())))
    }

    fn describe(&self) -> String {
        format!("replay: {}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixture::fixture_for_tests;

    fn request() -> GenerationRequest {
        GenerationRequest::for_fixture(&fixture_for_tests("alpha", "doc text"), "v1", None)
    }

    fn sh(script: &str, timeout_ms: u64) -> CommandClient {
        CommandClient::new(
            &["sh".to_owned(), "-c".to_owned(), script.to_owned()],
            Duration::from_millis(timeout_ms),
        )
        .unwrap()
    }

    #[test]
    fn empty_argv_yields_no_client() {
        assert!(CommandClient::new(&[], Duration::from_secs(1)).is_none());
        assert!(CommandClient::new(&[String::new()], Duration::from_secs(1)).is_none());
    }

    #[test]
    fn request_serializes_without_absent_options() {
        let v = serde_json::to_value(request()).unwrap();
        assert_eq!(v["fixture_id"], "alpha");
        assert_eq!(v["mode"], "full");
        assert!(v.get("context").is_none());
        assert!(v.get("model").is_none());
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let long = "x".repeat(STDERR_TAIL) + "END";
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with('…'));
        assert!(tail.ends_with("END"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_receives_envelope_and_returns_json() {
        // Echo back the fixture id from the request envelope.
        let client = sh(
            r#"line=$(cat); case "$line" in *'"kind":"generate"'*'"fixture_id":"alpha"'*) echo '{"ok":true}';; *) echo '{"ok":false}';; esac"#,
            5_000,
        );
        let v = client.generate(&request()).await.unwrap();
        assert_eq!(v, json!({ "ok": true }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tempfail_exit_is_rate_limited() {
        let client = sh("cat >/dev/null; echo busy >&2; exit 75", 5_000);
        let err = client.generate(&request()).await.unwrap_err();
        assert_eq!(err, CallError::RateLimited("busy".into()));
        assert!(err.is_transient());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn other_exit_is_transport() {
        let client = sh("cat >/dev/null; exit 3", 5_000);
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, CallError::Transport(ref m) if m.contains("exit code 3")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_json_stdout_is_malformed() {
        let client = sh("cat >/dev/null; echo 'Sure! Here is your feedback'", 5_000);
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, CallError::Malformed(_)));
        assert!(err.is_transient());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn large_output_before_reading_input_does_not_stall() {
        // 256 KiB of stdout before stdin is touched, against a request well
        // past the pipe buffer.
        let client = sh(
            r#"head -c 262144 /dev/zero | tr '\0' ' '; cat >/dev/null; echo '{"ok":true}'"#,
            10_000,
        );
        let big = fixture_for_tests("alpha", &"Shipped the billing service. ".repeat(20_000));
        let request = GenerationRequest::for_fixture(&big, "v1", None);
        let v = client.generate(&request).await.unwrap();
        assert_eq!(v, json!({ "ok": true }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let client = sh("sleep 5", 100);
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, CallError::Timeout { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn completion_envelope_carries_messages() {
        let client = sh(
            r#"line=$(cat); case "$line" in *'"kind":"complete"'*'"role":"system"'*) echo '"{\"ok\":1}"';; *) exit 9;; esac"#,
            5_000,
        );
        let v = client
            .complete(&[PromptMessage::system("rubric"), PromptMessage::user("doc")])
            .await
            .unwrap();
        assert_eq!(v, Value::String("{\"ok\":1}".into()));
    }

    #[tokio::test]
    async fn missing_program_is_rejected() {
        let client = CommandClient::new(
            &["/nonexistent/feval-generator".to_owned()],
            Duration::from_secs(1),
        )
        .unwrap();
        let err = client.generate(&request()).await.unwrap_err();
        assert!(matches!(err, CallError::Rejected(_)));
    }

    #[tokio::test]
    async fn replay_reads_recorded_output() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.json"), r#"{"score": 70}"#).unwrap();
        let replay = ReplayGenerator::new(dir.path());
        let v = replay.generate(&request()).await.unwrap();
        assert_eq!(v["score"], 70);
    }

    #[tokio::test]
    async fn replay_missing_recording_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReplayGenerator::new(dir.path())
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Rejected(ref m) if m.contains("alpha.json")));
    }

    #[tokio::test]
    async fn replay_bad_json_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.json"), "{ not json").unwrap();
        let err = ReplayGenerator::new(dir.path())
            .generate(&request())
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Malformed(_)));
    }
}
