//! Shared test helpers for feedback-eval integration tests.
//!
//! Every test works in its own temp directory holding a fixture corpus,
//! recorded generator outputs and, when needed, a `feval.toml`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Mutex;

use async_trait::async_trait;
use feedback_eval::client::{GenerationRequest, Generator};
use feedback_eval::error::CallError;
use serde_json::{Value, json};
use tempfile::TempDir;

pub const DOCUMENT: &str = "Jane Doe\nBackend Engineer\n\
    Worked on the payments API for the checkout team.\n\
    Mentored two junior engineers and ran the on-call rotation.\n\
    Skills: Rust, Go, PostgreSQL, Kubernetes";

/// An output that passes every check against [`DOCUMENT`].
pub fn good_output(score: f64) -> Value {
    json!({
        "score": score,
        "subscores": { "impact": 65, "clarity": 80, "structure": 74 },
        "summary": "Solid backend experience; impact statements lack numbers.",
        "top_fixes": [
            { "title": "Quantify impact", "detail": "Add metrics to the payments bullet.", "priority": 1 },
            { "title": "Tighten summary", "detail": "Cut the generic opening line.", "priority": 2 },
            { "title": "Group skills", "detail": "Split languages from tools.", "priority": 3 }
        ],
        "findings": [{
            "category": "impact",
            "severity": "high",
            "evidence": "Worked on the payments API",
            "issue": "No outcome is stated.",
            "suggestion": "State what changed because of the work."
        }],
        "rewrites": [{
            "kind": "impact",
            "original": "Worked on the payments API",
            "rewritten": "Rebuilt the payments API, cutting checkout errors by 40%",
            "rationale": "Leads with the outcome."
        }]
    })
}

/// [`good_output`] with a rewrite quoting text the document never says.
pub fn hallucinated_output(score: f64) -> Value {
    let mut v = good_output(score);
    v["rewrites"][0]["original"] = json!("Led a team of 40 engineers at Google");
    v
}

/// A temp directory laid out the way `feval` expects by default:
/// `fixtures/`, `recordings/`, `baseline.json`, `eval-report.md`.
pub struct EvalDir {
    pub dir: TempDir,
}

impl EvalDir {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("fixtures")).unwrap();
        std::fs::create_dir_all(dir.path().join("recordings")).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn fixtures_dir(&self) -> PathBuf {
        self.path().join("fixtures")
    }

    pub fn recordings_dir(&self) -> PathBuf {
        self.path().join("recordings")
    }

    pub fn baseline_path(&self) -> PathBuf {
        self.path().join("baseline.json")
    }

    /// Write `fixtures/<id>.json` with an inline document.
    pub fn add_fixture(&self, id: &str, document: &str, tags: &[&str]) {
        let body = json!({ "id": id, "document": document, "tags": tags });
        std::fs::write(
            self.fixtures_dir().join(format!("{id}.json")),
            serde_json::to_string_pretty(&body).unwrap(),
        )
        .unwrap();
    }

    /// Write `recordings/<id>.json`.
    pub fn record(&self, id: &str, output: &Value) {
        std::fs::write(
            self.recordings_dir().join(format!("{id}.json")),
            serde_json::to_string_pretty(output).unwrap(),
        )
        .unwrap();
    }

    pub fn write_config(&self, toml: &str) {
        std::fs::write(self.path().join("feval.toml"), toml).unwrap();
    }
}

/// Run the `feval` binary in `dir`.
pub fn feval_in(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_feval"))
        .args(args)
        .current_dir(dir)
        .env_remove("FEVAL_CONFIG")
        .env_remove("FEVAL_LOG")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute feval")
}

/// Run `feval` and assert the exit code. Returns stdout.
pub fn feval_exit(dir: &Path, args: &[&str], code: i32) -> String {
    let out = feval_in(dir, args);
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(
        out.status.code(),
        Some(code),
        "feval {} exited with {:?}:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
        out.status.code(),
    );
    stdout
}

/// Generator serving fixed outputs per fixture id, counting calls.
pub struct MapGenerator {
    outputs: HashMap<String, Result<Value, CallError>>,
    pub calls: Mutex<Vec<String>>,
}

impl MapGenerator {
    pub fn new(outputs: impl IntoIterator<Item = (&'static str, Result<Value, CallError>)>) -> Self {
        Self {
            outputs: outputs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Generator for MapGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, CallError> {
        let id = request.fixture_id.to_string();
        self.calls.lock().unwrap().push(id.clone());
        self.outputs
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Err(CallError::Rejected(format!("no output for {id}"))))
    }

    fn describe(&self) -> String {
        "map".to_owned()
    }
}
