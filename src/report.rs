//! Human-facing output: the Markdown report file and the terminal summary.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::HarnessError;
use crate::model::{DriftReport, EvalRunOutput, FixtureResult, FixtureStatus, JudgeResult};

/// Verdict line used by both the report and the summary.
fn verdict(output: &EvalRunOutput) -> &'static str {
    if output.ok { "OK" } else { "FAILED" }
}

/// Escape a value for a Markdown table cell.
fn cell(s: &str) -> String {
    s.replace('|', "\\|").replace("\r\n", " ").replace(['\n', '\r'], " ")
}

fn fmt_score(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.0}")
    } else {
        format!("{v:.1}")
    }
}

/// Render the whole run as a Markdown document.
#[must_use]
pub fn generate_markdown_report(output: &EvalRunOutput) -> String {
    let mut md = String::new();
    let m = &output.metadata;

    let _ = writeln!(md, "# Feedback eval report: {}\n", verdict(output));

    md.push_str("| Field | Value |\n|---|---|\n");
    let rows: [(&str, String); 9] = [
        ("Run", m.run_id.clone()),
        ("Started", m.started_at.clone()),
        ("Finished", m.finished_at.clone()),
        ("Prompt version", m.prompt_version.clone()),
        ("Model", m.model.clone().unwrap_or_else(|| "-".to_owned())),
        (
            "Baseline",
            match (&m.baseline_path, &m.baseline_created_at) {
                (Some(p), Some(at)) => format!("{p} (captured {at})"),
                (Some(p), None) => p.clone(),
                _ => "none".to_owned(),
            },
        ),
        ("Version policy", m.version_policy.clone()),
        ("Judge", if m.judge_enabled { "enabled" } else { "disabled" }.to_owned()),
        ("Aborted", if m.aborted { "yes" } else { "no" }.to_owned()),
    ];
    for (k, v) in rows {
        let _ = writeln!(md, "| {k} | {} |", cell(&v));
    }

    let c = &output.counts;
    let _ = writeln!(
        md,
        "\n## Summary\n\n| PASS | WARN | FAIL | Total |\n|---|---|---|---|\n| {} | {} | {} | {} |",
        c.pass,
        c.warn,
        c.fail,
        c.total()
    );

    if let Some(j) = &output.judge_summary {
        let _ = writeln!(
            md,
            "\nJudge: {} verdict(s), mean {}, min {}, max {}, {} issue(s).",
            j.count,
            fmt_score(j.mean),
            fmt_score(j.min),
            fmt_score(j.max),
            j.issue_count
        );
    }

    md.push_str("\n## Fixtures\n");
    for r in &output.results {
        render_fixture(&mut md, r);
    }
    md
}

fn render_fixture(md: &mut String, r: &FixtureResult) {
    let _ = writeln!(md, "\n### [{}] {}\n", r.status, r.fixture_id);
    let _ = writeln!(md, "Attempts: {}, duration: {} ms", r.attempts, r.duration_ms);

    let failed = r.failed_checks();
    if !failed.is_empty() {
        md.push_str("\n| Check | Severity | Path | Message |\n|---|---|---|---|\n");
        for c in failed {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} |",
                c.check_name,
                c.severity,
                cell(c.path.as_deref().unwrap_or("-")),
                cell(&c.message)
            );
        }
    }

    let _ = writeln!(md, "\n{}", drift_line(&r.drift));

    if let Some(j) = &r.judge {
        render_judge(md, j);
    }

    for note in &r.notes {
        let _ = writeln!(md, "\n> Note: {note}");
    }

    if r.status != FixtureStatus::Pass
        && let Some(raw) = &r.raw_output
    {
        let pretty = serde_json::to_string_pretty(raw).unwrap_or_else(|_| raw.to_string());
        let _ = writeln!(
            md,
            "\n<details>\n<summary>Raw output</summary>\n\n```json\n{pretty}\n```\n\n</details>"
        );
    }
}

/// One-line description of a drift comparison.
#[must_use]
pub fn drift_line(d: &DriftReport) -> String {
    if let Some(reason) = &d.skipped {
        return format!("Drift: skipped ({reason})");
    }
    let mut line = format!("Drift: {}", d.status);
    if let (Some(delta), Some(base), Some(cur)) = (d.delta, d.baseline_score, d.current_score) {
        let _ = write!(
            line,
            ", delta {} (baseline {}, current {})",
            fmt_score(delta),
            fmt_score(base),
            fmt_score(cur)
        );
    }
    if !d.subscore_breaches.is_empty() {
        let _ = write!(line, ", subscore breaches: {}", d.subscore_breaches.join(", "));
    }
    line
}

fn render_judge(md: &mut String, j: &JudgeResult) {
    let _ = writeln!(
        md,
        "\nJudge: final {} (evidence {}, actionability {}, tone {}, methodology {})",
        fmt_score(j.final_score),
        fmt_score(j.evidence_quality),
        fmt_score(j.actionability),
        fmt_score(j.tone_fidelity),
        fmt_score(j.methodology_alignment)
    );
    for issue in &j.issues {
        let _ = writeln!(md, "- {}: {}", issue.kind, issue.detail);
    }
}

/// Write the Markdown report, creating parent directories as needed.
///
/// # Errors
/// [`HarnessError::Io`] when the file cannot be written.
pub fn write_report(output: &EvalRunOutput, path: &Path) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, generate_markdown_report(output))?;
    tracing::info!(path = %path.display(), "report written");
    Ok(())
}

/// Terminal summary lines, one per fixture, then totals and verdict.
#[must_use]
pub fn summary_lines(output: &EvalRunOutput) -> Vec<String> {
    let mut lines: Vec<String> = output
        .results
        .iter()
        .map(|r| {
            let first = r
                .failed_checks()
                .first()
                .map(|c| format!("{}: {}", c.check_name, c.message))
                .or_else(|| {
                    (r.drift.status > crate::model::DriftStatus::None).then(|| drift_line(&r.drift))
                });
            match first {
                Some(msg) => format!("[{}] {} - {}", r.status, r.fixture_id, msg),
                None => format!("[{}] {}", r.status, r.fixture_id),
            }
        })
        .collect();
    let c = &output.counts;
    lines.push(format!(
        "{} fixture(s): {} passed, {} warned, {} failed",
        c.total(),
        c.pass,
        c.warn,
        c.fail
    ));
    if output.metadata.aborted {
        lines.push("Run was cancelled before every fixture finished.".to_owned());
    }
    lines.push(format!("Verdict: {}", verdict(output)));
    lines
}

/// Print [`summary_lines`] to stdout.
pub fn print_summary(output: &EvalRunOutput) {
    for line in summary_lines(output) {
        println!("{line}");
    }
}

/// Process exit code for a run: `0` without FAIL, `1` otherwise.
#[must_use]
pub const fn exit_code(output: &EvalRunOutput) -> u8 {
    if output.ok { 0 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BaselineSkip, CheckCode, CheckResult, DriftStatus, FixtureId, JudgeIssue, RunMetadata,
        Severity,
    };
    use serde_json::json;

    fn meta() -> RunMetadata {
        RunMetadata {
            run_id: "run-1".into(),
            started_at: "2026-01-01T00:00:00Z".into(),
            finished_at: "2026-01-01T00:01:00Z".into(),
            prompt_version: "v1".into(),
            model: None,
            baseline_path: Some("baseline.json".into()),
            baseline_created_at: Some("2025-12-01T00:00:00Z".into()),
            judge_enabled: true,
            version_policy: "exact".into(),
            aborted: false,
        }
    }

    fn passing(id: &str) -> FixtureResult {
        FixtureResult {
            fixture_id: FixtureId::new(id).unwrap(),
            content_hash: "h".into(),
            status: FixtureStatus::Pass,
            raw_output: Some(json!({ "score": 70 })),
            checks: vec![CheckResult::pass(CheckCode::ShapeParse, Severity::Error, "ok")],
            drift: DriftReport {
                status: DriftStatus::None,
                delta: Some(2.0),
                current_score: Some(72.0),
                baseline_score: Some(70.0),
                ..DriftReport::default()
            },
            judge: Some(JudgeResult {
                evidence_quality: 8.0,
                actionability: 7.0,
                tone_fidelity: 9.0,
                methodology_alignment: 6.0,
                final_score: 78.0,
                issues: vec![JudgeIssue {
                    kind: "vague_fix".into(),
                    detail: "fix 3 is generic".into(),
                }],
            }),
            notes: vec![],
            attempts: 1,
            duration_ms: 12,
        }
    }

    fn failing(id: &str) -> FixtureResult {
        FixtureResult {
            fixture_id: FixtureId::new(id).unwrap(),
            content_hash: "h".into(),
            status: FixtureStatus::Fail,
            raw_output: Some(json!({ "score": 40 })),
            checks: vec![
                CheckResult::fail(CheckCode::LengthVerbose, Severity::Warning, "summary is long")
                    .at("summary"),
                CheckResult::fail(
                    CheckCode::GroundingRewriteOriginal,
                    Severity::Error,
                    "quote | not found\nin document",
                )
                .at("rewrites[0].original"),
            ],
            drift: DriftReport::skipped(BaselineSkip::Missing),
            judge: None,
            notes: vec!["judge unavailable: offline".into()],
            attempts: 2,
            duration_ms: 30,
        }
    }

    fn run() -> EvalRunOutput {
        EvalRunOutput::assemble(vec![failing("bravo"), passing("alpha")], meta())
    }

    #[test]
    fn report_covers_every_section() {
        let md = generate_markdown_report(&run());
        assert!(md.starts_with("# Feedback eval report: FAILED"));
        assert!(md.contains("| Prompt version | v1 |"));
        assert!(md.contains("| 1 | 0 | 1 | 2 |"));
        assert!(md.contains("### [PASS] alpha"));
        assert!(md.contains("### [FAIL] bravo"));
        assert!(md.contains("Judge: final 78"));
        assert!(md.contains("- vague_fix: fix 3 is generic"));
        assert!(md.contains("> Note: judge unavailable: offline"));
        assert!(md.contains("Drift: none, delta 2 (baseline 70, current 72)"));
    }

    #[test]
    fn errors_listed_before_warnings() {
        let md = generate_markdown_report(&run());
        let err = md.find("grounding.rewrite_original").unwrap();
        let warn = md.find("length.verbose").unwrap();
        assert!(err < warn);
    }

    #[test]
    fn table_cells_are_escaped() {
        let md = generate_markdown_report(&run());
        assert!(md.contains("quote \\| not found in document"));
    }

    #[test]
    fn raw_output_only_for_non_pass() {
        let md = generate_markdown_report(&run());
        assert_eq!(md.matches("<details>").count(), 1);
        let details = md.find("<details>").unwrap();
        assert!(details > md.find("### [FAIL] bravo").unwrap());
    }

    #[test]
    fn drift_line_variants() {
        assert_eq!(
            drift_line(&DriftReport::skipped(BaselineSkip::NoBaselineFile)),
            format!("Drift: skipped ({})", BaselineSkip::NoBaselineFile)
        );
        let d = DriftReport {
            status: DriftStatus::Error,
            delta: Some(30.0),
            current_score: Some(50.0),
            baseline_score: Some(80.0),
            subscore_breaches: vec!["impact".into()],
            ..DriftReport::default()
        };
        assert_eq!(
            drift_line(&d),
            "Drift: error, delta 30 (baseline 80, current 50), subscore breaches: impact"
        );
    }

    #[test]
    fn summary_lists_first_failure_and_verdict() {
        let lines = summary_lines(&run());
        assert_eq!(lines[0], "[PASS] alpha");
        assert!(lines[1].starts_with("[FAIL] bravo - grounding.rewrite_original"));
        assert_eq!(lines[2], "2 fixture(s): 1 passed, 0 warned, 1 failed");
        assert_eq!(lines.last().unwrap(), "Verdict: FAILED");
    }

    #[test]
    fn exit_code_follows_ok() {
        assert_eq!(exit_code(&run()), 1);
        let ok = EvalRunOutput::assemble(vec![passing("alpha")], meta());
        assert_eq!(exit_code(&ok), 0);
    }

    #[test]
    fn write_report_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/report.md");
        write_report(&run(), &path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("bravo"));
    }
}
