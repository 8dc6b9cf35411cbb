//! `feval` binary: exit codes, report file, capture refusal.

mod common;
use common::*;

fn corpus_with_recordings() -> EvalDir {
    let env = EvalDir::new();
    for id in ["alpha", "bravo"] {
        env.add_fixture(id, DOCUMENT, &["smoke"]);
        env.record(id, &good_output(72.0));
    }
    env
}

#[test]
fn fixtures_lists_corpus_and_coverage() {
    let env = corpus_with_recordings();
    let stdout = feval_exit(env.path(), &["fixtures", "--json"], 0);
    let listing: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let entries = listing.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["id"], "alpha");
    assert_eq!(entries[0]["baseline"], "no baseline file");
    assert_eq!(entries[0]["content_hash"].as_str().unwrap().len(), 64);
}

#[test]
fn capture_then_run_passes() {
    let env = corpus_with_recordings();
    let stdout = feval_exit(
        env.path(),
        &["capture", "--replay", "recordings", "--prompt-version", "v1"],
        0,
    );
    assert!(stdout.contains("[ACCEPT] alpha"));
    assert!(env.baseline_path().exists());

    let stdout = feval_exit(
        env.path(),
        &["run", "--replay", "recordings", "--prompt-version", "v1"],
        0,
    );
    assert!(stdout.contains("[PASS] alpha"));
    assert!(stdout.contains("Verdict: OK"));
    let report = std::fs::read_to_string(env.path().join("eval-report.md")).unwrap();
    assert!(report.contains("# Feedback eval report: OK"));

    let listing = feval_exit(env.path(), &["fixtures", "--json"], 0);
    assert!(listing.contains("\"covered\""));
}

#[test]
fn hallucinated_output_fails_run() {
    let env = corpus_with_recordings();
    env.record("bravo", &hallucinated_output(72.0));
    let stdout = feval_exit(env.path(), &["run", "--replay", "recordings", "--json"], 1);
    let output: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(output["ok"], false);
    assert_eq!(output["counts"]["fail"], 1);
    assert_eq!(output["results"][1]["fixture_id"], "bravo");
    assert_eq!(output["results"][1]["status"], "FAIL");
}

#[test]
fn missing_recording_fails_only_that_fixture() {
    let env = corpus_with_recordings();
    std::fs::remove_file(env.recordings_dir().join("alpha.json")).unwrap();
    let stdout = feval_exit(env.path(), &["run", "--replay", "recordings"], 1);
    assert!(stdout.contains("[FAIL] alpha - generation.call_failed"));
    assert!(stdout.contains("[PASS] bravo"));
}

#[test]
fn capture_refuses_partial_baseline() {
    let env = corpus_with_recordings();
    env.record("bravo", &hallucinated_output(72.0));
    std::fs::write(env.baseline_path(), "untouched").unwrap();

    let out = feval_in(env.path(), &["capture", "--replay", "recordings"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("--allow-partial"));
    assert_eq!(std::fs::read_to_string(env.baseline_path()).unwrap(), "untouched");

    feval_exit(
        env.path(),
        &["capture", "--replay", "recordings", "--allow-partial"],
        0,
    );
    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(env.baseline_path()).unwrap()).unwrap();
    assert!(written["fixtures"]["alpha"].is_object());
    assert!(written["fixtures"]["bravo"].is_null());
}

#[test]
fn unwritable_report_still_prints_results() {
    let env = corpus_with_recordings();
    // A regular file where the report directory should be.
    std::fs::write(env.path().join("blocker"), "").unwrap();

    let out = feval_in(
        env.path(),
        &["run", "--replay", "recordings", "--report", "blocker/report.md", "--json"],
    );
    assert_eq!(out.status.code(), Some(2));
    let output: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(output["counts"]["pass"], 2);
    assert!(String::from_utf8_lossy(&out.stderr).contains("failed to write report"));

    let out = feval_in(
        env.path(),
        &["run", "--replay", "recordings", "--report", "blocker/report.md"],
    );
    assert_eq!(out.status.code(), Some(2));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[PASS] alpha"));
    assert!(stdout.contains("Verdict: OK"));
    assert!(!stdout.contains("Report:"));
}

#[test]
fn selection_by_tag_and_id() {
    let env = corpus_with_recordings();
    env.add_fixture("charlie", DOCUMENT, &["other"]);
    let stdout = feval_exit(
        env.path(),
        &["run", "--replay", "recordings", "--tag", "smoke", "--fixture", "b*"],
        0,
    );
    assert!(stdout.contains("[PASS] bravo"));
    assert!(!stdout.contains("alpha"));
    assert!(!stdout.contains("charlie"));
}

#[test]
fn config_errors_exit_two() {
    let env = corpus_with_recordings();

    // Unknown fixture id.
    let out = feval_in(env.path(), &["run", "--replay", "recordings", "--fixture", "zulu"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown fixture 'zulu'"));

    // No generator configured.
    let out = feval_in(env.path(), &["run"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("no generator configured"));

    // Judge requested without a command.
    let out = feval_in(env.path(), &["run", "--replay", "recordings", "--judge"]);
    assert_eq!(out.status.code(), Some(2));

    // Malformed baseline.
    std::fs::write(env.baseline_path(), "{ nope").unwrap();
    let out = feval_in(env.path(), &["run", "--replay", "recordings"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(!env.path().join("eval-report.md").exists());
}

#[test]
fn invalid_config_file_exits_two() {
    let env = corpus_with_recordings();
    env.write_config("[thresholds]\nscore_drift_warn = 20\nscore_drift_error = 10\n");
    let out = feval_in(env.path(), &["run", "--replay", "recordings"]);
    assert_eq!(out.status.code(), Some(2));

    env.write_config("[runner]\nbogus = 1\n");
    let out = feval_in(env.path(), &["fixtures"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("line 2"));
}

#[test]
fn config_file_sets_paths() {
    let env = corpus_with_recordings();
    env.write_config(
        "[paths]\nreport = \"out/report.md\"\n\n[generator]\nreplay_dir = \"recordings\"\nprompt_version = \"v3\"\n",
    );
    feval_exit(env.path(), &["run"], 0);
    let report = std::fs::read_to_string(env.path().join("out/report.md")).unwrap();
    assert!(report.contains("| Prompt version | v3 |"));
}

#[cfg(unix)]
#[test]
fn command_generator_round_trip() {
    let env = EvalDir::new();
    env.add_fixture("alpha", DOCUMENT, &[]);
    let output = serde_json::to_string(&good_output(72.0)).unwrap();
    std::fs::write(env.path().join("gen.json"), output).unwrap();
    env.write_config("[generator]\ncommand = [\"sh\", \"-c\", \"cat >/dev/null; cat gen.json\"]\n");
    let stdout = feval_exit(env.path(), &["run"], 0);
    assert!(stdout.contains("[PASS] alpha"));
}

#[cfg(unix)]
#[test]
fn command_generator_recovers_from_malformed_reply() {
    let env = EvalDir::new();
    env.add_fixture("alpha", DOCUMENT, &[]);
    let output = serde_json::to_string(&good_output(72.0)).unwrap();
    std::fs::write(env.path().join("gen.json"), output).unwrap();
    env.write_config(
        "[generator]\ncommand = [\"sh\", \"-c\", \"cat >/dev/null; if [ -e seen ]; then cat gen.json; else touch seen; echo 'Sure! Here you go'; fi\"]\n",
    );
    let stdout = feval_exit(env.path(), &["run", "--json"], 0);
    let output: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(output["results"][0]["status"], "PASS");
    assert_eq!(output["results"][0]["attempts"], 2);
}
