//! Run orchestration: generate, check, compare and judge every selected
//! fixture with bounded parallelism.
//!
//! Each fixture runs in its own task behind a [`Semaphore`] permit. Tasks
//! share only read-only state (`Arc`); every task produces exactly one
//! [`FixtureResult`], including when it panics or is cut short, so the
//! report always covers every selected fixture.
//!
//! Cancellation comes from two sources: an optional run deadline and an
//! [`AbortHandle`] (wired to Ctrl-C by the CLI). Fixtures that never
//! started and fixtures still in flight both become FAIL with
//! `run.cancelled`; finished results are kept.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::checks;
use crate::client::{GenerationRequest, Generator};
use crate::config::{EvalConfig, ThresholdConfig};
use crate::drift::classify_drift;
use crate::error::{CallError, HarnessError};
use crate::judge::JudgeClient;
use crate::model::{
    Baseline, BaselineFixture, BaselineLookup, BaselineSkip, CheckCode, CheckResult, DriftReport,
    EvalRunOutput, FeedbackOutput, Fixture, FixtureId, FixtureResult, FixtureStatus, JudgeResult,
    RunMetadata, Severity, VersionPolicy,
};
use crate::retry::{RetryPolicy, retry};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-run settings, resolved from config and CLI flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Prompt version under test.
    pub prompt_version: String,
    /// Model identifier, informational.
    pub model: Option<String>,
    /// Fixtures evaluated concurrently (at least 1).
    pub concurrency: usize,
    /// Timeout for each generation attempt.
    pub call_timeout: Duration,
    /// Deadline for the whole run.
    pub run_timeout: Option<Duration>,
    /// Baseline prompt-version compatibility.
    pub version_policy: VersionPolicy,
    /// Baseline file, recorded in the run metadata.
    pub baseline_path: Option<PathBuf>,
}

impl RunOptions {
    /// Options from a loaded configuration.
    #[must_use]
    pub fn from_config(cfg: &EvalConfig) -> Self {
        Self {
            prompt_version: cfg.generator.prompt_version.clone(),
            model: cfg.generator.model.clone(),
            concurrency: cfg.runner.concurrency.max(1),
            call_timeout: Duration::from_secs(cfg.runner.call_timeout_secs),
            run_timeout: cfg.runner.run_timeout_secs.map(Duration::from_secs),
            version_policy: cfg.baseline.version_policy,
            baseline_path: Some(cfg.paths.baseline.clone()),
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&EvalConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Aborts a running evaluation from another task (e.g. a Ctrl-C handler).
#[derive(Clone, Debug)]
pub struct AbortHandle(Arc<watch::Sender<bool>>);

impl AbortHandle {
    /// Request cancellation. Idempotent.
    pub fn abort(&self) {
        self.0.send_replace(true);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.0.borrow()
    }
}

/// Why a fixture was cancelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CancelReason {
    Aborted,
    Deadline { secs: u64 },
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aborted => write!(f, "run aborted"),
            Self::Deadline { secs } => write!(f, "run deadline of {secs}s reached"),
        }
    }
}

#[derive(Clone, Debug)]
struct CancelSignal {
    rx: watch::Receiver<bool>,
    deadline: Option<(Instant, u64)>,
}

impl CancelSignal {
    fn already(&self) -> Option<CancelReason> {
        if *self.rx.borrow() {
            return Some(CancelReason::Aborted);
        }
        match self.deadline {
            Some((at, secs)) if Instant::now() >= at => Some(CancelReason::Deadline { secs }),
            _ => None,
        }
    }

    async fn wait(self) -> CancelReason {
        let Self { mut rx, deadline } = self;
        let aborted = async move {
            // A dropped sender can never abort.
            let closed = rx.wait_for(|&aborted| aborted).await.is_err();
            if closed {
                std::future::pending::<()>().await;
            }
        };
        match deadline {
            Some((at, secs)) => tokio::select! {
                () = aborted => CancelReason::Aborted,
                () = tokio::time::sleep_until(at) => CancelReason::Deadline { secs },
            },
            None => {
                aborted.await;
                CancelReason::Aborted
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// What to do after checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pipeline {
    /// Checks, drift, judge.
    Grade,
    /// Checks only.
    Capture,
}

/// Evaluates fixtures against injected clients.
pub struct Runner {
    generator: Arc<dyn Generator>,
    judge: Option<JudgeClient>,
    thresholds: ThresholdConfig,
    retry: RetryPolicy,
    abort: AbortHandle,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("generator", &self.generator.describe())
            .field("judge", &self.judge.is_some())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Immutable state shared by every fixture task of one run.
struct Shared {
    generator: Arc<dyn Generator>,
    judge: Option<JudgeClient>,
    thresholds: ThresholdConfig,
    retry: RetryPolicy,
    baseline: Option<Arc<Baseline>>,
    opts: RunOptions,
    pipeline: Pipeline,
}

impl Runner {
    /// A runner without a judge.
    pub fn new(generator: Arc<dyn Generator>, thresholds: ThresholdConfig, retry: RetryPolicy) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            generator,
            judge: None,
            thresholds,
            retry,
            abort: AbortHandle(Arc::new(tx)),
        }
    }

    /// Enable the judge for [`run_eval`](Self::run_eval).
    #[must_use]
    pub fn with_judge(mut self, judge: JudgeClient) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Whether a judge is configured.
    #[must_use]
    pub const fn judge_enabled(&self) -> bool {
        self.judge.is_some()
    }

    /// Handle that cancels the current and any later run of this runner.
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Grade every fixture: generate, check, compare with the baseline and
    /// optionally judge.
    ///
    /// Never fails as a whole: per-fixture problems become FAIL results.
    pub async fn run_eval(
        &self,
        fixtures: Vec<Fixture>,
        baseline: Option<Arc<Baseline>>,
        opts: &RunOptions,
    ) -> EvalRunOutput {
        let started_at = chrono::Utc::now();
        let baseline_created_at = baseline.as_ref().map(|b| b.created_at.clone());
        let baseline_path = baseline
            .as_ref()
            .and(opts.baseline_path.as_ref())
            .map(|p| p.display().to_string());

        tracing::info!(
            fixtures = fixtures.len(),
            concurrency = opts.concurrency,
            judge = self.judge.is_some(),
            baseline = baseline.is_some(),
            generator = %self.generator.describe(),
            "starting evaluation run"
        );

        let results = self
            .execute(self.shared(baseline, opts, Pipeline::Grade), fixtures)
            .await;
        let aborted = results.iter().any(was_cancelled);

        let metadata = RunMetadata {
            run_id: run_id(&started_at),
            started_at: started_at.to_rfc3339(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            prompt_version: opts.prompt_version.clone(),
            model: opts.model.clone(),
            baseline_path,
            baseline_created_at,
            judge_enabled: self.judge.is_some(),
            version_policy: opts.version_policy.to_string(),
            aborted,
        };
        let output = EvalRunOutput::assemble(results, metadata);
        tracing::info!(
            pass = output.counts.pass,
            warn = output.counts.warn,
            fail = output.counts.fail,
            aborted,
            "evaluation run finished"
        );
        output
    }

    /// Generate and check every fixture and build a new baseline from the
    /// outputs without error-severity failures. Nothing is written here;
    /// see [`CaptureOutcome::commit`].
    pub async fn capture_baseline(&self, fixtures: Vec<Fixture>, opts: &RunOptions) -> CaptureOutcome {
        let selected = fixtures.len();

        tracing::info!(fixtures = selected, "capturing baseline");
        let mut results = self
            .execute(self.shared(None, opts, Pipeline::Capture), fixtures)
            .await;
        results.sort_by(|a, b| a.fixture_id.cmp(&b.fixture_id));

        let mut baseline = Baseline::new(opts.prompt_version.clone(), opts.model.clone());
        let mut rejected = Vec::new();
        for result in &results {
            match accept(result) {
                Ok(output) => {
                    baseline.fixtures.insert(
                        result.fixture_id.clone(),
                        BaselineFixture {
                            fixture_id: result.fixture_id.clone(),
                            score: output.score,
                            subscores: output.subscores,
                            prompt_version: opts.prompt_version.clone(),
                            captured_at: chrono::Utc::now().to_rfc3339(),
                            content_hash: result.content_hash.clone(),
                        },
                    );
                }
                Err(reason) => {
                    tracing::warn!(fixture = %result.fixture_id, %reason, "fixture rejected from baseline");
                    rejected.push((result.fixture_id.clone(), reason));
                }
            }
        }

        CaptureOutcome {
            baseline,
            results,
            rejected,
            selected,
        }
    }

    fn shared(&self, baseline: Option<Arc<Baseline>>, opts: &RunOptions, pipeline: Pipeline) -> Arc<Shared> {
        Arc::new(Shared {
            generator: Arc::clone(&self.generator),
            judge: self.judge.clone(),
            thresholds: self.thresholds.clone(),
            retry: self.retry.clone(),
            baseline,
            opts: opts.clone(),
            pipeline,
        })
    }

    /// Run every fixture in the pool and return exactly one result per
    /// fixture, in completion order.
    async fn execute(&self, shared: Arc<Shared>, fixtures: Vec<Fixture>) -> Vec<FixtureResult> {
        let signal = CancelSignal {
            rx: self.abort.0.subscribe(),
            deadline: shared
                .opts
                .run_timeout
                .map(|d| (Instant::now() + d, d.as_secs())),
        };
        let sem = Arc::new(Semaphore::new(shared.opts.concurrency.max(1)));
        let mut set = JoinSet::new();
        let mut results = Vec::with_capacity(fixtures.len());
        let mut selected = Vec::with_capacity(fixtures.len());
        let mut stopped = signal.already();

        for fixture in fixtures {
            let content_hash = fixture.content_hash();
            selected.push((fixture.id.clone(), content_hash.clone()));
            if let Some(reason) = stopped {
                results.push(cancelled(fixture.id, content_hash, reason, false, 0, 0));
                continue;
            }
            let permit = tokio::select! {
                biased;
                reason = signal.clone().wait() => {
                    stopped = Some(reason);
                    None
                }
                permit = Arc::clone(&sem).acquire_owned() => permit.ok(),
            };
            // A permit freed by a cancelled task must not start new work.
            if permit.is_some()
                && let Some(reason) = signal.already()
            {
                stopped = Some(reason);
                results.push(cancelled(fixture.id, content_hash, reason, false, 0, 0));
                continue;
            }
            let Some(permit) = permit else {
                let reason = stopped.unwrap_or(CancelReason::Aborted);
                stopped = Some(reason);
                results.push(cancelled(fixture.id, content_hash, reason, false, 0, 0));
                continue;
            };
            let shared = Arc::clone(&shared);
            let signal = signal.clone();
            set.spawn(async move {
                let _permit = permit;
                run_fixture(shared, fixture, content_hash, signal).await
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "fixture task failed"),
            }
        }

        let seen: HashSet<FixtureId> = results.iter().map(|r| r.fixture_id.clone()).collect();
        for (id, content_hash) in selected {
            if !seen.contains(&id) {
                results.push(internal_error(
                    id,
                    content_hash,
                    "task ended without a result".to_owned(),
                    0,
                    0,
                ));
            }
        }
        results
    }
}

/// One fixture, isolated in its own task so a panic or cancellation still
/// yields a result.
async fn run_fixture(
    shared: Arc<Shared>,
    fixture: Fixture,
    content_hash: String,
    signal: CancelSignal,
) -> FixtureResult {
    let started = Instant::now();
    let id = fixture.id.clone();
    let attempts = Arc::new(AtomicU32::new(0));

    let inner = tokio::spawn({
        let attempts = Arc::clone(&attempts);
        let content_hash = content_hash.clone();
        async move { shared.evaluate(&fixture, content_hash, &attempts).await }
    });
    let abort = inner.abort_handle();

    tokio::select! {
        joined = inner => match joined {
            Ok(result) => result,
            Err(e) => {
                let detail = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                tracing::error!(fixture = %id, %detail, "fixture evaluation panicked");
                internal_error(
                    id,
                    content_hash,
                    detail,
                    attempts.load(Ordering::Relaxed),
                    elapsed_ms(started),
                )
            }
        },
        reason = signal.wait() => {
            abort.abort();
            tracing::warn!(fixture = %id, %reason, "fixture cancelled in flight");
            cancelled(
                id,
                content_hash,
                reason,
                true,
                attempts.load(Ordering::Relaxed),
                elapsed_ms(started),
            )
        }
    }
}

impl Shared {
    #[tracing::instrument(skip_all, fields(fixture = %fixture.id))]
    async fn evaluate(&self, fixture: &Fixture, content_hash: String, attempts: &AtomicU32) -> FixtureResult {
        let started = Instant::now();
        let request = GenerationRequest::for_fixture(
            fixture,
            &self.opts.prompt_version,
            self.opts.model.as_deref(),
        );

        let generator = &*self.generator;
        let request = &request;
        let call_timeout = self.opts.call_timeout;
        let attempted = retry(&self.retry, "generate", move |n| {
            attempts.store(n, Ordering::Relaxed);
            async move {
                match tokio::time::timeout(call_timeout, generator.generate(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(CallError::Timeout {
                        secs: call_timeout.as_secs().max(1),
                    }),
                }
            }
        })
        .await;

        let raw = match attempted.result {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(attempts = attempted.attempts, error = %err, "generation failed");
                return FixtureResult::failed(
                    fixture.id.clone(),
                    content_hash,
                    CheckResult::fail(
                        CheckCode::GenerationCallFailed,
                        Severity::Error,
                        format!(
                            "generation failed after {} attempt(s): {err}",
                            attempted.attempts
                        ),
                    )
                    .with_value(err.kind()),
                    attempted.attempts,
                    elapsed_ms(started),
                );
            }
        };

        let outcome = checks::evaluate_output(fixture, &raw, &self.thresholds);
        let mut notes = Vec::new();
        let (drift, judge) = match self.pipeline {
            Pipeline::Capture => (DriftReport::default(), None),
            Pipeline::Grade => {
                let drift = self.drift_for(fixture, outcome.parsed.as_ref());
                let judge = self
                    .judge_output(fixture, outcome.parsed.as_ref(), &mut notes)
                    .await;
                (drift, judge)
            }
        };

        let status = FixtureStatus::roll_up(&outcome.checks, drift.status);
        let duration_ms = elapsed_ms(started);
        tracing::info!(%status, attempts = attempted.attempts, duration_ms, "fixture evaluated");

        FixtureResult {
            fixture_id: fixture.id.clone(),
            content_hash,
            status,
            raw_output: Some(raw),
            checks: outcome.checks,
            drift,
            judge,
            notes,
            attempts: attempted.attempts,
            duration_ms,
        }
    }

    fn drift_for(&self, fixture: &Fixture, parsed: Option<&FeedbackOutput>) -> DriftReport {
        let lookup = match &self.baseline {
            Some(b) => b.entry_for(fixture, &self.opts.prompt_version, self.opts.version_policy),
            None => BaselineLookup::Skipped(BaselineSkip::NoBaselineFile),
        };
        classify_drift(parsed, &lookup, &self.thresholds)
    }

    async fn judge_output(
        &self,
        fixture: &Fixture,
        parsed: Option<&FeedbackOutput>,
        notes: &mut Vec<String>,
    ) -> Option<JudgeResult> {
        let judge = self.judge.as_ref()?;
        let Some(parsed) = parsed else {
            notes.push("judge skipped: output did not parse".to_owned());
            return None;
        };
        match judge.run_judge(&fixture.document, parsed).await {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                tracing::warn!(error = %e, "judge unavailable");
                notes.push(format!("judge unavailable: {e}"));
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Result of a capture run, before anything is written.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptureOutcome {
    /// The new baseline, holding accepted fixtures only.
    pub baseline: Baseline,
    /// Per-fixture results, sorted by id.
    pub results: Vec<FixtureResult>,
    /// Rejected fixtures and why.
    pub rejected: Vec<(FixtureId, String)>,
    /// Number of fixtures selected for capture.
    pub selected: usize,
}

/// What [`CaptureOutcome::commit`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureVerdict {
    /// The baseline file was replaced.
    Written,
    /// Some fixtures were rejected and partial capture was not allowed.
    RefusedPartial,
    /// No fixture was accepted.
    NothingAccepted,
}

impl CaptureOutcome {
    /// Number of accepted fixtures.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.baseline.fixtures.len()
    }

    /// Replace the baseline at `path` if the capture is acceptable.
    ///
    /// The old file is left untouched unless the verdict is
    /// [`CaptureVerdict::Written`].
    ///
    /// # Errors
    /// [`HarnessError::BaselineWrite`] when the atomic replace fails.
    pub fn commit(&self, path: &std::path::Path, allow_partial: bool) -> Result<CaptureVerdict, HarnessError> {
        if self.accepted() == 0 {
            return Ok(CaptureVerdict::NothingAccepted);
        }
        if !self.rejected.is_empty() && !allow_partial {
            return Ok(CaptureVerdict::RefusedPartial);
        }
        self.baseline.write_atomic(path)?;
        tracing::info!(
            path = %path.display(),
            accepted = self.accepted(),
            rejected = self.rejected.len(),
            "baseline written"
        );
        Ok(CaptureVerdict::Written)
    }
}

/// A result may enter the baseline when it has no error-severity failure
/// and its output parses.
fn accept(result: &FixtureResult) -> Result<FeedbackOutput, String> {
    if let Some(err) = result.checks.iter().find(|c| c.is_error()) {
        return Err(format!("{}: {}", err.check_name, err.message));
    }
    let raw = result
        .raw_output
        .as_ref()
        .ok_or_else(|| "no output".to_owned())?;
    FeedbackOutput::from_value(raw)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cancelled(
    id: FixtureId,
    content_hash: String,
    reason: CancelReason,
    in_flight: bool,
    attempts: u32,
    duration_ms: u64,
) -> FixtureResult {
    let stage = if in_flight {
        "while the fixture was in flight"
    } else {
        "before the fixture started"
    };
    FixtureResult::failed(
        id,
        content_hash,
        CheckResult::fail(CheckCode::RunCancelled, Severity::Error, format!("{reason} {stage}")),
        attempts,
        duration_ms,
    )
}

fn internal_error(
    id: FixtureId,
    content_hash: String,
    detail: String,
    attempts: u32,
    duration_ms: u64,
) -> FixtureResult {
    FixtureResult::failed(
        id,
        content_hash,
        CheckResult::fail(
            CheckCode::RunInternalError,
            Severity::Error,
            format!("internal error: {detail}"),
        ),
        attempts,
        duration_ms,
    )
}

fn was_cancelled(result: &FixtureResult) -> bool {
    result
        .checks
        .iter()
        .any(|c| c.check_name == CheckCode::RunCancelled && !c.passed)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic with non-string payload".to_owned())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn run_id(started_at: &chrono::DateTime<chrono::Utc>) -> String {
    format!(
        "run-{}-{:04x}",
        started_at.format("%Y%m%dT%H%M%SZ"),
        rand::random::<u16>()
    )
}
