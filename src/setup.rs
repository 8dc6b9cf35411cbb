//! Shared command plumbing: config resolution, corpus loading and client
//! construction. Everything here runs before the first fixture, so every
//! failure is a configuration error.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use feedback_eval::client::{CommandClient, Generator, ReplayGenerator};
use feedback_eval::config::{DEFAULT_CONFIG_FILE, EvalConfig};
use feedback_eval::corpus::{Selection, load_corpus};
use feedback_eval::error::HarnessError;
use feedback_eval::judge::JudgeClient;
use feedback_eval::model::Fixture;
use feedback_eval::retry::RetryPolicy;
use feedback_eval::runner::AbortHandle;

/// Flags every subcommand accepts.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Config file [default: feval.toml in the current directory]
    #[arg(long, value_name = "PATH", env = "FEVAL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Fixture corpus directory (overrides [paths] fixtures)
    #[arg(long, value_name = "DIR")]
    pub fixtures: Option<PathBuf>,
}

/// Fixture subset flags.
#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Only these fixture ids (glob patterns allowed, repeatable)
    #[arg(long = "fixture", value_name = "ID")]
    pub ids: Vec<String>,

    /// Only fixtures carrying one of these tags (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,
}

impl SelectArgs {
    pub fn selection(&self) -> Selection {
        Selection {
            ids: self.ids.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// Flags shared by the commands that call the generator.
#[derive(Args, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// Baseline file (overrides [paths] baseline)
    #[arg(long, value_name = "PATH")]
    pub baseline: Option<PathBuf>,

    /// Fixtures evaluated in parallel (overrides [runner] concurrency)
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Prompt version under test (overrides [generator] prompt_version)
    #[arg(long, value_name = "V")]
    pub prompt_version: Option<String>,

    /// Serve recorded outputs from DIR instead of calling the generator
    #[arg(long, value_name = "DIR")]
    pub replay: Option<PathBuf>,
}

impl GenerateArgs {
    pub fn apply(&self, cfg: &mut EvalConfig) {
        if let Some(p) = &self.baseline {
            cfg.paths.baseline.clone_from(p);
        }
        if let Some(n) = self.concurrency {
            cfg.runner.concurrency = n;
        }
        if let Some(v) = &self.prompt_version {
            cfg.generator.prompt_version.clone_from(v);
        }
        if let Some(dir) = &self.replay {
            cfg.generator.replay_dir = Some(dir.clone());
        }
    }
}

/// Load the config file and apply the common overrides. Callers apply
/// their own flags and then call [`EvalConfig::validate`].
pub fn load_config(common: &CommonArgs) -> Result<EvalConfig> {
    let path = common
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    // An explicitly named file must exist; the default one is optional.
    if common.config.is_some() && !path.exists() {
        return Err(HarnessError::Config {
            path,
            detail: "file not found".to_owned(),
        }
        .into());
    }
    let mut cfg = EvalConfig::load(&path)?;
    if let Some(dir) = &common.fixtures {
        cfg.paths.fixtures.clone_from(dir);
    }
    Ok(cfg)
}

/// Load the corpus and narrow it to the selection.
pub fn load_selected(cfg: &EvalConfig, select: &SelectArgs) -> Result<Vec<Fixture>> {
    let corpus = load_corpus(&cfg.paths.fixtures)?;
    let selection = select.selection();
    let fixtures = selection.apply(corpus)?;
    tracing::info!(selected = fixtures.len(), %selection, "fixtures selected");
    Ok(fixtures)
}

/// The generation client: replay when a replay directory is configured,
/// otherwise the configured command.
pub fn build_generator(cfg: &EvalConfig) -> Result<Arc<dyn Generator>> {
    if let Some(dir) = &cfg.generator.replay_dir {
        if !dir.is_dir() {
            return Err(HarnessError::InvalidConfig(format!(
                "replay directory {} does not exist",
                dir.display()
            ))
            .into());
        }
        return Ok(Arc::new(ReplayGenerator::new(dir.clone())));
    }
    let client = CommandClient::new(&cfg.generator.command, call_timeout(cfg))
        .ok_or(HarnessError::NoGenerator)?;
    Ok(Arc::new(client))
}

/// The judge, when enabled. Enabled without a command is a config error.
pub fn build_judge(cfg: &EvalConfig, enabled: bool) -> Result<Option<JudgeClient>> {
    if !enabled {
        return Ok(None);
    }
    let client = CommandClient::new(&cfg.judge.command, call_timeout(cfg)).ok_or_else(|| {
        HarnessError::JudgeUnavailable {
            detail: "[judge] command is empty".to_owned(),
        }
    })?;
    Ok(Some(JudgeClient::new(
        Arc::new(client),
        &RetryPolicy::from(&cfg.retry),
        call_timeout(cfg),
    )))
}

/// Cancel the run on Ctrl-C. Finished fixtures are kept in the report.
pub fn abort_on_ctrl_c(handle: AbortHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            eprintln!("interrupted: cancelling remaining fixtures");
            handle.abort();
        }
    });
}

/// Serialize `value` as pretty JSON for stdout.
pub fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize output as JSON")
}

const fn call_timeout(cfg: &EvalConfig) -> Duration {
    Duration::from_secs(cfg.runner.call_timeout_secs)
}
