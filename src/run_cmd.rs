use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use feedback_eval::model::Baseline;
use feedback_eval::report;
use feedback_eval::retry::RetryPolicy;
use feedback_eval::runner::{RunOptions, Runner};

use crate::setup::{self, CommonArgs, GenerateArgs, SelectArgs};

/// Grade the corpus.
///
/// Examples:
///   feval run
///   feval run --fixture 'swe-*' --judge
///   feval run --replay recordings/ --json
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub select: SelectArgs,

    #[command(flatten)]
    pub generate: GenerateArgs,

    /// Markdown report path (overrides [paths] report)
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Run the rubric judge (requires [judge] command)
    #[arg(long, conflicts_with = "no_judge")]
    pub judge: bool,

    /// Skip the judge even if [judge] enabled = true
    #[arg(long)]
    pub no_judge: bool,

    /// Cancel fixtures still running after SECS seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the full run output as JSON instead of the summary
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    fn judge_enabled(&self, configured: bool) -> bool {
        if self.judge {
            true
        } else if self.no_judge {
            false
        } else {
            configured
        }
    }
}

pub async fn run(args: &RunArgs) -> Result<u8> {
    let mut cfg = setup::load_config(&args.common)?;
    args.generate.apply(&mut cfg);
    if let Some(path) = &args.report {
        cfg.paths.report.clone_from(path);
    }
    if let Some(secs) = args.timeout {
        cfg.runner.run_timeout_secs = Some(secs);
    }
    cfg.validate()?;

    let fixtures = setup::load_selected(&cfg, &args.select)?;
    let baseline = Baseline::read(&cfg.paths.baseline)?;
    if baseline.is_none() {
        tracing::warn!(
            path = %cfg.paths.baseline.display(),
            "no baseline file, drift will be skipped"
        );
    }

    let generator = setup::build_generator(&cfg)?;
    let judge = setup::build_judge(&cfg, args.judge_enabled(cfg.judge.enabled))?;

    let mut runner = Runner::new(generator, cfg.thresholds.clone(), RetryPolicy::from(&cfg.retry));
    if let Some(judge) = judge {
        runner = runner.with_judge(judge);
    }
    setup::abort_on_ctrl_c(runner.abort_handle());

    let opts = RunOptions::from_config(&cfg);
    let output = runner
        .run_eval(fixtures, baseline.map(Arc::new), &opts)
        .await;

    // Results reach stdout even when the report file cannot be written.
    if args.json {
        println!("{}", setup::to_pretty_json(&output)?);
    } else {
        report::print_summary(&output);
    }

    report::write_report(&output, &cfg.paths.report)
        .with_context(|| format!("failed to write report {}", cfg.paths.report.display()))?;
    if !args.json {
        println!("Report: {}", cfg.paths.report.display());
    }

    Ok(report::exit_code(&output))
}
