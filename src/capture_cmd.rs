use anyhow::Result;
use clap::Args;

use feedback_eval::retry::RetryPolicy;
use feedback_eval::runner::{CaptureVerdict, RunOptions, Runner};

use crate::setup::{self, CommonArgs, GenerateArgs, SelectArgs};

/// Record a baseline.
///
/// Examples:
///   feval capture --prompt-version v2
///   feval capture --fixture swe-senior --allow-partial
#[derive(Args, Debug)]
pub struct CaptureArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub select: SelectArgs,

    #[command(flatten)]
    pub generate: GenerateArgs,

    /// Write the baseline even if some selected fixtures were rejected
    #[arg(long)]
    pub allow_partial: bool,
}

pub async fn run(args: &CaptureArgs) -> Result<u8> {
    let mut cfg = setup::load_config(&args.common)?;
    args.generate.apply(&mut cfg);
    cfg.validate()?;

    let fixtures = setup::load_selected(&cfg, &args.select)?;
    let generator = setup::build_generator(&cfg)?;
    let runner = Runner::new(generator, cfg.thresholds.clone(), RetryPolicy::from(&cfg.retry));
    setup::abort_on_ctrl_c(runner.abort_handle());

    let opts = RunOptions::from_config(&cfg);
    let outcome = runner.capture_baseline(fixtures, &opts).await;

    for result in &outcome.results {
        match outcome.rejected.iter().find(|(id, _)| *id == result.fixture_id) {
            Some((_, reason)) => println!("[REJECT] {} - {reason}", result.fixture_id),
            None => println!("[ACCEPT] {}", result.fixture_id),
        }
    }

    let path = &cfg.paths.baseline;
    match outcome.commit(path, args.allow_partial)? {
        CaptureVerdict::Written => {
            println!(
                "Baseline written to {}: {} of {} fixture(s) at prompt version {}",
                path.display(),
                outcome.accepted(),
                outcome.selected,
                opts.prompt_version
            );
            Ok(0)
        }
        CaptureVerdict::RefusedPartial => {
            eprintln!(
                "Refusing to write a partial baseline: {} of {} fixture(s) rejected; {} left unchanged.\n  \
                 To fix: resolve the rejections, or re-run with --allow-partial",
                outcome.rejected.len(),
                outcome.selected,
                path.display()
            );
            Ok(1)
        }
        CaptureVerdict::NothingAccepted => {
            eprintln!(
                "No fixture produced an acceptable output; {} left unchanged.",
                path.display()
            );
            Ok(1)
        }
    }
}
