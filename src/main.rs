use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod capture_cmd;
mod fixtures_cmd;
mod run_cmd;
mod setup;

/// Exit code for configuration and other fatal errors.
const EXIT_FATAL: u8 = 2;

/// Eval harness for structured LLM feedback
///
/// Runs a corpus of fixture documents through the feedback generator,
/// validates every output against the output contract, compares scores
/// with a trusted baseline and reports PASS/WARN/FAIL per fixture.
///
/// QUICK START:
///
///   # Record a baseline from a known-good prompt version
///   feval capture --prompt-version v1
///
///   # After changing the prompt or model, grade against it
///   feval run --prompt-version v1.1
///
///   # Offline, from recorded outputs
///   feval run --replay recordings/
///
/// EXIT CODES:
///
///   0  every fixture passed or warned
///   1  at least one fixture failed (or capture refused to write)
///   2  configuration error; nothing was evaluated
#[derive(Parser)]
#[command(name = "feval")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'feval <command> --help' for more information on a specific command.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade the fixture corpus against the baseline
    ///
    /// Generates output for every selected fixture, runs the contract
    /// checks, classifies score drift against the baseline and optionally
    /// asks the judge for a rubric verdict. Writes a Markdown report and
    /// prints a summary.
    Run(run_cmd::RunArgs),

    /// Record a new baseline from the current generator
    ///
    /// Only outputs without error-level check failures are recorded. The
    /// old baseline is replaced atomically, and only when every selected
    /// fixture was accepted (or --allow-partial is given).
    Capture(capture_cmd::CaptureArgs),

    /// List the fixture corpus and its baseline coverage
    Fixtures(fixtures_cmd::FixturesArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _telemetry = feedback_eval::telemetry::init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start async runtime: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Run(ref args) => run_cmd::run(args).await,
            Commands::Capture(ref args) => capture_cmd::run(args).await,
            Commands::Fixtures(ref args) => fixtures_cmd::run(args),
        }
    });

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}
