use anyhow::Result;
use clap::Args;
use serde::Serialize;

use feedback_eval::corpus::load_corpus;
use feedback_eval::model::{Baseline, BaselineLookup};

use crate::setup::{self, CommonArgs};

/// Width of the hash prefix in the text listing.
const HASH_PREFIX: usize = 12;

/// List fixtures.
#[derive(Args, Debug)]
pub struct FixturesArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Print the listing as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct FixtureEntry {
    id: String,
    mode: String,
    content_hash: String,
    tags: Vec<String>,
    /// `"covered"`, or why the baseline would be skipped.
    baseline: String,
}

pub fn run(args: &FixturesArgs) -> Result<u8> {
    let cfg = setup::load_config(&args.common)?;
    cfg.validate()?;
    let corpus = load_corpus(&cfg.paths.fixtures)?;
    let baseline = Baseline::read(&cfg.paths.baseline)?;

    let entries: Vec<FixtureEntry> = corpus
        .iter()
        .map(|f| {
            let coverage = match &baseline {
                None => "no baseline file".to_owned(),
                Some(b) => match b.entry_for(
                    f,
                    &cfg.generator.prompt_version,
                    cfg.baseline.version_policy,
                ) {
                    BaselineLookup::Usable(_) => "covered".to_owned(),
                    BaselineLookup::Skipped(reason) => reason.to_string(),
                },
            };
            FixtureEntry {
                id: f.id.to_string(),
                mode: f.mode.to_string(),
                content_hash: f.content_hash(),
                tags: f.tags.clone(),
                baseline: coverage,
            }
        })
        .collect();

    if args.json {
        println!("{}", setup::to_pretty_json(&entries)?);
        return Ok(0);
    }

    let width = entries.iter().map(|e| e.id.len()).max().unwrap_or(0);
    for e in &entries {
        let hash: String = e.content_hash.chars().take(HASH_PREFIX).collect();
        let tags = if e.tags.is_empty() {
            String::new()
        } else {
            format!("  [{}]", e.tags.join(", "))
        };
        println!("{:<width$}  {:<8}  {hash}  {}{tags}", e.id, e.mode, e.baseline);
    }
    let covered = entries.iter().filter(|e| e.baseline == "covered").count();
    println!(
        "{} fixture(s), {covered} covered by {}",
        entries.len(),
        cfg.paths.baseline.display()
    );
    Ok(0)
}
