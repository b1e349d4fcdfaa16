//! buildall: build conda recipes that are not yet published, then upload them.
//!
//! # Usage
//!
//! ```text
//! buildall <recipe>... [--check-against CH...] [--dry-run] [--upload USER]
//!          [--force] [--rebuild] [--dev] [--no-test] [--cycle-packages]
//!          [--python 27,36,37] [--numpy 1.11] [--cuda 9.2,10.0]
//!          [-c|--clean] [-v...]
//! ```
//!
//! The exit status is the number of builds that would run (`--dry-run`) or the
//! number of builds that failed.

mod logging;
mod options;
mod recipes;
mod report;

use anyhow::{Context, Result};
use clap::Parser;

use buildall_core::{BuildIdClock, PrereleaseExclusions};
use buildall_index::CondaIndex;
use buildall_pipeline::{pipeline, AnacondaCli, CondaBuilder, Toolkit, UploadRetrier};
use buildall_render::CondaRenderer;

use options::Cli;

/// Holds the upload token; removed from the environment so builds never see it.
const TOKEN_ENV: &str = "BINSTAR_TOKEN";

fn main() -> Result<()> {
    let token = std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty());
    std::env::remove_var(TOKEN_ENV);

    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    tracing::trace!(?cli, "arguments");

    let code = run(cli, token)?;
    std::process::exit(code)
}

fn run(cli: Cli, token: Option<String>) -> Result<i32> {
    let recipe_dirs = recipes::expand(&cli.recipes)?;
    let policy = cli.channel_policy();
    let config = cli.run_config(recipe_dirs, &policy)?;
    tracing::trace!(axes = ?config.axes, "variant axes");

    let exclusions = PrereleaseExclusions::load_at(&cli.pre_blacklist)
        .with_context(|| format!("failed to read {}", cli.pre_blacklist.display()))?;
    let uploader = UploadRetrier::new(Box::new(AnacondaCli::new(&cli.anaconda, token)), exclusions)
        .with_max_retries(cli.max_retries);
    let renderer = CondaRenderer::new(&cli.conda);
    let index = CondaIndex::new(&cli.conda);
    let builder = CondaBuilder::new(&cli.conda);
    let tools = Toolkit {
        renderer: &renderer,
        index: &index,
        builder: &builder,
        uploader: &uploader,
        policy: &policy,
    };

    let dry_run = config.dry_run;
    let mut clock = BuildIdClock::default();
    let report = pipeline::run(config, &tools, &mut clock, &mut |event| {
        report::print_event(&event, dry_run)
    })
    .context("build run aborted")?;

    report::print_summary(&report);
    Ok(report.exit_code())
}
