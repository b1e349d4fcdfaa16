//! End-to-end run: query the index, render, select, then build each variant.
//!
//! A render or index failure aborts the run. A failed build is recorded and
//! the run moves on to the next variant.

use std::path::PathBuf;

use serde::Serialize;

use buildall_core::{BuildId, BuildIdClock, Channel, ChannelPolicy, RecipeVariant, VariantAxes};
use buildall_index::PackageIndex;
use buildall_render::{render_recipes, MetadataRenderer, RenderOptions, RenderOrder};

use crate::error::PipelineError;
use crate::executor::{BuildOptions, BuildReport, Executor, PackageBuilder};
use crate::selector::{select_builds, SelectorFlags};
use crate::upload::UploadRetrier;

/// Everything a run needs to know, collected from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    pub recipe_dirs: Vec<PathBuf>,
    pub axes: VariantAxes,
    /// Channels searched for published artifacts and handed to the renderer.
    pub check_against: Vec<Channel>,
    pub order: RenderOrder,
    /// Fully render (with sources) instead of provisional renders.
    pub finalize: bool,
    pub work_dir: Option<PathBuf>,
    pub selector: SelectorFlags,
    pub build: BuildOptions,
    pub dry_run: bool,
}

/// The external collaborators of a run.
pub struct Toolkit<'a> {
    pub renderer: &'a dyn MetadataRenderer,
    pub index: &'a dyn PackageIndex,
    pub builder: &'a dyn PackageBuilder,
    pub uploader: &'a UploadRetrier,
    pub policy: &'a ChannelPolicy,
}

/// Progress notifications, in the order they happen.
#[derive(Debug)]
pub enum RunEvent<'a> {
    /// The variant was selected and is about to build (or would, in dry-run).
    Scheduled(&'a RecipeVariant),
    Built(&'a BuildReport),
    Failed(&'a FailedBuild),
}

/// A variant whose build or upload failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedBuild {
    pub build_id: BuildId,
    pub name: String,
    pub output_path: PathBuf,
    pub error: String,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    /// Output files of every selected variant, in selection order.
    pub scheduled: Vec<PathBuf>,
    pub built: Vec<BuildReport>,
    pub failures: Vec<FailedBuild>,
}

impl RunReport {
    /// Process exit status: builds that would run in dry-run, failures otherwise.
    pub fn exit_code(&self) -> i32 {
        let count = if self.dry_run {
            self.scheduled.len()
        } else {
            self.failures.len()
        };
        i32::try_from(count).unwrap_or(i32::MAX)
    }
}

/// Run the whole pipeline for `config`.
pub fn run(
    config: RunConfig,
    tools: &Toolkit<'_>,
    clock: &mut BuildIdClock,
    observer: &mut dyn FnMut(RunEvent<'_>),
) -> Result<RunReport, PipelineError> {
    tracing::info!(
        "checking {} channel(s) for published packages",
        config.check_against.len()
    );
    let index = tools.index.query(&config.check_against)?;
    tracing::debug!("{} published filename(s) known", index.len());

    let options = RenderOptions {
        channels: config.check_against.clone(),
        finalize: config.finalize,
        work_dir: config.work_dir.clone(),
    };
    let variants = render_recipes(
        tools.renderer,
        &config.recipe_dirs,
        &config.axes,
        &options,
        config.order,
        clock,
    )?;
    tracing::info!("{} variant(s) rendered", variants.len());

    let executor = Executor::new(tools.builder, tools.uploader, tools.policy, &config.build);
    let mut report = RunReport {
        dry_run: config.dry_run,
        ..RunReport::default()
    };

    for mut variant in select_builds(variants, &index, config.selector) {
        observer(RunEvent::Scheduled(&variant));
        report.scheduled.push(variant.output_path.clone());
        if config.dry_run {
            continue;
        }

        match executor.execute(&mut variant) {
            Ok(built) => {
                observer(RunEvent::Built(&built));
                report.built.push(built);
            }
            Err(err) => {
                tracing::error!("{}: {err}", variant.build_id);
                let failed = FailedBuild {
                    build_id: variant.build_id.clone(),
                    name: variant.name.clone(),
                    output_path: variant.output_path.clone(),
                    error: err.to_string(),
                };
                observer(RunEvent::Failed(&failed));
                report.failures.push(failed);
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_counts_schedule_in_dry_run() {
        let report = RunReport {
            dry_run: true,
            scheduled: vec![PathBuf::from("a"), PathBuf::from("b")],
            ..RunReport::default()
        };
        assert_eq!(report.exit_code(), 2);
    }

    #[test]
    fn exit_code_counts_failures_otherwise() {
        let failure = FailedBuild {
            build_id: BuildId::from("1"),
            name: "a".to_string(),
            output_path: PathBuf::from("a"),
            error: "boom".to_string(),
        };
        let report = RunReport {
            dry_run: false,
            scheduled: vec![PathBuf::from("a"), PathBuf::from("b")],
            failures: vec![failure],
            ..RunReport::default()
        };
        assert_eq!(report.exit_code(), 1);
        assert_eq!(RunReport::default().exit_code(), 0);
    }
}
