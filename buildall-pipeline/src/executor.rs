//! Build execution for one selected variant.
//!
//! Order of effects:
//! 1. Resolve `extra.include_omnia_label` to a label channel (unknown → warn).
//! 2. Rewrite the variant's channels: label channel, upstream, own, fallback.
//! 3. Build.
//! 4. List the first entries of every artifact.
//! 5. Upload when a user is configured; no artifacts is a failed build.
//! 6. Purge build work directories, whatever happened above.
//! 7. Delete artifacts when cleaning.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use buildall_core::{process, BuildId, ChannelPolicy, Label, ProcessError, RecipeVariant, RenderedMeta};

use crate::error::BuildError;
use crate::upload::UploadRetrier;

/// Entries shown per artifact before the listing is cut off.
pub const LISTING_LIMIT: usize = 20;

/// Options shared by every build of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// Skip the recipe's tests.
    pub no_test: bool,
    /// Account to upload to; `None` disables upload.
    pub upload_user: Option<String>,
    pub force: bool,
    pub dev: bool,
    /// Delete artifacts once they have been handled.
    pub clean: bool,
}

/// The external package builder.
pub trait PackageBuilder {
    /// Build `variant`, returning the artifacts it produced.
    fn build(&self, variant: &RecipeVariant, no_test: bool) -> Result<Vec<PathBuf>, BuildError>;

    /// Remove build work directories and caches (never artifacts).
    fn purge(&self) -> Result<(), ProcessError>;

    /// Entry names inside an artifact archive.
    fn list_contents(&self, artifact: &Path) -> Result<Vec<String>, ProcessError>;
}

/// First entries of one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentListing {
    pub artifact: PathBuf,
    pub entries: Vec<String>,
    pub truncated: bool,
}

impl ContentListing {
    pub fn new(artifact: PathBuf, mut entries: Vec<String>) -> Self {
        let truncated = entries.len() > LISTING_LIMIT;
        entries.truncate(LISTING_LIMIT);
        Self {
            artifact,
            entries,
            truncated,
        }
    }
}

/// Outcome of one successful build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub build_id: BuildId,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub artifacts: Vec<PathBuf>,
    pub listings: Vec<ContentListing>,
    /// Labels uploaded under; empty when upload is off.
    pub uploaded_labels: Vec<String>,
}

/// Runs selected variants through build, listing, upload and cleanup.
pub struct Executor<'a> {
    builder: &'a dyn PackageBuilder,
    uploader: &'a UploadRetrier,
    policy: &'a ChannelPolicy,
    options: &'a BuildOptions,
}

impl<'a> Executor<'a> {
    pub fn new(
        builder: &'a dyn PackageBuilder,
        uploader: &'a UploadRetrier,
        policy: &'a ChannelPolicy,
        options: &'a BuildOptions,
    ) -> Self {
        Self {
            builder,
            uploader,
            policy,
            options,
        }
    }

    /// Build (and maybe upload) one variant. Rewrites `variant.channels`.
    pub fn execute(&self, variant: &mut RecipeVariant) -> Result<BuildReport, BuildError> {
        let label = extra_label(variant);
        variant.channels = self.policy.build_channels(label, &variant.channels);
        tracing::debug!(
            "channels for {}: {}",
            variant.build_id,
            variant
                .channels
                .iter()
                .map(|c| c.0.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let result = self.build_and_publish(variant);
        if let Err(err) = self.builder.purge() {
            tracing::warn!(error = %err, "failed to purge build directories");
        }
        let report = result?;
        if self.options.clean {
            for artifact in &report.artifacts {
                match std::fs::remove_file(artifact) {
                    Ok(()) => tracing::debug!("removed {}", artifact.display()),
                    Err(err) => tracing::warn!(error = %err, "cannot remove {}", artifact.display()),
                }
            }
        }
        Ok(report)
    }

    fn build_and_publish(&self, variant: &RecipeVariant) -> Result<BuildReport, BuildError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        tracing::info!("building {} {} ({})", variant.name, variant.version, variant.build_id);

        let artifacts = self.builder.build(variant, self.options.no_test)?;
        let listings = artifacts
            .iter()
            .filter_map(|artifact| match self.builder.list_contents(artifact) {
                Ok(entries) => Some(ContentListing::new(artifact.clone(), entries)),
                Err(err) => {
                    tracing::warn!(error = %err, "cannot list {}", artifact.display());
                    None
                }
            })
            .collect();

        if artifacts.is_empty() {
            return Err(BuildError::NoArtifacts {
                name: variant.name.clone(),
                build_id: variant.build_id.clone(),
            });
        }

        let uploaded_labels = match &self.options.upload_user {
            Some(user) => self
                .uploader
                .upload(variant, user, self.options.force, self.options.dev)?,
            None => vec![],
        };

        Ok(BuildReport {
            build_id: variant.build_id.clone(),
            name: variant.name.clone(),
            started_at,
            duration_ms: clock.elapsed().as_millis(),
            artifacts,
            listings,
            uploaded_labels,
        })
    }
}

fn extra_label(variant: &RecipeVariant) -> Option<Label> {
    let raw = variant.extra.include_omnia_label.as_deref()?;
    match raw.parse::<Label>() {
        Ok(label) => Some(label),
        Err(err) => {
            tracing::warn!("{}: {err}; building without an extra label channel", variant.name);
            None
        }
    }
}

// ---------------------------------------------------------------------------
// conda build backend
// ---------------------------------------------------------------------------

/// Builds with `conda build`, lists archives with `tar`.
#[derive(Debug, Clone)]
pub struct CondaBuilder {
    conda: PathBuf,
    tar: PathBuf,
}

impl Default for CondaBuilder {
    fn default() -> Self {
        Self::new("conda")
    }
}

impl CondaBuilder {
    pub fn new(conda: impl Into<PathBuf>) -> Self {
        Self {
            conda: conda.into(),
            tar: PathBuf::from("tar"),
        }
    }

    pub fn with_tar(mut self, tar: impl Into<PathBuf>) -> Self {
        self.tar = tar.into();
        self
    }

    fn command(&self, variant: &RecipeVariant, no_test: bool) -> Result<Command, BuildError> {
        let mut cmd = Command::new(&self.conda);
        cmd.arg("build").arg(variant.meta.recipe_dir());
        if let RenderedMeta::Provisional { variant: config, .. } = &variant.meta {
            cmd.args(["--python", config.python.as_str()])
                .args(["--numpy", config.numpy.as_str()]);
            let keys = config.variant_keys();
            if !keys.is_empty() {
                cmd.arg("--variants").arg(serde_json::to_string(&keys)?);
            }
            cmd.envs(config.env());
        }
        cmd.args(["--no-anaconda-upload", "--override-channels"]);
        if no_test {
            cmd.arg("--no-test");
        }
        for channel in &variant.channels {
            cmd.arg("-c").arg(&channel.0);
        }
        Ok(cmd)
    }
}

impl PackageBuilder for CondaBuilder {
    fn build(&self, variant: &RecipeVariant, no_test: bool) -> Result<Vec<PathBuf>, BuildError> {
        let mut cmd = self.command(variant, no_test)?;
        process::run_inherited(&mut cmd).map_err(|source| BuildError::Build {
            name: variant.name.clone(),
            build_id: variant.build_id.clone(),
            source,
        })?;
        if variant.output_path.is_file() {
            Ok(vec![variant.output_path.clone()])
        } else {
            Ok(vec![])
        }
    }

    fn purge(&self) -> Result<(), ProcessError> {
        process::run_captured(Command::new(&self.conda).args(["build", "purge"])).map(|_| ())
    }

    fn list_contents(&self, artifact: &Path) -> Result<Vec<String>, ProcessError> {
        let output = process::run_captured(Command::new(&self.tar).arg("-tf").arg(artifact))?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }
}
