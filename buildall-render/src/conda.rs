//! `conda render` backend for [`MetadataRenderer`].
//!
//! Each variant costs two invocations: one printing the rendered recipe as
//! YAML, one with `--output` printing the artifact path.

use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;

use buildall_core::{process, ExtraConfig, RenderedMeta, VariantConfig};

use crate::engine::{MetadataRenderer, RenderOptions, RenderedVariant, RECIPE_FILE};
use crate::error::{io_err, RenderError};

/// Renders recipes by shelling out to `conda render`.
#[derive(Debug, Clone)]
pub struct CondaRenderer {
    conda: PathBuf,
}

impl Default for CondaRenderer {
    fn default() -> Self {
        Self::new("conda")
    }
}

impl CondaRenderer {
    pub fn new(conda: impl Into<PathBuf>) -> Self {
        Self {
            conda: conda.into(),
        }
    }

    fn command(
        &self,
        recipe_dir: &Path,
        variant: &VariantConfig,
        options: &RenderOptions,
    ) -> Result<Command, RenderError> {
        let mut cmd = Command::new(&self.conda);
        cmd.arg("render")
            .arg(recipe_dir)
            .args(["--python", variant.python.as_str()])
            .args(["--numpy", variant.numpy.as_str()]);
        let keys = variant.variant_keys();
        if !keys.is_empty() {
            cmd.arg("--variants").arg(serde_json::to_string(&keys)?);
        }
        if !options.finalize {
            cmd.arg("--no-source");
        }
        for channel in &options.channels {
            cmd.arg("-c").arg(&channel.0);
        }
        cmd.envs(variant.env());
        Ok(cmd)
    }

    fn run(&self, recipe_dir: &Path, mut cmd: Command) -> Result<String, RenderError> {
        let output = process::run_captured(&mut cmd).map_err(|source| RenderError::Recipe {
            path: recipe_dir.to_path_buf(),
            source,
        })?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl MetadataRenderer for CondaRenderer {
    fn render_variant(
        &self,
        recipe_dir: &Path,
        variant: &VariantConfig,
        options: &RenderOptions,
    ) -> Result<RenderedVariant, RenderError> {
        let yaml = self.run(recipe_dir, self.command(recipe_dir, variant, options)?)?;
        let body = recipe_body(recipe_dir, &yaml)?;
        let recipe = parse_rendered(recipe_dir, body)?;

        let mut cmd = self.command(recipe_dir, variant, options)?;
        cmd.arg("--output");
        let listing = self.run(recipe_dir, cmd)?;
        let output_path = parse_output_path(recipe_dir, &listing)?;

        let meta = if options.finalize {
            let work_dir = options
                .work_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join("buildall-render"));
            let staged = stage_final(recipe_dir, &work_dir, &output_path, body)?;
            RenderedMeta::Final { recipe_dir: staged }
        } else {
            RenderedMeta::Provisional {
                recipe_dir: recipe_dir.to_path_buf(),
                variant: variant.clone(),
            }
        };

        Ok(RenderedVariant {
            name: recipe.package.name,
            version: recipe.package.version,
            output_path,
            skip: recipe.build.unwrap_or_default().skip,
            extra: recipe.extra.unwrap_or_default(),
            meta,
        })
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RenderedRecipe {
    package: PackageSection,
    #[serde(default)]
    build: Option<BuildSection>,
    #[serde(default)]
    extra: Option<ExtraConfig>,
}

#[derive(Debug, Deserialize)]
struct PackageSection {
    name: String,
    #[serde(deserialize_with = "scalar_string")]
    version: String,
}

#[derive(Debug, Default, Deserialize)]
struct BuildSection {
    #[serde(default)]
    skip: bool,
}

fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    use serde_yaml::Value;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected a version string, got {other:?}"))),
    }
}

/// The YAML document in `stdout`, starting at the `package:` key. Anything
/// the renderer logs before it is dropped.
fn recipe_body<'a>(recipe_dir: &Path, stdout: &'a str) -> Result<&'a str, RenderError> {
    let mut offset = 0;
    for line in stdout.split_inclusive('\n') {
        if line.starts_with("package:") {
            return Ok(&stdout[offset..]);
        }
        offset += line.len();
    }
    Err(RenderError::Parse {
        path: recipe_dir.to_path_buf(),
        message: "no `package:` section in render output".to_string(),
    })
}

fn parse_rendered(recipe_dir: &Path, body: &str) -> Result<RenderedRecipe, RenderError> {
    serde_yaml::from_str(body).map_err(|e| RenderError::Parse {
        path: recipe_dir.to_path_buf(),
        message: e.to_string(),
    })
}

/// First artifact path printed by `conda render --output`.
fn parse_output_path(recipe_dir: &Path, stdout: &str) -> Result<PathBuf, RenderError> {
    let mut artifacts = stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.ends_with(".tar.bz2") || line.ends_with(".conda"));
    let first = artifacts.next().ok_or_else(|| RenderError::Parse {
        path: recipe_dir.to_path_buf(),
        message: "no artifact path in `--output` listing".to_string(),
    })?;
    let extra = artifacts.count();
    if extra > 0 {
        tracing::debug!(
            "{} renders {} more output(s); only the first is tracked",
            recipe_dir.display(),
            extra
        );
    }
    Ok(PathBuf::from(first))
}

// ---------------------------------------------------------------------------
// Final renders
// ---------------------------------------------------------------------------

/// Copy the recipe into `work_dir/<artifact stem>/` and replace its
/// `meta.yaml` with the rendered document.
fn stage_final(
    recipe_dir: &Path,
    work_dir: &Path,
    output_path: &Path,
    body: &str,
) -> Result<PathBuf, RenderError> {
    let stem = output_path
        .file_name()
        .map(|n| n.to_string_lossy().trim_end_matches(".tar.bz2").trim_end_matches(".conda").to_string())
        .unwrap_or_else(|| "recipe".to_string());
    let target = work_dir.join(stem);
    if target.exists() {
        std::fs::remove_dir_all(&target).map_err(|e| io_err(&target, e))?;
    }
    copy_dir(recipe_dir, &target)?;
    let meta = target.join(RECIPE_FILE);
    std::fs::write(&meta, body).map_err(|e| io_err(&meta, e))?;
    Ok(target)
}

fn copy_dir(from: &Path, to: &Path) -> Result<(), RenderError> {
    std::fs::create_dir_all(to).map_err(|e| io_err(to, e))?;
    let entries = std::fs::read_dir(from).map_err(|e| io_err(from, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(from, e))?;
        let path = entry.path();
        let dest = to.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| io_err(&path, e))?;
        if file_type.is_dir() {
            copy_dir(&path, &dest)?;
        } else {
            std::fs::copy(&path, &dest).map_err(|e| io_err(&path, e))?;
        }
    }
    Ok(())
}
