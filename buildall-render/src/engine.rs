//! Recipe enumeration — [`MetadataRenderer`] and [`render_recipes`].

use std::path::{Path, PathBuf};

use buildall_core::{
    BuildId, BuildIdClock, Channel, ExtraConfig, RecipeVariant, RenderedMeta, VariantAxes,
    VariantConfig,
};

use crate::error::RenderError;
use crate::variants::{expand_axes, interleave, RenderOrder};

/// File whose presence marks a directory as a recipe.
pub const RECIPE_FILE: &str = "meta.yaml";

/// Options handed to the renderer for every variant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Channels made known to the renderer (and kept on each variant).
    pub channels: Vec<Channel>,
    /// Download sources and fully resolve the recipe. Off by default:
    /// provisional descriptors are enough to decide what to build.
    pub finalize: bool,
    /// Where final renders are staged. Defaults to the system temp dir.
    pub work_dir: Option<PathBuf>,
}

/// A single rendered variant, before it is given a build identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedVariant {
    pub name: String,
    pub version: String,
    pub output_path: PathBuf,
    pub skip: bool,
    pub extra: ExtraConfig,
    pub meta: RenderedMeta,
}

impl RenderedVariant {
    pub fn into_variant(self, build_id: BuildId, channels: Vec<Channel>) -> RecipeVariant {
        RecipeVariant {
            build_id,
            name: self.name,
            version: self.version,
            output_path: self.output_path,
            skip: self.skip,
            extra: self.extra,
            channels,
            meta: self.meta,
        }
    }
}

/// The external recipe-metadata renderer.
pub trait MetadataRenderer {
    /// Render `recipe_dir` for one variant combination.
    fn render_variant(
        &self,
        recipe_dir: &Path,
        variant: &VariantConfig,
        options: &RenderOptions,
    ) -> Result<RenderedVariant, RenderError>;
}

/// Render every variant of every recipe directory, in `order`.
///
/// Directories without a [`RECIPE_FILE`] are skipped with a warning; any
/// render failure aborts the whole call.
pub fn render_recipes<R>(
    renderer: &R,
    recipe_dirs: &[PathBuf],
    axes: &VariantAxes,
    options: &RenderOptions,
    order: RenderOrder,
    clock: &mut BuildIdClock,
) -> Result<Vec<RecipeVariant>, RenderError>
where
    R: MetadataRenderer + ?Sized,
{
    let combos = expand_axes(axes);
    tracing::trace!(?axes, combinations = combos.len(), "variant axes");

    let mut groups: Vec<Vec<RecipeVariant>> = Vec::with_capacity(recipe_dirs.len());
    for dir in recipe_dirs {
        if !dir.join(RECIPE_FILE).is_file() {
            tracing::warn!("skipping {}: no {RECIPE_FILE} found", dir.display());
            continue;
        }

        let mut group = Vec::with_capacity(combos.len());
        for variant in &combos {
            tracing::trace!(recipe = %dir.display(), %variant, "rendering");
            let rendered = renderer.render_variant(dir, variant, options)?;
            // Distinct variants can otherwise collapse onto one identifier.
            let build_id = clock.next_id();
            tracing::debug!(
                "rendered {} {} ({variant}) as {build_id}",
                rendered.name,
                rendered.version
            );
            group.push(rendered.into_variant(build_id, options.channels.clone()));
        }
        groups.push(group);
    }

    Ok(match order {
        RenderOrder::PackageMajor => groups.into_iter().flatten().collect(),
        RenderOrder::Cycle => interleave(groups),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;
    use std::time::Duration;

    use tempfile::TempDir;

    /// Records calls; fails for recipes named `broken`.
    #[derive(Default)]
    struct FakeRenderer {
        calls: RefCell<Vec<(PathBuf, VariantConfig)>>,
    }

    impl MetadataRenderer for FakeRenderer {
        fn render_variant(
            &self,
            recipe_dir: &Path,
            variant: &VariantConfig,
            _options: &RenderOptions,
        ) -> Result<RenderedVariant, RenderError> {
            self.calls
                .borrow_mut()
                .push((recipe_dir.to_path_buf(), variant.clone()));
            let name = recipe_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if name == "broken" {
                return Err(RenderError::Parse {
                    path: recipe_dir.to_path_buf(),
                    message: "no package section".to_string(),
                });
            }
            Ok(RenderedVariant {
                output_path: PathBuf::from(format!("/bld/{name}-1.0-py{}_0.tar.bz2", variant.python)),
                name,
                version: "1.0".to_string(),
                skip: false,
                extra: ExtraConfig::default(),
                meta: RenderedMeta::Provisional {
                    recipe_dir: recipe_dir.to_path_buf(),
                    variant: variant.clone(),
                },
            })
        }
    }

    fn recipe(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(RECIPE_FILE), "package:\n  name: x\n").unwrap();
        dir
    }

    fn axes(python: &[&str]) -> VariantAxes {
        VariantAxes {
            python: python.iter().map(|s| s.to_string()).collect(),
            numpy: vec!["1.11".to_string()],
            cuda: vec![],
        }
    }

    fn clock() -> BuildIdClock {
        BuildIdClock::new(Duration::ZERO)
    }

    #[test]
    fn package_major_order_groups_by_recipe() {
        let tmp = TempDir::new().unwrap();
        let dirs = vec![recipe(tmp.path(), "a"), recipe(tmp.path(), "b")];
        let out = render_recipes(
            &FakeRenderer::default(),
            &dirs,
            &axes(&["2.7", "3.6"]),
            &RenderOptions::default(),
            RenderOrder::PackageMajor,
            &mut clock(),
        )
        .unwrap();
        let names: Vec<String> = out.iter().map(|v| v.output_filename()).collect();
        assert_eq!(
            names,
            [
                "a-1.0-py2.7_0.tar.bz2",
                "a-1.0-py3.6_0.tar.bz2",
                "b-1.0-py2.7_0.tar.bz2",
                "b-1.0-py3.6_0.tar.bz2",
            ]
        );
    }

    #[test]
    fn cycle_order_alternates_recipes() {
        let tmp = TempDir::new().unwrap();
        let dirs = vec![recipe(tmp.path(), "a"), recipe(tmp.path(), "b")];
        let out = render_recipes(
            &FakeRenderer::default(),
            &dirs,
            &axes(&["2.7", "3.6"]),
            &RenderOptions::default(),
            RenderOrder::Cycle,
            &mut clock(),
        )
        .unwrap();
        let names: Vec<&str> = out.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["a", "b", "a", "b"]);
    }

    #[test]
    fn missing_recipe_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let empty = tmp.path().join("not-a-recipe");
        fs::create_dir_all(&empty).unwrap();
        let renderer = FakeRenderer::default();
        let out = render_recipes(
            &renderer,
            &[empty, recipe(tmp.path(), "a")],
            &axes(&["3.7"]),
            &RenderOptions::default(),
            RenderOrder::PackageMajor,
            &mut clock(),
        )
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(renderer.calls.borrow().len(), 1);
    }

    #[test]
    fn render_failure_aborts() {
        let tmp = TempDir::new().unwrap();
        let dirs = vec![recipe(tmp.path(), "broken"), recipe(tmp.path(), "a")];
        let renderer = FakeRenderer::default();
        let err = render_recipes(
            &renderer,
            &dirs,
            &axes(&["3.7"]),
            &RenderOptions::default(),
            RenderOrder::PackageMajor,
            &mut clock(),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::Parse { .. }));
        assert_eq!(renderer.calls.borrow().len(), 1, "nothing rendered after the failure");
    }

    #[test]
    fn every_variant_gets_a_distinct_build_id_and_channels() {
        let tmp = TempDir::new().unwrap();
        let dirs = vec![recipe(tmp.path(), "a"), recipe(tmp.path(), "b")];
        let options = RenderOptions {
            channels: vec![Channel::from("omnia")],
            ..RenderOptions::default()
        };
        let out = render_recipes(
            &FakeRenderer::default(),
            &dirs,
            &axes(&["2.7", "3.6", "3.7"]),
            &options,
            RenderOrder::PackageMajor,
            &mut clock(),
        )
        .unwrap();
        let mut ids: Vec<&BuildId> = out.iter().map(|v| &v.build_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
        assert!(out.iter().all(|v| v.channels == [Channel::from("omnia")]));
    }
}
