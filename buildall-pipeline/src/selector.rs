//! Build selection.
//!
//! Rule precedence per variant, first match wins:
//! 1. `Duplicate` (output path already queued in this run)
//! 2. `ForceUpload` (`extra.force_upload` set) → build
//! 3. `ExistsLocally` (artifact on disk and not `rebuild`)
//! 4. `SkippedByRecipe` (the recipe's own skip flag)
//! 5. `AlreadyPublished` (filename in the existence index and not `force`)
//! 6. `Build`
//!
//! Selection is lazy: the local-disk check for a variant runs only after every
//! earlier selected variant has been handed out (and, in a real run, built).

use std::collections::HashMap;
use std::path::PathBuf;

use buildall_core::RecipeVariant;
use buildall_index::ExistenceIndex;

/// Variants already handed out in this run, keyed by output path.
pub type QueuedSet = HashMap<PathBuf, RecipeVariant>;

/// Flags that relax the existence checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectorFlags {
    /// Build even if the artifact is already published.
    pub force: bool,
    /// Build even if the artifact is already on local disk.
    pub rebuild: bool,
}

/// Outcome of the selection rules for one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Duplicate,
    ForceUpload,
    ExistsLocally,
    SkippedByRecipe,
    AlreadyPublished,
    Build,
}

impl Decision {
    pub fn builds(&self) -> bool {
        matches!(self, Decision::ForceUpload | Decision::Build)
    }
}

/// Apply the selection rules to `variant` without recording anything.
pub fn decide(
    variant: &RecipeVariant,
    queued: &QueuedSet,
    index: &ExistenceIndex,
    flags: SelectorFlags,
) -> Decision {
    if queued.contains_key(&variant.output_path) {
        return Decision::Duplicate;
    }
    if variant.extra.force_upload {
        return Decision::ForceUpload;
    }
    if !flags.rebuild && variant.output_path.exists() {
        return Decision::ExistsLocally;
    }
    if variant.skip {
        return Decision::SkippedByRecipe;
    }
    if !flags.force && index.contains(&variant.output_filename()) {
        return Decision::AlreadyPublished;
    }
    Decision::Build
}

/// Single-pass iterator over the variants that must be built.
pub struct BuildSelector<'a, I> {
    variants: I,
    index: &'a ExistenceIndex,
    flags: SelectorFlags,
    queued: QueuedSet,
}

/// Select the variants of `variants` that need building.
pub fn select_builds<'a, I>(
    variants: I,
    index: &'a ExistenceIndex,
    flags: SelectorFlags,
) -> BuildSelector<'a, I::IntoIter>
where
    I: IntoIterator<Item = RecipeVariant>,
{
    BuildSelector {
        variants: variants.into_iter(),
        index,
        flags,
        queued: QueuedSet::new(),
    }
}

impl<I> BuildSelector<'_, I> {
    /// Variants handed out so far.
    pub fn queued(&self) -> &QueuedSet {
        &self.queued
    }
}

impl<I> Iterator for BuildSelector<'_, I>
where
    I: Iterator<Item = RecipeVariant>,
{
    type Item = RecipeVariant;

    fn next(&mut self) -> Option<RecipeVariant> {
        for variant in self.variants.by_ref() {
            let decision = decide(&variant, &self.queued, self.index, self.flags);
            let file = variant.output_filename();
            match decision {
                Decision::Duplicate => {
                    let identical = self
                        .queued
                        .get(&variant.output_path)
                        .is_some_and(|earlier| earlier.same_build(&variant));
                    if identical {
                        tracing::debug!("skipping {file}: already queued");
                    } else {
                        tracing::warn!(
                            "skipping {file} ({}): another variant with the same output is \
                             already queued; check the recipe for unpinned dependencies",
                            variant.build_id
                        );
                    }
                }
                Decision::ExistsLocally => {
                    tracing::debug!("skipping {file}: exists at {}", variant.output_path.display());
                }
                Decision::SkippedByRecipe => tracing::debug!("skipping {file}: recipe skip"),
                Decision::AlreadyPublished => {
                    tracing::debug!("skipping {file}: already in the package index");
                }
                Decision::ForceUpload | Decision::Build => {
                    if decision == Decision::ForceUpload {
                        tracing::debug!("scheduling {file}: force_upload is set");
                    } else {
                        tracing::debug!("scheduling {file}");
                    }
                    self.queued
                        .insert(variant.output_path.clone(), variant.clone());
                    return Some(variant);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use buildall_core::{BuildId, ExtraConfig, RenderedMeta, VariantConfig};
    use buildall_index::PackageRecord;
    use tempfile::TempDir;

    fn variant(id: &str, output: &Path) -> RecipeVariant {
        RecipeVariant {
            build_id: BuildId::from(id),
            name: "openmm".to_string(),
            version: "7.3.1".to_string(),
            output_path: output.to_path_buf(),
            skip: false,
            extra: ExtraConfig::default(),
            channels: vec![],
            meta: RenderedMeta::Provisional {
                recipe_dir: PathBuf::from("recipes/openmm"),
                variant: VariantConfig {
                    python: "3.7".to_string(),
                    numpy: "1.11".to_string(),
                    cuda: None,
                },
            },
        }
    }

    fn published(filename: &str) -> ExistenceIndex {
        let mut index = ExistenceIndex::default();
        index.insert(
            filename,
            "https://conda.anaconda.org/omnia/label/main",
            PackageRecord {
                name: "openmm".to_string(),
                version: "7.3.1".to_string(),
                build: "py37_0".to_string(),
                md5: Some("abc".to_string()),
                sha256: None,
                subdir: Some("linux-64".to_string()),
            },
        );
        index
    }

    #[test]
    fn fresh_variant_builds() {
        let tmp = TempDir::new().unwrap();
        let v = variant("1", &tmp.path().join("openmm-7.3.1-py37_0.tar.bz2"));
        let d = decide(&v, &QueuedSet::new(), &ExistenceIndex::default(), SelectorFlags::default());
        assert_eq!(d, Decision::Build);
        assert!(d.builds());
    }

    #[test]
    fn local_file_beats_recipe_skip_and_index() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("openmm-7.3.1-py37_0.tar.bz2");
        fs::write(&out, b"pkg").unwrap();
        let mut v = variant("1", &out);
        v.skip = true;
        let index = published("openmm-7.3.1-py37_0.tar.bz2");
        assert_eq!(
            decide(&v, &QueuedSet::new(), &index, SelectorFlags::default()),
            Decision::ExistsLocally
        );
    }

    #[test]
    fn rebuild_ignores_local_file() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("openmm-7.3.1-py37_0.tar.bz2");
        fs::write(&out, b"pkg").unwrap();
        let flags = SelectorFlags {
            rebuild: true,
            ..SelectorFlags::default()
        };
        assert_eq!(
            decide(&variant("1", &out), &QueuedSet::new(), &ExistenceIndex::default(), flags),
            Decision::Build
        );
    }

    #[test]
    fn recipe_skip_checked_before_index() {
        let tmp = TempDir::new().unwrap();
        let mut v = variant("1", &tmp.path().join("openmm-7.3.1-py37_0.tar.bz2"));
        v.skip = true;
        let index = published("openmm-7.3.1-py37_0.tar.bz2");
        let flags = SelectorFlags {
            force: true,
            rebuild: true,
        };
        assert_eq!(decide(&v, &QueuedSet::new(), &index, flags), Decision::SkippedByRecipe);
    }

    #[test]
    fn force_overrides_index() {
        let tmp = TempDir::new().unwrap();
        let v = variant("1", &tmp.path().join("openmm-7.3.1-py37_0.tar.bz2"));
        let index = published("openmm-7.3.1-py37_0.tar.bz2");
        assert_eq!(
            decide(&v, &QueuedSet::new(), &index, SelectorFlags::default()),
            Decision::AlreadyPublished
        );
        let flags = SelectorFlags {
            force: true,
            ..SelectorFlags::default()
        };
        assert_eq!(decide(&v, &QueuedSet::new(), &index, flags), Decision::Build);
    }

    #[test]
    fn duplicate_beats_force_upload() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("openmm-7.3.1-py37_0.tar.bz2");
        let mut v = variant("2", &out);
        v.extra.force_upload = true;
        let mut queued = QueuedSet::new();
        queued.insert(out.clone(), variant("1", &out));
        assert_eq!(
            decide(&v, &queued, &ExistenceIndex::default(), SelectorFlags::default()),
            Decision::Duplicate
        );
    }

    #[test]
    fn differing_duplicate_yields_only_the_first() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("openmm-7.3.1-py37_0.tar.bz2");
        let first = variant("1", &out);
        let mut second = variant("2", &out);
        second.meta = RenderedMeta::Provisional {
            recipe_dir: PathBuf::from("recipes/openmm"),
            variant: VariantConfig {
                python: "3.7".to_string(),
                numpy: "1.14".to_string(),
                cuda: None,
            },
        };
        assert!(!first.same_build(&second));

        let index = ExistenceIndex::default();
        let mut selector = select_builds(vec![first, second], &index, SelectorFlags::default());
        assert_eq!(selector.next().map(|v| v.build_id), Some(BuildId::from("1")));
        assert!(selector.next().is_none());
        let kept = selector.queued().get(&out).map(|v| v.build_id.clone());
        assert_eq!(kept, Some(BuildId::from("1")));
    }

    #[test]
    fn selector_records_what_it_yields() {
        let tmp = TempDir::new().unwrap();
        let a = variant("1", &tmp.path().join("a.tar.bz2"));
        let b = variant("2", &tmp.path().join("b.tar.bz2"));
        let index = ExistenceIndex::default();
        let mut selector = select_builds(vec![a, b], &index, SelectorFlags::default());
        assert_eq!(selector.next().map(|v| v.build_id), Some(BuildId::from("1")));
        assert_eq!(selector.queued().len(), 1);
        assert_eq!(selector.next().map(|v| v.build_id), Some(BuildId::from("2")));
        assert!(selector.next().is_none());
        assert_eq!(selector.queued().len(), 2);
    }
}
