//! Domain types for recipe variants.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::channel::Channel;

// ---------------------------------------------------------------------------
// Build identifiers
// ---------------------------------------------------------------------------

/// A time-ordered identifier assigned to every rendered variant.
///
/// Lexical order equals chronological order (`%Y%m%d%H%M%S` + milliseconds).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BuildId(pub String);

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for BuildId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for BuildId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Hands out strictly increasing [`BuildId`]s derived from wall-clock time.
///
/// Sleeps `spacing` between assignments so consecutive identifiers land on
/// distinct clock ticks; if the clock still has not advanced (or went
/// backwards), the previous value is bumped by one millisecond.
#[derive(Debug, Clone)]
pub struct BuildIdClock {
    spacing: Duration,
    last_millis: Option<i64>,
}

/// Default pause between two identifier assignments.
pub const BUILD_ID_SPACING: Duration = Duration::from_millis(50);

impl Default for BuildIdClock {
    fn default() -> Self {
        Self::new(BUILD_ID_SPACING)
    }
}

impl BuildIdClock {
    pub fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            last_millis: None,
        }
    }

    /// Assign the next identifier.
    pub fn next_id(&mut self) -> BuildId {
        if self.last_millis.is_some() && !self.spacing.is_zero() {
            std::thread::sleep(self.spacing);
        }
        let mut millis = Utc::now().timestamp_millis();
        if let Some(last) = self.last_millis {
            if millis <= last {
                millis = last + 1;
            }
        }
        self.last_millis = Some(millis);
        let at: DateTime<Utc> = DateTime::from_timestamp_millis(millis).unwrap_or_default();
        BuildId(at.format("%Y%m%d%H%M%S%3f").to_string())
    }
}

// ---------------------------------------------------------------------------
// Variant axes
// ---------------------------------------------------------------------------

/// A CUDA toolkit version in both its dotted and its compact form
/// (`9.2` / `92`, `10.0` / `100`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CudaVersion {
    pub full: String,
    pub short: String,
}

impl fmt::Display for CudaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.full.fmt(f)
    }
}

/// Ordered values for each variant axis, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VariantAxes {
    pub python: Vec<String>,
    pub numpy: Vec<String>,
    #[serde(default)]
    pub cuda: Vec<CudaVersion>,
}

/// One concrete combination of axis values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantConfig {
    pub python: String,
    pub numpy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cuda: Option<CudaVersion>,
}

impl VariantConfig {
    /// Extra variant keys handed to the renderer and builder (`--variants`).
    pub fn variant_keys(&self) -> BTreeMap<String, String> {
        let mut keys = BTreeMap::new();
        if let Some(cuda) = &self.cuda {
            keys.insert("cuda_version".to_string(), cuda.full.clone());
            keys.insert("cuda_short_version".to_string(), cuda.short.clone());
        }
        keys
    }

    /// Environment variables exported to the build for this variant.
    pub fn env(&self) -> Vec<(&'static str, String)> {
        match &self.cuda {
            Some(cuda) => vec![
                ("CUDA_VERSION", cuda.full.clone()),
                ("CUDA_SHORT_VERSION", cuda.short.clone()),
            ],
            None => vec![],
        }
    }
}

impl fmt::Display for VariantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "python={} numpy={}", self.python, self.numpy)?;
        if let Some(cuda) = &self.cuda {
            write!(f, " cuda={cuda}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Rendered metadata
// ---------------------------------------------------------------------------

/// How far a variant was rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedMeta {
    /// Rendered without source download or finalization; the builder must
    /// re-render from the recipe directory with the same variant.
    Provisional {
        recipe_dir: PathBuf,
        variant: VariantConfig,
    },
    /// Fully resolved; `recipe_dir` holds the rendered recipe.
    Final { recipe_dir: PathBuf },
}

impl RenderedMeta {
    pub fn recipe_dir(&self) -> &Path {
        match self {
            RenderedMeta::Provisional { recipe_dir, .. } => recipe_dir,
            RenderedMeta::Final { recipe_dir } => recipe_dir,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, RenderedMeta::Final { .. })
    }
}

/// The recipe's free-form `extra:` block, with the keys this tool acts on
/// pulled out.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtraConfig {
    /// Build and upload regardless of any existing artifact.
    #[serde(default, deserialize_with = "truthy")]
    pub force_upload: bool,

    /// Comma-separated upload labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload: Option<String>,

    /// Label whose channel is put in front of the build channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_omnia_label: Option<String>,

    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

impl ExtraConfig {
    /// Labels listed under `upload`, trimmed, empties dropped. `None` when
    /// no label is left.
    pub fn upload_labels(&self) -> Option<Vec<String>> {
        let labels: Vec<String> = self
            .upload
            .as_deref()?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        (!labels.is_empty()).then_some(labels)
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_yaml::Value;

    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "on" | "1"
        ),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        _ => false,
    })
}

/// One rendered (recipe, variant) pair: the unit the selector, executor and
/// uploader operate on.
#[derive(Debug, Clone, PartialEq)]
pub struct RecipeVariant {
    pub build_id: BuildId,
    pub name: String,
    pub version: String,
    /// Where the builder will place the artifact.
    pub output_path: PathBuf,
    pub skip: bool,
    pub extra: ExtraConfig,
    pub channels: Vec<Channel>,
    pub meta: RenderedMeta,
}

impl RecipeVariant {
    /// Base filename of the output artifact (the existence-index key).
    pub fn output_filename(&self) -> String {
        self.output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `true` when both descriptors describe the same build, ignoring the
    /// build identifier.
    pub fn same_build(&self, other: &RecipeVariant) -> bool {
        self.name == other.name
            && self.version == other.version
            && self.output_path == other.output_path
            && self.skip == other.skip
            && self.extra == other.extra
            && self.channels == other.channels
            && self.meta == other.meta
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
