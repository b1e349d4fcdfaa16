//! Existence index for `buildall-index`.
//!
//! [`PackageIndex::query`] asks the package index once for everything
//! published under a set of channels and returns an [`ExistenceIndex`]:
//! artifact filename → channel → [`PackageRecord`]. The index is built once per
//! run and only read afterwards.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use buildall_core::{process, Channel, ProcessError};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What the index knows about one published artifact in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub build: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdir: Option<String>,
}

/// Published artifacts grouped by filename, then by channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistenceIndex {
    by_filename: HashMap<String, HashMap<String, PackageRecord>>,
}

impl ExistenceIndex {
    pub fn insert(&mut self, filename: impl Into<String>, channel: impl Into<String>, record: PackageRecord) {
        self.by_filename
            .entry(filename.into())
            .or_default()
            .insert(channel.into(), record);
    }

    /// `true` if `filename` is published in any of the queried channels.
    pub fn contains(&self, filename: &str) -> bool {
        self.by_filename.contains_key(filename)
    }

    /// Channels (and records) holding `filename`.
    pub fn channels_for(&self, filename: &str) -> Option<&HashMap<String, PackageRecord>> {
        self.by_filename.get(filename)
    }

    /// Number of distinct filenames.
    pub fn len(&self) -> usize {
        self.by_filename.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_filename.is_empty()
    }

    /// Build an index from `conda search --json` output.
    ///
    /// The channel key has the record's platform subdirectory stripped, so it
    /// matches the channel URL that was queried.
    pub fn from_search_json(json: &str) -> Result<Self, IndexError> {
        let parsed: SearchOutput = serde_json::from_str(json)?;
        let packages = match parsed {
            SearchOutput::Error(err) => return Err(conda_error(err)),
            SearchOutput::Packages(packages) => packages,
        };

        let mut index = Self::default();
        for (name, records) in packages {
            for raw in records {
                let channel = strip_subdir(&raw.channel, raw.subdir.as_deref());
                let record = PackageRecord {
                    name: raw.name.unwrap_or_else(|| name.clone()),
                    version: raw.version,
                    build: raw.build,
                    md5: raw.md5,
                    sha256: raw.sha256,
                    subdir: raw.subdir,
                };
                index.insert(raw.filename, channel, record);
            }
        }
        Ok(index)
    }
}

/// Errors from the package index query. All of them abort the run.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("package index query failed: {0}")]
    Query(#[from] ProcessError),

    #[error("package index returned {exception}: {message}")]
    Conda { exception: String, message: String },

    #[error("failed to parse package index output: {0}")]
    Json(#[from] serde_json::Error),
}

/// The external package-index collaborator.
pub trait PackageIndex {
    fn query(&self, channels: &[Channel]) -> Result<ExistenceIndex, IndexError>;
}

// ---------------------------------------------------------------------------
// conda search backend
// ---------------------------------------------------------------------------

/// `conda search` reports an empty result set with this exception.
const NOT_FOUND_EXCEPTION: &str = "PackagesNotFoundError";

/// Queries channels with `conda search --json --override-channels`.
#[derive(Debug, Clone)]
pub struct CondaIndex {
    conda: PathBuf,
}

impl Default for CondaIndex {
    fn default() -> Self {
        Self::new("conda")
    }
}

impl CondaIndex {
    pub fn new(conda: impl Into<PathBuf>) -> Self {
        Self {
            conda: conda.into(),
        }
    }

    fn command(&self, channels: &[Channel]) -> Command {
        let mut cmd = Command::new(&self.conda);
        cmd.args(["search", "--json", "--override-channels"]);
        for channel in channels {
            cmd.arg("-c").arg(channel.url());
        }
        cmd.arg("*");
        cmd
    }
}

impl PackageIndex for CondaIndex {
    fn query(&self, channels: &[Channel]) -> Result<ExistenceIndex, IndexError> {
        if channels.is_empty() {
            return Ok(ExistenceIndex::default());
        }
        let output = process::run_unchecked(&mut self.command(channels))?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if output.status.success() {
            let index = ExistenceIndex::from_search_json(&stdout)?;
            tracing::info!(
                channels = channels.len(),
                packages = index.len(),
                "loaded package index"
            );
            return Ok(index);
        }

        // A failing search still prints a JSON error document on stdout.
        match serde_json::from_str::<CondaErrorDoc>(&stdout) {
            Ok(err) if err.exception_name == NOT_FOUND_EXCEPTION => {
                tracing::info!("no packages published in the checked channels");
                Ok(ExistenceIndex::default())
            }
            Ok(err) => Err(conda_error(err)),
            Err(_) => Err(IndexError::Query(ProcessError::Failed {
                command: process::describe(&self.command(channels)),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchOutput {
    Error(CondaErrorDoc),
    Packages(BTreeMap<String, Vec<SearchRecord>>),
}

#[derive(Debug, Deserialize)]
struct CondaErrorDoc {
    exception_name: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchRecord {
    #[serde(rename = "fn")]
    filename: String,
    channel: String,
    #[serde(default)]
    name: Option<String>,
    version: String,
    build: String,
    #[serde(default)]
    md5: Option<String>,
    #[serde(default)]
    sha256: Option<String>,
    #[serde(default)]
    subdir: Option<String>,
}

fn conda_error(err: CondaErrorDoc) -> IndexError {
    IndexError::Conda {
        exception: err.exception_name,
        message: err.message.or(err.error).unwrap_or_default(),
    }
}

fn strip_subdir(channel: &str, subdir: Option<&str>) -> String {
    let channel = channel.trim_end_matches('/');
    match subdir {
        Some(subdir) => channel
            .strip_suffix(subdir)
            .map(|c| c.trim_end_matches('/'))
            .unwrap_or(channel)
            .to_string(),
        None => channel.to_string(),
    }
}
