//! Packages that never go to the `dev` label automatically.
//!
//! The list lives in a plain text file (`.pre_black_listed` by default):
//! one package name per line, blank lines and `#` comments ignored.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;

use crate::error::{io_err, CoreError};

/// Default exclusion-list file name, resolved against the working directory.
pub const DEFAULT_EXCLUSIONS_FILE: &str = ".pre_black_listed";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrereleaseExclusions {
    names: BTreeSet<String>,
}

impl PrereleaseExclusions {
    pub fn parse(contents: &str) -> Self {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect()
    }

    /// Load the list at `path`. A missing file is an empty list.
    pub fn load_at(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let list = Self::parse(&contents);
                tracing::debug!(path = %path.display(), entries = list.len(), "loaded pre-release exclusions");
                Ok(list)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(io_err(path, err)),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<String> for PrereleaseExclusions {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}
