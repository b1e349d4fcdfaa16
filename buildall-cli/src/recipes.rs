//! Expansion of recipe arguments.
//!
//! Arguments holding glob syntax (`*`, `?`, `[...]`) are expanded to the
//! directories they match, sorted. Other arguments pass through untouched.
//! Repeated paths are kept once, first wins.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub fn expand(args: &[String]) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut dirs = Vec::new();
    for arg in args {
        for dir in expand_one(arg)? {
            if seen.insert(dir.clone()) {
                dirs.push(dir);
            }
        }
    }
    Ok(dirs)
}

fn expand_one(arg: &str) -> Result<Vec<PathBuf>> {
    if !arg.contains(['*', '?', '[']) {
        return Ok(vec![PathBuf::from(arg)]);
    }

    let mut matches = Vec::new();
    for entry in glob::glob(arg).with_context(|| format!("invalid recipe pattern {arg}"))? {
        let path = entry.with_context(|| format!("cannot expand {arg}"))?;
        if path.is_dir() {
            matches.push(path);
        }
    }
    matches.sort();

    if matches.is_empty() {
        tracing::warn!("{arg} matched no recipe directories");
    }
    Ok(matches)
}
