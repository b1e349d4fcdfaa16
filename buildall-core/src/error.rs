//! Error types for buildall-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from parsing configuration values and reading local files.
#[derive(Debug, Error)]
pub enum CoreError {
    /// I/O failure, annotated with the path being read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `--python` / `--numpy` / `--cuda` token that cannot be interpreted.
    #[error("invalid version token '{token}': {reason}")]
    InvalidVersionToken { token: String, reason: String },

    /// A label outside the standard set was requested where only those are allowed.
    #[error("unknown label '{0}'; expected one of: main, dev, rc, beta")]
    UnknownLabel(String),
}

/// Errors from running an external tool (`conda`, `anaconda`, `tar`).
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started at all.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran but exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
