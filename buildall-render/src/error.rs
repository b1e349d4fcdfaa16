//! Error types for buildall-render.

use std::path::PathBuf;

use thiserror::Error;

use buildall_core::ProcessError;

/// Rendering failures. All of them abort the run.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The renderer tool rejected the recipe (malformed recipe, unmet
    /// dependency, script exit).
    #[error("failed to render {path}: {source}")]
    Recipe {
        path: PathBuf,
        #[source]
        source: ProcessError,
    },

    /// The renderer produced output this tool does not understand.
    #[error("unexpected render output for {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Filesystem error while staging a final render.
    #[error("render I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Variant keys could not be encoded for the renderer.
    #[error("variant serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io {
        path: path.into(),
        source,
    }
}
