//! Error types for buildall-pipeline.

use std::path::PathBuf;

use thiserror::Error;

use buildall_core::{BuildId, CoreError, ProcessError};
use buildall_index::IndexError;
use buildall_render::RenderError;

/// Errors that stop the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("configuration error: {0}")]
    Config(#[from] CoreError),
}

/// A failed build of one variant. Recorded, never fatal to the run.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The package builder exited unsuccessfully.
    #[error("build of {name} ({build_id}) failed: {source}")]
    Build {
        name: String,
        build_id: BuildId,
        #[source]
        source: ProcessError,
    },

    /// The builder finished without producing an artifact.
    #[error("build of {name} ({build_id}) produced no artifacts")]
    NoArtifacts { name: String, build_id: BuildId },

    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Variant keys could not be encoded for the builder.
    #[error("variant serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Upload failures.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The artifact to upload is not on disk.
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// `dev` uploads must also be forced.
    #[error("uploading to the dev label requires --force")]
    DevRequiresForce,

    /// Every attempt failed; carries the last failure.
    #[error("upload of {path} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: ProcessError,
    },
}
