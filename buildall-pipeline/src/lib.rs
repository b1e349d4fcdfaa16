//! # buildall-pipeline
//!
//! Build selection, build execution and upload with retries.
//!
//! Call [`pipeline::run`] to render recipes, pick the variants that still need
//! building, and build (and optionally upload) each of them in turn.

pub mod error;
pub mod executor;
pub mod pipeline;
pub mod selector;
pub mod upload;

pub use error::{BuildError, PipelineError, UploadError};
pub use executor::{BuildOptions, BuildReport, CondaBuilder, ContentListing, Executor, PackageBuilder};
pub use pipeline::{FailedBuild, RunConfig, RunEvent, RunReport, Toolkit};
pub use selector::{select_builds, BuildSelector, Decision, QueuedSet, SelectorFlags};
pub use upload::{select_labels, AnacondaCli, UploadCli, UploadRequest, UploadRetrier};
