//! buildall core library — domain types, channels, version tokens, errors.
//!
//! Public API surface:
//! - [`types`] — recipe variants, build identifiers, variant axes
//! - [`channel`] — channels, labels and channel precedence policy
//! - [`version`] — CLI version-token normalization and pre-release detection
//! - [`exclusions`] — the `.pre_black_listed` exclusion list
//! - [`process`] — external tool invocation
//! - [`error`] — [`CoreError`], [`ProcessError`]

pub mod channel;
pub mod error;
pub mod exclusions;
pub mod process;
pub mod types;
pub mod version;

pub use channel::{Channel, ChannelPolicy, Label, STANDARD_LABELS};
pub use error::{CoreError, ProcessError};
pub use exclusions::PrereleaseExclusions;
pub use types::{
    BuildId, BuildIdClock, CudaVersion, ExtraConfig, RecipeVariant, RenderedMeta, VariantAxes,
    VariantConfig,
};
