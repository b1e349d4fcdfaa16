//! # buildall-render
//!
//! Expands recipe directories into one [`RecipeVariant`] per variant
//! combination.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//!
//! use buildall_core::{BuildIdClock, VariantAxes};
//! use buildall_render::{render_recipes, CondaRenderer, RenderOptions, RenderOrder};
//!
//! fn render(dirs: &[PathBuf], axes: &VariantAxes) {
//!     let renderer = CondaRenderer::default();
//!     let options = RenderOptions::default();
//!     let mut clock = BuildIdClock::default();
//!     if let Ok(variants) =
//!         render_recipes(&renderer, dirs, axes, &options, RenderOrder::Cycle, &mut clock)
//!     {
//!         for v in variants {
//!             println!("{} {}", v.build_id, v.output_path.display());
//!         }
//!     }
//! }
//! ```
//!
//! [`RecipeVariant`]: buildall_core::RecipeVariant

pub mod conda;
pub mod engine;
pub mod error;
pub mod variants;

pub use conda::CondaRenderer;
pub use engine::{
    render_recipes, MetadataRenderer, RenderOptions, RenderedVariant, RECIPE_FILE,
};
pub use error::RenderError;
pub use variants::{expand_axes, interleave, RenderOrder};
