//! # jp2derive
//!
//! Derivative generation for JPEG2000 images: computes an encoder parameter
//! set (a "recipe") from source image properties and drives an external
//! `kdu_compress` binary to produce the output file under a wall-clock
//! deadline.
//!
//! This crate provides:
//! - Recipe calculation: resolution levels, quality layers, bit-rate
//!   schedule, and colorspace signaling derived from image metadata and
//!   policy constraints, with named presets and literal overrides.
//! - A bit-depth estimator that corrects unreliable grayscale hints from a
//!   size-consistency heuristic.
//! - Bounded subprocess execution: hard deadline, process-group kill on
//!   timeout or cancellation, and structured errors carrying the encoder's
//!   stderr.
//! - A thin orchestrator staging working files per directive and handing
//!   results to a storage collaborator.
//!
//! ## Example
//!
//! ```no_run
//! use jp2derive::{Config, DerivativeJob, Directive, SourceStore};
//! # async fn example(store: impl SourceStore) -> jp2derive::Result<()> {
//! let config = Config::load_or_default(Some("jp2derive.json".as_ref()));
//! let job = DerivativeJob::new(store, config)?;
//! let report = job.process(&[Directive::new("access", "jp2")]).await?;
//! for failure in &report.failures {
//!     eprintln!("{}: {}", failure.directive, failure.error);
//! }
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod depth;
pub mod directive;
mod error;
pub mod image;
pub mod job;
pub mod recipe;
pub mod tools;
pub mod workspace;

// Re-exports
pub use command::{BoundedCommand, CommandOutput, CommandRunner, ProcessRunner};
pub use config::{Config, EncoderConfig};
pub use depth::estimate_bits_per_pixel;
pub use directive::{Directive, DirectiveOptions, RecipeSource};
pub use error::{Error, Result};
pub use image::{
    Colorspace, ImageCrateInspector, ImageInspector, ImageProperties, TransformOptions,
};
pub use job::{DerivativeJob, DirectiveFailure, JobReport, SourceStore, JP2_MIME_TYPE};
pub use recipe::{build_recipe, final_compression_ratio, layer_rates, level_count_for_size, Recipe};
pub use tools::{check_encoder, resolve_encoder, ToolInfo, ENCODER_TOOL};
pub use workspace::Workspace;
