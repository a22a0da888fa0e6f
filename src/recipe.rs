//! JPEG2000 encoder recipe calculation.
//!
//! A [`Recipe`] is the fully resolved parameter string handed to the
//! external encoder for one invocation. Resolution order: a named preset
//! from configuration, a literal override from the directive, or a computed
//! single-rate recipe derived from the source properties. The tiling,
//! progression-order, and packaging parameters of computed recipes are fixed
//! policy tuned for progressive-resolution streaming, not user-configurable.

use std::collections::HashMap;
use std::fmt;

use crate::directive::{Directive, DirectiveOptions, RecipeSource};
use crate::image::Colorspace;

/// Default quality layer count.
pub const DEFAULT_LAYER_COUNT: u32 = 8;
/// Default target compression ratio (1:10).
pub const DEFAULT_TARGET_RATIO: u32 = 10;
/// Default floor on derivative size, in megabytes.
pub const DEFAULT_MIN_OUTPUT_MB: u32 = 3;
/// Stop subdividing once the lowest resolution is at or below this size.
const REFERENCE_THUMBNAIL_DIM: u32 = 96;
/// Divisor of the legacy declining layer-rate ladder.
const LEGACY_RATE_DIVISOR: f64 = 1.618;

/// An immutable, ordered encoder parameter string.
///
/// Once built, a recipe fully determines encoder behavior for one
/// invocation. All whitespace between tokens is collapsed to single spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipe(String);

impl Recipe {
    /// Wrap a literal parameter string, normalizing whitespace.
    pub fn literal(params: &str) -> Self {
        Self(params.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    /// The parameter string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The parameters as an argument vector for the encoder command line.
    pub fn args(&self) -> Vec<String> {
        self.0.split_whitespace().map(str::to_string).collect()
    }

    /// Build the legacy multi-layer recipe with a declining geometric rate
    /// schedule.
    ///
    /// Kept for compatibility with older named presets. Identical to the
    /// computed single-rate recipe except the `-rate` parameter carries one
    /// rate per quality layer; see [`layer_rates`]. Never produced
    /// implicitly: the computed path is single-rate, and the two rate
    /// semantics are deliberately not merged.
    pub fn layered_legacy(
        layer_count: u32,
        effective_ratio: u32,
        colorspace: Colorspace,
        levels: u32,
        num_threads: u32,
    ) -> Self {
        let rates = layer_rates(layer_count, effective_ratio)
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        Self::assemble(&rates, colorspace, num_threads, layer_count, levels)
    }

    fn assemble(
        rate: &str,
        colorspace: Colorspace,
        num_threads: u32,
        layers: u32,
        levels: u32,
    ) -> Self {
        let params = format!(
            "-rate {rate} \
             -jp2_space {space} \
             -num_threads {num_threads} \
             -no_weights \
             Clayers={layers} \
             Clevels={levels} \
             Cprecincts={precincts} \
             Cblk={{64,64}} \
             Cuse_sop=yes \
             Corder=RPCL \
             ORGgen_plt=yes \
             ORGtparts=R",
            space = colorspace.jp2_space_tag(),
            precincts = precinct_ladder(levels),
        );
        Self::literal(&params)
    }
}

impl fmt::Display for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the recipe for one directive.
///
/// Priority: a named preset (keyed `<preset>_<gray|color>` in `presets`),
/// then a literal override, then the computed recipe. An unknown preset is
/// non-fatal: it logs a warning and falls through to the computation.
pub fn build_recipe(
    directive: &Directive,
    colorspace: Colorspace,
    long_dim: u32,
    byte_size: u64,
    bits_per_pixel: u32,
    presets: &HashMap<String, String>,
    num_threads: u32,
) -> Recipe {
    match &directive.options.recipe {
        Some(RecipeSource::Preset(name)) => {
            let key = format!("{}_{}", name, colorspace.preset_suffix());
            if let Some(params) = presets.get(&key) {
                return Recipe::literal(params);
            }
            tracing::warn!(
                preset = %name,
                key = %key,
                "no JP2 recipe preset found in configuration; using computed recipe"
            );
        }
        Some(RecipeSource::Literal(params)) => return Recipe::literal(params),
        None => {}
    }

    calculate_recipe(
        &directive.options,
        colorspace,
        long_dim,
        byte_size,
        bits_per_pixel,
        num_threads,
    )
}

/// Compute the single-rate recipe from source properties and options.
fn calculate_recipe(
    options: &DirectiveOptions,
    colorspace: Colorspace,
    long_dim: u32,
    byte_size: u64,
    bits_per_pixel: u32,
    num_threads: u32,
) -> Recipe {
    let levels = options
        .levels
        .unwrap_or_else(|| level_count_for_size(long_dim));
    let layers = options.layers.unwrap_or(DEFAULT_LAYER_COUNT);
    let target_ratio = options.compression.unwrap_or(DEFAULT_TARGET_RATIO).max(1);
    let min_output_bytes =
        u64::from(options.min_output_size_mb.unwrap_or(DEFAULT_MIN_OUTPUT_MB)) * 1_048_576;

    let effective_ratio = final_compression_ratio(byte_size, target_ratio, min_output_bytes);
    // Bits per pixel to target in the compressed stream; the encoder's
    // `-rate` is a bits/pixel budget, not bits/sample.
    let rate = f64::from(bits_per_pixel) / f64::from(effective_ratio);

    Recipe::assemble(&rate.to_string(), colorspace, num_threads, layers, levels)
}

/// The number of resolution levels appropriate for an image dimension.
///
/// The smallest count (at least one) such that repeatedly halving
/// `long_dim` that many times lands at or below a practical thumbnail size.
pub fn level_count_for_size(long_dim: u32) -> u32 {
    let mut levels = 1u32;
    let mut dim = f64::from(long_dim) / 2.0;
    while dim > f64::from(REFERENCE_THUMBNAIL_DIM) {
        dim /= 2.0;
        levels += 1;
    }
    levels
}

/// Enforce the floor on derivative output size.
///
/// If the requested ratio would produce an output smaller than
/// `min_output_bytes`, returns the ratio that lands on the floor instead
/// (rounded, clamped to at least 1). Protects very small or low-detail
/// sources from becoming unusably tiny.
pub fn final_compression_ratio(byte_size: u64, target_ratio: u32, min_output_bytes: u64) -> u32 {
    let size = byte_size as f64;
    let floor = min_output_bytes as f64;
    if size / f64::from(target_ratio) < floor {
        let ratio = (size / floor).round() as u32;
        ratio.max(1)
    } else {
        target_ratio
    }
}

/// The legacy declining geometric per-layer rate schedule.
///
/// Starting from `24.0 / effective_ratio`, each layer's rate is the previous
/// divided by the golden ratio, rounded to 8 decimal places. Each quality
/// layer roughly adds the previous layer's content at a diminishing bit
/// budget, supporting progressive quality refinement.
pub fn layer_rates(layer_count: u32, effective_ratio: u32) -> Vec<f64> {
    let mut rates = Vec::with_capacity(layer_count as usize);
    let mut rate = 24.0 / f64::from(effective_ratio.max(1));
    for _ in 0..layer_count {
        rates.push(rate);
        rate = round_places(rate / LEGACY_RATE_DIVISOR, 8);
    }
    rates
}

/// Precinct sizes halving 256 down to 16, one entry per resolution level
/// plus the base band. The encoder repeats the final entry for any deeper
/// levels, so the clamped tail is equivalent to listing more.
fn precinct_ladder(levels: u32) -> String {
    let mut parts = Vec::with_capacity(levels as usize + 1);
    let mut size = 256u32;
    for _ in 0..=levels {
        parts.push(format!("{{{size},{size}}}"));
        if size > 16 {
            size /= 2;
        }
    }
    parts.join(",")
}

fn round_places(value: f64, places: u32) -> f64 {
    let scale = 10f64.powi(places as i32);
    (value * scale).round() / scale
}
