//! Derivative directives.
//!
//! A [`Directive`] is a named request to produce one derivative output with
//! specific options. Directives deserialize from the configuration surface;
//! every option defaults so a bare `{ "name": "...", "target_format": "jp2" }`
//! is valid.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A named request to produce one derivative output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directive {
    /// Identifier for this derivative (also the default output name).
    pub name: String,
    /// Target format / file suffix (e.g. `"jp2"`). Required; absence is a
    /// configuration error, never a default.
    #[serde(default)]
    pub target_format: Option<String>,
    /// Tuning options.
    #[serde(default)]
    pub options: DirectiveOptions,
}

impl Directive {
    /// Create a directive with default options.
    pub fn new(name: impl Into<String>, target_format: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_format: Some(target_format.into()),
            options: DirectiveOptions::default(),
        }
    }

    /// The target format, or [`Error::Config`] if it was never specified.
    pub fn require_target_format(&self) -> Result<&str> {
        self.target_format
            .as_deref()
            .filter(|f| !f.is_empty())
            .ok_or_else(|| {
                Error::config(format!(
                    "directive '{}' is missing the target format to transcode into",
                    self.name
                ))
            })
    }

    /// The name the derivative is stored under.
    pub fn output_name(&self) -> &str {
        self.options.output_name.as_deref().unwrap_or(&self.name)
    }
}

/// Recognized directive options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectiveOptions {
    /// Resolution level count override.
    pub levels: Option<u32>,
    /// Quality layer count override.
    pub layers: Option<u32>,
    /// Target compression ratio (target-size : source-size of 1:N).
    pub compression: Option<u32>,
    /// Floor on the derivative size, in megabytes.
    pub min_output_size_mb: Option<u32>,
    /// Explicit recipe override.
    pub recipe: Option<RecipeSource>,
    /// `WxH` geometry to fit the working image within before encoding.
    pub resize: Option<String>,
    /// Convert color sources to the sRGB profile while staging.
    pub to_srgb: bool,
    /// Storage name override; defaults to the directive name.
    pub output_name: Option<String>,
}

impl Default for DirectiveOptions {
    fn default() -> Self {
        Self {
            levels: None,
            layers: None,
            compression: None,
            min_output_size_mb: None,
            recipe: None,
            resize: None,
            to_srgb: true,
            output_name: None,
        }
    }
}

/// Where a recipe comes from when a directive overrides the computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecipeSource {
    /// A named preset, looked up as `<name>_<gray|color>` in configuration.
    Preset(String),
    /// A literal encoder parameter string, passed through verbatim.
    Literal(String),
}
