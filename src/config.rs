//! Configuration surface.
//!
//! The top-level [`Config`] is deserialized from JSON and carries the
//! encoder settings, named recipe presets, and the directive list. Every
//! section defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::directive::Directive;
use crate::{Error, Result};

fn default_num_threads() -> u32 {
    4
}

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// External encoder settings.
    pub encoder: EncoderConfig,
    /// Named recipe presets, keyed `<presetName>_<gray|color>`, mapping to
    /// literal encoder parameter strings.
    pub presets: HashMap<String, String>,
    /// Derivative directives to run.
    pub directives: Vec<Directive>,
}

/// Settings for the external JPEG2000 encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Path to the `kdu_compress` executable; falls back to a PATH lookup.
    pub kdu_compress_path: Option<PathBuf>,
    /// Base directory for working files; falls back to the system temp dir.
    pub temp_dir: Option<PathBuf>,
    /// Wall-clock deadline per invocation, in seconds. Unset means no
    /// deadline.
    pub timeout_secs: Option<u64>,
    /// Thread-count hint passed to the encoder.
    pub num_threads: u32,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            kdu_compress_path: None,
            temp_dir: None,
            timeout_secs: None,
            num_threads: default_num_threads(),
        }
    }
}

impl EncoderConfig {
    /// The configured deadline as a [`Duration`].
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    ///
    /// String-based so the caller can read the file however it sees fit
    /// (async, embedded, etc.).
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::config(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (i, directive) in self.directives.iter().enumerate() {
            if directive.name.is_empty() {
                warnings.push(format!("directives[{i}].name is empty"));
            }
            if directive.target_format.as_deref().unwrap_or("").is_empty() {
                warnings.push(format!(
                    "directives[{i}] has no target_format and will fail at run time"
                ));
            }
        }

        for key in self.presets.keys() {
            if !key.ends_with("_gray") && !key.ends_with("_color") {
                warnings.push(format!(
                    "preset \"{key}\" is not keyed by colorspace (expected <name>_gray or <name>_color)"
                ));
            }
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_valid() {
        let config = Config::from_json("{}").unwrap();
        assert!(config.presets.is_empty());
        assert!(config.directives.is_empty());
        assert_eq!(config.encoder.num_threads, 4);
        assert!(config.encoder.timeout().is_none());
    }

    #[test]
    fn full_config_roundtrips() {
        let json = r#"{
            "encoder": {
                "kdu_compress_path": "/opt/kakadu/kdu_compress",
                "timeout_secs": 120,
                "num_threads": 2
            },
            "presets": {
                "default_color": "-rate 2.4 Clevels=7",
                "default_gray": "-rate 0.8 Clevels=7"
            },
            "directives": [
                { "name": "access", "target_format": "jp2" }
            ]
        }"#;
        let config = Config::from_json(json).unwrap();
        assert_eq!(
            config.encoder.kdu_compress_path.as_deref(),
            Some(Path::new("/opt/kakadu/kdu_compress"))
        );
        assert_eq!(config.encoder.timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.presets.len(), 2);
        assert_eq!(config.directives.len(), 1);
    }

    #[test]
    fn malformed_json_is_config_error() {
        let result = Config::from_json("{ not json");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = Config::load_or_default(Some(Path::new("/nonexistent/jp2derive.json")));
        assert!(config.directives.is_empty());
    }

    #[test]
    fn validate_flags_unkeyed_presets_and_bad_directives() {
        let json = r#"{
            "presets": { "default": "-rate 2.4" },
            "directives": [ { "name": "access" } ]
        }"#;
        let config = Config::from_json(json).unwrap();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("target_format")));
        assert!(warnings.iter().any(|w| w.contains("preset")));
    }
}
