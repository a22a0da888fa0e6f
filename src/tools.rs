//! External encoder detection.
//!
//! Resolves the `kdu_compress` executable from configuration or `PATH` and
//! can probe its availability and version for diagnostics.

use std::path::{Path, PathBuf};

use crate::config::EncoderConfig;
use crate::{Error, Result};

/// Name of the JPEG2000 encoder binary.
pub const ENCODER_TOOL: &str = "kdu_compress";

/// Availability information for the encoder.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of `-v` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Resolve the encoder executable.
///
/// A configured path wins when it exists; otherwise the binary is looked up
/// in `PATH`.
pub fn resolve_encoder(config: &EncoderConfig) -> Result<PathBuf> {
    if let Some(path) = config.kdu_compress_path.as_deref() {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            path = %path.display(),
            "configured kdu_compress path does not exist; falling back to PATH lookup"
        );
    }

    which::which(ENCODER_TOOL).map_err(|_| Error::tool_not_found(ENCODER_TOOL))
}

/// Probe the encoder and report availability and version.
pub fn check_encoder(config: &EncoderConfig) -> ToolInfo {
    match resolve_encoder(config) {
        Ok(path) => ToolInfo {
            name: ENCODER_TOOL.to_string(),
            available: true,
            version: detect_version(&path),
            path: Some(path),
        },
        Err(_) => ToolInfo {
            name: ENCODER_TOOL.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Run `kdu_compress -v` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path).arg("-v").output().ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configured_path_falls_back_to_path_lookup() {
        let config = EncoderConfig {
            kdu_compress_path: Some(PathBuf::from("/nonexistent/kdu_compress")),
            ..EncoderConfig::default()
        };
        // kdu_compress is unlikely to be installed in CI; either outcome is
        // fine, the call just must not use the bogus configured path.
        if let Ok(path) = resolve_encoder(&config) {
            assert_ne!(path, PathBuf::from("/nonexistent/kdu_compress"));
        }
    }

    #[test]
    fn configured_existing_path_wins() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = EncoderConfig {
            kdu_compress_path: Some(file.path().to_path_buf()),
            ..EncoderConfig::default()
        };
        assert_eq!(resolve_encoder(&config).unwrap(), file.path());
    }

    #[test]
    fn check_reports_unavailable_without_panic() {
        let config = EncoderConfig::default();
        let info = check_encoder(&config);
        assert_eq!(info.name, ENCODER_TOOL);
        // Availability depends on the environment; the probe must not panic.
        let _ = info.available;
    }
}
