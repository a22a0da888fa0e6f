//! Temp staging for one directive.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::{Error, Result};

/// Working directory for one derivative directive.
///
/// Holds the staged encoder input and its output. The directory and
/// everything in it are removed when the workspace drops, whether the
/// directive succeeded or failed, so a partial output never outlives the
/// invocation. A workspace is never shared between concurrent directives.
#[derive(Debug)]
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    /// Create a workspace, under `base` when configured.
    pub fn new(base: Option<&Path>) -> Result<Self> {
        let temp_dir = match base {
            Some(base) => TempDir::with_prefix_in("jp2derive-", base),
            None => TempDir::with_prefix("jp2derive-"),
        }
        .map_err(|e| Error::workspace(e.to_string()))?;

        Ok(Self { temp_dir })
    }

    /// The workspace directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A working file path with the given name.
    pub fn working_file(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }
}
