//! Staging area management
//!
//! Each invocation gets a uniquely named, ephemeral directory under the host
//! temp area. The untrusted source is materialized inside it, the directory
//! becomes the sandbox's entire filesystem view, and it is removed again on
//! every exit path.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::output::normalize_line_endings;

/// Namespace prefix for staging directory names
pub const STAGING_PREFIX: &str = "python-wasm-runner";

/// Fixed name of the materialized source file
pub const SOURCE_FILE_NAME: &str = "main.py";

/// In-sandbox mount point of the staging directory
pub const GUEST_ROOT: &str = "/";

/// In-sandbox path of the source file
pub const GUEST_SOURCE_PATH: &str = "/main.py";

/// An ephemeral staging directory, removed on drop
pub struct StagingDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl StagingDir {
    /// Create a fresh staging directory with a unique random suffix
    pub fn create() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", STAGING_PREFIX))
            .tempdir()
            .map_err(|e| Error::Sandbox(format!("Failed to create staging directory: {}", e)))?;
        let path = dir.path().to_path_buf();

        debug!("Staging directory created: {}", path.display());
        Ok(StagingDir {
            dir: Some(dir),
            path,
        })
    }

    /// Materialize the untrusted source at the fixed filename, with line
    /// endings normalized so the interpreter parses consistently
    pub fn write_source(&self, code: &str) -> Result<()> {
        let source_path = self.path.join(SOURCE_FILE_NAME);
        std::fs::write(&source_path, normalize_line_endings(code))?;
        Ok(())
    }

    /// Host path of the staging directory
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            // Leaked staging dirs waste disk, not correctness
            if let Err(e) = dir.close() {
                warn!(
                    "Failed to delete staging directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}
