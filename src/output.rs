//! Result classification and output normalization
//!
//! Turns the raw bytes captured from the sandbox's standard streams into a
//! normalized, caller-facing result.

use serde::{Deserialize, Serialize};

/// Result of one sandboxed execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Normalized standard output
    pub stdout: String,
    /// Normalized standard error
    pub stderr: String,
    /// Exit code reported by the sandboxed program (if it ran to completion)
    pub exit_code: Option<i32>,
    /// Host-side infrastructure failure, if any. Never set for errors the
    /// untrusted program reported through its own output.
    pub platform_error: Option<String>,
}

impl ExecutionResult {
    /// Create a result for a program that ran to completion
    pub fn completed(stdout: impl AsRef<str>, stderr: impl AsRef<str>, exit_code: i32) -> Self {
        ExecutionResult {
            stdout: normalize_stream(stdout.as_ref()),
            stderr: normalize_stream(stderr.as_ref()),
            exit_code: Some(exit_code),
            platform_error: None,
        }
    }

    /// Create a result for a host-side failure, keeping any partial output
    pub fn platform_failure(
        stdout: impl AsRef<str>,
        stderr: impl AsRef<str>,
        error: impl Into<String>,
    ) -> Self {
        ExecutionResult {
            stdout: normalize_stream(stdout.as_ref()),
            stderr: normalize_stream(stderr.as_ref()),
            exit_code: None,
            platform_error: Some(error.into()),
        }
    }

    /// Check whether host-side infrastructure failed
    pub fn is_platform_error(&self) -> bool {
        self.platform_error.is_some()
    }

    /// Get stdout and stderr joined by one line break, for substring checks
    pub fn combined_output(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Normalize all line endings to `\n`
pub(crate) fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn normalize_stream(raw: &str) -> String {
    normalize_line_endings(raw).trim().to_string()
}
