//! Error types for the sandbox runner

use thiserror::Error;

/// Result type alias using the runner's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sandbox runner
#[derive(Error, Debug)]
pub enum Error {
    /// Fatal configuration error (artifact missing, engine construction failed)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Sandbox infrastructure error (staging, linking, instantiation)
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Wasm runtime error (trap, missing entry point)
    #[error("Wasm runtime error: {0}")]
    Wasm(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if the error aborts all further executions (vs. a per-run failure)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

impl From<wasmtime::Error> for Error {
    fn from(err: wasmtime::Error) -> Self {
        Error::Wasm(err.to_string())
    }
}
