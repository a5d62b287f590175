//! # PyWasm Runner
//!
//! Sandboxed execution of untrusted Python code in a WebAssembly virtual machine.
//!
//! ## Features
//!
//! - **Hardware-Independent Sandbox:** CPython compiled to WASI, run by Wasmtime
//! - **Isolation by Omission:** One preopened staging directory, no network, no env
//! - **Reusable Runtime:** Engine and module compiled once per process
//! - **Faithful Output Capture:** Stdout/stderr collected even after a trap
//!
//! ## Example
//!
//! ```rust,no_run
//! let result = pywasm_runner::run("print('hello')")?;
//! assert_eq!(result.stdout, "hello");
//! assert!(!result.is_platform_error());
//! # Ok::<(), pywasm_runner::Error>(())
//! ```

pub mod error;
pub mod output;
pub mod runtime;
pub mod session;
pub mod staging;

pub use error::{Error, Result};
pub use output::ExecutionResult;
pub use session::SandboxSession;

use tracing::debug;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run untrusted Python source in the sandbox and collect its output.
///
/// Returns `Err` only for fatal configuration failures (interpreter artifact
/// missing or malformed); anything that breaks during a single invocation is
/// reported in the result's `platform_error` instead. Blocks until the
/// sandboxed program halts or traps; there is no timeout, so a program that
/// never halts blocks the calling thread indefinitely.
pub fn run(source: &str) -> Result<ExecutionResult> {
    let runtime = runtime::runtime()?;

    debug!("Executing {} bytes of untrusted source", source.len());
    Ok(SandboxSession::new(runtime).run(source))
}
