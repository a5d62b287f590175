//! Process-wide sandbox runtime
//!
//! Owns the Wasmtime engine, the compiled interpreter module, and a WASI
//! linker. Construction is expensive (the interpreter artifact is compiled
//! with speed optimization), so the runtime is built lazily exactly once and
//! shared read-only by every session for the process lifetime.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::info;
use wasmtime::{Config, Engine, Linker, Module, OptLevel, WasmBacktraceDetails};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};

use crate::error::{Error, Result};

/// Filename of the interpreter artifact, next to the running executable
pub const ARTIFACT_FILE_NAME: &str = "python.wasm";

/// Environment variable overriding the artifact location
pub const ARTIFACT_ENV: &str = "PYWASM_RUNNER_ARTIFACT";

/// Human-readable name for the compiled module in logs
const MODULE_NAME: &str = "python";

static RUNTIME: OnceLock<Result<SandboxRuntime>> = OnceLock::new();

/// Get the process-wide runtime, initializing it on first use.
///
/// Initialization failure is cached: once the artifact turns out to be
/// missing or malformed, every later call returns the same fatal error
/// without retrying.
pub fn runtime() -> Result<&'static SandboxRuntime> {
    match RUNTIME.get_or_init(SandboxRuntime::initialize) {
        Ok(runtime) => Ok(runtime),
        Err(Error::Config(msg)) => Err(Error::Config(msg.clone())),
        Err(e) => Err(Error::Config(e.to_string())),
    }
}

/// Shared, immutable sandbox runtime state
pub struct SandboxRuntime {
    engine: Engine,
    module: Module,
    linker: Linker<WasiP1Ctx>,
}

impl SandboxRuntime {
    fn initialize() -> Result<Self> {
        Self::load(&artifact_path()?)
    }

    /// Build the engine and compile the interpreter artifact at `artifact`
    pub(crate) fn load(artifact: &Path) -> Result<Self> {
        let mut config = Config::new();
        config.cranelift_opt_level(OptLevel::Speed);
        config.wasm_backtrace_details(WasmBacktraceDetails::Enable);

        let engine = Engine::new(&config)
            .map_err(|e| Error::Config(format!("Failed to construct engine: {}", e)))?;

        let bytes = std::fs::read(artifact).map_err(|e| {
            Error::Config(format!(
                "Failed to read sandbox artifact {}: {}",
                artifact.display(),
                e
            ))
        })?;
        let module = Module::new(&engine, &bytes).map_err(|e| {
            Error::Config(format!(
                "Failed to compile sandbox artifact {}: {}",
                artifact.display(),
                e
            ))
        })?;

        // WASI exports are defined once here so per-session instantiation
        // only has to create a store
        let mut linker = Linker::new(&engine);
        preview1::add_to_linker_sync(&mut linker, |ctx: &mut WasiP1Ctx| ctx)
            .map_err(|e| Error::Config(format!("Failed to define WASI on linker: {}", e)))?;

        info!(
            "Sandbox runtime initialized ({} module from {})",
            MODULE_NAME,
            artifact.display()
        );
        Ok(SandboxRuntime {
            engine,
            module,
            linker,
        })
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.engine
    }

    pub(crate) fn module(&self) -> &Module {
        &self.module
    }

    pub(crate) fn linker(&self) -> &Linker<WasiP1Ctx> {
        &self.linker
    }
}

/// Resolve the interpreter artifact path: explicit override, or the fixed
/// location next to the running executable
fn artifact_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(ARTIFACT_ENV) {
        return Ok(PathBuf::from(path));
    }

    let exe = std::env::current_exe()
        .map_err(|e| Error::Config(format!("Failed to locate running executable: {}", e)))?;
    Ok(exe
        .parent()
        .map(|dir| dir.join(ARTIFACT_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(ARTIFACT_FILE_NAME)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact_is_fatal() {
        let err = SandboxRuntime::load(Path::new("/nonexistent/python.wasm"))
            .err()
            .unwrap();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("/nonexistent/python.wasm"));
    }

    #[test]
    fn test_malformed_artifact_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("python.wasm");
        std::fs::write(&bogus, b"definitely not wasm").unwrap();

        let err = SandboxRuntime::load(&bogus).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_wat_artifact_compiles() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("noop.wat");
        std::fs::write(&artifact, "(module (func (export \"_start\")))").unwrap();

        let runtime = SandboxRuntime::load(&artifact).unwrap();
        assert!(runtime.module().get_export("_start").is_some());
    }
}
