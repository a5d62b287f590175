//! Per-invocation sandbox session
//!
//! A session walks one untrusted program through Staged -> Linked ->
//! Executed -> Collected. The sandbox gets exactly one preopened directory
//! (the staging dir, mounted at `/`) and its argv; no environment variables,
//! no sockets, no other directories. Isolation is by omission: anything not
//! granted here does not exist inside the sandbox.

use tracing::debug;
use wasmtime::Store;
use wasmtime_wasi::pipe::MemoryOutputPipe;
use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

use crate::error::{Error, Result};
use crate::output::ExecutionResult;
use crate::runtime::SandboxRuntime;
use crate::staging::{self, StagingDir};

/// argv[0] presented to the sandboxed interpreter
const INTERPRETER_ARGV0: &str = "python";

/// Exported function invoked to start the sandboxed program
const ENTRY_POINT: &str = "_start";

/// Upper bound on captured bytes per standard stream
const STREAM_CAPTURE_LIMIT: usize = 16 * 1024 * 1024;

/// One sandboxed execution. Never reused: the store and instance are torn
/// down with the session so no interpreter state leaks across invocations.
pub struct SandboxSession<'rt> {
    runtime: &'rt SandboxRuntime,
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
}

impl<'rt> SandboxSession<'rt> {
    /// Create a session against the shared runtime
    pub fn new(runtime: &'rt SandboxRuntime) -> Self {
        SandboxSession {
            runtime,
            stdout: MemoryOutputPipe::new(STREAM_CAPTURE_LIMIT),
            stderr: MemoryOutputPipe::new(STREAM_CAPTURE_LIMIT),
        }
    }

    /// Run the untrusted source to completion and collect its output.
    ///
    /// Host-side failures (staging, instantiation, traps) are recovered here
    /// into a result with `platform_error` set and whatever partial output
    /// the program managed to flush. Failures the program reports through
    /// its own streams are ordinary output.
    pub fn run(self, source: &str) -> ExecutionResult {
        let outcome = self.execute(source);

        // Collected: the pipes hold whatever was flushed, trap or not
        let stdout = String::from_utf8_lossy(&self.stdout.contents()).into_owned();
        let stderr = String::from_utf8_lossy(&self.stderr.contents()).into_owned();

        match outcome {
            Ok(exit_code) => {
                debug!("Sandboxed program completed with exit code {}", exit_code);
                ExecutionResult::completed(stdout, stderr, exit_code)
            }
            Err(e) => {
                debug!("Sandboxed execution failed host-side: {}", e);
                ExecutionResult::platform_failure(stdout, stderr, e.to_string())
            }
        }
    }

    fn execute(&self, source: &str) -> Result<i32> {
        // Staged; the directory is removed on every exit path via Drop
        let staging = StagingDir::create()?;
        staging.write_source(source)?;

        // Linked
        let mut store = self.link(&staging)?;

        // Executed
        self.invoke(&mut store)
    }

    /// Build the isolated store: one preopen, argv, captured stdio
    fn link(&self, staging: &StagingDir) -> Result<Store<WasiP1Ctx>> {
        let mut builder = WasiCtxBuilder::new();
        builder
            .args(&[INTERPRETER_ARGV0, staging::GUEST_SOURCE_PATH])
            .stdout(self.stdout.clone())
            .stderr(self.stderr.clone());
        builder
            .preopened_dir(
                staging.path(),
                staging::GUEST_ROOT,
                DirPerms::all(),
                FilePerms::all(),
            )
            .map_err(|e| Error::Sandbox(format!("Failed to preopen staging directory: {:?}", e)))?;

        Ok(Store::new(self.runtime.engine(), builder.build_p1()))
    }

    fn invoke(&self, store: &mut Store<WasiP1Ctx>) -> Result<i32> {
        let instance = self
            .runtime
            .linker()
            .instantiate(&mut *store, self.runtime.module())
            .map_err(|e| Error::Sandbox(format!("Failed to instantiate module: {:?}", e)))?;

        let entry = instance
            .get_typed_func::<(), ()>(&mut *store, ENTRY_POINT)
            .map_err(|e| Error::Wasm(format!("Entry point '{}' not found: {}", ENTRY_POINT, e)))?;

        match entry.call(&mut *store, ()) {
            Ok(()) => Ok(0),
            Err(trap) => match trap.downcast_ref::<wasmtime_wasi::I32Exit>() {
                // proc_exit is how the interpreter terminates; any code is a
                // program outcome, not a host failure
                Some(exit) => Ok(exit.0),
                None => Err(Error::Wasm(format!("Sandbox trapped: {:?}", trap))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile a wat program as the stand-in interpreter artifact
    fn runtime_from_wat(wat: &str) -> (SandboxRuntime, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("interpreter.wat");
        std::fs::write(&artifact, wat).unwrap();
        (SandboxRuntime::load(&artifact).unwrap(), dir)
    }

    // Writes "hello\n" to stdout, "noise\n" to stderr, then exits with 3.
    const EXITING_GUEST: &str = r#"
        (module
          (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
          (import "wasi_snapshot_preview1" "proc_exit"
            (func $proc_exit (param i32)))
          (memory (export "memory") 1)
          (data (i32.const 64) "hello\n")
          (data (i32.const 80) "noise\n")
          (func (export "_start")
            (i32.store (i32.const 0) (i32.const 64))
            (i32.store (i32.const 4) (i32.const 6))
            (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 32)))
            (i32.store (i32.const 8) (i32.const 80))
            (i32.store (i32.const 12) (i32.const 6))
            (drop (call $fd_write (i32.const 2) (i32.const 8) (i32.const 1) (i32.const 32)))
            (call $proc_exit (i32.const 3))))
    "#;

    // Writes "partial\n" to stdout, then hits an unreachable trap.
    const TRAPPING_GUEST: &str = r#"
        (module
          (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
          (memory (export "memory") 1)
          (data (i32.const 64) "partial\n")
          (func (export "_start")
            (i32.store (i32.const 0) (i32.const 64))
            (i32.store (i32.const 4) (i32.const 8))
            (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 32)))
            unreachable))
    "#;

    // Opens main.py from the preopened root and echoes it to stdout.
    const ECHOING_GUEST: &str = r#"
        (module
          (import "wasi_snapshot_preview1" "path_open"
            (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
          (import "wasi_snapshot_preview1" "fd_read"
            (func $fd_read (param i32 i32 i32 i32) (result i32)))
          (import "wasi_snapshot_preview1" "fd_write"
            (func $fd_write (param i32 i32 i32 i32) (result i32)))
          (memory (export "memory") 1)
          (data (i32.const 100) "main.py")
          (func (export "_start")
            (drop (call $path_open
              (i32.const 3) (i32.const 0)
              (i32.const 100) (i32.const 7)
              (i32.const 0)
              (i64.const 2)
              (i64.const 0) (i32.const 0)
              (i32.const 8)))
            (i32.store (i32.const 16) (i32.const 200))
            (i32.store (i32.const 20) (i32.const 256))
            (drop (call $fd_read
              (i32.load (i32.const 8)) (i32.const 16) (i32.const 1) (i32.const 24)))
            (i32.store (i32.const 32) (i32.const 200))
            (i32.store (i32.const 36) (i32.load (i32.const 24)))
            (drop (call $fd_write (i32.const 1) (i32.const 32) (i32.const 1) (i32.const 40)))))
    "#;

    #[test]
    fn test_output_captured_and_exit_code_recorded() {
        let (runtime, _dir) = runtime_from_wat(EXITING_GUEST);
        let result = SandboxSession::new(&runtime).run("ignored");

        assert_eq!(result.stdout, "hello");
        assert_eq!(result.stderr, "noise");
        assert_eq!(result.exit_code, Some(3));
        assert!(!result.is_platform_error());
    }

    #[test]
    fn test_trap_is_platform_error_with_partial_output() {
        let (runtime, _dir) = runtime_from_wat(TRAPPING_GUEST);
        let result = SandboxSession::new(&runtime).run("ignored");

        assert!(result.is_platform_error());
        assert!(result.platform_error.as_deref().unwrap().contains("trap"));
        assert_eq!(result.stdout, "partial");
        assert_eq!(result.exit_code, None);
    }

    #[test]
    fn test_missing_entry_point_is_platform_error() {
        let (runtime, _dir) = runtime_from_wat("(module (memory (export \"memory\") 1))");
        let result = SandboxSession::new(&runtime).run("ignored");

        assert!(result.is_platform_error());
        assert!(result.platform_error.as_deref().unwrap().contains("_start"));
    }

    #[test]
    fn test_guest_sees_materialized_source() {
        let (runtime, _dir) = runtime_from_wat(ECHOING_GUEST);
        let result = SandboxSession::new(&runtime).run("print('sandboxed')");

        assert_eq!(result.stdout, "print('sandboxed')");
        assert!(!result.is_platform_error());
    }

    #[test]
    fn test_sequential_sessions_do_not_interfere() {
        let (runtime, _dir) = runtime_from_wat(ECHOING_GUEST);

        let first = SandboxSession::new(&runtime).run("first body");
        let second = SandboxSession::new(&runtime).run("second body");

        assert_eq!(first.stdout, "first body");
        assert_eq!(second.stdout, "second body");
    }
}
