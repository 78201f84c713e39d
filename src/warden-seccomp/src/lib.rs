//! Seccomp filter compilation for Warden.
//!
//! Provides [`SeccompilerCompiler`], the [`FilterCompiler`] used by the CLI.
//! It builds a BPF program with `seccompiler` and serializes it the way
//! bubblewrap expects on `--seccomp FD`.

#[cfg(target_os = "linux")]
mod seccomp;
#[cfg(target_os = "linux")]
mod syscalls;

use warden_policy::{FilterCompiler, FilterError, FilterProgram, SyscallMode};

/// Filter compiler backed by `seccompiler`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeccompilerCompiler;

impl SeccompilerCompiler {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
impl FilterCompiler for SeccompilerCompiler {
    fn name(&self) -> &str {
        "seccompiler"
    }

    fn check_prerequisites(&self) -> Result<(), String> {
        seccomp::native_arch().map(|_| ())
    }

    fn compile(&self, mode: SyscallMode, blacklist: &[String]) -> Result<FilterProgram, FilterError> {
        seccomp::compile_filter(mode, blacklist)
    }
}

#[cfg(not(target_os = "linux"))]
impl FilterCompiler for SeccompilerCompiler {
    fn name(&self) -> &str {
        "seccompiler"
    }

    fn check_prerequisites(&self) -> Result<(), String> {
        Err("seccomp filters are only supported on Linux".to_string())
    }

    fn compile(&self, _mode: SyscallMode, _blacklist: &[String]) -> Result<FilterProgram, FilterError> {
        Err(FilterError::Unavailable(
            "seccomp filters are only supported on Linux".to_string(),
        ))
    }
}
