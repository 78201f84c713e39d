//! Syscall policy selection.
//!
//! The policy core picks a filtering mode and a blacklist; turning that into
//! an executable filter program is delegated to a [`FilterCompiler`]. A
//! compiler that cannot run on this system downgrades the policy to
//! [`SyscallMode::Disabled`] with a warning instead of failing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Syscalls denied (or logged) inside the sandbox, in filter order.
pub const DEFAULT_BLACKLIST: &[&str] = &[
    "_sysctl",
    "acct",
    "add_key",
    "adjtimex",
    "bpf",
    "clock_adjtime",
    "clock_settime",
    "create_module",
    "delete_module",
    "fanotify_init",
    "finit_module",
    "get_kernel_syms",
    "get_mempolicy",
    "init_module",
    "ioperm",
    "iopl",
    "kcmp",
    "kexec_file_load",
    "kexec_load",
    "keyctl",
    "lookup_dcookie",
    "mbind",
    "migrate_pages",
    "move_pages",
    "name_to_handle_at",
    "nfsservctl",
    "open_by_handle_at",
    "perf_event_open",
    "personality",
    "process_vm_readv",
    "process_vm_writev",
    "ptrace",
    "query_module",
    "quotactl",
    "reboot",
    "request_key",
    "set_mempolicy",
    "settimeofday",
    "stime",
    "swapoff",
    "swapon",
    "syslog",
    "uselib",
    "userfaultfd",
    "ustat",
    "vhangup",
    "vm86",
    "vm86old",
    "vmsplice",
];

/// How blacklisted syscalls are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyscallMode {
    /// No filter is installed.
    Disabled,
    /// Blacklisted syscalls fail with `EPERM`.
    #[default]
    Block,
    /// Blacklisted syscalls are allowed but logged by the kernel.
    Log,
}

impl SyscallMode {
    /// Pick the mode from the mutually exclusive CLI flags, falling back to
    /// `default` when neither is set.
    pub fn from_flags(disable: bool, log: bool, default: SyscallMode) -> Self {
        match (disable, log) {
            (true, _) => SyscallMode::Disabled,
            (false, true) => SyscallMode::Log,
            (false, false) => default,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, SyscallMode::Disabled)
    }
}

impl fmt::Display for SyscallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyscallMode::Disabled => write!(f, "disabled"),
            SyscallMode::Block => write!(f, "block"),
            SyscallMode::Log => write!(f, "log"),
        }
    }
}

impl FromStr for SyscallMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "disabled" | "off" | "none" => Ok(SyscallMode::Disabled),
            "block" | "deny" => Ok(SyscallMode::Block),
            "log" => Ok(SyscallMode::Log),
            _ => Err(format!(
                "Unknown syscall mode: '{}'. Valid modes: disabled, block, log",
                s
            )),
        }
    }
}

/// Mode plus the ordered syscall names it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyscallPolicy {
    pub mode: SyscallMode,
    pub blacklist: Vec<String>,
}

impl SyscallPolicy {
    /// Policy over [`DEFAULT_BLACKLIST`] followed by `extra` names not
    /// already listed.
    pub fn new(mode: SyscallMode, extra: &[String]) -> Self {
        let mut blacklist: Vec<String> = DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect();
        for name in extra {
            if !blacklist.contains(name) {
                blacklist.push(name.clone());
            }
        }
        Self { mode, blacklist }
    }

    pub fn disabled() -> Self {
        Self {
            mode: SyscallMode::Disabled,
            blacklist: Vec::new(),
        }
    }

    /// Compile this policy, degrading to disabled when the compiler cannot
    /// produce a program.
    ///
    /// Returns the effective policy and the program, if any.
    pub fn compile(self, compiler: &dyn FilterCompiler) -> (SyscallPolicy, Option<FilterProgram>) {
        if !self.mode.is_enabled() {
            return (self, None);
        }

        if let Err(reason) = compiler.check_prerequisites() {
            warn!(
                compiler = compiler.name(),
                requested = %self.mode,
                "syscall filter unavailable ({reason}); continuing with filtering disabled"
            );
            return (SyscallPolicy::disabled(), None);
        }

        match compiler.compile(self.mode, &self.blacklist) {
            Ok(program) => {
                debug!(
                    compiler = compiler.name(),
                    mode = %self.mode,
                    syscalls = self.blacklist.len(),
                    bytes = program.len(),
                    "compiled syscall filter"
                );
                (self, Some(program))
            }
            Err(e) => {
                warn!(
                    compiler = compiler.name(),
                    error = %e,
                    "syscall filter compilation failed; continuing with filtering disabled"
                );
                (SyscallPolicy::disabled(), None)
            }
        }
    }
}

/// A compiled filter program, as raw bytes for the isolation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterProgram(Vec<u8>);

impl FilterProgram {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Errors from a filter compiler.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter compiler unavailable: {0}")]
    Unavailable(String),

    #[error("failed to build filter: {0}")]
    Build(String),
}

/// Turns a syscall policy into a filter program.
pub trait FilterCompiler {
    /// Compiler name for diagnostics.
    fn name(&self) -> &str;

    /// Whether this compiler can run here. The error explains what is
    /// missing.
    fn check_prerequisites(&self) -> Result<(), String>;

    /// Build a program applying `mode` to `blacklist`.
    fn compile(&self, mode: SyscallMode, blacklist: &[String]) -> Result<FilterProgram, FilterError>;
}
