//! Seccomp blacklist filters.
//!
//! Builds a filter that allows every syscall by default and applies the
//! requested action to each blacklisted one:
//! - `Block` → the syscall fails with `EPERM`
//! - `Log` → the syscall runs and the kernel logs it
//!
//! The dispatch generated by `seccompiler` kills any process calling in
//! through a foreign ABI, so a preamble runs first:
//! - foreign ABI (i386 on x86_64, arm32 on aarch64): killed in `Block`
//!   mode, allowed in `Log` mode
//! - x32 syscalls on x86_64: the match action, since x32 numbers alias
//!   the blacklisted ones
//!
//! The filter is compiled, never applied to this process; bubblewrap loads
//! it into the sandboxed child.

use std::collections::BTreeMap;

use seccompiler::{
    BpfProgram, SeccompAction, SeccompFilter, SeccompRule, TargetArch, sock_filter,
};
use tracing::debug;
use warden_policy::{FilterError, FilterProgram, SyscallMode};

use crate::syscalls::syscall_number;

const BPF_LD_W_ABS: u16 = 0x20;
const BPF_JEQ_K: u16 = 0x15;
const BPF_JSET_K: u16 = 0x45;
const BPF_RET_K: u16 = 0x06;

// offsets into struct seccomp_data
const DATA_NR_OFFSET: u32 = 0;
const DATA_ARCH_OFFSET: u32 = 4;

const X32_SYSCALL_BIT: u32 = 0x4000_0000;

const AUDIT_ARCH_X86_64: u32 = 0xC000_003E;
const AUDIT_ARCH_AARCH64: u32 = 0xC000_00B7;

/// The ABI the filter is built for.
#[derive(Debug, Clone, Copy)]
pub struct NativeArch {
    pub target: TargetArch,
    /// `AUDIT_ARCH_*` value the kernel reports for native syscalls.
    pub audit: u32,
    /// Whether the x32 ABI shares this audit value.
    pub has_x32: bool,
}

/// Architecture of the running process.
pub fn native_arch() -> Result<NativeArch, String> {
    if cfg!(target_arch = "x86_64") {
        Ok(NativeArch {
            target: TargetArch::x86_64,
            audit: AUDIT_ARCH_X86_64,
            has_x32: true,
        })
    } else if cfg!(target_arch = "aarch64") {
        Ok(NativeArch {
            target: TargetArch::aarch64,
            audit: AUDIT_ARCH_AARCH64,
            has_x32: false,
        })
    } else {
        Err(format!(
            "unsupported architecture for seccomp filter: {}",
            std::env::consts::ARCH
        ))
    }
}

/// Compile `blacklist` under `mode` into bubblewrap's filter format.
pub fn compile_filter(mode: SyscallMode, blacklist: &[String]) -> Result<FilterProgram, FilterError> {
    let (match_action, foreign_action) = match mode {
        SyscallMode::Block => (
            SeccompAction::Errno(libc::EPERM as u32),
            SeccompAction::KillProcess,
        ),
        SyscallMode::Log => (SeccompAction::Log, SeccompAction::Allow),
        SyscallMode::Disabled => {
            return Err(FilterError::Build(
                "no filter is built in disabled mode".to_string(),
            ));
        }
    };

    let arch = native_arch().map_err(FilterError::Unavailable)?;

    let mut rules: BTreeMap<i64, Vec<SeccompRule>> = BTreeMap::new();
    for name in blacklist {
        match syscall_number(name) {
            // empty rule vec = unconditional match
            Some(nr) => {
                rules.insert(nr, vec![]);
            }
            None => debug!(syscall = %name, "syscall not available on this architecture"),
        }
    }

    if rules.is_empty() {
        return Err(FilterError::Build(
            "no blacklisted syscall exists on this architecture".to_string(),
        ));
    }

    let filter = SeccompFilter::new(
        rules,
        SeccompAction::Allow, // default: allow
        match_action.clone(), // when rule matches
        arch.target,
    )
    .map_err(|e| FilterError::Build(e.to_string()))?;

    let dispatch: BpfProgram = filter
        .try_into()
        .map_err(|e: seccompiler::BackendError| FilterError::Build(e.to_string()))?;

    let mut prog = preamble(&arch, foreign_action, match_action);
    prog.extend(dispatch);

    debug!(instructions = prog.len(), %mode, "seccomp filter compiled");
    Ok(FilterProgram::new(serialize(&prog)))
}

fn stmt(code: u16, k: u32) -> sock_filter {
    sock_filter { code, jt: 0, jf: 0, k }
}

fn jump(code: u16, k: u32, jt: u8, jf: u8) -> sock_filter {
    sock_filter { code, jt, jf, k }
}

/// Instructions run before the per-syscall dispatch. Native, non-x32
/// syscalls fall through to it.
fn preamble(arch: &NativeArch, foreign: SeccompAction, on_match: SeccompAction) -> Vec<sock_filter> {
    let mut prog = vec![
        stmt(BPF_LD_W_ABS, DATA_ARCH_OFFSET),
        jump(BPF_JEQ_K, arch.audit, 1, 0),
        stmt(BPF_RET_K, u32::from(foreign)),
    ];
    if arch.has_x32 {
        prog.extend([
            stmt(BPF_LD_W_ABS, DATA_NR_OFFSET),
            jump(BPF_JSET_K, X32_SYSCALL_BIT, 0, 1),
            stmt(BPF_RET_K, u32::from(on_match)),
        ]);
    }
    prog
}

/// Native-endian `struct sock_filter` records, 8 bytes each.
fn serialize(prog: &[sock_filter]) -> Vec<u8> {
    let mut out = Vec::with_capacity(prog.len() * 8);
    for insn in prog {
        out.extend_from_slice(&insn.code.to_ne_bytes());
        out.push(insn.jt);
        out.push(insn.jf);
        out.extend_from_slice(&insn.k.to_ne_bytes());
    }
    out
}
