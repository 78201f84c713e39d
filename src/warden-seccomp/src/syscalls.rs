//! Syscall name to number table.
//!
//! Covers the names the blacklist can contain. Names that do not exist on
//! the running architecture resolve to `None`.

/// Syscall number for `name` on this architecture.
pub fn syscall_number(name: &str) -> Option<i64> {
    let nr = match name {
        "acct" => libc::SYS_acct,
        "add_key" => libc::SYS_add_key,
        "adjtimex" => libc::SYS_adjtimex,
        "bpf" => libc::SYS_bpf,
        "chroot" => libc::SYS_chroot,
        "clock_adjtime" => libc::SYS_clock_adjtime,
        "clock_settime" => libc::SYS_clock_settime,
        "delete_module" => libc::SYS_delete_module,
        "fanotify_init" => libc::SYS_fanotify_init,
        "finit_module" => libc::SYS_finit_module,
        "get_mempolicy" => libc::SYS_get_mempolicy,
        "init_module" => libc::SYS_init_module,
        "kcmp" => libc::SYS_kcmp,
        "kexec_file_load" => libc::SYS_kexec_file_load,
        "kexec_load" => libc::SYS_kexec_load,
        "keyctl" => libc::SYS_keyctl,
        "lookup_dcookie" => libc::SYS_lookup_dcookie,
        "mbind" => libc::SYS_mbind,
        "migrate_pages" => libc::SYS_migrate_pages,
        "mount" => libc::SYS_mount,
        "move_pages" => libc::SYS_move_pages,
        "name_to_handle_at" => libc::SYS_name_to_handle_at,
        "open_by_handle_at" => libc::SYS_open_by_handle_at,
        "perf_event_open" => libc::SYS_perf_event_open,
        "personality" => libc::SYS_personality,
        "pivot_root" => libc::SYS_pivot_root,
        "process_vm_readv" => libc::SYS_process_vm_readv,
        "process_vm_writev" => libc::SYS_process_vm_writev,
        "ptrace" => libc::SYS_ptrace,
        "quotactl" => libc::SYS_quotactl,
        "reboot" => libc::SYS_reboot,
        "request_key" => libc::SYS_request_key,
        "set_mempolicy" => libc::SYS_set_mempolicy,
        "setns" => libc::SYS_setns,
        "settimeofday" => libc::SYS_settimeofday,
        "swapoff" => libc::SYS_swapoff,
        "swapon" => libc::SYS_swapon,
        "syslog" => libc::SYS_syslog,
        "umount2" => libc::SYS_umount2,
        "unshare" => libc::SYS_unshare,
        "userfaultfd" => libc::SYS_userfaultfd,
        "vhangup" => libc::SYS_vhangup,
        "vmsplice" => libc::SYS_vmsplice,
        _ => return arch_specific(name),
    };
    Some(nr as i64)
}

#[cfg(target_arch = "x86_64")]
fn arch_specific(name: &str) -> Option<i64> {
    let nr = match name {
        "_sysctl" => libc::SYS__sysctl,
        "ioperm" => libc::SYS_ioperm,
        "iopl" => libc::SYS_iopl,
        "nfsservctl" => libc::SYS_nfsservctl,
        "uselib" => libc::SYS_uselib,
        "ustat" => libc::SYS_ustat,
        // Removed from the kernel; the numbers stay reserved.
        "create_module" => 174,
        "get_kernel_syms" => 177,
        "query_module" => 178,
        _ => return None,
    };
    Some(nr as i64)
}

#[cfg(not(target_arch = "x86_64"))]
fn arch_specific(_name: &str) -> Option<i64> {
    None
}
