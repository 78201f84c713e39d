//! The policy accumulator threaded through the loader and bundles.

use std::collections::BTreeSet;

use crate::env::Environment;

/// Raw argument that forbids nested user namespaces inside the sandbox.
pub const DISABLE_USERNS: &str = "--disable-userns";

/// Accumulated policy: path sets, env passthrough and raw directives.
///
/// `rw` and `ro` are deduplicated independently; a path may sit in both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyState {
    /// Paths bound read-write.
    pub rw: BTreeSet<String>,

    /// Paths bound read-only.
    pub ro: BTreeSet<String>,

    /// Environment variable names forwarded into the sandbox, in order.
    pub env: Vec<String>,

    /// Low-level directives emitted verbatim before any bind.
    pub raw: Vec<String>,

    /// Directories that must exist before the sandbox starts.
    pub runtime_dirs: Vec<String>,
}

impl PolicyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The deny-all baseline: every namespace unshared, empty environment,
    /// no capabilities, and fresh `/proc`, `/dev` and `/tmp`.
    pub fn deny_all(env: &Environment) -> Self {
        let mut state = Self::new();
        state.push_raw([
            "--unshare-all",
            "--unshare-user",
            DISABLE_USERNS,
            "--die-with-parent",
            "--new-session",
            "--clearenv",
            "--cap-drop",
            "ALL",
            "--proc",
            "/proc",
            "--dev",
            "/dev",
            "--tmpfs",
            "/tmp",
        ]);
        if let Some(runtime) = env.runtime_dir() {
            state.push_raw(["--dir".to_string(), runtime]);
        }
        state
    }

    /// System roots and variables every program needs to start.
    pub fn with_basics(mut self) -> Self {
        self.add_ro_all([
            "/usr",
            "/bin",
            "/sbin",
            "/lib",
            "/lib32",
            "/lib64",
            "/etc/ld.so.cache",
            "/etc/ld.so.conf",
            "/etc/ld.so.conf.d",
            "/etc/localtime",
            "/etc/passwd",
            "/etc/group",
            "/etc/alternatives",
            "/etc/locale.alias",
            "/etc/locale.conf",
        ]);
        self.add_env_all([
            "PATH",
            "LANG",
            "LANGUAGE",
            "LC_ALL",
            "HOME",
            "USER",
            "LOGNAME",
            "TZ",
            "XDG_RUNTIME_DIR",
        ]);
        self
    }

    pub fn add_rw(&mut self, path: impl Into<String>) {
        self.rw.insert(path.into());
    }

    pub fn add_ro(&mut self, path: impl Into<String>) {
        self.ro.insert(path.into());
    }

    pub fn add_rw_all<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rw.extend(paths.into_iter().map(Into::into));
    }

    pub fn add_ro_all<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ro.extend(paths.into_iter().map(Into::into));
    }

    /// Forward `name` into the sandbox. Repeated names keep their first
    /// position.
    pub fn add_env(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.env.contains(&name) {
            self.env.push(name);
        }
    }

    pub fn add_env_all<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.add_env(name);
        }
    }

    pub fn push_raw<I, S>(&mut self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.raw.extend(args.into_iter().map(Into::into));
    }

    /// Remove every occurrence of a single-word raw directive.
    pub fn remove_raw(&mut self, arg: &str) {
        self.raw.retain(|a| a != arg);
    }

    pub fn require_dir(&mut self, dir: impl Into<String>) {
        let dir = dir.into();
        if !self.runtime_dirs.contains(&dir) {
            self.runtime_dirs.push(dir);
        }
    }
}
