//! Snapshot of the invoking process environment.
//!
//! Every stage of policy derivation reads variables through an
//! [`Environment`] captured once per invocation, so bundles and the
//! assembler stay deterministic functions of their inputs and tests never
//! have to mutate the real process environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Placeholder for the user's home directory.
pub const HOME_VAR: &str = "${HOME}";
/// Placeholder for the per-user runtime directory.
pub const RUNUSER_VAR: &str = "${RUNUSER}";
/// Placeholder for the user's downloads directory.
pub const DOWNLOADS_VAR: &str = "${DOWNLOADS}";

/// Immutable view of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Capture the current process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 are left out. When
    /// `HOME` is unset the platform home directory is filled in.
    pub fn from_process() -> Self {
        let mut vars: BTreeMap<String, String> = std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect();

        if !vars.get("HOME").is_some_and(|h| !h.is_empty()) {
            if let Some(home) = dirs::home_dir() {
                vars.insert("HOME".to_string(), home.to_string_lossy().into_owned());
            }
        }

        Self { vars }
    }

    /// Build an environment from explicit name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Value of `name` if it is set and non-empty.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn home(&self) -> Option<&str> {
        self.get("HOME")
    }

    /// The per-user runtime directory.
    ///
    /// Uses `XDG_RUNTIME_DIR`, falling back to `/run/user/<uid>`.
    pub fn runtime_dir(&self) -> Option<String> {
        if let Some(dir) = self.get("XDG_RUNTIME_DIR") {
            return Some(dir.to_string());
        }

        #[cfg(unix)]
        {
            // SAFETY: getuid has no preconditions and cannot fail.
            let uid = unsafe { libc::getuid() };
            Some(format!("/run/user/{uid}"))
        }

        #[cfg(not(unix))]
        {
            None
        }
    }

    /// The user's downloads directory.
    ///
    /// Resolution order: `XDG_DOWNLOAD_DIR` in the environment, the
    /// `XDG_DOWNLOAD_DIR` entry of `user-dirs.dirs`, then `~/Downloads`.
    pub fn downloads_dir(&self) -> Option<String> {
        if let Some(dir) = self.get("XDG_DOWNLOAD_DIR") {
            return Some(dir.to_string());
        }

        let home = self.home()?;
        let config_home = self
            .get("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| Path::new(home).join(".config"));

        if let Ok(contents) = std::fs::read_to_string(config_home.join("user-dirs.dirs")) {
            if let Some(dir) = parse_user_dirs(&contents, "XDG_DOWNLOAD_DIR", home) {
                return Some(dir);
            }
        }

        Some(format!("{home}/Downloads"))
    }

    /// Resolve the three path placeholders once.
    pub fn path_vars(&self) -> PathVars {
        PathVars {
            home: self.home().map(str::to_string),
            runtime: self.runtime_dir(),
            downloads: self.downloads_dir(),
        }
    }
}

/// Values substituted for the profile placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathVars {
    pub home: Option<String>,
    pub runtime: Option<String>,
    pub downloads: Option<String>,
}

impl PathVars {
    /// Replace known placeholders in `input`.
    ///
    /// Placeholders without a value are left untouched; the resulting path
    /// will not exist and is dropped later.
    pub fn substitute(&self, input: &str) -> String {
        let mut out = input.to_string();
        for (var, value) in [
            (HOME_VAR, &self.home),
            (RUNUSER_VAR, &self.runtime),
            (DOWNLOADS_VAR, &self.downloads),
        ] {
            if let Some(value) = value {
                out = out.replace(var, value);
            }
        }
        out
    }
}

/// Look up `key` in the contents of a `user-dirs.dirs` file.
fn parse_user_dirs(contents: &str, key: &str, home: &str) -> Option<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .find(|(name, _)| name.trim() == key)
        .map(|(_, value)| value.trim().trim_matches('"').replace("$HOME", home))
        .filter(|value| !value.is_empty())
}
