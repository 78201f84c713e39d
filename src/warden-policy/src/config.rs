//! Warden configuration.
//!
//! Loaded from `$XDG_CONFIG_HOME/warden/config.toml` when present. Every
//! field is optional in the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::env::Environment;
use crate::error::{PolicyError, PolicyResult};
use crate::profile::DEFAULT_MAX_INCLUDE_DEPTH;
use crate::syscall::SyscallMode;

/// Directory searched for `<name>.profile` files.
pub const DEFAULT_PROFILE_DIR: &str = "/etc/firejail";

/// Overrides `profile_dir`.
pub const PROFILE_DIR_ENV: &str = "WARDEN_PROFILE_DIR";

/// Overrides `bwrap`.
pub const BWRAP_ENV: &str = "WARDEN_BWRAP";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WardenConfig {
    /// Directory holding permission profiles.
    pub profile_dir: PathBuf,

    /// Bubblewrap executable, looked up on `PATH` when relative.
    pub bwrap: String,

    /// Maximum include nesting before loading fails.
    pub max_include_depth: usize,

    /// Filtering mode used when no CLI flag selects one.
    pub syscall_mode: SyscallMode,

    /// Syscalls appended to the built-in blacklist.
    pub extra_blacklist: Vec<String>,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from(DEFAULT_PROFILE_DIR),
            bwrap: "bwrap".to_string(),
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            syscall_mode: SyscallMode::default(),
            extra_blacklist: Vec::new(),
        }
    }
}

impl WardenConfig {
    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("warden").join("config.toml"))
    }

    /// Parse a configuration document.
    pub fn from_toml(contents: &str) -> PolicyResult<Self> {
        toml::from_str(contents).map_err(|e| PolicyError::Config(e.to_string()))
    }

    /// Load `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults; an unreadable or malformed one is
    /// an error.
    pub fn load(path: Option<&Path>) -> PolicyResult<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::default_path) else {
            return Ok(Self::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                debug!(path = %path.display(), "loaded configuration");
                Self::from_toml(&contents)
                    .map_err(|e| PolicyError::Config(format!("{}: {e}", path.display())))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(PolicyError::Io { path, source }),
        }
    }

    /// Apply `WARDEN_*` environment overrides.
    pub fn with_env_overrides(mut self, env: &Environment) -> Self {
        if let Some(dir) = env.get(PROFILE_DIR_ENV) {
            self.profile_dir = PathBuf::from(dir);
        }
        if let Some(bwrap) = env.get(BWRAP_ENV) {
            self.bwrap = bwrap.to_string();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = WardenConfig::default();
        assert_eq!(config.profile_dir, PathBuf::from("/etc/firejail"));
        assert_eq!(config.syscall_mode, SyscallMode::Block);
        assert_eq!(config.max_include_depth, 16);
    }

    #[test]
    fn test_partial_toml() {
        let config = WardenConfig::from_toml(
            r#"
profile_dir = "/usr/local/share/warden/profiles"
syscall_mode = "log"
extra_blacklist = ["chroot"]
"#,
        )
        .unwrap();
        assert_eq!(
            config.profile_dir,
            PathBuf::from("/usr/local/share/warden/profiles")
        );
        assert_eq!(config.syscall_mode, SyscallMode::Log);
        assert_eq!(config.extra_blacklist, vec!["chroot"]);
        assert_eq!(config.bwrap, "bwrap");
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            WardenConfig::from_toml("profile_directory = \"/x\""),
            Err(PolicyError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let config = WardenConfig::load(Some(&temp.path().join("config.toml"))).unwrap();
        assert_eq!(config, WardenConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        let env = Environment::from_pairs([
            ("WARDEN_PROFILE_DIR", "/opt/profiles"),
            ("WARDEN_BWRAP", "/opt/bin/bwrap"),
        ]);
        let config = WardenConfig::default().with_env_overrides(&env);
        assert_eq!(config.profile_dir, PathBuf::from("/opt/profiles"));
        assert_eq!(config.bwrap, "/opt/bin/bwrap");
    }
}
