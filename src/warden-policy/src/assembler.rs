//! Final policy assembly.
//!
//! Turns an accumulated [`PolicyState`] into the ordered argument sequence
//! handed to the isolation engine:
//!
//! 1. raw directives, in insertion order
//! 2. bind directives for every existing, readable path, sorted by path
//!    components so parents are mounted before their children
//! 3. `--setenv` for every forwarded variable that is set and non-empty
//!
//! A path listed both read-write and read-only produces both binds; the
//! read-only bind comes second and therefore wins inside the sandbox.

use std::path::Path;

use tracing::{debug, warn};

use crate::env::Environment;
use crate::state::PolicyState;

/// Whether `path` exists and the invoking user may read it.
///
/// Sockets and device nodes count as readable when `access(2)` says so,
/// which is why this does not try to open the path.
#[cfg(unix)]
pub fn is_readable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the whole call.
    unsafe { libc::access(c_path.as_ptr(), libc::R_OK) == 0 }
}

#[cfg(not(unix))]
pub fn is_readable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok()
}

/// One rendered directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Verbatim engine argument.
    Raw(String),
    /// Read-write bind of a path onto itself.
    Bind(String),
    /// Read-only bind of a path onto itself.
    RoBind(String),
    /// Variable set inside the sandbox.
    SetEnv { name: String, value: String },
}

impl Directive {
    /// Engine arguments for this directive.
    pub fn args(&self) -> Vec<&str> {
        match self {
            Directive::Raw(arg) => vec![arg.as_str()],
            Directive::Bind(path) => vec!["--bind", path.as_str(), path.as_str()],
            Directive::RoBind(path) => vec!["--ro-bind", path.as_str(), path.as_str()],
            Directive::SetEnv { name, value } => vec!["--setenv", name.as_str(), value.as_str()],
        }
    }
}

/// The final, deterministic directive sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPolicy {
    pub directives: Vec<Directive>,
}

impl RenderedPolicy {
    /// Flat argument list.
    pub fn args(&self) -> Vec<&str> {
        self.directives.iter().flat_map(Directive::args).collect()
    }

    /// Every argument followed by a NUL byte, as read by `bwrap --args`.
    pub fn to_nul_stream(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for arg in self.args() {
            out.extend_from_slice(arg.as_bytes());
            out.push(0);
        }
        out
    }

    pub fn binds(&self) -> impl Iterator<Item = &str> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Bind(path) => Some(path.as_str()),
            _ => None,
        })
    }

    pub fn ro_binds(&self) -> impl Iterator<Item = &str> {
        self.directives.iter().filter_map(|d| match d {
            Directive::RoBind(path) => Some(path.as_str()),
            _ => None,
        })
    }

    pub fn set_envs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.directives.iter().filter_map(|d| match d {
            Directive::SetEnv { name, value } => Some((name.as_str(), value.as_str())),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }
}

/// Create directories bundles need at sandbox start.
///
/// Runs before assembly, dry-run included, so the paths it creates pass the
/// existence check. Failure only drops the affected bind.
pub fn prepare_runtime_dirs(state: &PolicyState) {
    for dir in &state.runtime_dirs {
        if Path::new(dir).is_dir() {
            continue;
        }
        match std::fs::create_dir_all(dir) {
            Ok(()) => debug!(dir = %dir, "created runtime directory"),
            Err(e) => warn!(dir = %dir, error = %e, "could not create runtime directory"),
        }
    }
}

/// Render `state` against the current filesystem and `env`.
pub fn assemble(state: &PolicyState, env: &Environment) -> RenderedPolicy {
    let mut directives: Vec<Directive> = state.raw.iter().cloned().map(Directive::Raw).collect();

    // (path, read_only) pairs; rw sorts before ro for an identical path.
    let mut binds: Vec<(&str, bool)> = state
        .rw
        .iter()
        .map(|p| (p.as_str(), false))
        .chain(state.ro.iter().map(|p| (p.as_str(), true)))
        .filter(|(path, _)| {
            let keep = is_readable(Path::new(path));
            if !keep {
                debug!(path, "dropping missing or unreadable path");
            }
            keep
        })
        .collect();
    binds.sort_by(|a, b| Path::new(a.0).cmp(Path::new(b.0)).then(a.1.cmp(&b.1)));

    directives.extend(binds.into_iter().map(|(path, read_only)| {
        if read_only {
            Directive::RoBind(path.to_string())
        } else {
            Directive::Bind(path.to_string())
        }
    }));

    directives.extend(state.env.iter().filter_map(|name| {
        env.get(name).map(|value| Directive::SetEnv {
            name: name.clone(),
            value: value.to_string(),
        })
    }));

    RenderedPolicy { directives }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    #[test]
    fn test_missing_paths_dropped() {
        let temp = tempfile::tempdir().unwrap();
        let present = temp.path().join("present");
        fs::create_dir(&present).unwrap();

        let mut state = PolicyState::new();
        state.add_rw(present.to_string_lossy());
        state.add_rw(temp.path().join("absent").to_string_lossy());

        let rendered = assemble(&state, &Environment::default());
        let binds: Vec<_> = rendered.binds().collect();
        assert_eq!(binds, vec![present.to_str().unwrap()]);
    }

    #[test]
    fn test_parents_before_children() {
        let temp = tempfile::tempdir().unwrap();
        let parent = temp.path().join("home");
        let child = parent.join("Downloads");
        let sibling = temp.path().join("home-other");
        fs::create_dir_all(&child).unwrap();
        fs::create_dir_all(&sibling).unwrap();

        let mut state = PolicyState::new();
        state.add_rw(child.to_string_lossy());
        state.add_rw(sibling.to_string_lossy());
        state.add_ro(parent.to_string_lossy());

        let rendered = assemble(&state, &Environment::default());
        let order: Vec<String> = rendered
            .directives
            .iter()
            .map(|d| match d {
                Directive::Bind(p) | Directive::RoBind(p) => p.clone(),
                other => panic!("unexpected directive {other:?}"),
            })
            .collect();
        let parent_pos = order.iter().position(|p| *p == parent.to_string_lossy()).unwrap();
        let child_pos = order.iter().position(|p| *p == child.to_string_lossy()).unwrap();
        assert!(parent_pos < child_pos);
    }

    #[test]
    fn test_cross_set_duplicate_kept() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().to_string_lossy().into_owned();

        let mut state = PolicyState::new();
        state.add_rw(path.clone());
        state.add_ro(path.clone());

        let rendered = assemble(&state, &Environment::default());
        assert_eq!(
            rendered.directives,
            vec![Directive::Bind(path.clone()), Directive::RoBind(path)]
        );
    }

    #[test]
    fn test_env_requires_non_empty_value() {
        let mut state = PolicyState::new();
        state.add_env_all(["DISPLAY", "EMPTY", "UNSET"]);
        let env = Environment::from_pairs([("DISPLAY", ":0"), ("EMPTY", "")]);

        let rendered = assemble(&state, &env);
        assert_eq!(rendered.set_envs().collect::<Vec<_>>(), vec![("DISPLAY", ":0")]);
    }

    #[test]
    fn test_raw_first_then_binds_then_env() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().to_string_lossy().into_owned();

        let mut state = PolicyState::new();
        state.add_env("TERM");
        state.add_ro(path.clone());
        state.push_raw(["--share-net"]);

        let env = Environment::from_pairs([("TERM", "xterm")]);
        let rendered = assemble(&state, &env);
        assert_eq!(
            rendered.args(),
            vec![
                "--share-net",
                "--ro-bind",
                path.as_str(),
                path.as_str(),
                "--setenv",
                "TERM",
                "xterm"
            ]
        );
    }

    #[test]
    fn test_nul_stream() {
        let rendered = RenderedPolicy {
            directives: vec![
                Directive::Raw("--unshare-all".to_string()),
                Directive::SetEnv {
                    name: "A".to_string(),
                    value: "b c".to_string(),
                },
            ],
        };
        assert_eq!(rendered.to_nul_stream(), b"--unshare-all\0--setenv\0A\0b c\0".to_vec());
    }

    #[test]
    fn test_prepare_runtime_dirs_creates_missing() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("at-spi");

        let mut state = PolicyState::new();
        state.require_dir(dir.to_string_lossy());
        prepare_runtime_dirs(&state);

        assert!(dir.is_dir());
    }
}
