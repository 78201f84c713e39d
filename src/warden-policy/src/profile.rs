//! Permission-profile loading.
//!
//! Profiles are line-oriented files in the firejail style:
//!
//! ```text
//! # comment
//! include globals.local
//! whitelist ${DOWNLOADS}
//! whitelist #${HOME}/.ssh      disabled by the leading '#'
//! read-only /etc/foo           # trailing comment
//! whitelist-ro ${HOME}/.config/mimeapps.list
//! ```
//!
//! Only `include`, `whitelist`, `read-only` and `whitelist-ro` contribute;
//! every other keyword is ignored. Placeholders are substituted before glob
//! expansion, and only readable matches are kept.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::assembler::is_readable;
use crate::env::PathVars;
use crate::error::{PolicyError, PolicyResult};
use crate::state::PolicyState;

/// Default bound on include nesting.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 16;

/// File extension of permission profiles.
pub const PROFILE_EXTENSION: &str = "profile";

const COMMENT: char = '#';
const DISABLE_MARKER: char = '#';

/// Directive keywords that contribute to a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Include,
    Whitelist,
    ReadOnly,
    WhitelistRo,
}

impl DirectiveKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "include" => Some(Self::Include),
            "whitelist" => Some(Self::Whitelist),
            "read-only" => Some(Self::ReadOnly),
            "whitelist-ro" => Some(Self::WhitelistRo),
            _ => None,
        }
    }
}

/// A single parsed profile line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileDirective {
    pub kind: DirectiveKind,
    /// Pattern with placeholders still in place.
    pub argument: String,
}

/// Parse one line into a directive.
///
/// Returns `None` for blank lines, comments, disabled lines and
/// unrecognized keywords.
pub fn parse_line(line: &str) -> Option<ProfileDirective> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(COMMENT) {
        return None;
    }

    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };
    let kind = DirectiveKind::from_keyword(keyword)?;

    if rest.starts_with(DISABLE_MARKER) {
        trace!(line, "directive disabled");
        return None;
    }

    let argument = strip_inline_comment(rest);
    if argument.is_empty() {
        return None;
    }

    Some(ProfileDirective {
        kind,
        argument: argument.to_string(),
    })
}

/// Parse every contributing directive of a profile.
pub fn parse_profile(contents: &str) -> Vec<ProfileDirective> {
    contents.lines().filter_map(parse_line).collect()
}

/// Cut the line at the first `#` that follows whitespace.
fn strip_inline_comment(rest: &str) -> &str {
    let mut prev_ws = false;
    for (idx, ch) in rest.char_indices() {
        if ch == COMMENT && prev_ws {
            return rest[..idx].trim_end();
        }
        prev_ws = ch.is_whitespace();
    }
    rest
}

/// Expand a glob pattern, keeping readable matches only.
pub fn expand_glob(pattern: &str) -> Vec<PathBuf> {
    let paths = match glob::glob(pattern) {
        Ok(paths) => paths,
        Err(e) => {
            debug!(pattern, error = %e, "invalid glob pattern");
            return Vec::new();
        }
    };

    paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                debug!(pattern, error = %e, "glob match unreadable");
                None
            }
        })
        .filter(|path| is_readable(path))
        .collect()
}

/// Whether a profile was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Absent,
}

/// Recursive profile loader.
///
/// The loader owns only its include bookkeeping; the policy state is passed
/// in and handed back by every call.
#[derive(Debug)]
pub struct ProfileLoader {
    profile_dir: PathBuf,
    vars: PathVars,
    max_depth: usize,
    /// Files currently being loaded, outermost first.
    stack: Vec<PathBuf>,
    /// Files already loaded to completion.
    loaded: HashSet<PathBuf>,
}

impl ProfileLoader {
    pub fn new(profile_dir: impl Into<PathBuf>, vars: PathVars) -> Self {
        Self {
            profile_dir: profile_dir.into(),
            vars,
            max_depth: DEFAULT_MAX_INCLUDE_DEPTH,
            stack: Vec::new(),
            loaded: HashSet::new(),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    /// Path of the profile called `name`.
    ///
    /// A name containing `/` is taken as a path to a profile file.
    pub fn profile_path(&self, name: &str) -> PathBuf {
        if name.contains('/') {
            PathBuf::from(name)
        } else {
            self.profile_dir
                .join(format!("{name}.{PROFILE_EXTENSION}"))
        }
    }

    /// Load the profile called `name`.
    pub fn load_named(
        &mut self,
        name: &str,
        state: PolicyState,
    ) -> PolicyResult<(PolicyState, LoadStatus)> {
        let path = self.profile_path(name);
        self.load(&path, state)
    }

    /// Load the profile at `path` and everything it includes.
    ///
    /// An absent or unreadable file yields [`LoadStatus::Absent`] with the
    /// state unchanged.
    pub fn load(
        &mut self,
        path: &Path,
        state: PolicyState,
    ) -> PolicyResult<(PolicyState, LoadStatus)> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "profile not loaded");
                return Ok((state, LoadStatus::Absent));
            }
        };

        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if self.stack.contains(&key) {
            return Err(PolicyError::IncludeCycle { path: key });
        }
        if self.stack.len() >= self.max_depth {
            return Err(PolicyError::IncludeTooDeep {
                path: key,
                limit: self.max_depth,
            });
        }
        if self.loaded.contains(&key) {
            debug!(path = %key.display(), "profile already loaded");
            return Ok((state, LoadStatus::Loaded));
        }

        debug!(path = %key.display(), depth = self.stack.len(), "loading profile");
        self.stack.push(key.clone());
        let result = self.apply_all(&contents, state);
        self.stack.pop();

        let state = result?;
        self.loaded.insert(key);
        Ok((state, LoadStatus::Loaded))
    }

    fn apply_all(&mut self, contents: &str, mut state: PolicyState) -> PolicyResult<PolicyState> {
        for directive in parse_profile(contents) {
            state = self.apply(&directive, state)?;
        }
        Ok(state)
    }

    fn apply(
        &mut self,
        directive: &ProfileDirective,
        mut state: PolicyState,
    ) -> PolicyResult<PolicyState> {
        let pattern = self.vars.substitute(&directive.argument);

        match directive.kind {
            DirectiveKind::Include => {
                let pattern = if Path::new(&pattern).is_absolute() {
                    pattern
                } else {
                    self.profile_dir.join(&pattern).to_string_lossy().into_owned()
                };
                for path in expand_glob(&pattern) {
                    (state, _) = self.load(&path, state)?;
                }
            }
            DirectiveKind::Whitelist => {
                state.add_rw_all(expand_glob(&pattern).iter().map(|p| path_string(p)));
            }
            DirectiveKind::ReadOnly | DirectiveKind::WhitelistRo => {
                state.add_ro_all(expand_glob(&pattern).iter().map(|p| path_string(p)));
            }
        }

        Ok(state)
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
