//! Application policy composition.
//!
//! ```text
//! application id ──► deny-all baseline + basics
//!                          │
//!                          ▼
//!                  capability bundles (registry)
//!                          │
//!                          ▼
//!                  permission profile (loader)
//!                          │
//!                          ▼
//!                  assembler ──► rendered policy
//!                          │
//!                          ▼
//!                  syscall policy ──► optional filter program
//! ```

use std::path::PathBuf;

use tracing::{debug, info};

use crate::assembler::{RenderedPolicy, assemble, prepare_runtime_dirs};
use crate::boundary::Invocation;
use crate::bundles::{BundleRegistry, Resolution};
use crate::config::WardenConfig;
use crate::env::Environment;
use crate::error::PolicyResult;
use crate::profile::{LoadStatus, ProfileLoader};
use crate::state::PolicyState;
use crate::syscall::{FilterCompiler, FilterProgram, SyscallMode, SyscallPolicy};

/// What to compute a policy for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRequest {
    /// Application identifier, usually the command's file name.
    pub app: String,
    /// Profile to load instead of the one the registry picks.
    pub profile_override: Option<String>,
    /// Filtering mode chosen for this run.
    pub syscall_mode: SyscallMode,
}

impl PolicyRequest {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            profile_override: None,
            syscall_mode: SyscallMode::default(),
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile_override = Some(profile.into());
        self
    }

    pub fn with_syscall_mode(mut self, mode: SyscallMode) -> Self {
        self.syscall_mode = mode;
        self
    }
}

/// The composed, not yet rendered, policy for one application.
#[derive(Debug, Clone)]
pub struct ApplicationPolicy {
    pub app: String,
    pub resolution: Resolution,
    /// Profile file that was looked up.
    pub profile_path: PathBuf,
    pub profile_status: LoadStatus,
    pub state: PolicyState,
}

/// Compose baseline, basics, bundles and profile for `request`.
pub fn compose(
    request: &PolicyRequest,
    registry: &BundleRegistry,
    env: &Environment,
    config: &WardenConfig,
) -> PolicyResult<ApplicationPolicy> {
    let state = PolicyState::deny_all(env).with_basics();

    let resolution = registry.resolve(&request.app);
    debug!(
        app = %request.app,
        bundles = ?resolution.bundles.iter().map(|b| b.name()).collect::<Vec<_>>(),
        profile = %resolution.profile,
        "resolved application"
    );
    let state = resolution.apply(state, env);

    let profile = request
        .profile_override
        .as_deref()
        .unwrap_or(&resolution.profile);
    let mut loader = ProfileLoader::new(&config.profile_dir, env.path_vars())
        .with_max_depth(config.max_include_depth);
    let profile_path = loader.profile_path(profile);
    let (state, profile_status) = loader.load(&profile_path, state)?;
    if profile_status == LoadStatus::Absent {
        info!(profile = %profile_path.display(), "no profile found; using bundles only");
    }

    Ok(ApplicationPolicy {
        app: request.app.clone(),
        resolution,
        profile_path,
        profile_status,
        state,
    })
}

/// A fully computed policy, ready for the execution boundary.
#[derive(Debug, Clone)]
pub struct ComputedPolicy {
    pub application: ApplicationPolicy,
    pub rendered: RenderedPolicy,
    /// Effective syscall policy after any degradation.
    pub syscalls: SyscallPolicy,
    pub filter: Option<FilterProgram>,
}

impl ComputedPolicy {
    /// Package the policy with the command for hand-off.
    pub fn into_invocation(self, command: Vec<String>) -> Invocation {
        Invocation::new(self.rendered, self.filter, command)
    }
}

/// Run the whole derivation: compose, create runtime directories, render,
/// and compile the syscall filter.
pub fn compute(
    request: &PolicyRequest,
    registry: &BundleRegistry,
    env: &Environment,
    config: &WardenConfig,
    compiler: &dyn FilterCompiler,
) -> PolicyResult<ComputedPolicy> {
    let application = compose(request, registry, env, config)?;

    prepare_runtime_dirs(&application.state);
    let rendered = assemble(&application.state, env);

    let (syscalls, filter) =
        SyscallPolicy::new(request.syscall_mode, &config.extra_blacklist).compile(compiler);

    debug!(
        directives = rendered.len(),
        rw = rendered.binds().count(),
        ro = rendered.ro_binds().count(),
        syscall_mode = %syscalls.mode,
        "policy computed"
    );

    Ok(ComputedPolicy {
        application,
        rendered,
        syscalls,
        filter,
    })
}
