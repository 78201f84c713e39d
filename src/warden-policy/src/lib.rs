//! Warden Policy - sandbox policy derivation.
//!
//! Computes what an untrusted application may see when it runs under
//! bubblewrap: writable and read-only paths, forwarded environment
//! variables, and a syscall filter. Nothing here enforces the policy; the
//! result is handed to an [`ExecutionBoundary`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────────┐   ┌───────────────┐
//! │ ProfileLoader│   │ BundleRegistry │   │ SyscallPolicy │
//! │  (profile)   │   │   (bundles)    │   │   (syscall)   │
//! └──────┬───────┘   └───────┬────────┘   └───────┬───────┘
//!        │    PolicyState    │                    │ FilterCompiler
//!        └─────────┬─────────┘                    │
//!                  ▼                              ▼
//!            assemble() ──► RenderedPolicy + FilterProgram
//!                                   │
//!                                   ▼
//!                          ExecutionBoundary
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use warden_policy::{BundleRegistry, Environment, PolicyRequest, WardenConfig, compute};
//!
//! let env = Environment::from_process();
//! let config = WardenConfig::load(None)?.with_env_overrides(&env);
//! let request = PolicyRequest::new("firefox");
//! let computed = compute(&request, &BundleRegistry::builtin(), &env, &config, &compiler)?;
//! for arg in computed.rendered.args() {
//!     println!("{arg}");
//! }
//! ```

pub mod assembler;
pub mod boundary;
pub mod bundles;
pub mod config;
pub mod env;
pub mod error;
pub mod policy;
pub mod profile;
pub mod state;
pub mod syscall;


// Re-exports for convenient access
pub use assembler::{Directive, RenderedPolicy, assemble, is_readable, prepare_runtime_dirs};
pub use boundary::{BoundaryError, ChannelMode, ExecutionBoundary, Invocation};
pub use bundles::{AppEntry, BundleRegistry, CapabilityBundle, Resolution, app_identifier};
pub use config::WardenConfig;
pub use env::{Environment, PathVars};
pub use error::{PolicyError, PolicyResult};
pub use policy::{ApplicationPolicy, ComputedPolicy, PolicyRequest, compose, compute};
pub use profile::{DirectiveKind, LoadStatus, ProfileDirective, ProfileLoader, parse_line};
pub use state::PolicyState;
pub use syscall::{
    DEFAULT_BLACKLIST, FilterCompiler, FilterError, FilterProgram, SyscallMode, SyscallPolicy,
};
