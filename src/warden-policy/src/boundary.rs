//! Interface to the external isolation engine.
//!
//! The policy core never enforces anything itself. It hands an
//! [`Invocation`] to an [`ExecutionBoundary`], which delivers the rendered
//! directives over one channel and the optional filter program over a
//! second one.

use thiserror::Error;

use crate::assembler::RenderedPolicy;
use crate::syscall::FilterProgram;

/// Everything the isolation engine needs to start the sandboxed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub policy: RenderedPolicy,
    pub filter: Option<FilterProgram>,
    /// The command and its arguments.
    pub command: Vec<String>,
}

/// Which channels an invocation populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Directive stream only.
    ArgsOnly,
    /// Directive stream plus filter program.
    ArgsAndFilter,
}

impl Invocation {
    pub fn new(policy: RenderedPolicy, filter: Option<FilterProgram>, command: Vec<String>) -> Self {
        Self {
            policy,
            filter,
            command,
        }
    }

    pub fn channel_mode(&self) -> ChannelMode {
        if self.filter.is_some() {
            ChannelMode::ArgsAndFilter
        } else {
            ChannelMode::ArgsOnly
        }
    }
}

/// Errors raised while handing off to the isolation engine.
#[derive(Debug, Error)]
pub enum BoundaryError {
    #[error("isolation engine not found: {0}")]
    EngineNotFound(String),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Receives a computed policy and runs the command under it.
pub trait ExecutionBoundary {
    /// Engine name for diagnostics.
    fn name(&self) -> &str;

    /// Confirm the engine can be started at all. Checked before any policy
    /// work so a missing engine fails fast.
    fn check_available(&self) -> Result<(), BoundaryError> {
        Ok(())
    }

    /// Start the command and wait for it. Returns its exit code.
    fn hand_off(&self, invocation: &Invocation) -> Result<i32, BoundaryError>;
}
