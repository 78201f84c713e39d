//! Warden CLI library.
//!
//! - `cli` - Command-line arguments
//! - `logging` - tracing subscriber setup
//! - `run` - The derive-then-hand-off pipeline
//! - `bwrap` - Bubblewrap execution boundary

pub mod bwrap;
pub mod cli;
pub mod logging;
pub mod run;

pub use bwrap::BwrapBoundary;
pub use cli::Cli;
pub use logging::init_logging;
pub use run::{CliError, execute, run};
