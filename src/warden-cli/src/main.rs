//! Warden - run an untrusted application under bubblewrap.
//!
//! Usage:
//!   warden [OPTIONS] <COMMAND> [ARGS]...
//!
//! The policy is derived from the application's capability bundles and its
//! permission profile, then handed to bubblewrap together with a seccomp
//! filter.

use clap::{CommandFactory, Parser};

use warden_cli::{Cli, CliError, init_logging, run};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.trace);

    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("warden: {err:#}");
            if let Some(CliError::FatalUsage(_)) = err.downcast_ref::<CliError>() {
                eprintln!("\n{}", Cli::command().render_usage());
            }
            1
        }
    };

    std::process::exit(code)
}
