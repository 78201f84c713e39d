//! CLI argument structures and parsing.

use std::path::PathBuf;

use clap::Parser;
use warden_policy::SyscallMode;

/// Run an application inside a bubblewrap sandbox derived from its
/// capability bundles and permission profile.
#[derive(Debug, Parser)]
#[command(name = "warden", version)]
#[command(about = "Run an application under a derived bubblewrap sandbox policy", long_about = None)]
#[command(override_usage = "warden [OPTIONS] <COMMAND> [ARGS]...")]
pub struct Cli {
    /// Compute and print the policy without starting the application
    #[arg(long = "dry-run", short = 'n')]
    pub dry_run: bool,

    /// Enable verbose output (debug-level logging)
    #[arg(long = "verbose", short = 'v')]
    pub verbose: bool,

    /// Enable trace-level logging for debugging
    #[arg(long = "trace")]
    pub trace: bool,

    /// Load this profile instead of the application's own
    #[arg(long = "profile", short = 'p', value_name = "NAME")]
    pub profile: Option<String>,

    /// Directory holding permission profiles
    #[arg(long = "profile-dir", value_name = "DIR")]
    pub profile_dir: Option<PathBuf>,

    /// Do not install a seccomp filter
    #[arg(long = "no-seccomp", conflicts_with = "seccomp_log")]
    pub no_seccomp: bool,

    /// Log blacklisted syscalls instead of blocking them
    #[arg(long = "seccomp-log")]
    pub seccomp_log: bool,

    /// Configuration file (default: ~/.config/warden/config.toml)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Command to run and its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    /// Filtering mode selected by the flags, or `default` when none is set.
    pub fn syscall_mode(&self, default: SyscallMode) -> SyscallMode {
        SyscallMode::from_flags(self.no_seccomp, self.seccomp_log, default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_trailing_args_kept() {
        let cli = Cli::try_parse_from(["warden", "-n", "firefox", "--private-window", "-v"]).unwrap();
        assert!(cli.dry_run);
        assert!(!cli.verbose);
        assert_eq!(cli.command, vec!["firefox", "--private-window", "-v"]);
    }

    #[test]
    fn test_seccomp_flags_conflict() {
        assert!(Cli::try_parse_from(["warden", "--no-seccomp", "--seccomp-log", "sh"]).is_err());
    }

    #[test]
    fn test_syscall_mode_selection() {
        let cli = Cli::try_parse_from(["warden", "--seccomp-log", "sh"]).unwrap();
        assert_eq!(cli.syscall_mode(SyscallMode::Block), SyscallMode::Log);

        let cli = Cli::try_parse_from(["warden", "sh"]).unwrap();
        assert_eq!(cli.syscall_mode(SyscallMode::Block), SyscallMode::Block);

        let cli = Cli::try_parse_from(["warden", "--no-seccomp", "sh"]).unwrap();
        assert_eq!(cli.syscall_mode(SyscallMode::Block), SyscallMode::Disabled);
    }

    #[test]
    fn test_command_optional_at_parse_time() {
        let cli = Cli::try_parse_from(["warden"]).unwrap();
        assert!(cli.command.is_empty());
    }
}
