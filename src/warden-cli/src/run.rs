//! The derive-then-hand-off pipeline behind the `warden` binary.

use std::io::Write;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};
use warden_policy::{
    BundleRegistry, ComputedPolicy, Environment, ExecutionBoundary, FilterCompiler, LoadStatus,
    PolicyRequest, WardenConfig, app_identifier, compute,
};
use warden_seccomp::SeccompilerCompiler;

use crate::bwrap::BwrapBoundary;
use crate::cli::Cli;

/// Failures that stop warden before any policy is computed.
#[derive(Debug, Error)]
pub enum CliError {
    /// The invocation itself is unusable; usage is printed.
    #[error("{0}")]
    FatalUsage(String),

    /// A required external program is missing.
    #[error("missing dependency: {0}")]
    MissingDependency(String),
}

/// Run warden for parsed arguments. Returns the process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    let env = Environment::from_process();
    let mut config = WardenConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?
        .with_env_overrides(&env);
    if let Some(dir) = &cli.profile_dir {
        config.profile_dir = dir.clone();
    }

    let boundary = BwrapBoundary::new(config.bwrap.clone());
    let compiler = SeccompilerCompiler::new();
    let mut stdout = std::io::stdout().lock();
    execute(&cli, &env, &config, &compiler, &boundary, &mut stdout)
}

/// Compute the policy for `cli.command` and either print it (dry run) or
/// hand it to `boundary`.
pub fn execute(
    cli: &Cli,
    env: &Environment,
    config: &WardenConfig,
    compiler: &dyn FilterCompiler,
    boundary: &dyn ExecutionBoundary,
    out: &mut dyn Write,
) -> Result<i32> {
    let Some(program) = cli.command.first() else {
        return Err(CliError::FatalUsage("no command given".to_string()).into());
    };

    if !cli.dry_run {
        boundary
            .check_available()
            .map_err(|e| CliError::MissingDependency(e.to_string()))?;
    }

    let resolved = which::which(program)
        .map_err(|_| CliError::FatalUsage(format!("command not found: {program}")))?;
    let app = app_identifier(program);
    debug!(app = %app, command = %resolved.display(), "resolved command");

    let mut command = vec![resolved.to_string_lossy().into_owned()];
    command.extend(cli.command.iter().skip(1).cloned());

    let mut request =
        PolicyRequest::new(app).with_syscall_mode(cli.syscall_mode(config.syscall_mode));
    if let Some(profile) = &cli.profile {
        request = request.with_profile(profile.clone());
    }

    let computed = compute(&request, &BundleRegistry::builtin(), env, config, compiler)
        .with_context(|| format!("failed to compute policy for {}", request.app))?;

    if cli.dry_run {
        print_dry_run(&computed, boundary.name(), &command, out)?;
        return Ok(0);
    }

    info!(
        app = %computed.application.app,
        syscall_mode = %computed.syscalls.mode,
        "starting sandboxed application"
    );
    let invocation = computed.into_invocation(command);
    let code = boundary
        .hand_off(&invocation)
        .with_context(|| format!("{} hand-off failed", boundary.name()))?;
    Ok(code)
}

/// Human-readable description of the computed policy, followed by the
/// equivalent engine command line and one argument per line.
fn print_dry_run(
    computed: &ComputedPolicy,
    engine: &str,
    command: &[String],
    out: &mut dyn Write,
) -> Result<()> {
    let application = &computed.application;
    let bundles: Vec<&str> = application
        .resolution
        .bundles
        .iter()
        .map(|b| b.name())
        .collect();
    let profile_status = match application.profile_status {
        LoadStatus::Loaded => "loaded",
        LoadStatus::Absent => "not found",
    };

    writeln!(out, "# application: {}", application.app)?;
    writeln!(
        out,
        "# bundles: {}",
        if bundles.is_empty() {
            "none".to_string()
        } else {
            bundles.join(", ")
        }
    )?;
    writeln!(
        out,
        "# profile: {} ({profile_status})",
        application.profile_path.display()
    )?;
    match &computed.filter {
        Some(program) => writeln!(
            out,
            "# seccomp: {} ({} syscalls, {} byte filter attached)",
            computed.syscalls.mode,
            computed.syscalls.blacklist.len(),
            program.len()
        )?,
        None => writeln!(out, "# seccomp: disabled (no filter attached)")?,
    }

    let args = computed.rendered.args();
    let mut line: Vec<&str> = vec![engine];
    line.extend(args.iter().copied());
    line.push("--");
    line.extend(command.iter().map(String::as_str));
    let joined = shlex::try_join(line).context("policy contains an argument with a NUL byte")?;
    writeln!(out, "{joined}")?;

    writeln!(out, "# arguments:")?;
    for arg in args {
        writeln!(out, "{arg}")?;
    }
    Ok(())
}
