//! End-to-end checks of the `warden` binary that never start a sandbox.

use std::process::Command;

fn warden(temp: &tempfile::TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_warden"));
    cmd.env("WARDEN_PROFILE_DIR", temp.path())
        .env("WARDEN_BWRAP", "warden-test-no-such-engine")
        .arg("--config")
        .arg(temp.path().join("config.toml"));
    cmd
}

#[test]
fn no_command_exits_one_with_usage() {
    let temp = tempfile::tempdir().unwrap();
    let output = warden(&temp).output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no command given"));
    assert!(stderr.contains("Usage:"));
}

#[test]
fn missing_engine_exits_one() {
    let temp = tempfile::tempdir().unwrap();
    let output = warden(&temp).arg("sh").output().unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing dependency"));
}

#[test]
fn dry_run_prints_policy_without_engine() {
    let temp = tempfile::tempdir().unwrap();
    std::fs::write(temp.path().join("sh.profile"), "# shell\nread-only /etc\n").unwrap();

    let output = warden(&temp)
        .args(["--dry-run", "--no-seccomp", "sh"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("(loaded)"));
    assert!(stdout.contains("--ro-bind /etc /etc"));
    assert!(stdout.contains("# seccomp: disabled"));
}

#[test]
fn conflicting_seccomp_flags_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let output = warden(&temp)
        .args(["--no-seccomp", "--seccomp-log", "sh"])
        .output()
        .unwrap();

    assert!(!output.status.success());
}
