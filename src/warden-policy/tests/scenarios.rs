//! End-to-end policy derivation scenarios.

use std::cell::Cell;
use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use warden_policy::{
    BundleRegistry, CapabilityBundle, ChannelMode, Environment, FilterCompiler, FilterError,
    FilterProgram, LoadStatus, PolicyRequest, ProfileLoader, PolicyState, SyscallMode,
    WardenConfig, compute,
};

/// Deterministic stand-in for the real filter compiler.
struct StubCompiler {
    available: bool,
    calls: Cell<usize>,
}

impl StubCompiler {
    fn available() -> Self {
        Self {
            available: true,
            calls: Cell::new(0),
        }
    }

    fn unavailable() -> Self {
        Self {
            available: false,
            calls: Cell::new(0),
        }
    }
}

impl FilterCompiler for StubCompiler {
    fn name(&self) -> &str {
        "stub"
    }

    fn check_prerequisites(&self) -> Result<(), String> {
        if self.available {
            Ok(())
        } else {
            Err("compiler toolchain missing".to_string())
        }
    }

    fn compile(&self, mode: SyscallMode, blacklist: &[String]) -> Result<FilterProgram, FilterError> {
        self.calls.set(self.calls.get() + 1);
        Ok(FilterProgram::new(
            format!("{mode}:{}", blacklist.len()).into_bytes(),
        ))
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[test]
fn include_whitelist_and_read_only_scenario() {
    let temp = tempfile::tempdir().unwrap();
    let home = temp.path().join("home");
    let etc = temp.path().join("etc");
    let profiles = temp.path().join("profiles");
    fs::create_dir_all(home.join("Downloads")).unwrap();
    fs::create_dir_all(&etc).unwrap();
    fs::create_dir_all(&profiles).unwrap();
    fs::write(etc.join("foo"), "").unwrap();
    fs::write(etc.join("bar"), "").unwrap();

    fs::write(
        profiles.join("A.profile"),
        format!(
            "include B.profile\nwhitelist ${{HOME}}/Downloads\nread-only {}\n",
            etc.join("foo").display()
        ),
    )
    .unwrap();
    fs::write(
        profiles.join("B.profile"),
        format!("whitelist-ro {}\n", etc.join("bar").display()),
    )
    .unwrap();

    let env = Environment::from_pairs([("HOME", path_str(&home))]);
    let mut loader = ProfileLoader::new(&profiles, env.path_vars());
    let (state, status) = loader.load_named("A", PolicyState::new()).unwrap();

    assert_eq!(status, LoadStatus::Loaded);
    assert_eq!(
        state.rw.into_iter().collect::<Vec<_>>(),
        vec![format!("{}/Downloads", path_str(&home))]
    );
    assert_eq!(
        state.ro.into_iter().collect::<Vec<_>>(),
        vec![path_str(&etc.join("bar")), path_str(&etc.join("foo"))]
    );
}

#[test]
fn include_scenario_filters_missing_entries() {
    let temp = tempfile::tempdir().unwrap();
    let home = temp.path().join("home");
    let profiles = temp.path().join("profiles");
    fs::create_dir_all(&home).unwrap();
    fs::create_dir_all(&profiles).unwrap();

    fs::write(
        profiles.join("A.profile"),
        format!(
            "include B.profile\nwhitelist ${{HOME}}/Downloads\nread-only {}\n",
            temp.path().join("etc/foo").display()
        ),
    )
    .unwrap();
    fs::write(
        profiles.join("B.profile"),
        format!("whitelist-ro {}\n", temp.path().join("etc/bar").display()),
    )
    .unwrap();

    let env = Environment::from_pairs([("HOME", path_str(&home))]);
    let mut loader = ProfileLoader::new(&profiles, env.path_vars());
    let (state, _) = loader.load_named("A", PolicyState::new()).unwrap();

    assert!(state.rw.is_empty());
    assert!(state.ro.is_empty());
}

#[test]
fn firefox_variant_uses_browser_bundles_and_shared_profile() {
    let temp = tempfile::tempdir().unwrap();
    let profiles = temp.path().join("profiles");
    fs::create_dir_all(&profiles).unwrap();
    fs::write(profiles.join("firefox.profile"), "whitelist ${HOME}\n").unwrap();

    let env = Environment::from_pairs([
        ("HOME", path_str(temp.path())),
        ("XDG_RUNTIME_DIR", path_str(&temp.path().join("run"))),
    ]);
    let config = WardenConfig {
        profile_dir: profiles.clone(),
        ..WardenConfig::default()
    };

    let computed = compute(
        &PolicyRequest::new("firefox-esr"),
        &BundleRegistry::builtin(),
        &env,
        &config,
        &StubCompiler::available(),
    )
    .unwrap();

    assert_eq!(
        computed.application.resolution.bundles,
        vec![
            CapabilityBundle::Gui,
            CapabilityBundle::Sound,
            CapabilityBundle::Dbus,
            CapabilityBundle::Net,
            CapabilityBundle::ProfileSyncDaemon,
        ]
    );
    assert_eq!(computed.application.profile_path, profiles.join("firefox.profile"));
    assert_eq!(computed.application.profile_status, LoadStatus::Loaded);
    assert!(computed.rendered.args().contains(&"--share-net"));
    assert!(computed.rendered.binds().any(|p| p == path_str(temp.path())));
}

#[test]
fn log_mode_without_compiler_degrades_to_disabled() {
    let temp = tempfile::tempdir().unwrap();
    let env = Environment::from_pairs([
        ("HOME", path_str(temp.path())),
        ("XDG_RUNTIME_DIR", path_str(&temp.path().join("run"))),
        ("TERM", "xterm-256color".to_string()),
    ]);
    let config = WardenConfig {
        profile_dir: temp.path().join("profiles"),
        ..WardenConfig::default()
    };
    let registry = BundleRegistry::builtin();

    let unavailable = StubCompiler::unavailable();
    let degraded = compute(
        &PolicyRequest::new("bash").with_syscall_mode(SyscallMode::Log),
        &registry,
        &env,
        &config,
        &unavailable,
    )
    .unwrap();
    let disabled = compute(
        &PolicyRequest::new("bash").with_syscall_mode(SyscallMode::Disabled),
        &registry,
        &env,
        &config,
        &StubCompiler::available(),
    )
    .unwrap();

    assert_eq!(degraded.syscalls.mode, SyscallMode::Disabled);
    assert!(degraded.filter.is_none());
    assert_eq!(unavailable.calls.get(), 0);
    assert_eq!(degraded.rendered, disabled.rendered);

    let invocation = degraded.into_invocation(vec!["bash".to_string()]);
    assert_eq!(invocation.channel_mode(), ChannelMode::ArgsOnly);
}

#[test]
fn block_mode_attaches_filter() {
    let temp = tempfile::tempdir().unwrap();
    let env = Environment::from_pairs([("HOME", path_str(temp.path()))]);
    let config = WardenConfig {
        profile_dir: temp.path().to_path_buf(),
        ..WardenConfig::default()
    };

    let computed = compute(
        &PolicyRequest::new("curl"),
        &BundleRegistry::builtin(),
        &env,
        &config,
        &StubCompiler::available(),
    )
    .unwrap();

    assert_eq!(computed.syscalls.mode, SyscallMode::Block);
    let invocation = computed.into_invocation(vec!["curl".to_string()]);
    assert_eq!(invocation.channel_mode(), ChannelMode::ArgsAndFilter);
}

#[test]
fn dbus_bundle_creates_accessibility_dir() {
    let temp = tempfile::tempdir().unwrap();
    let runtime = temp.path().join("run");
    let env = Environment::from_pairs([
        ("HOME", path_str(temp.path())),
        ("XDG_RUNTIME_DIR", path_str(&runtime)),
    ]);
    let config = WardenConfig {
        profile_dir: temp.path().to_path_buf(),
        ..WardenConfig::default()
    };

    compute(
        &PolicyRequest::new("evince").with_syscall_mode(SyscallMode::Disabled),
        &BundleRegistry::builtin(),
        &env,
        &config,
        &StubCompiler::available(),
    )
    .unwrap();

    assert!(runtime.join("at-spi").is_dir());
}
