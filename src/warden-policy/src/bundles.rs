//! Capability bundles and the application registry.
//!
//! A bundle is a named contribution of paths, environment variables and raw
//! directives for one class of application needs. Bundles only append to the
//! [`PolicyState`], except [`CapabilityBundle::UserNs`] which lifts the
//! nested user namespace restriction. Paths are added whether or not they
//! exist; the assembler drops the missing ones.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::env::Environment;
use crate::state::{DISABLE_USERNS, PolicyState};

use CapabilityBundle::{
    Dbus, Games, Gui, Net, ProfileSyncDaemon as Psd, RwHome, Sound, Term, UserNs,
};

/// A composable set of permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityBundle {
    /// Display server sockets and toolkit variables.
    Gui,
    /// Audio server sockets and sound devices.
    Sound,
    /// Session, system and accessibility buses.
    Dbus,
    /// Host network namespace and name resolution.
    Net,
    /// Shell startup files and terminal variables.
    Term,
    /// Game launcher data and input devices.
    Games,
    /// Read-write access to the whole home directory.
    RwHome,
    /// Allow nested user namespaces.
    UserNs,
    /// profile-sync-daemon runtime directory.
    ProfileSyncDaemon,
}

impl CapabilityBundle {
    pub const ALL: [CapabilityBundle; 9] = [
        CapabilityBundle::Gui,
        CapabilityBundle::Sound,
        CapabilityBundle::Dbus,
        CapabilityBundle::Net,
        CapabilityBundle::Term,
        CapabilityBundle::Games,
        CapabilityBundle::RwHome,
        CapabilityBundle::UserNs,
        CapabilityBundle::ProfileSyncDaemon,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CapabilityBundle::Gui => "gui",
            CapabilityBundle::Sound => "sound",
            CapabilityBundle::Dbus => "dbus",
            CapabilityBundle::Net => "net",
            CapabilityBundle::Term => "term",
            CapabilityBundle::Games => "games",
            CapabilityBundle::RwHome => "rwhome",
            CapabilityBundle::UserNs => "userns",
            CapabilityBundle::ProfileSyncDaemon => "psd",
        }
    }

    /// Apply this bundle to `state`.
    pub fn apply(&self, mut state: PolicyState, env: &Environment) -> PolicyState {
        let home = env.home().map(str::to_string);
        let runtime = env.runtime_dir();
        let in_home = |rel: &str| home.as_ref().map(|h| format!("{h}/{rel}"));
        let in_runtime = |rel: &str| runtime.as_ref().map(|r| format!("{r}/{rel}"));

        match self {
            CapabilityBundle::Gui => {
                state.add_ro("/tmp/.X11-unix");
                if let Some(display) = env.get("WAYLAND_DISPLAY") {
                    // WAYLAND_DISPLAY may be absolute.
                    if Path::new(display).is_absolute() {
                        state.add_ro(display);
                    } else if let Some(socket) = in_runtime(display) {
                        state.add_ro(socket);
                    }
                }
                if let Some(xauth) = env.get("XAUTHORITY") {
                    state.add_ro(xauth);
                }
                state.add_ro_all(
                    [
                        in_home(".Xauthority"),
                        in_home(".config/fontconfig"),
                        in_home(".local/share/fonts"),
                        in_home(".config/gtk-3.0"),
                        in_home(".icons"),
                    ]
                    .into_iter()
                    .flatten(),
                );
                state.add_ro_all([
                    "/etc/fonts",
                    "/usr/share/fonts",
                    "/usr/share/icons",
                    "/usr/share/themes",
                    "/usr/share/mime",
                    "/sys/dev/char",
                    "/sys/devices/pci0000:00",
                ]);
                state.push_raw(["--dev-bind-try", "/dev/dri", "/dev/dri"]);
                state.add_env_all([
                    "DISPLAY",
                    "WAYLAND_DISPLAY",
                    "XAUTHORITY",
                    "XDG_SESSION_TYPE",
                    "XDG_CURRENT_DESKTOP",
                    "XDG_SESSION_DESKTOP",
                    "DESKTOP_SESSION",
                    "GDK_BACKEND",
                    "GTK_THEME",
                    "QT_QPA_PLATFORM",
                    "QT_WAYLAND_DISABLE_WINDOWDECORATION",
                    "MOZ_ENABLE_WAYLAND",
                    "XCURSOR_THEME",
                    "XCURSOR_SIZE",
                ]);
            }
            CapabilityBundle::Sound => {
                state.add_rw_all(
                    [in_runtime("pulse/native"), in_runtime("pipewire-0")]
                        .into_iter()
                        .flatten(),
                );
                state.add_ro_all([in_home(".config/pulse/cookie")].into_iter().flatten());
                state.add_ro_all(["/etc/pulse", "/etc/alsa", "/usr/share/alsa", "/etc/asound.conf"]);
                state.push_raw(["--dev-bind-try", "/dev/snd", "/dev/snd"]);
                state.add_env_all(["PULSE_SERVER", "PULSE_COOKIE", "PIPEWIRE_REMOTE"]);
            }
            CapabilityBundle::Dbus => {
                state.add_rw_all(
                    [in_runtime("bus"), in_runtime("at-spi/bus")]
                        .into_iter()
                        .flatten(),
                );
                state.add_rw("/run/dbus/system_bus_socket");
                if let Some(at_spi) = in_runtime("at-spi") {
                    state.require_dir(at_spi);
                }
                state.add_ro("/etc/machine-id");
                state.add_env_all([
                    "DBUS_SESSION_BUS_ADDRESS",
                    "DBUS_SYSTEM_BUS_ADDRESS",
                    "AT_SPI_BUS_ADDRESS",
                    "NO_AT_BRIDGE",
                ]);
            }
            CapabilityBundle::Net => {
                state.push_raw(["--share-net"]);
                state.add_ro_all([
                    "/etc/resolv.conf",
                    "/etc/hosts",
                    "/etc/host.conf",
                    "/etc/nsswitch.conf",
                    "/etc/gai.conf",
                    "/etc/services",
                    "/etc/protocols",
                    "/etc/ssl",
                    "/etc/ca-certificates",
                    "/etc/pki",
                    "/run/systemd/resolve",
                ]);
                state.add_env_all([
                    "http_proxy",
                    "https_proxy",
                    "no_proxy",
                    "HTTP_PROXY",
                    "HTTPS_PROXY",
                    "NO_PROXY",
                ]);
            }
            CapabilityBundle::Term => {
                state.add_ro_all(
                    [
                        in_home(".bashrc"),
                        in_home(".bash_profile"),
                        in_home(".profile"),
                        in_home(".inputrc"),
                        in_home(".zshrc"),
                        in_home(".config/fish"),
                    ]
                    .into_iter()
                    .flatten(),
                );
                state.add_ro_all([
                    "/etc/bash.bashrc",
                    "/etc/bashrc",
                    "/etc/profile",
                    "/etc/profile.d",
                    "/etc/inputrc",
                    "/etc/zsh",
                    "/etc/terminfo",
                    "/usr/share/terminfo",
                ]);
                state.add_env_all(["TERM", "COLORTERM", "SHELL", "EDITOR", "PAGER", "COLUMNS", "LINES"]);
            }
            CapabilityBundle::Games => {
                state.add_rw_all(
                    [
                        in_home(".steam"),
                        in_home(".local/share/Steam"),
                        in_home(".local/share/lutris"),
                        in_home(".wine"),
                        in_home(".cache/mesa_shader_cache"),
                    ]
                    .into_iter()
                    .flatten(),
                );
                state.add_ro("/sys/class/input");
                state.push_raw(["--dev-bind-try", "/dev/input", "/dev/input"]);
                state.push_raw(["--dev-bind-try", "/dev/uinput", "/dev/uinput"]);
                state.add_env_all([
                    "SDL_VIDEODRIVER",
                    "SDL_AUDIODRIVER",
                    "STEAM_RUNTIME",
                    "SteamAppId",
                    "WINEPREFIX",
                    "DXVK_HUD",
                    "__GL_SHADER_DISK_CACHE",
                ]);
            }
            CapabilityBundle::RwHome => {
                if let Some(home) = &home {
                    state.add_rw(home.as_str());
                }
            }
            CapabilityBundle::UserNs => {
                state.remove_raw(DISABLE_USERNS);
            }
            CapabilityBundle::ProfileSyncDaemon => {
                state.add_rw_all([in_runtime("psd")].into_iter().flatten());
            }
        }

        state
    }
}

impl fmt::Display for CapabilityBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CapabilityBundle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapabilityBundle::ALL
            .into_iter()
            .find(|b| b.name() == s.to_lowercase())
            .ok_or_else(|| {
                format!(
                    "Unknown capability bundle: '{}'. Valid bundles: {}",
                    s,
                    CapabilityBundle::ALL.map(|b| b.name()).join(", ")
                )
            })
    }
}

/// What the registry knows about one application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppEntry {
    pub bundles: Vec<CapabilityBundle>,
    /// Profile to load instead of the identifier's own.
    pub profile: Option<String>,
}

/// Result of resolving an application identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub bundles: Vec<CapabilityBundle>,
    pub profile: String,
}

impl Resolution {
    /// Apply every resolved bundle in order.
    pub fn apply(&self, state: PolicyState, env: &Environment) -> PolicyState {
        self.bundles
            .iter()
            .fold(state, |state, bundle| bundle.apply(state, env))
    }
}

const BROWSER: &[CapabilityBundle] = &[Gui, Sound, Dbus, Net, Psd];
const MESSENGER: &[CapabilityBundle] = &[Gui, Sound, Dbus, Net];
const MEDIA: &[CapabilityBundle] = &[Gui, Sound, Dbus];
const DESKTOP: &[CapabilityBundle] = &[Gui, Dbus];
const SHELL: &[CapabilityBundle] = &[Term];
const NET_TOOL: &[CapabilityBundle] = &[Net, Term];

/// Built-in application table: identifier, bundles, profile override.
const BUILTIN_APPS: &[(&str, &[CapabilityBundle], Option<&str>)] = &[
    ("firefox", BROWSER, None),
    ("firefox-esr", BROWSER, Some("firefox")),
    ("firefox-developer-edition", BROWSER, Some("firefox")),
    ("librewolf", BROWSER, Some("firefox")),
    ("chromium", BROWSER, None),
    ("chromium-browser", BROWSER, Some("chromium")),
    ("google-chrome", BROWSER, None),
    ("google-chrome-stable", BROWSER, Some("google-chrome")),
    ("thunderbird", MESSENGER, None),
    ("signal-desktop", MESSENGER, None),
    ("telegram-desktop", MESSENGER, None),
    ("mpv", MEDIA, None),
    ("vlc", MEDIA, None),
    ("evince", DESKTOP, None),
    ("okular", DESKTOP, None),
    ("zathura", DESKTOP, None),
    ("eog", DESKTOP, None),
    ("gimp", DESKTOP, None),
    ("inkscape", DESKTOP, None),
    ("libreoffice", DESKTOP, None),
    ("steam", &[Gui, Sound, Dbus, Net, Games, UserNs], None),
    ("wine", &[Gui, Sound, Games, Net], None),
    ("lutris", &[Gui, Sound, Games, Net], None),
    ("bash", SHELL, None),
    ("zsh", SHELL, None),
    ("fish", SHELL, None),
    ("vim", SHELL, None),
    ("nvim", SHELL, None),
    ("htop", SHELL, None),
    ("less", SHELL, None),
    ("curl", NET_TOOL, None),
    ("wget", NET_TOOL, None),
    ("ssh", NET_TOOL, None),
    ("git", NET_TOOL, None),
    ("code", &[Gui, Dbus, Net, Term, RwHome], None),
    ("codium", &[Gui, Dbus, Net, Term, RwHome], None),
];

/// Maps application identifiers to bundles and profile names.
#[derive(Debug, Clone, Default)]
pub struct BundleRegistry {
    apps: HashMap<String, AppEntry>,
}

impl BundleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry preloaded with the built-in application table.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for (app, bundles, profile) in BUILTIN_APPS {
            registry.register(
                *app,
                AppEntry {
                    bundles: bundles.to_vec(),
                    profile: profile.map(str::to_string),
                },
            );
        }
        registry
    }

    /// Add or replace an application entry.
    pub fn register(&mut self, app: impl Into<String>, entry: AppEntry) -> &mut Self {
        self.apps.insert(app.into(), entry);
        self
    }

    pub fn get(&self, app: &str) -> Option<&AppEntry> {
        self.apps.get(app)
    }

    /// Resolve an application identifier. Never fails: unknown identifiers
    /// get no bundles and their own profile name.
    pub fn resolve(&self, app: &str) -> Resolution {
        match self.apps.get(app) {
            Some(entry) => Resolution {
                bundles: entry.bundles.clone(),
                profile: entry.profile.clone().unwrap_or_else(|| app.to_string()),
            },
            None => Resolution {
                bundles: Vec::new(),
                profile: app.to_string(),
            },
        }
    }
}

/// Application identifier for a command: the file name of its first word.
pub fn app_identifier(command: &str) -> String {
    Path::new(command)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| command.to_string())
}
