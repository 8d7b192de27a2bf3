//! Compiler settings.
//!
//! Settings describe the host rather than the project being compiled:
//! where the security database and file-context files live, where
//! installed modules are stored, and which toolchain binaries package the
//! emitted source. Every field has a default, so an empty file (or no file
//! at all) targets a stock installation.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable naming an explicit settings file.
pub const SETTINGS_ENV: &str = "CONFINE_SETTINGS";

/// System-wide settings location, consulted when the variable is unset.
pub const SYSTEM_SETTINGS_PATH: &str = "/etc/confine/confine.toml";

/// Top-level settings document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// Where system policy state is read from.
    #[serde(default)]
    pub system: SystemSettings,

    /// Installed-module inspection.
    #[serde(default)]
    pub modules: ModuleSettings,

    /// External packaging toolchain.
    #[serde(default)]
    pub toolchain: ToolchainSettings,

    /// Compiler behaviour knobs.
    #[serde(default)]
    pub compiler: CompilerSettings,
}

/// How the security database is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Query the running system with `seinfo` and selinuxfs.
    #[default]
    Live,
    /// Read a TOML snapshot of the database.
    Snapshot,
}

/// Location of system policy state.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemSettings {
    /// Database source kind.
    #[serde(default)]
    pub source: SourceKind,

    /// Snapshot file, required when `source = "snapshot"`.
    #[serde(default)]
    pub snapshot: Option<PathBuf>,

    /// `seinfo` binary used by the live source.
    #[serde(default = "default_seinfo")]
    pub seinfo: PathBuf,

    /// selinuxfs class tree (`<class>/perms/<perm>`).
    #[serde(default = "default_class_root")]
    pub class_root: PathBuf,

    /// Policy type override; read from `selinux_config` when unset.
    #[serde(default)]
    pub policy_type: Option<String>,

    /// The SELinux config file holding `SELINUXTYPE=`.
    #[serde(default = "default_selinux_config")]
    pub selinux_config: PathBuf,

    /// System file-context file override.
    #[serde(default)]
    pub file_contexts: Option<PathBuf>,

    /// Home-directory file-context file override.
    #[serde(default)]
    pub file_contexts_homedirs: Option<PathBuf>,

    /// Local-customisation file-context file override.
    #[serde(default)]
    pub file_contexts_local: Option<PathBuf>,
}

impl Default for SystemSettings {
    fn default() -> Self {
        Self {
            source: SourceKind::default(),
            snapshot: None,
            seinfo: default_seinfo(),
            class_root: default_class_root(),
            policy_type: None,
            selinux_config: default_selinux_config(),
            file_contexts: None,
            file_contexts_homedirs: None,
            file_contexts_local: None,
        }
    }
}

impl SystemSettings {
    /// The loaded policy type, e.g. `targeted`.
    pub fn policy_type(&self) -> String {
        if let Some(kind) = &self.policy_type {
            return kind.clone();
        }
        std::fs::read_to_string(&self.selinux_config)
            .ok()
            .and_then(|text| parse_policy_type(&text))
            .unwrap_or_else(|| DEFAULT_POLICY_TYPE.to_owned())
    }

    fn contexts_dir(&self) -> PathBuf {
        Path::new("/etc/selinux")
            .join(self.policy_type())
            .join("contexts/files")
    }

    /// System file-context file.
    pub fn file_contexts_path(&self) -> PathBuf {
        self.file_contexts
            .clone()
            .unwrap_or_else(|| self.contexts_dir().join("file_contexts"))
    }

    /// Home-directory file-context file.
    pub fn file_contexts_homedirs_path(&self) -> PathBuf {
        self.file_contexts_homedirs
            .clone()
            .unwrap_or_else(|| self.contexts_dir().join("file_contexts.homedirs"))
    }

    /// Local-customisation file-context file.
    pub fn file_contexts_local_path(&self) -> PathBuf {
        self.file_contexts_local
            .clone()
            .unwrap_or_else(|| self.contexts_dir().join("file_contexts.local"))
    }
}

/// Installed-module inspection.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleSettings {
    /// Whether to inspect installed modules for self-label masking.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Root of the policy module store.
    #[serde(default = "default_store_root")]
    pub store_root: PathBuf,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            store_root: default_store_root(),
        }
    }
}

/// External packaging toolchain.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolchainSettings {
    /// Whether to package emitted source into a loadable module.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `checkmodule` binary.
    #[serde(default = "default_checkmodule")]
    pub checkmodule: PathBuf,

    /// `semodule_package` binary.
    #[serde(default = "default_semodule_package")]
    pub semodule_package: PathBuf,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            checkmodule: default_checkmodule(),
            semodule_package: default_semodule_package(),
        }
    }
}

/// Compiler behaviour knobs.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerSettings {
    /// Domain an executable runs in when its resource declares none.
    #[serde(default = "default_fallback_exec_domain")]
    pub fallback_exec_domain: String,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            fallback_exec_domain: default_fallback_exec_domain(),
        }
    }
}

// Default value functions for serde

const DEFAULT_POLICY_TYPE: &str = "targeted";

fn default_true() -> bool {
    true
}
fn default_seinfo() -> PathBuf {
    PathBuf::from("seinfo")
}
fn default_class_root() -> PathBuf {
    PathBuf::from("/sys/fs/selinux/class")
}
fn default_selinux_config() -> PathBuf {
    PathBuf::from("/etc/selinux/config")
}
fn default_store_root() -> PathBuf {
    PathBuf::from("/var/lib/selinux")
}
fn default_checkmodule() -> PathBuf {
    PathBuf::from("checkmodule")
}
fn default_semodule_package() -> PathBuf {
    PathBuf::from("semodule_package")
}
fn default_fallback_exec_domain() -> String {
    "unconfined_t".to_owned()
}

/// Extract `SELINUXTYPE=` from an SELinux config file.
fn parse_policy_type(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| line.strip_prefix("SELINUXTYPE="))
        .map(|value| value.trim().trim_matches('"').to_owned())
        .filter(|value| !value.is_empty())
}

impl Settings {
    /// Load settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read settings at {}: {e}", path.display()))?;
        let settings: Settings = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("failed to parse settings at {}: {e}", path.display()))?;
        Ok(settings)
    }

    /// Find and load settings: `$CONFINE_SETTINGS`, then the system-wide
    /// file, then the user config directory, then defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a discovered file cannot be read or parsed.
    pub fn discover() -> anyhow::Result<Self> {
        if let Some(path) = std::env::var_os(SETTINGS_ENV) {
            return Self::load(Path::new(&path));
        }
        let system = Path::new(SYSTEM_SETTINGS_PATH);
        if system.is_file() {
            return Self::load(system);
        }
        if let Some(user) = user_settings_path().filter(|p| p.is_file()) {
            return Self::load(&user);
        }
        Ok(Self::default())
    }
}

/// Per-user settings file (`~/.config/confine/confine.toml` on Linux).
pub fn user_settings_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "confine")
        .map(|dirs| dirs.config_dir().join("confine.toml"))
}
