//! Read-only view of the installed policy module store.
//!
//! A rebuild must not mistake its own earlier output for pre-existing
//! system labeling, so the compiler inspects any installed module sharing
//! the project's name: the CIL it was compiled to lists the `filecon`
//! paths and types the module provides.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CompileError, Result};

/// Installation state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    /// Installed and enabled.
    Enabled,
    /// Installed but disabled.
    Disabled,
    /// Not installed at any priority.
    NotInstalled,
}

impl std::fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::NotInstalled => "not installed",
        })
    }
}

/// What an installed module's CIL declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CilInfo {
    /// Types the module defines.
    pub provided_types: Vec<String>,
    /// File-context patterns the module installs.
    pub filecon_paths: Vec<String>,
}

/// A module store rooted at e.g. `/var/lib/selinux`.
#[derive(Debug, Clone)]
pub struct ModuleStore {
    root: PathBuf,
    policy_type: String,
}

impl ModuleStore {
    /// Store for `policy_type` under `root`.
    pub fn new(root: impl Into<PathBuf>, policy_type: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            policy_type: policy_type.into(),
        }
    }

    fn modules_dir(&self) -> PathBuf {
        self.root
            .join(&self.policy_type)
            .join("active")
            .join("modules")
    }

    /// Highest priority at which `name` is installed.
    pub fn priority(&self, name: &str) -> Result<Option<u32>> {
        let dir = self.modules_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(CompileError::io(dir, err)),
        };
        let mut best = None;
        for entry in entries {
            let entry = entry.map_err(|e| CompileError::io(&dir, e))?;
            let Some(priority) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };
            if entry.path().join(name).is_dir() && best.map_or(true, |b| priority > b) {
                best = Some(priority);
            }
        }
        Ok(best)
    }

    /// Installation state of `name`.
    pub fn status(&self, name: &str) -> Result<ModuleStatus> {
        if self.priority(name)?.is_none() {
            return Ok(ModuleStatus::NotInstalled);
        }
        if self.modules_dir().join("disabled").join(name).exists() {
            Ok(ModuleStatus::Disabled)
        } else {
            Ok(ModuleStatus::Enabled)
        }
    }

    /// Parsed CIL of `name`, or `None` if it is not installed.
    pub fn cil_info(&self, name: &str) -> Result<Option<CilInfo>> {
        let Some(priority) = self.priority(name)? else {
            return Ok(None);
        };
        let path = self
            .modules_dir()
            .join(priority.to_string())
            .join(name)
            .join("cil");
        Ok(Some(parse_cil(&read_cil(&path)?)))
    }
}

/// Read a CIL file, decompressing it if it is bzip2.
pub fn read_cil(path: &Path) -> Result<String> {
    let data = std::fs::read(path).map_err(|e| CompileError::io(path, e))?;
    if !data.starts_with(b"BZh") {
        return Ok(String::from_utf8_lossy(&data).into_owned());
    }
    let mut text = String::new();
    bzip2::read::BzDecoder::new(data.as_slice())
        .read_to_string(&mut text)
        .map_err(|e| CompileError::io(path, e))?;
    Ok(text)
}

static FILECON_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"\(filecon\s+"([^"]*)""#).ok());
static TYPE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\(type\s+(\w+_t)\)").ok());

/// Extract provided types and `filecon` paths from CIL text.
pub fn parse_cil(text: &str) -> CilInfo {
    let captures = |re: Option<&Regex>| -> Vec<String> {
        re.into_iter()
            .flat_map(|re| re.captures_iter(text))
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_owned()))
            .collect()
    };
    CilInfo {
        provided_types: captures(TYPE_RE.as_ref()),
        filecon_paths: captures(FILECON_RE.as_ref()),
    }
}
