//! Project input model.
//!
//! A project is one JSON document listing file resources and one or more
//! specs. Each spec pairs applications with the permissions they need.
//! Paths arrive fully expanded and absolute; the compiler does no macro or
//! group substitution of its own.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{CompileError, Result};

/// Most hand-written rules a project may carry.
pub const MAX_EXTRA_RULES: usize = 5000;

/// Longest accepted module name.
pub const MAX_MODULE_NAME_LEN: usize = 50;

/// Longest accepted module version.
pub const MAX_VERSION_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// A complete project.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project name; also the stem of every module name.
    pub name: String,

    /// Module version.
    #[serde(default = "default_version")]
    pub version: String,

    /// Declared file resources.
    #[serde(default)]
    pub resources: Vec<Resource>,

    /// Spec files, each compiled into its own module unless monolithic.
    #[serde(default)]
    pub specs: Vec<Spec>,

    /// SELinux engine options.
    #[serde(default)]
    pub selinux: EngineConfig,
}

/// One file resource.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Absolute path, possibly ending in a wildcard form.
    pub path: String,

    /// Class keyword (`file`, `dir`, `exec_file`, ... or `all`).
    #[serde(rename = "type", default)]
    pub class: String,

    /// Labeling options.
    #[serde(default)]
    pub selinux: ResourceOptions,
}

/// Labeling options of a resource.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOptions {
    /// Keep the label the system already assigns.
    #[serde(default)]
    pub is_sys_file: bool,

    /// Give the resource a type outside the `file_type` attribute.
    #[serde(default)]
    pub is_private_file: bool,

    /// Explicit type name.
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,

    /// Domain a process enters when executing this file.
    #[serde(default)]
    pub domain: Option<String>,
}

/// One spec file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spec {
    /// File name of the spec; its stem names the spec's module.
    pub name: String,

    /// Applications and their permissions.
    #[serde(default)]
    pub application_list: Vec<ApplicationEntry>,
}

/// An application with its permission list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationEntry {
    /// The subject process.
    pub application: Application,

    /// What the process may do.
    #[serde(default)]
    pub permission_list: Vec<Permission>,
}

/// A subject process, named by its executable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    /// Executable path; must also be declared as a resource.
    pub path: String,

    /// Log denials instead of enforcing them.
    #[serde(default)]
    pub is_permissive: bool,

    /// Run without confinement.
    #[serde(default)]
    pub is_unconfined: bool,
}

/// One permission declaration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    /// `filesystem`, `capability` or `network`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Resource paths or network resource strings.
    #[serde(default)]
    pub resources: Vec<String>,

    /// Action keywords.
    #[serde(default)]
    pub actions: Vec<String>,
}

/// Permission kinds the generators understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionKind {
    /// File and filesystem access.
    Filesystem,
    /// Linux capabilities.
    Capability,
    /// Sockets, ports and network peers.
    Network,
}

impl PermissionKind {
    /// Resolve a permission `type` keyword.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "filesystem" => Some(Self::Filesystem),
            "capability" => Some(Self::Capability),
            "network" => Some(Self::Network),
            _ => None,
        }
    }
}

/// SELinux engine options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Module layout.
    #[serde(default)]
    pub policy: PolicyOptions,

    /// Raw rules folded into the base module.
    #[serde(default)]
    pub extra_rules: Vec<String>,
}

/// Module layout options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyOptions {
    /// Compile the whole project into a single module.
    #[serde(default)]
    pub monolithic: bool,
}

fn default_version() -> String {
    "1.0".to_owned()
}

impl Project {
    /// Read and validate a project document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CompileError::io(path, e))?;
        Self::parse(&text)
    }

    /// Parse and validate project JSON.
    pub fn parse(text: &str) -> Result<Self> {
        let mut project: Project = serde_json::from_str(text)
            .map_err(|e| CompileError::Config(format!("malformed project: {e}")))?;
        if project.version.is_empty() {
            project.version = default_version();
        }
        project.validate()?;
        Ok(project)
    }

    /// Check names, paths and limits.
    pub fn validate(&self) -> Result<()> {
        validate_module_name(&self.name)?;
        validate_version(&self.version)?;

        if self.resources.is_empty() {
            return Err(CompileError::Config("project declares no resources".to_owned()));
        }
        let mut seen = HashSet::new();
        for res in &self.resources {
            if !res.path.starts_with('/') {
                return Err(CompileError::Config(format!(
                    "resource path {} must be absolute",
                    res.path
                )));
            }
            if !seen.insert(res.path.as_str()) {
                return Err(CompileError::Config(format!(
                    "resource {} declared twice",
                    res.path
                )));
            }
        }

        if self.specs.is_empty() {
            return Err(CompileError::Config("project declares no specs".to_owned()));
        }
        for spec in &self.specs {
            if spec.stem().is_empty() {
                return Err(CompileError::Config("spec without a name".to_owned()));
            }
            if spec.application_list.is_empty() {
                return Err(CompileError::Config(format!(
                    "spec {} lists no applications",
                    spec.name
                )));
            }
        }

        if self.selinux.extra_rules.len() > MAX_EXTRA_RULES {
            return Err(CompileError::Config(format!(
                "at most {MAX_EXTRA_RULES} extra rules are allowed"
            )));
        }
        Ok(())
    }

    /// Resource declared at exactly `path`.
    pub fn resource(&self, path: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.path == path)
    }
}

impl Spec {
    /// Spec file name without directory or extension.
    pub fn stem(&self) -> &str {
        let file = self.name.rsplit('/').next().unwrap_or(&self.name);
        match file.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file,
        }
    }
}

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// Keywords of the policy language; none may name a module.
const RESERVED_WORDS: &[&str] = &[
    "alias", "allow", "and", "attribute", "attribute_role", "auditallow", "auditdeny", "bool",
    "category", "cfalse", "class", "clone", "common", "constrain", "ctrue", "dom", "domby",
    "dominance", "dontaudit", "else", "equals", "false", "filename", "filesystem", "fscon",
    "fs_use_task", "fs_use_trans", "fs_use_xattr", "genfscon", "h1", "h2", "identifier", "if",
    "incomp", "inherits", "iomemcon", "ioportcon", "ipv4_addr", "ipv6_addr", "l1", "l2", "level",
    "mlsconstrain", "mlsvalidatetrans", "module", "netifcon", "neverallow", "nodecon", "not",
    "notequal", "number", "object_r", "optional", "or", "path", "pcidevicecon", "permissive",
    "pirqcon", "policycap", "portcon", "r1", "r2", "r3", "range", "range_transition", "require",
    "role", "roleattribute", "roles", "role_transition", "sameuser", "sensitivity", "sid",
    "source", "t1", "t2", "t3", "target", "true", "type", "typealias", "typeattribute",
    "typebounds", "type_change", "type_member", "types", "type_transition", "u1", "u2", "u3",
    "user", "validatetrans", "version_identifier", "xor", "default_user", "default_role",
    "default_type", "default_range", "low", "high", "low_high",
];

/// Check a module name: identifier syntax, length, not a keyword.
pub fn validate_module_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let well_formed = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !well_formed || name.len() > MAX_MODULE_NAME_LEN {
        return Err(CompileError::Config(format!("invalid module name {name:?}")));
    }
    if RESERVED_WORDS.contains(&name) {
        return Err(CompileError::Config(format!(
            "module name {name:?} is a reserved word"
        )));
    }
    Ok(())
}

/// Check a module version: digits and dots, starting with a digit.
pub fn validate_version(version: &str) -> Result<()> {
    let mut chars = version.chars();
    let well_formed = chars.next().is_some_and(|c| c.is_ascii_digit())
        && chars.all(|c| c.is_ascii_digit() || c == '.');
    if !well_formed || version.len() > MAX_VERSION_LEN {
        return Err(CompileError::Config(format!("invalid module version {version:?}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Network resources
// ---------------------------------------------------------------------------

/// A parsed `domain:..,type:..,protocol:..,port:..` network resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetResource {
    /// Address family, e.g. `inet`, `unix`, `netlink`.
    pub domain: String,
    /// Socket type, e.g. `stream`, `dgram`.
    pub socket_type: String,
    /// Protocol, e.g. `tcp`, or a netlink family.
    pub protocol: String,
    /// Port, or 0 when unset.
    pub port: u16,
}

impl NetResource {
    /// Parse a network resource string. Whitespace is ignored and values
    /// are case-insensitive.
    pub fn parse(line: &str) -> Result<Self> {
        let invalid = CompileError::InvalidPermission;
        let compact: String = line.chars().filter(|c| *c != ' ' && *c != '\t').collect();

        let fields: Vec<&str> = compact.split(',').collect();
        if fields.len() > 4 {
            return Err(invalid(format!("too many fields in network resource {line}")));
        }

        let mut res = Self::default();
        for field in fields.into_iter().filter(|f| !f.is_empty()) {
            let Some((key, value)) = field.split_once(':').filter(|(_, v)| !v.contains(':'))
            else {
                return Err(invalid(format!("invalid network resource {line}")));
            };
            let value = value.trim().to_lowercase();
            match key.trim().to_lowercase().as_str() {
                "domain" => res.domain = value,
                "type" => res.socket_type = value,
                "protocol" => res.protocol = value,
                "port" if value.is_empty() => {}
                "port" => {
                    res.port = value
                        .parse::<u16>()
                        .ok()
                        .filter(|p| *p != 0)
                        .ok_or_else(|| invalid(format!("{value} is an invalid port")))?;
                }
                other => {
                    return Err(invalid(format!(
                        "invalid network field {other} in {line}"
                    )))
                }
            }
        }

        if res.domain.is_empty() && res.socket_type.is_empty() && res.protocol.is_empty() {
            return Err(invalid(format!(
                "network resource {line} leaves domain, type and protocol blank"
            )));
        }
        Ok(res)
    }
}
