//! Where the security database comes from.
//!
//! A [`PolicySource`] produces a [`SystemPolicy`]: the types, attributes,
//! roles, labeled ports and class permissions of the loaded policy. The
//! live source asks the running system; the snapshot source reads the same
//! facts from a TOML file so builds can run offline.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Deserialize;
use tracing::debug;

use crate::context::{Context, PortContext, Protocol};
use crate::error::{CompileError, Result};
use crate::settings::{SourceKind, SystemSettings};

// ---------------------------------------------------------------------------
// SystemPolicy
// ---------------------------------------------------------------------------

/// Facts about the loaded policy that the compiler consults.
#[derive(Debug, Clone, Default)]
pub struct SystemPolicy {
    types: BTreeSet<String>,
    attributes: BTreeSet<String>,
    roles: Vec<String>,
    ports: Vec<PortContext>,
    classes: BTreeMap<String, BTreeSet<String>>,
}

impl SystemPolicy {
    /// Assemble a policy. A name listed both as a type and an attribute is
    /// kept as an attribute only.
    pub fn new(
        types: impl IntoIterator<Item = String>,
        attributes: impl IntoIterator<Item = String>,
        roles: Vec<String>,
        ports: Vec<PortContext>,
        classes: BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        let attributes: BTreeSet<String> = attributes.into_iter().collect();
        let types = types
            .into_iter()
            .filter(|t| !attributes.contains(t))
            .collect();
        Self {
            types,
            attributes,
            roles,
            ports,
            classes,
        }
    }

    /// Whether `name` is a defined type.
    pub fn type_defined(&self, name: &str) -> bool {
        self.types.contains(name)
    }

    /// Whether `name` is a defined attribute.
    pub fn attr_defined(&self, name: &str) -> bool {
        self.attributes.contains(name)
    }

    /// Every role, in database order.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// First labeled interval containing `port` for `protocol`.
    pub fn lookup_port(&self, port: u16, protocol: Protocol) -> Option<&PortContext> {
        self.ports.iter().find(|pc| pc.contains(port, protocol))
    }

    /// Whether the policy defines object class `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Every permission of `class`, if the class exists.
    pub fn class_permissions(&self, class: &str) -> Option<&BTreeSet<String>> {
        self.classes.get(class)
    }

    /// Replace the class table, e.g. with one read from selinuxfs.
    pub fn with_classes(mut self, classes: BTreeMap<String, BTreeSet<String>>) -> Self {
        self.classes = classes;
        self
    }
}

/// Anything that can produce a [`SystemPolicy`].
pub trait PolicySource {
    /// Load the database. Failures are [`CompileError::SystemState`].
    fn load(&self) -> Result<SystemPolicy>;
}

/// Build the source the settings ask for.
pub fn from_settings(settings: &SystemSettings) -> Result<Box<dyn PolicySource + Send + Sync>> {
    match settings.source {
        SourceKind::Live => Ok(Box::new(LiveSource {
            seinfo: settings.seinfo.clone(),
            class_root: settings.class_root.clone(),
        })),
        SourceKind::Snapshot => {
            let path = settings.snapshot.clone().ok_or_else(|| {
                CompileError::Config("snapshot source selected without a snapshot path".to_owned())
            })?;
            Ok(Box::new(SnapshotSource::new(path)))
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot source
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Snapshot {
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    ports: Vec<SnapshotPort>,
    #[serde(default)]
    classes: BTreeMap<String, BTreeSet<String>>,
}

#[derive(Debug, Deserialize)]
struct SnapshotPort {
    protocol: Protocol,
    low: u16,
    high: u16,
    context: String,
}

/// Reads the database from a TOML snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotSource {
    path: PathBuf,
    class_root: Option<PathBuf>,
}

impl SnapshotSource {
    /// Snapshot at `path`; classes come from the file itself.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            class_root: None,
        }
    }

    /// Take the class table from a selinuxfs-style tree instead.
    pub fn with_class_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.class_root = Some(root.into());
        self
    }

    /// Parse snapshot text.
    pub fn parse(text: &str) -> Result<SystemPolicy> {
        let snap: Snapshot = toml::from_str(text)
            .map_err(|e| CompileError::SystemState(format!("malformed policy snapshot: {e}")))?;

        let mut ports = Vec::with_capacity(snap.ports.len());
        for port in snap.ports {
            let context = Context::parse(&port.context).ok_or_else(|| {
                CompileError::SystemState(format!("malformed port context {}", port.context))
            })?;
            ports.push(PortContext {
                low: port.low,
                high: port.high,
                protocol: port.protocol,
                context,
            });
        }
        Ok(SystemPolicy::new(
            snap.types,
            snap.attributes,
            snap.roles,
            ports,
            snap.classes,
        ))
    }
}

impl PolicySource for SnapshotSource {
    fn load(&self) -> Result<SystemPolicy> {
        let text = std::fs::read_to_string(&self.path).map_err(|e| {
            CompileError::SystemState(format!(
                "cannot read policy snapshot {}: {e}",
                self.path.display()
            ))
        })?;
        let policy = Self::parse(&text)?;
        match &self.class_root {
            Some(root) => Ok(policy.with_classes(read_class_tree(root)?)),
            None => Ok(policy),
        }
    }
}

// ---------------------------------------------------------------------------
// Live source
// ---------------------------------------------------------------------------

/// Queries the running system with `seinfo` and the selinuxfs class tree.
#[derive(Debug, Clone)]
pub struct LiveSource {
    /// `seinfo` binary.
    pub seinfo: PathBuf,
    /// selinuxfs class directory.
    pub class_root: PathBuf,
}

impl LiveSource {
    fn query(&self, flag: &str) -> Result<String> {
        let output = Command::new(&self.seinfo).arg(flag).output().map_err(|e| {
            CompileError::SystemState(format!("failed to run {}: {e}", self.seinfo.display()))
        })?;
        if !output.status.success() {
            return Err(CompileError::SystemState(format!(
                "{} {flag} failed: {}",
                self.seinfo.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PolicySource for LiveSource {
    fn load(&self) -> Result<SystemPolicy> {
        let types = seinfo_items(&self.query("-t")?);
        let attributes = seinfo_items(&self.query("-a")?);
        let roles = seinfo_items(&self.query("-r")?);
        let ports = seinfo_items(&self.query("--portcon")?)
            .iter()
            .filter_map(|line| parse_portcon(line))
            .collect::<Vec<_>>();
        let classes = read_class_tree(&self.class_root)?;
        debug!(
            types = types.len(),
            attributes = attributes.len(),
            roles = roles.len(),
            ports = ports.len(),
            classes = classes.len(),
            "loaded live policy"
        );
        Ok(SystemPolicy::new(types, attributes, roles, ports, classes))
    }
}

/// Items of a `seinfo` listing, without the `Kind: count` header.
pub fn seinfo_items(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !is_seinfo_header(line))
        .map(str::to_owned)
        .collect()
}

fn is_seinfo_header(line: &str) -> bool {
    let Some((kind, count)) = line.split_once(':') else {
        return false;
    };
    kind.chars().next().is_some_and(|c| c.is_ascii_uppercase())
        && !kind.contains(char::is_whitespace)
        && count.trim().parse::<u64>().is_ok()
}

/// Parse `portcon <proto> <port|low-high> <context>`. Protocols without
/// port labels in this compiler are skipped.
pub fn parse_portcon(line: &str) -> Option<PortContext> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let ["portcon", proto, range, context] = fields[..] else {
        return None;
    };
    let protocol = Protocol::parse(proto)?;
    let (low, high) = match range.split_once('-') {
        Some((low, high)) => (low.parse().ok()?, high.parse().ok()?),
        None => {
            let port = range.parse().ok()?;
            (port, port)
        }
    };
    Some(PortContext {
        low,
        high,
        protocol,
        context: Context::parse(context)?,
    })
}

/// Read `<root>/<class>/perms/<perm>` into a class table.
pub fn read_class_tree(root: &Path) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let unreadable = |path: &Path, e: std::io::Error| {
        CompileError::SystemState(format!("cannot read class tree {}: {e}", path.display()))
    };

    let mut classes = BTreeMap::new();
    for entry in std::fs::read_dir(root).map_err(|e| unreadable(root, e))? {
        let entry = entry.map_err(|e| unreadable(root, e))?;
        let perms_dir = entry.path().join("perms");
        if !perms_dir.is_dir() {
            continue;
        }
        let mut perms = BTreeSet::new();
        for perm in std::fs::read_dir(&perms_dir).map_err(|e| unreadable(&perms_dir, e))? {
            let perm = perm.map_err(|e| unreadable(&perms_dir, e))?;
            perms.insert(perm.file_name().to_string_lossy().into_owned());
        }
        classes.insert(entry.file_name().to_string_lossy().into_owned(), perms);
    }
    if classes.is_empty() {
        return Err(CompileError::SystemState(format!(
            "no object classes under {}",
            root.display()
        )));
    }
    Ok(classes)
}
