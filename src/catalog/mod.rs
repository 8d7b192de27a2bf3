//! Context catalog: everything the compiler knows about the host policy.
//!
//! The catalog pairs a [`SystemPolicy`] with four tiers of file contexts,
//! searched from most to least authoritative:
//!
//! 1. `temp`: entries allocated during the current compile
//! 2. `local`: local customisations
//! 3. `homedir`: generated home-directory contexts
//! 4. `system`: the policy's default contexts
//!
//! Inside a tier, exact patterns are tried before wildcard patterns, and
//! wildcard patterns with a longer literal prefix before shorter ones.
//! Among equals the later-declared entry wins.

pub mod fcfile;
pub mod source;

use std::cmp::Reverse;
use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::context::{FileClass, FileContext, PortContext, Protocol};
use crate::error::{CompileError, Result};
use crate::settings::SystemSettings;

pub use source::{LiveSource, PolicySource, SnapshotSource, SystemPolicy};

/// A file-context tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Entries allocated during the current compile.
    Temp,
    /// Local customisations.
    Local,
    /// Home-directory contexts.
    Homedir,
    /// System default contexts.
    System,
}

impl Tier {
    /// Search order, most authoritative first.
    pub const SEARCH_ORDER: [Tier; 4] = [Tier::Temp, Tier::Local, Tier::Homedir, Tier::System];

    fn index(self) -> usize {
        match self {
            Tier::Temp => 0,
            Tier::Local => 1,
            Tier::Homedir => 2,
            Tier::System => 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TierEntries {
    entries: Vec<FileContext>,
    /// Indices into `entries` in search order.
    order: Vec<usize>,
}

impl TierEntries {
    fn new(entries: Vec<FileContext>) -> Self {
        let mut tier = Self {
            entries,
            order: Vec::new(),
        };
        tier.reorder();
        tier
    }

    fn push(&mut self, fc: FileContext) {
        self.entries.push(fc);
        self.reorder();
    }

    fn reorder(&mut self) {
        let entries = &self.entries;
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| {
            let fc = &entries[i];
            let specificity = if fc.has_wildcard { fc.prefix.len() } else { 0 };
            (fc.has_wildcard, Reverse(specificity), Reverse(i))
        });
        self.order = order;
    }

    fn find(&self, pred: impl Fn(&FileContext) -> bool) -> Option<usize> {
        self.order
            .iter()
            .copied()
            .find(|&i| self.entries.get(i).is_some_and(&pred))
    }
}

/// Host policy facts plus tiered file-context lookup.
#[derive(Debug, Clone)]
pub struct Catalog {
    policy: SystemPolicy,
    tiers: [TierEntries; 4],
}

impl Catalog {
    /// Build a catalog from already-loaded parts.
    pub fn new(
        policy: SystemPolicy,
        system: Vec<FileContext>,
        homedir: Vec<FileContext>,
        local: Vec<FileContext>,
    ) -> Self {
        Self {
            policy,
            tiers: [
                TierEntries::default(),
                TierEntries::new(local),
                TierEntries::new(homedir),
                TierEntries::new(system),
            ],
        }
    }

    /// Load the database and file-context files named by `settings`.
    ///
    /// Missing system or home-directory files are fatal; a missing local
    /// file just leaves that tier empty.
    pub fn load(settings: &SystemSettings) -> Result<Self> {
        let policy = source::from_settings(settings)?.load()?;
        Self::load_with(policy, settings)
    }

    /// Load file-context files for an already-loaded database.
    pub fn load_with(policy: SystemPolicy, settings: &SystemSettings) -> Result<Self> {
        let required = |path: std::path::PathBuf| {
            fcfile::read(&path).map_err(|e| {
                CompileError::SystemState(format!(
                    "cannot read file contexts {}: {e}",
                    path.display()
                ))
            })
        };
        let system = required(settings.file_contexts_path())?;
        let homedir = required(settings.file_contexts_homedirs_path())?;
        let local_path = settings.file_contexts_local_path();
        let local = match fcfile::read(&local_path) {
            Ok(fcs) => fcs,
            Err(err) => {
                debug!(path = %local_path.display(), error = %err, "no local file contexts");
                Vec::new()
            }
        };
        info!(
            system = system.len(),
            homedir = homedir.len(),
            local = local.len(),
            "loaded file contexts"
        );
        Ok(Self::new(policy, system, homedir, local))
    }

    /// The underlying policy facts.
    pub fn policy(&self) -> &SystemPolicy {
        &self.policy
    }

    /// Best entry labeling `path` as `class`.
    pub fn lookup(&self, path: &str, class: FileClass) -> Option<&FileContext> {
        self.search(|fc| fc.matches(path, class))
            .and_then(|(tier, i)| self.tiers[tier.index()].entries.get(i))
    }

    /// Like [`Catalog::lookup`], also reporting the tier that answered.
    pub fn lookup_with_tier(&self, path: &str, class: FileClass) -> Option<(Tier, &FileContext)> {
        let (tier, i) = self.search(|fc| fc.matches(path, class))?;
        self.tiers[tier.index()].entries.get(i).map(|fc| (tier, fc))
    }

    /// Entry whose pattern is exactly `pattern`, in search order.
    pub fn get_file_context(&mut self, pattern: &str) -> Option<&mut FileContext> {
        let (tier, i) = self.search(|fc| fc.pattern == pattern)?;
        self.tiers[tier.index()].entries.get_mut(i)
    }

    /// Invalidate the entry with exactly this pattern. Returns whether one
    /// was found.
    pub fn mask(&mut self, pattern: &str) -> bool {
        match self.get_file_context(pattern) {
            Some(fc) => {
                fc.valid = false;
                true
            }
            None => false,
        }
    }

    /// Record an entry allocated by the current compile.
    pub fn add_temp(&mut self, fc: FileContext) {
        self.tiers[Tier::Temp.index()].push(fc);
    }

    /// Entries allocated by the current compile, in insertion order.
    pub fn temp_contexts(&self) -> &[FileContext] {
        &self.tiers[Tier::Temp.index()].entries
    }

    fn search(&self, pred: impl Fn(&FileContext) -> bool) -> Option<(Tier, usize)> {
        Tier::SEARCH_ORDER
            .iter()
            .find_map(|&tier| self.tiers[tier.index()].find(&pred).map(|i| (tier, i)))
    }

    /// Whether `name` is a defined type.
    pub fn type_defined(&self, name: &str) -> bool {
        self.policy.type_defined(name)
    }

    /// Whether `name` is a defined attribute.
    pub fn attr_defined(&self, name: &str) -> bool {
        self.policy.attr_defined(name)
    }

    /// First labeled port interval containing `port` for `protocol`.
    pub fn lookup_port(&self, port: u16, protocol: Protocol) -> Option<&PortContext> {
        self.policy.lookup_port(port, protocol)
    }

    /// Every role in the database.
    pub fn roles(&self) -> &[String] {
        self.policy.roles()
    }

    /// Whether object class `class` exists.
    pub fn has_class(&self, class: &str) -> bool {
        self.policy.has_class(class)
    }

    /// Every permission of `class`, if the class exists.
    pub fn class_permissions(&self, class: &str) -> Option<&BTreeSet<String>> {
        self.policy.class_permissions(class)
    }
}
