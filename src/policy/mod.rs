//! Policy assembly.
//!
//! A [`Policy`] accumulates everything one module will contain. Adding a
//! rule also records every symbol it references: a name the module itself
//! defines is never required, and defining a name drops any earlier
//! require of it. Rules are validated against the system's class catalog
//! as they arrive.

pub mod emit;

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::catalog::Catalog;
use crate::context::FileContext;
use crate::error::{CompileError, Result};
use crate::project::{validate_module_name, validate_version};
use crate::rule::{AvcRule, Rule, TypeRule};

/// Symbols a module references but does not define.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requires {
    /// Required types.
    pub types: BTreeSet<String>,
    /// Required roles.
    pub roles: BTreeSet<String>,
    /// Required attributes.
    pub attributes: BTreeSet<String>,
    /// Required classes and the permissions used of each.
    pub classes: BTreeMap<String, BTreeSet<String>>,
}

/// Symbols a module declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Defines {
    /// Role to the types associated with it.
    pub roles: BTreeMap<String, BTreeSet<String>>,
    /// Type to the attributes it carries.
    pub types: BTreeMap<String, BTreeSet<String>>,
}

/// A type substitution made while resolving transition conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Type that was dropped.
    pub from: String,
    /// Type now used in its place.
    pub to: String,
}

/// One module under construction.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Module name.
    pub name: String,
    /// Module version.
    pub version: String,
    /// Referenced symbols.
    pub requires: Requires,
    /// Declared symbols.
    pub defines: Defines,
    /// Access-vector rules in insertion order, merged by target.
    pub avc_rules: Vec<AvcRule>,
    /// Type-transition rules in insertion order, deduplicated.
    pub type_rules: Vec<TypeRule>,
    /// Domains declared permissive.
    pub permissive: Vec<String>,
    /// File contexts the module installs.
    pub file_contexts: Vec<FileContext>,
}

impl Policy {
    /// An empty module. Fails on an invalid name or version.
    pub fn new(name: &str, version: &str) -> Result<Self> {
        validate_module_name(name)?;
        validate_version(version)?;
        Ok(Self {
            name: name.to_owned(),
            version: version.to_owned(),
            requires: Requires::default(),
            defines: Defines::default(),
            avc_rules: Vec::new(),
            type_rules: Vec::new(),
            permissive: Vec::new(),
            file_contexts: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Requires
    // -----------------------------------------------------------------------

    /// Require `name` as a type unless this module defines it.
    pub fn add_type_require(&mut self, name: &str) {
        if !name.is_empty() && !self.defines.types.contains_key(name) {
            self.requires.types.insert(name.to_owned());
        }
    }

    /// Require an attribute.
    pub fn add_attr_require(&mut self, name: &str) {
        if !name.is_empty() {
            self.requires.attributes.insert(name.to_owned());
        }
    }

    /// Require a role.
    pub fn add_role_require(&mut self, name: &str) {
        if !name.is_empty() {
            self.requires.roles.insert(name.to_owned());
        }
    }

    /// Require `name` as whatever the system says it is.
    fn add_symbol_require(&mut self, catalog: &Catalog, name: &str) {
        if catalog.attr_defined(name) {
            self.add_attr_require(name);
        } else {
            self.add_type_require(name);
        }
    }

    /// Require `class` with `actions`; `*` stands for every permission.
    fn add_class_require(
        &mut self,
        catalog: &Catalog,
        class: &str,
        actions: &BTreeSet<String>,
    ) -> Result<()> {
        let all = catalog.class_permissions(class).ok_or_else(|| CompileError::InvalidRule {
            rule: class.to_owned(),
            reason: format!("class {class} is not defined by the system policy"),
        })?;
        let entry = self.requires.classes.entry(class.to_owned()).or_default();
        if actions.is_empty() || actions.contains("*") {
            entry.extend(all.iter().cloned());
        } else {
            entry.extend(actions.iter().cloned());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rules
    // -----------------------------------------------------------------------

    /// Add rules, recording what they reference. Each rule is checked
    /// against the system's classes and permissions first.
    pub fn add_rules<I>(&mut self, catalog: &Catalog, rules: I) -> Result<()>
    where
        I: IntoIterator<Item = Rule>,
    {
        for rule in rules {
            validate(catalog, &rule)?;
            match rule {
                Rule::Avc(rule) => self.add_avc_rule(catalog, rule)?,
                Rule::Type(rule) => self.add_type_rule(catalog, rule),
            }
        }
        Ok(())
    }

    fn add_avc_rule(&mut self, catalog: &Catalog, rule: AvcRule) -> Result<()> {
        self.add_class_require(catalog, &rule.class, &rule.actions)?;
        self.add_symbol_require(catalog, &rule.subject);
        self.add_symbol_require(catalog, &rule.object);
        if !self.avc_rules.iter_mut().any(|have| have.merge(&rule)) {
            self.avc_rules.push(rule);
        }
        Ok(())
    }

    fn add_type_rule(&mut self, catalog: &Catalog, rule: TypeRule) {
        self.add_symbol_require(catalog, &rule.subject);
        self.add_symbol_require(catalog, &rule.object);
        self.add_symbol_require(catalog, &rule.target);
        if !self.type_rules.contains(&rule) {
            self.type_rules.push(rule);
        }
    }

    // -----------------------------------------------------------------------
    // Defines
    // -----------------------------------------------------------------------

    /// Define a type with no attributes.
    pub fn add_type_define(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        self.defines.types.entry(name.to_owned()).or_default();
        self.requires.types.remove(name);
    }

    /// Define a type carrying `attr`, requiring the attribute.
    pub fn add_type_attr_define(&mut self, name: &str, attr: &str) {
        if name.is_empty() || attr.is_empty() {
            return;
        }
        self.add_attr_require(attr);
        self.defines
            .types
            .entry(name.to_owned())
            .or_default()
            .insert(attr.to_owned());
        self.requires.types.remove(name);
    }

    /// Associate `name` with `role`, requiring the role.
    pub fn add_role_type_define(&mut self, role: &str, name: &str) {
        if role.is_empty() || name.is_empty() {
            return;
        }
        self.add_role_require(role);
        self.defines
            .roles
            .entry(role.to_owned())
            .or_default()
            .insert(name.to_owned());
    }

    /// Declare `domain` permissive.
    pub fn add_permissive(&mut self, domain: &str) {
        self.add_type_require(domain);
        if !self.permissive.iter().any(|d| d == domain) {
            self.permissive.push(domain.to_owned());
        }
    }

    /// Install a file context with this module.
    pub fn add_file_context(&mut self, fc: FileContext) {
        self.file_contexts.push(fc);
    }

    /// Types this module defines, sorted.
    pub fn defined_types(&self) -> Vec<&str> {
        self.defines.types.keys().map(String::as_str).collect()
    }

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------

    /// Make type transitions unambiguous.
    ///
    /// Whenever two transitions agree on everything but the target, the
    /// later target is replaced by the earlier one everywhere in the module.
    /// Repeats until no conflict is left, since a substitution can make
    /// rules agree that did not before.
    pub fn resolve_type_conflicts(&mut self) -> Vec<Replacement> {
        let mut replaced = Vec::new();
        while let Some(rep) = self.first_conflict() {
            debug!(module = %self.name, from = %rep.from, to = %rep.to, "replacing type");
            self.replace_type(&rep.from, &rep.to);
            replaced.push(rep);
        }
        replaced
    }

    fn first_conflict(&self) -> Option<Replacement> {
        self.type_rules.iter().enumerate().find_map(|(i, first)| {
            self.type_rules
                .iter()
                .skip(i.saturating_add(1))
                .find(|later| first.conflicts_with(later))
                .map(|later| Replacement {
                    from: later.target.clone(),
                    to: first.target.clone(),
                })
        })
    }

    fn replace_type(&mut self, from: &str, to: &str) {
        let swap = |name: &mut String| {
            if name == from {
                *name = to.to_owned();
            }
        };

        let type_rules = std::mem::take(&mut self.type_rules);
        for mut rule in type_rules {
            swap(&mut rule.subject);
            swap(&mut rule.object);
            swap(&mut rule.target);
            if !self.type_rules.contains(&rule) {
                self.type_rules.push(rule);
            }
        }

        let avc_rules = std::mem::take(&mut self.avc_rules);
        for mut rule in avc_rules {
            swap(&mut rule.subject);
            swap(&mut rule.object);
            if !self.avc_rules.iter_mut().any(|have| have.merge(&rule)) {
                self.avc_rules.push(rule);
            }
        }

        for fc in &mut self.file_contexts {
            swap(&mut fc.context.type_name);
        }
    }
}

/// Check a rule's class and permissions against the system catalog.
pub fn validate(catalog: &Catalog, rule: &Rule) -> Result<()> {
    let invalid = |reason: String| CompileError::InvalidRule {
        rule: rule.to_string().trim_end().to_owned(),
        reason,
    };
    let class = rule.class();
    let Some(perms) = catalog.class_permissions(class) else {
        return Err(invalid(format!("unknown class {class}")));
    };
    if let Rule::Avc(avc) = rule {
        if avc.actions.is_empty() {
            return Err(invalid("no permissions".to_owned()));
        }
        if let Some(bad) = avc
            .actions
            .iter()
            .find(|p| p.as_str() != "*" && !perms.contains(p.as_str()))
        {
            return Err(invalid(format!("class {class} has no permission {bad}")));
        }
    }
    Ok(())
}
