//! Permission-to-rule generators.
//!
//! Each generator turns one permission declaration of one application into
//! candidate rules. Generators read the allocation and the catalog but
//! never mutate them; assembling, merging and validating the rules is the
//! policy's job.

pub mod capability;
pub mod defaults;
pub mod filesystem;
pub mod network;

use crate::allocator::{AppItem, Allocation};
use crate::catalog::Catalog;
use crate::diagnostics::Diagnostics;
use crate::error::{CompileError, Result};
use crate::project::{Permission, PermissionKind};
use crate::rule::Rule;

/// Read-only inputs shared by every generator of one compile.
#[derive(Debug, Clone, Copy)]
pub struct Generator<'a> {
    /// Labels of the project's resources and applications.
    pub alloc: &'a Allocation,
    /// System policy facts, consulted for port labels.
    pub catalog: &'a Catalog,
    /// Domain entered through an executable with no configured domain.
    pub fallback_exec_domain: &'a str,
    /// Where skipped declarations are reported.
    pub diagnostics: &'a Diagnostics,
}

impl Generator<'_> {
    /// Rules granting `perm` to `app`. Unknown permission kinds are
    /// reported and produce no rules.
    pub fn rules(&self, app: &AppItem, perm: &Permission) -> Result<Vec<Rule>> {
        match PermissionKind::parse(&perm.kind) {
            Some(PermissionKind::Filesystem) => filesystem::rules(self, app, perm),
            Some(PermissionKind::Capability) => capability::rules(app, perm),
            Some(PermissionKind::Network) => network::rules(self, app, perm),
            None => {
                self.diagnostics.warn(format!(
                    "skipping unsupported permission type {:?} of {}",
                    perm.kind, app.path
                ));
                Ok(Vec::new())
            }
        }
    }
}

/// Reject a declaration with no resources or no actions.
fn require_nonempty(perm: &Permission, need_resources: bool) -> Result<()> {
    if perm.actions.is_empty() || (need_resources && perm.resources.is_empty()) {
        return Err(CompileError::InvalidPermission(format!(
            "{} permission needs {}",
            perm.kind,
            if need_resources { "resources and actions" } else { "actions" }
        )));
    }
    Ok(())
}

/// Append each item of `extra` not already in `into`, keeping order.
fn push_unique(into: &mut Vec<String>, extra: &[&str]) {
    for item in extra {
        if !into.iter().any(|have| have == item) {
            into.push((*item).to_owned());
        }
    }
}
