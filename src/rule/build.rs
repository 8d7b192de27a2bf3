//! Stock rule bundles shared by the permission generators.

use crate::context::FileClass;

use super::{AvcRule, Rule, TypeRule};

/// Permissions a domain needs on an executable it transitions through.
const ENTRY_PERMS: [&str; 6] = ["entrypoint", "execute", "getattr", "open", "read", "map"];
const EXEC_PERMS: [&str; 5] = ["execute", "getattr", "open", "read", "map"];
const RELABEL_PERMS: [&str; 3] = ["getattr", "relabelto", "relabelfrom"];

/// One `allow` per kernel class of `class`.
pub fn file_allow(subject: &str, object: &str, class: FileClass, actions: &[String]) -> Vec<Rule> {
    class
        .security_classes()
        .into_iter()
        .map(|cls| AvcRule::allow(subject, object, cls, actions.iter().cloned()).into())
        .collect()
}

/// One named `type_transition` per kernel class of `class`. `name` is
/// matched literally, so callers skip wildcard paths.
pub fn file_type_transition(
    subject: &str,
    parent: &str,
    class: FileClass,
    target: &str,
    name: &str,
) -> Vec<Rule> {
    class
        .security_classes()
        .into_iter()
        .map(|cls| TypeRule::transition(subject, parent, cls, target, Some(name)).into())
        .collect()
}

/// Automatic domain transition: `subject` executing a file of type
/// `entry` lands in `target`.
pub fn domain_auto_transition(subject: &str, entry: &str, target: &str) -> Vec<Rule> {
    vec![
        TypeRule::transition(subject, entry, "process", target, None).into(),
        AvcRule::allow(target, entry, "file", ENTRY_PERMS).into(),
        AvcRule::allow(subject, entry, "file", EXEC_PERMS).into(),
        AvcRule::allow(target, entry, "process", ["sigchld"]).into(),
        AvcRule::allow(subject, target, "process", ["rlimitinh", "siginh", "transition"]).into(),
    ]
}

/// Relabel and association rules for a private file type.
pub fn private_file_type(file_type: &str, class: FileClass) -> Vec<Rule> {
    let mut rules = Vec::new();
    for cls in class.security_classes() {
        rules.push(AvcRule::allow("unconfined_t", file_type, cls, RELABEL_PERMS).into());
        rules.push(AvcRule::allow("restorecond_t", file_type, cls, RELABEL_PERMS).into());
    }
    rules.push(AvcRule::allow(file_type, "fs_t", "filesystem", ["associate"]).into());
    rules
}

/// Full capability grants for an unconfined domain. `capability2` is only
/// granted when the loaded policy defines that class.
pub fn unconfined_capabilities(domain: &str, has_capability2: bool) -> Vec<Rule> {
    let mut rules: Vec<Rule> = vec![AvcRule::allow(domain, domain, "capability", ["*"]).into()];
    if has_capability2 {
        rules.push(AvcRule::allow(domain, domain, "capability2", ["*"]).into());
    }
    rules
}

/// Full process-control grants over every domain.
pub fn unconfined_process(domain: &str) -> Vec<Rule> {
    vec![AvcRule::allow(domain, "domain", "process", ["*"]).into()]
}
