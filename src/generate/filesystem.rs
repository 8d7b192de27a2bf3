//! File and filesystem permissions.

use crate::allocator::{AppItem, FileItem};
use crate::context::FileClass;
use crate::error::{CompileError, Result};
use crate::label;
use crate::project::Permission;
use crate::rule::{build, AvcRule, Rule};

use super::{push_unique, require_nonempty, Generator};

/// Action requesting filesystem mount rules instead of file rules.
pub const MOUNT: &str = "mount";

const CREATE: &[&str] = &["open", "getattr", "setattr", "write", "create"];
const READ: &[&str] = &["open", "getattr", "read"];
const DEV_READ: &[&str] = &["open", "getattr", "read", "ioctl"];
const WRITE: &[&str] = &["open", "getattr", "setattr", "write", "create"];
const DEV_WRITE: &[&str] = &["open", "getattr", "setattr", "write", "ioctl"];
const DIR_WRITE: &[&str] = &[
    "open", "getattr", "setattr", "write", "create", "add_name", "remove_name", "rmdir", "search",
];
const DIR_READ: &[&str] = &["open", "getattr", "read", "search"];
const APPEND: &[&str] = &["open", "getattr", "setattr", "write", "create", "append"];
const RENAME: &[&str] = &["getattr", "setattr", "rename", "unlink", "link"];
const REMOVE: &[&str] = &["getattr", "unlink"];
const DIR_REMOVE: &[&str] = &["getattr", "remove_name", "rmdir"];
const EXEC: &[&str] = &["execute", "open", "read", "getattr"];
const FILE_EXEC: &[&str] = &["open", "read", "execute", "execute_no_trans"];
const MOUNT_PERMS: [&str; 4] = ["mount", "remount", "unmount", "getattr"];

/// Kernel permissions an action keyword expands to for `class`. `None`
/// means the keyword is not a known action and is passed through as is.
pub fn action_permissions(class: FileClass, action: &str) -> Option<&'static [&'static str]> {
    let device = matches!(class, FileClass::Blk | FileClass::Chr);
    let dir = class == FileClass::Dir;
    let perms: &[&str] = match action {
        "create" => CREATE,
        "read" if dir => DIR_READ,
        "read" if device => DEV_READ,
        "read" => READ,
        "write" if dir => DIR_WRITE,
        "write" if device => DEV_WRITE,
        "write" => WRITE,
        "append" => APPEND,
        "rename" | "link" => RENAME,
        "remove" if dir => DIR_REMOVE,
        "remove" => REMOVE,
        "lock" => &["lock"],
        "map" => &["map"],
        "ioctl" => &["ioctl"],
        "mounton" => &["mounton"],
        "exec" if class == FileClass::File => FILE_EXEC,
        "exec" => EXEC,
        "search" if dir => DIR_READ,
        "search" => &[],
        _ => return None,
    };
    Some(perms)
}

/// Deduplicated kernel permissions for `actions` on one concrete class.
pub fn permissions(class: FileClass, actions: &[String]) -> Vec<String> {
    let mut perms = Vec::new();
    for action in actions.iter().filter(|a| a.as_str() != MOUNT) {
        match action_permissions(class, action) {
            Some(set) => push_unique(&mut perms, set),
            None => push_unique(&mut perms, &[action.as_str()]),
        }
    }
    perms
}

pub(super) fn rules(gen: &Generator<'_>, app: &AppItem, perm: &Permission) -> Result<Vec<Rule>> {
    require_nonempty(perm, true)?;

    let items = perm
        .resources
        .iter()
        .map(|path| {
            gen.alloc.file(path).ok_or_else(|| CompileError::UndefinedReference {
                kind: "resource",
                name: path.clone(),
            })
        })
        .collect::<Result<Vec<&FileItem>>>()?;

    let has = |action: &str| perm.actions.iter().any(|a| a == action);

    let mut rules = Vec::new();
    for item in items {
        rules.extend(common_rules(app, item, &perm.actions));

        if has("exec") {
            let target = item
                .exec_domain
                .as_deref()
                .unwrap_or(gen.fallback_exec_domain);
            rules.extend(build::domain_auto_transition(&app.domain, item.type_name(), target));
        }
        if has("create") {
            rules.extend(create_rules(app, item));
        }
        if has("remove") {
            rules.extend(dir_write(app, item.inherited_type()));
        }
        if has(MOUNT) {
            rules.push(AvcRule::allow(&app.domain, item.type_name(), "filesystem", MOUNT_PERMS).into());
        }
    }
    Ok(rules)
}

/// Rules on the resource's own type, one class at a time so every class
/// gets its own permission table.
fn common_rules(app: &AppItem, item: &FileItem, actions: &[String]) -> Vec<Rule> {
    let classes: &[FileClass] = match item.class {
        FileClass::Any => FileClass::concrete(),
        _ => std::slice::from_ref(&item.class),
    };
    classes
        .iter()
        .flat_map(|&class| {
            let perms = permissions(class, actions);
            if perms.is_empty() {
                Vec::new()
            } else {
                build::file_allow(&app.domain, item.type_name(), class, &perms)
            }
        })
        .collect()
}

fn dir_write(app: &AppItem, dir_type: &str) -> Vec<Rule> {
    let perms: Vec<String> = DIR_WRITE.iter().map(|p| (*p).to_owned()).collect();
    build::file_allow(&app.domain, dir_type, FileClass::Dir, &perms)
}

fn create_rules(app: &AppItem, item: &FileItem) -> Vec<Rule> {
    let mut rules = dir_write(app, item.inherited_type());
    if item.type_name() == item.inherited_type() || label::has_unescaped_wildcard(&item.path) {
        return rules;
    }
    let name = label::get_base(&item.path);
    if name.is_empty() {
        return rules;
    }
    rules.extend(build::file_type_transition(
        &app.domain,
        item.inherited_type(),
        item.class,
        item.type_name(),
        &name,
    ));
    rules
}
