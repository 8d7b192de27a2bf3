//! Linux capability permissions.

use crate::allocator::AppItem;
use crate::error::{CompileError, Result};
use crate::project::Permission;
use crate::rule::{AvcRule, Rule};

use super::{push_unique, require_nonempty};

/// Every capability keyword a project may request.
pub const CAPABILITIES: [&str; 41] = [
    "audit_control",
    "audit_read",
    "audit_write",
    "block_suspend",
    "bpf",
    "checkpoint_restore",
    "chown",
    "dac_override",
    "dac_read_search",
    "fowner",
    "fsetid",
    "ipc_lock",
    "ipc_owner",
    "kill",
    "lease",
    "linux_immutable",
    "mac_admin",
    "mac_override",
    "mknod",
    "net_admin",
    "net_bind_service",
    "net_broadcast",
    "net_raw",
    "perfmon",
    "setgid",
    "setfcap",
    "setpcap",
    "setuid",
    "sys_admin",
    "sys_boot",
    "sys_chroot",
    "sys_module",
    "sys_nice",
    "sys_pacct",
    "sys_ptrace",
    "sys_rawio",
    "sys_resource",
    "sys_time",
    "sys_tty_config",
    "syslog",
    "wake_alarm",
];

/// Capabilities numbered past 31, which the kernel checks in `capability2`.
const CAPABILITY2: [&str; 9] = [
    "mac_override",
    "mac_admin",
    "syslog",
    "wake_alarm",
    "block_suspend",
    "audit_read",
    "perfmon",
    "bpf",
    "checkpoint_restore",
];

/// Which class checks `cap`.
pub fn class_of(cap: &str) -> &'static str {
    if CAPABILITY2.contains(&cap) {
        "capability2"
    } else {
        "capability"
    }
}

pub(super) fn rules(app: &AppItem, perm: &Permission) -> Result<Vec<Rule>> {
    require_nonempty(perm, false)?;

    let mut caps = Vec::new();
    for action in &perm.actions {
        if !CAPABILITIES.contains(&action.as_str()) {
            return Err(CompileError::InvalidPermission(format!(
                "invalid capability {action}"
            )));
        }
        push_unique(&mut caps, &[action.as_str()]);
    }

    let (cap2, cap1): (Vec<String>, Vec<String>) =
        caps.into_iter().partition(|c| class_of(c) == "capability2");

    let domain = app.domain.as_str();
    let mut rules: Vec<Rule> = Vec::new();
    if !cap1.is_empty() {
        rules.push(AvcRule::allow(domain, domain, "capability", cap1).into());
    }
    if !cap2.is_empty() {
        rules.push(AvcRule::allow(domain, domain, "capability2", cap2).into());
    }
    rules.push(AvcRule::allow(domain, domain, "process", ["setcap", "getcap"]).into());
    Ok(rules)
}
