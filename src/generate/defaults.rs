//! Rules every application domain receives regardless of its permissions.

use crate::rule::{build, AvcRule, Rule};

/// Attributes that exempt a domain from confinement.
pub const UNCONFINED_ATTRIBUTES: [&str; 12] = [
    "corenet_unconfined_type",
    "dbusd_unconfined",
    "devices_unconfined_type",
    "files_unconfined_type",
    "filesystem_unconfined_type",
    "kern_unconfined",
    "selinux_unconfined_type",
    "sepgsql_unconfined_type",
    "storage_unconfined_type",
    "unconfined_domain_type",
    "unconfined_usertype",
    "xserver_unconfined_type",
];

/// Attribute every process domain carries.
pub const DOMAIN_ATTRIBUTE: &str = "domain";

/// Terminal access and directory traversal.
pub fn base_rules(domain: &str) -> Vec<Rule> {
    vec![
        AvcRule::allow(
            domain,
            "user_devpts_t",
            "chr_file",
            ["append", "read", "write", "getattr", "ioctl"],
        )
        .into(),
        AvcRule::allow(domain, "file_type", "dir", ["search", "getattr"]).into(),
    ]
}

/// Any domain executing `exec_type` lands in `domain`.
pub fn entry_rules(domain: &str, exec_type: &str) -> Vec<Rule> {
    build::domain_auto_transition(DOMAIN_ATTRIBUTE, exec_type, domain)
}

/// Capability and process grants of an unconfined domain.
pub fn unconfined_rules(domain: &str, has_capability2: bool) -> Vec<Rule> {
    let mut rules = build::unconfined_capabilities(domain, has_capability2);
    rules.extend(build::unconfined_process(domain));
    rules
}
