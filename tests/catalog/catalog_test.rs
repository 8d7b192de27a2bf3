//! Tests for `src/catalog/`.

use confine::catalog::{Catalog, PolicySource, SnapshotSource, Tier};
use confine::context::{Context, FileClass, FileContext, Protocol};
use confine::error::CompileError;

use crate::fixture::Host;

fn type_of(catalog: &Catalog, path: &str, class: FileClass) -> Option<(Tier, String)> {
    catalog
        .lookup_with_tier(path, class)
        .map(|(tier, fc)| (tier, fc.context.type_name.clone()))
}

#[test]
fn exact_patterns_beat_wildcards_and_longer_prefixes_win() {
    let catalog = Host::new().catalog();
    assert_eq!(
        type_of(&catalog, "/usr/bin/bash", FileClass::File),
        Some((Tier::System, "shell_exec_t".to_owned()))
    );
    assert_eq!(
        type_of(&catalog, "/usr/bin/ls", FileClass::File),
        Some((Tier::System, "bin_t".to_owned()))
    );
    assert_eq!(
        type_of(&catalog, "/usr/share", FileClass::Dir),
        Some((Tier::System, "usr_t".to_owned()))
    );
}

#[test]
fn class_must_be_compatible() {
    let catalog = Host::new().catalog();
    assert_eq!(
        type_of(&catalog, "/", FileClass::Dir),
        Some((Tier::System, "root_t".to_owned()))
    );
    assert_eq!(type_of(&catalog, "/", FileClass::File), None);
    assert_eq!(type_of(&catalog, "/srv", FileClass::Dir), None);
}

#[test]
fn tiers_are_searched_most_authoritative_first() {
    let host = Host::new();
    host.write(
        "file_contexts.local",
        "/opt(/.*)?\tsystem_u:object_r:etc_t:s0\n",
    );
    let mut catalog = host.catalog();

    assert_eq!(
        type_of(&catalog, "/home/alice", FileClass::Dir),
        Some((Tier::Homedir, "user_home_dir_t".to_owned()))
    );
    assert_eq!(
        type_of(&catalog, "/opt/tool", FileClass::File),
        Some((Tier::Local, "etc_t".to_owned()))
    );

    catalog.add_temp(FileContext::new(
        "/opt/tool",
        FileClass::File,
        Context::object("tool_t"),
    ));
    assert_eq!(
        type_of(&catalog, "/opt/tool", FileClass::File),
        Some((Tier::Temp, "tool_t".to_owned()))
    );
    assert_eq!(catalog.temp_contexts().len(), 1);
}

#[test]
fn masked_entries_are_skipped() {
    let host = Host::new();
    host.write(
        "file_contexts.local",
        "/usr/bin/tool\t--\tsystem_u:object_r:tool_exec_t:s0\n",
    );
    let mut catalog = host.catalog();
    assert!(catalog.mask("/usr/bin/tool"));
    assert_eq!(
        type_of(&catalog, "/usr/bin/tool", FileClass::File),
        Some((Tier::System, "bin_t".to_owned()))
    );
}

#[test]
fn policy_facts_come_from_the_snapshot() {
    let catalog = Host::new().catalog();
    assert!(catalog.type_defined("bin_t"));
    assert!(!catalog.type_defined("domain"));
    assert!(catalog.attr_defined("domain"));
    assert_eq!(catalog.roles(), ["system_r", "unconfined_r"]);
    assert!(catalog.has_class("capability2"));
    assert!(catalog
        .class_permissions("file")
        .is_some_and(|p| p.contains("entrypoint")));

    let port = catalog.lookup_port(80, Protocol::Tcp).expect("port 80");
    assert_eq!(port.context.type_name, "http_port_t");
    assert!(catalog.lookup_port(80, Protocol::Udp).is_none());
    assert!(catalog.lookup_port(8080, Protocol::Tcp).is_none());
}

#[test]
fn class_tree_replaces_snapshot_classes() {
    let host = Host::new();
    for (class, perm) in [("file", "read"), ("file", "write"), ("dir", "search")] {
        host.write(&format!("class/{class}/perms/{perm}"), "");
    }
    let policy = SnapshotSource::new(host.path().join("policy.toml"))
        .with_class_root(host.path().join("class"))
        .load()
        .expect("snapshot with class tree");
    assert!(policy.has_class("dir"));
    assert!(!policy.has_class("process"));
    let file: Vec<&str> = policy
        .class_permissions("file")
        .map(|p| p.iter().map(String::as_str).collect())
        .unwrap_or_default();
    assert_eq!(file, ["read", "write"]);
}

#[test]
fn missing_system_inputs_are_system_state_errors() {
    let host = Host::new();
    std::fs::remove_file(host.path().join("file_contexts.homedirs")).expect("remove");
    let err = Catalog::load(&host.settings().system).expect_err("missing homedirs");
    assert!(matches!(err, CompileError::SystemState(_)), "{err}");

    std::fs::remove_file(host.path().join("policy.toml")).expect("remove");
    let err = SnapshotSource::new(host.path().join("policy.toml"))
        .load()
        .expect_err("missing snapshot");
    assert!(err.is_fatal_for_all_modules());
}

#[test]
fn temp_entries_outrank_system_entries() {
    let mut catalog = Host::new().catalog();
    catalog.add_temp(FileContext::new(
        "/usr/bin(/.*)?",
        FileClass::Any,
        Context::object("mine_t"),
    ));
    assert_eq!(
        type_of(&catalog, "/usr/bin/bash", FileClass::File),
        Some((Tier::Temp, "mine_t".to_owned()))
    );
}
