//! Tests for `src/settings.rs`.

use std::path::PathBuf;

use confine::settings::{Settings, SourceKind};

fn load(text: &str) -> anyhow::Result<Settings> {
    let tmp = tempfile::tempdir().expect("temp dir");
    let path = tmp.path().join("confine.toml");
    std::fs::write(&path, text).expect("write settings");
    Settings::load(&path)
}

#[test]
fn empty_file_targets_a_stock_host() {
    let settings = load("").expect("empty settings");
    assert_eq!(settings.system.source, SourceKind::Live);
    assert_eq!(settings.system.class_root, PathBuf::from("/sys/fs/selinux/class"));
    assert!(settings.modules.enabled);
    assert_eq!(settings.modules.store_root, PathBuf::from("/var/lib/selinux"));
    assert!(settings.toolchain.enabled);
    assert_eq!(settings.toolchain.checkmodule, PathBuf::from("checkmodule"));
    assert_eq!(settings.compiler.fallback_exec_domain, "unconfined_t");
}

#[test]
fn file_context_paths_follow_the_policy_type() {
    let settings = load("[system]\npolicy_type = \"mls\"\n").expect("settings");
    assert_eq!(settings.system.policy_type(), "mls");
    assert_eq!(
        settings.system.file_contexts_path(),
        PathBuf::from("/etc/selinux/mls/contexts/files/file_contexts")
    );
    assert_eq!(
        settings.system.file_contexts_homedirs_path(),
        PathBuf::from("/etc/selinux/mls/contexts/files/file_contexts.homedirs")
    );
    assert_eq!(
        settings.system.file_contexts_local_path(),
        PathBuf::from("/etc/selinux/mls/contexts/files/file_contexts.local")
    );
}

#[test]
fn policy_type_is_read_from_the_selinux_config() {
    let tmp = tempfile::tempdir().expect("temp dir");
    let config = tmp.path().join("config");
    std::fs::write(&config, "SELINUX=enforcing\nSELINUXTYPE=minimum\n").expect("write");
    let settings = load(&format!(
        "[system]\nselinux_config = \"{}\"\n",
        config.display()
    ))
    .expect("settings");
    assert_eq!(settings.system.policy_type(), "minimum");

    let missing = load("[system]\nselinux_config = \"/nonexistent/config\"\n").expect("settings");
    assert_eq!(missing.system.policy_type(), "targeted");
}

#[test]
fn overrides_are_honoured() {
    let settings = load(
        "[system]\n\
         source = \"snapshot\"\n\
         snapshot = \"/srv/policy.toml\"\n\
         file_contexts = \"/srv/fc\"\n\
         [toolchain]\n\
         enabled = false\n\
         [compiler]\n\
         fallback_exec_domain = \"bin_t\"\n",
    )
    .expect("settings");
    assert_eq!(settings.system.source, SourceKind::Snapshot);
    assert_eq!(settings.system.snapshot, Some(PathBuf::from("/srv/policy.toml")));
    assert_eq!(settings.system.file_contexts_path(), PathBuf::from("/srv/fc"));
    assert!(!settings.toolchain.enabled);
    assert_eq!(settings.compiler.fallback_exec_domain, "bin_t");
}

#[test]
fn malformed_or_missing_files_are_errors() {
    let err = load("[system\n").expect_err("malformed");
    assert!(err.to_string().contains("failed to parse settings"));
    let err = load("[system]\nsource = \"remote\"\n").expect_err("unknown source");
    assert!(err.to_string().contains("failed to parse settings"));
    let err = Settings::load(std::path::Path::new("/nonexistent/confine.toml"))
        .expect_err("missing file");
    assert!(err.to_string().contains("failed to read settings"));
}
