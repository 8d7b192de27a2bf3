//! End-to-end compiles against a fabricated host.

use confine::compiler::{BuildReport, Compiler};
use confine::diagnostics::{Diagnostics, Level};
use confine::error::CompileError;

use crate::fixture::{artifact, project, Host, DEMO};

fn build(host: &Host, text: &str, out: &std::path::Path) -> BuildReport {
    let compiler = Compiler::new(host.settings(), Diagnostics::silent());
    match compiler.build(&project(text), out) {
        Ok(report) => report,
        Err(err) => panic!("build should succeed: {err}"),
    }
}

fn monolithic(text: &str) -> String {
    text.replacen(
        r#""name": "demo","#,
        r#""name": "demo", "selinux": {"policy": {"monolithic": true}},"#,
        1,
    )
}

#[test]
fn split_project_writes_base_and_spec_modules() {
    let host = Host::new();
    let out = host.path().join("out");
    let report = build(&host, DEMO, &out);

    assert!(report.is_success(), "{:?}", report.failures);
    let names: Vec<&str> = report.modules.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, ["demo_public", "demo_main"]);
    assert!(report.modules.iter().all(|m| !m.packaged));

    let base = artifact(&out, "demo_public", "demo_public.te");
    assert!(base.starts_with("module demo_public 1.0;\n"));
    assert!(base.contains("type example_exec_t, file_type;\n"));
    assert!(base.contains("type example_t, domain;\n"));
    assert!(base.contains("role system_r types example_t;\n"));
    assert!(base.contains("role unconfined_r types example_t;\n"));
    assert!(!base.contains("type_transition"));

    let fc = artifact(&out, "demo_public", "demo_public.fc");
    assert!(fc.contains("/usr/bin/example\t--\tsystem_u:object_r:example_exec_t:s0\n"));
    assert!(fc.contains("/var/log/example\t-d\tsystem_u:object_r:auto_example_"));

    let spec = artifact(&out, "demo_main", "demo_main.te");
    assert!(spec.contains("\ttype example_exec_t;\n"));
    assert!(spec.contains("\ttype example_t;\n"));
    assert!(spec.contains("\tattribute domain;\n"));
    assert!(spec.contains("allow example_t example_exec_t : file { entrypoint"));
    assert!(spec.contains("type_transition domain example_exec_t : process example_t;\n"));
    assert!(spec.contains("allow example_t example_t : capability { net_bind_service };\n"));
    assert!(spec.contains("allow example_t http_port_t : tcp_socket { name_bind node_bind };\n"));
    assert!(spec.contains("type_transition example_t var_log_t : dir auto_example_"));
    assert_eq!(artifact(&out, "demo_main", "demo_main.fc"), "");
}

#[test]
fn auxiliary_artifacts_describe_the_module() {
    let host = Host::new();
    let out = host.path().join("out");
    build(&host, DEMO, &out);

    let list = artifact(&out, "demo_public", "resourcelist");
    assert_eq!(
        list,
        "/usr/bin/example\n/var/log/example\n/var/log/example/*\n"
    );

    let config = artifact(&out, "demo_public", "config");
    assert!(config.starts_with("MODULE=demo_public\nTYPES=\""));
    assert!(config.contains("example_exec_t|"));

    let script = artifact(&out, "demo_public", "restorecon.sh");
    assert!(script.contains("restorecon -iR '/usr/bin/example'\n"));
    assert!(script.contains("restorecon -iR '/var/log/example'\n"));
    assert!(!out.join("demo_public").join("demo_public.pp").exists());
}

#[test]
fn monolithic_project_is_one_module() {
    let host = Host::new();
    let out = host.path().join("out");
    let report = build(&host, &monolithic(DEMO), &out);

    assert_eq!(report.modules.len(), 1);
    assert_eq!(report.modules[0].name, "demo");
    let te = artifact(&out, "demo", "demo.te");
    assert!(te.contains("type example_exec_t, file_type;\n"));
    assert!(te.contains("type_transition domain example_exec_t : process example_t;\n"));
    assert!(!te.contains("\ttype example_exec_t;\n"));
    assert!(!out.join("demo_public").exists());
}

#[test]
fn output_is_deterministic() {
    let host = Host::new();
    let first = host.path().join("a");
    let second = host.path().join("b");
    build(&host, DEMO, &first);
    build(&host, DEMO, &second);
    for (module, file) in [
        ("demo_public", "demo_public.te"),
        ("demo_public", "demo_public.fc"),
        ("demo_main", "demo_main.te"),
    ] {
        assert_eq!(artifact(&first, module, file), artifact(&second, module, file));
    }
}

#[test]
fn failing_spec_module_is_removed_and_others_survive() {
    let host = Host::new();
    let out = host.path().join("out");
    let text = DEMO.replacen(
        "  }]\n}",
        r#"  }, {
    "name": "bad.json",
    "applicationList": [{
      "application": {"path": "/usr/bin/example"},
      "permissionList": [{"type": "capability", "actions": ["fly"]}]
    }]
  }]
}"#,
        1,
    );
    std::fs::create_dir_all(out.join("demo_bad")).expect("stale dir");
    let report = build(&host, &text, &out);

    assert_eq!(report.failures.len(), 1);
    let (name, err) = &report.failures[0];
    assert_eq!(name, "demo_bad");
    assert!(matches!(err.root(), CompileError::InvalidPermission(_)), "{err}");
    assert!(!out.join("demo_bad").exists());
    assert!(out.join("demo_main").join("demo_main.te").exists());
    assert!(out.join("demo_public").join("demo_public.te").exists());
}

#[test]
fn transition_conflicts_are_resolved_and_reported() {
    let host = Host::new();
    let out = host.path().join("out");
    let text = r#"{
      "name": "demo",
      "selinux": {"policy": {"monolithic": true}},
      "resources": [
        {"path": "/usr/bin/example", "type": "exec_file"},
        {"path": "/var/log/a/example", "type": "dir"},
        {"path": "/var/log/b/example", "type": "dir"}
      ],
      "specs": [{"name": "main.json", "applicationList": [{
        "application": {"path": "/usr/bin/example"},
        "permissionList": [{"type": "filesystem",
          "resources": ["/var/log/a/example", "/var/log/b/example"], "actions": ["create"]}]
      }]}]
    }"#;
    let (sink, mut rx) = Diagnostics::channel();
    let compiler = Compiler::new(host.settings(), sink);
    let report = compiler.build(&project(text), &out).expect("build");
    assert!(report.is_success());

    let te = artifact(&out, "demo", "demo.te");
    let transitions: Vec<&str> = te
        .lines()
        .filter(|l| l.starts_with("type_transition") && l.ends_with("\"example\";"))
        .collect();
    assert_eq!(transitions.len(), 1, "{te}");

    let mut replaced = Vec::new();
    while let Ok(d) = rx.try_recv() {
        if d.level == Level::Warn && d.message.contains("due to type_transition rule conflict") {
            replaced.push(d.message);
        }
    }
    assert_eq!(replaced.len(), 1);
}

#[test]
fn extra_rules_land_in_the_base_module() {
    let host = Host::new();
    let out = host.path().join("out");
    let text = DEMO.replacen(
        r#""name": "demo","#,
        r#""name": "demo", "selinux": {"extraRules": ["allow example_t etc_t : file { read open };"]},"#,
        1,
    );
    build(&host, &text, &out);
    let base = artifact(&out, "demo_public", "demo_public.te");
    assert!(base.contains("allow example_t etc_t : file { open read };\n"));
    assert!(base.contains("\ttype etc_t;\n"));
}

#[test]
fn previously_installed_labels_are_masked() {
    let host = Host::new();
    host.write("policy.toml", &crate::fixture::snapshot_text(&["example_exec_t"]));
    host.write(
        "file_contexts.local",
        "/usr/bin/example\t--\tsystem_u:object_r:example_exec_t:s0\n",
    );

    // Without the installed module the local entry looks like a system label.
    let out = host.path().join("out");
    let err = Compiler::new(host.settings(), Diagnostics::silent())
        .build(&project(DEMO), &out)
        .expect_err("duplicate label without masking");
    assert!(err.to_string().contains("isSysFile"), "{err}");

    host.install_module(
        "demo_public",
        "(type example_exec_t)\n(filecon \"/usr/bin/example\" file (system_u object_r example_exec_t ((s0) (s0))))\n",
    );
    let report = build(&host, DEMO, &out);
    assert!(report.is_success());
    let base = artifact(&out, "demo_public", "demo_public.te");
    assert!(base.contains("type example_exec_t, file_type;\n"));
    assert!(!base.contains("\ttype example_exec_t;\n"));
}

#[test]
fn unreadable_system_state_aborts_the_build() {
    let host = Host::new();
    std::fs::remove_file(host.path().join("file_contexts")).expect("remove");
    let out = host.path().join("out");
    let err = Compiler::new(host.settings(), Diagnostics::silent())
        .build(&project(DEMO), &out)
        .expect_err("missing file contexts");
    assert!(err.is_fatal_for_all_modules(), "{err}");
    assert!(!out.join("demo_public").exists());
}

#[test]
fn executable_scenario_requires_type_and_transitions_into_derived_domain() {
    let host = Host::new();
    let out = host.path().join("out");
    let text = r#"{
      "name": "demo",
      "resources": [
        {"path": "/usr/bin/example", "type": "exec_file", "selinux": {"type": "example_exec_t"}}
      ],
      "specs": [{"name": "main.json", "applicationList": [{
        "application": {"path": "/usr/bin/example"},
        "permissionList": [{"type": "filesystem", "resources": ["/usr/bin/example"], "actions": ["exec"]}]
      }]}]
    }"#;
    let report = build(&host, text, &out);
    assert!(report.is_success());

    let te = artifact(&out, "demo_main", "demo_main.te");
    let require = te
        .split_once("require\n{\n")
        .and_then(|(_, rest)| rest.split_once("};\n"))
        .map(|(block, _)| block)
        .expect("require block");
    assert!(require.contains("\ttype example_exec_t;\n"), "{require}");
    assert!(te.contains(
        "allow example_t example_exec_t : file { entrypoint execute execute_no_trans getattr map open read };\n"
    ));
    assert!(te.contains("type_transition example_t example_exec_t : process example_t;\n"));
    assert!(te.contains("type_transition domain example_exec_t : process example_t;\n"));
}
