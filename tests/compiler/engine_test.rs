//! Tests for `src/engine.rs`.

use confine::compiler::Compiler;
use confine::diagnostics::Diagnostics;
use confine::engine::{Engine, ENGINES};
use confine::modules::ModuleStatus;

use crate::fixture::{project, Host, DEMO};

#[test]
fn every_engine_has_a_name_and_description() {
    for engine in ENGINES {
        assert!(!engine.name().is_empty());
        assert!(!engine.description().is_empty());
        assert_eq!(Engine::find(engine.name()), Some(*engine));
    }
}

#[test]
fn selinux_engine_builds_and_reports_status() {
    let host = Host::new();
    let compiler = Compiler::new(host.settings(), Diagnostics::silent());
    let out = host.path().join("out");

    let report = Engine::SELinux
        .build(&compiler, &project(DEMO), &out)
        .expect("build");
    assert!(report.is_success());

    let status = Engine::SELinux.status(&compiler, "demo_public").expect("status");
    assert_eq!(status, ModuleStatus::NotInstalled);

    host.install_module("demo_public", "(type example_exec_t)\n");
    let status = Engine::SELinux.status(&compiler, "demo_public").expect("status");
    assert_eq!(status, ModuleStatus::Enabled);
}
