//! Tests for the `confine` binary.

use assert_cmd::Command;

use crate::fixture::{Host, DEMO};

fn confine(host: &Host) -> Command {
    let mut cmd = Command::cargo_bin("confine").expect("binary is built");
    cmd.arg("--settings").arg(host.settings_path());
    cmd
}

fn stdout(cmd: &mut Command) -> String {
    let output = cmd.assert().success().get_output().stdout.clone();
    String::from_utf8_lossy(&output).into_owned()
}

#[test]
fn engines_lists_selinux() {
    let host = Host::new();
    let text = stdout(confine(&host).arg("engines"));
    assert!(text.starts_with("selinux\t"), "{text}");
}

#[test]
fn build_writes_modules_and_reports_progress() {
    let host = Host::new();
    let project = host.write("demo.json", DEMO);
    let out = host.path().join("out");

    let text = stdout(
        confine(&host)
            .arg("build")
            .arg("-p")
            .arg(&project)
            .arg("-o")
            .arg(&out)
            .arg("--no-package"),
    );
    assert!(text.contains("[info] demo: building project demo"), "{text}");
    assert!(out.join("demo_public").join("demo_public.te").is_file());
    assert!(out.join("demo_main").join("demo_main.fc").is_file());
}

#[test]
fn build_of_several_projects_fails_if_one_fails() {
    let host = Host::new();
    let good = host.write("demo.json", DEMO);
    let bad = host.write("bad.json", r#"{"name": "bad", "resources": []}"#);
    let out = host.path().join("out");

    let output = confine(&host)
        .arg("build")
        .arg("-p")
        .arg(&good)
        .arg("-p")
        .arg(&bad)
        .arg("-o")
        .arg(&out)
        .assert()
        .failure()
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8_lossy(&output);
    assert!(stderr.contains("1 project(s) failed to build"), "{stderr}");
    assert!(out.join("demo_public").join("demo_public.te").is_file());
}

#[test]
fn lookup_folds_links_and_prints_the_label() {
    let host = Host::new();
    let text = stdout(
        confine(&host)
            .arg("lookup")
            .arg("/bin/bash")
            .arg("--class")
            .arg("file"),
    );
    assert_eq!(text, "system\t/usr/bin/bash\tsystem_u:object_r:shell_exec_t:s0\n");

    confine(&host)
        .arg("lookup")
        .arg("/bin/bash")
        .arg("--class")
        .arg("widget")
        .assert()
        .failure();
}

#[test]
fn status_reports_missing_modules() {
    let host = Host::new();
    let text = stdout(confine(&host).arg("status").arg("demo"));
    assert_eq!(text, "demo: not installed\n");
}
