//! Tests for `src/generate/` driven through a real allocation.

use confine::allocator::{self, Allocation};
use confine::catalog::Catalog;
use confine::diagnostics::{Diagnostics, Level};
use confine::generate::{network, Generator};
use confine::project::{NetResource, Permission};

use crate::fixture::{project, Host};

const PROJECT: &str = r#"{
  "name": "demo",
  "resources": [
    {"path": "/usr/bin/example", "type": "exec_file"},
    {"path": "/opt/tool", "type": "exec_file", "selinux": {"domain": "tool_t"}},
    {"path": "/usr/bin/helper", "type": "exec_file"},
    {"path": "/mnt/data", "type": "dir", "selinux": {"type": "data_t"}}
  ],
  "specs": [{"name": "main.json", "applicationList": [
    {"application": {"path": "/usr/bin/example"}}
  ]}]
}"#;

fn setup(host: &Host) -> (Catalog, Allocation) {
    host.write(
        "file_contexts.local",
        "/mnt(/.*)?\tsystem_u:object_r:mnt_t:s0\n",
    );
    let mut catalog = host.catalog();
    let alloc = allocator::allocate(&project(PROJECT), &mut catalog, None).expect("allocates");
    (catalog, alloc)
}

fn permission(kind: &str, resources: &[&str], actions: &[&str]) -> Permission {
    Permission {
        kind: kind.to_owned(),
        resources: resources.iter().map(|s| (*s).to_owned()).collect(),
        actions: actions.iter().map(|s| (*s).to_owned()).collect(),
    }
}

fn texts(gen: &Generator<'_>, alloc: &Allocation, perm: &Permission) -> Vec<String> {
    let app = alloc.app("/usr/bin/example").expect("app");
    gen.rules(app, perm)
        .expect("rules")
        .iter()
        .map(ToString::to_string)
        .collect()
}

#[test]
fn exec_enters_configured_or_fallback_domain() {
    let host = Host::new();
    let (catalog, alloc) = setup(&host);
    let diagnostics = Diagnostics::silent();
    let gen = Generator {
        alloc: &alloc,
        catalog: &catalog,
        fallback_exec_domain: "unconfined_t",
        diagnostics: &diagnostics,
    };
    let domain = &alloc.app("/usr/bin/example").expect("app").domain;
    let helper = alloc.file("/usr/bin/helper").expect("helper").type_name();

    let rules = texts(&gen, &alloc, &permission("filesystem", &["/opt/tool"], &["exec"]));
    assert!(rules
        .iter()
        .any(|r| r.starts_with(&format!("type_transition {domain} ")) && r.ends_with(" : process tool_t;\n")));

    let rules = texts(&gen, &alloc, &permission("filesystem", &["/usr/bin/helper"], &["exec"]));
    assert!(rules.contains(&format!(
        "type_transition {domain} {helper} : process unconfined_t;\n"
    )));
}

#[test]
fn mount_grants_filesystem_permissions() {
    let host = Host::new();
    let (catalog, alloc) = setup(&host);
    let diagnostics = Diagnostics::silent();
    let gen = Generator {
        alloc: &alloc,
        catalog: &catalog,
        fallback_exec_domain: "unconfined_t",
        diagnostics: &diagnostics,
    };
    let rules = texts(&gen, &alloc, &permission("filesystem", &["/mnt/data"], &["mount", "read"]));
    let domain = &alloc.app("/usr/bin/example").expect("app").domain;
    assert!(rules.contains(&format!(
        "allow {domain} data_t : filesystem {{ getattr mount remount unmount }};\n"
    )));
    assert!(rules.contains(&format!(
        "allow {domain} data_t : dir {{ getattr open read search }};\n"
    )));
}

#[test]
fn unusable_declarations_are_reported_not_fatal() {
    let host = Host::new();
    let (catalog, alloc) = setup(&host);
    let (diagnostics, mut rx) = Diagnostics::channel();
    let gen = Generator {
        alloc: &alloc,
        catalog: &catalog,
        fallback_exec_domain: "unconfined_t",
        diagnostics: &diagnostics,
    };

    assert!(texts(&gen, &alloc, &permission("ipc", &["x"], &["send"])).is_empty());
    assert!(texts(&gen, &alloc, &permission("network", &["domain:bogus"], &["send"])).is_empty());

    let warnings = std::iter::from_fn(|| rx.try_recv().ok())
        .inspect(|d| assert_eq!(d.level, Level::Warn))
        .count();
    assert_eq!(warnings, 2);
}

#[test]
fn invalid_declarations_are_errors() {
    let host = Host::new();
    let (catalog, alloc) = setup(&host);
    let diagnostics = Diagnostics::silent();
    let gen = Generator {
        alloc: &alloc,
        catalog: &catalog,
        fallback_exec_domain: "unconfined_t",
        diagnostics: &diagnostics,
    };
    let app = alloc.app("/usr/bin/example").expect("app");
    for perm in [
        permission("filesystem", &["/nowhere"], &["read"]),
        permission("filesystem", &[], &["read"]),
        permission("capability", &[], &["teleport"]),
        permission("network", &["domain:inet"], &["shout"]),
        permission("network", &["port:99999"], &["bind"]),
    ] {
        assert!(gen.rules(app, &perm).is_err(), "{perm:?}");
    }
}

#[test]
fn unmapped_ports_fall_back_to_the_port_attribute() {
    let host = Host::new();
    let (catalog, alloc) = setup(&host);
    let diagnostics = Diagnostics::silent();
    let gen = Generator {
        alloc: &alloc,
        catalog: &catalog,
        fallback_exec_domain: "unconfined_t",
        diagnostics: &diagnostics,
    };
    let domain = &alloc.app("/usr/bin/example").expect("app").domain;
    let generic = format!("allow {domain} port_type : tcp_socket {{ name_bind node_bind }};\n");

    let unmapped = texts(
        &gen,
        &alloc,
        &permission("network", &["domain:inet,type:stream,protocol:tcp,port:8080"], &["bind"]),
    );
    assert!(unmapped.contains(&generic), "{unmapped:?}");
    assert!(!unmapped.iter().any(|r| r.contains("http_port_t")));

    let portless = texts(
        &gen,
        &alloc,
        &permission("network", &["domain:inet,type:stream,protocol:tcp"], &["bind"]),
    );
    assert!(portless.contains(&generic), "{portless:?}");

    let unix = texts(&gen, &alloc, &permission("network", &["domain:unix,type:stream"], &["bind"]));
    assert!(!unix.iter().any(|r| r.contains("port_t") || r.contains("port_type")));
}

#[test]
fn socket_classes_from_partial_resources() {
    let classes = |line: &str| network::socket_classes(&NetResource::parse(line).expect(line));
    assert_eq!(classes("domain:inet,type:dgram"), ["udp_socket"]);
    assert_eq!(classes("type:stream"), ["tcp_socket", "sctp_socket", "unix_stream_socket"]);
    assert_eq!(classes("protocol:route"), ["netlink_route_socket"]);
    assert_eq!(classes("domain:unix"), ["unix_stream_socket", "unix_dgram_socket"]);
    assert_eq!(classes("domain:packet"), ["packet_socket"]);
    assert!(classes("domain:inet,protocol:route").is_empty());
}
