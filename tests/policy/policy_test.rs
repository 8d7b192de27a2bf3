//! Tests for `src/policy/` against a fabricated host catalog.

use confine::context::{Context, FileClass, FileContext};
use confine::error::CompileError;
use confine::policy::{emit, Policy};
use confine::rule::{AvcRule, Rule, TypeRule};

use crate::fixture::Host;

fn transition(object: &str, class: &str, target: &str, name: &str) -> Rule {
    TypeRule::transition("app_t", object, class, target, Some(name)).into()
}

#[test]
fn conflict_resolution_reaches_a_fixed_point() {
    let catalog = Host::new().catalog();
    let mut policy = Policy::new("demo", "1.0").expect("valid");
    policy
        .add_rules(
            &catalog,
            [
                transition("var_t", "dir", "a_t", "x"),
                transition("var_t", "dir", "b_t", "x"),
                transition("b_t", "file", "c_t", "y"),
                transition("a_t", "file", "d_t", "y"),
                AvcRule::allow("app_t", "b_t", "dir", ["search"]).into(),
                AvcRule::allow("app_t", "a_t", "dir", ["getattr"]).into(),
            ],
        )
        .expect("valid rules");
    policy.add_file_context(FileContext::new(
        "/var/x",
        FileClass::Dir,
        Context::object("b_t"),
    ));

    let replaced: Vec<(String, String)> = policy
        .resolve_type_conflicts()
        .into_iter()
        .map(|r| (r.from, r.to))
        .collect();
    assert_eq!(
        replaced,
        [
            ("b_t".to_owned(), "a_t".to_owned()),
            ("d_t".to_owned(), "c_t".to_owned()),
        ]
    );

    for (i, a) in policy.type_rules.iter().enumerate() {
        for b in policy.type_rules.iter().skip(i.saturating_add(1)) {
            assert!(!a.conflicts_with(b), "{a} conflicts with {b}");
        }
    }
    assert_eq!(policy.type_rules.len(), 2);
    assert_eq!(policy.avc_rules.len(), 1);
    assert_eq!(
        policy.avc_rules[0].to_string(),
        "allow app_t a_t : dir { getattr search };\n"
    );
    assert_eq!(policy.file_contexts[0].context.type_name, "a_t");
}

#[test]
fn defined_types_are_never_required() {
    let catalog = Host::new().catalog();
    let mut policy = Policy::new("demo", "1.0").expect("valid");
    policy
        .add_rules(
            &catalog,
            [AvcRule::allow("app_t", "app_log_t", "file", ["append"]).into()],
        )
        .expect("valid rule");
    assert!(policy.requires.types.contains("app_log_t"));

    policy.add_type_attr_define("app_log_t", "file_type");
    policy.add_type_attr_define("app_t", "domain");
    policy.add_type_require("app_t");
    policy.add_permissive("app_t");

    for ty in policy.defined_types() {
        assert!(!policy.requires.types.contains(ty), "{ty} both defined and required");
    }
    let te = emit::te_text(&policy);
    assert!(!te.contains("\ttype app_t;"));
    assert!(te.contains("\tattribute domain;\n\tattribute file_type;\n"));
    assert!(te.contains("permissive app_t;\n"));
}

#[test]
fn rules_are_checked_against_system_classes() {
    let catalog = Host::new().catalog();
    let mut policy = Policy::new("demo", "1.0").expect("valid");
    for (rule, why) in [
        (AvcRule::allow("a_t", "b_t", "teleporter", ["use"]), "unknown class"),
        (AvcRule::allow("a_t", "b_t", "file", ["fly"]), "unknown permission"),
        (AvcRule::allow("a_t", "b_t", "file", Vec::<String>::new()), "no permissions"),
    ] {
        let err = policy.add_rules(&catalog, [rule.into()]).expect_err(why);
        assert!(matches!(err, CompileError::InvalidRule { .. }), "{why}: {err}");
    }
    assert!(policy.avc_rules.is_empty());

    policy
        .add_rules(&catalog, [AvcRule::allow("a_t", "a_t", "process", ["*"]).into()])
        .expect("wildcard rule");
    let te = emit::te_text(&policy);
    assert!(te.contains("\tclass process { "));
    assert!(te.contains(" transition "));
    assert!(te.contains("allow a_t a_t : process *;\n"));
}

#[test]
fn policy_names_and_versions_are_validated() {
    assert!(Policy::new("demo_public", "1.0.2").is_ok());
    for (name, version) in [("allow", "1.0"), ("9demo", "1.0"), ("demo", "v1"), ("demo", "1.0.0.0.0")] {
        let err = Policy::new(name, version).expect_err(name);
        assert!(matches!(err, CompileError::Config(_)), "{name} {version}: {err}");
    }
}
