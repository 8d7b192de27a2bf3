//! Policy source text.
//!
//! Output depends only on the policy's contents: requires and defines are
//! kept sorted, rules keep their insertion order.

use std::fmt::Write as _;

use super::Policy;

/// Type-enforcement (`.te`) source of a module.
pub fn te_text(policy: &Policy) -> String {
    let mut out = format!("module {} {};\n\n", policy.name, policy.version);

    let req = &policy.requires;
    out.push_str("require\n{\n");
    for role in &req.roles {
        let _ = writeln!(out, "\trole {role};");
    }
    for ty in &req.types {
        let _ = writeln!(out, "\ttype {ty};");
    }
    for attr in &req.attributes {
        let _ = writeln!(out, "\tattribute {attr};");
    }
    for (class, perms) in req.classes.iter().filter(|(_, p)| !p.is_empty()) {
        let perms: Vec<&str> = perms.iter().map(String::as_str).collect();
        let _ = writeln!(out, "\tclass {class} {{ {} }};", perms.join(" "));
    }
    out.push_str("};\n\n");

    for (role, types) in &policy.defines.roles {
        for ty in types {
            let _ = writeln!(out, "role {role} types {ty};");
        }
    }
    for (ty, attrs) in &policy.defines.types {
        out.push_str("type ");
        out.push_str(ty);
        for attr in attrs {
            out.push_str(", ");
            out.push_str(attr);
        }
        out.push_str(";\n");
    }
    out.push('\n');

    for domain in &policy.permissive {
        let _ = writeln!(out, "permissive {domain};");
    }
    out.push('\n');

    for rule in &policy.avc_rules {
        out.push_str(&rule.to_string());
    }
    out.push('\n');

    for rule in &policy.type_rules {
        out.push_str(&rule.to_string());
    }
    out.push('\n');
    out
}

/// File-context (`.fc`) source of a module.
pub fn fc_text(policy: &Policy) -> String {
    policy.file_contexts.iter().map(|fc| fc.line()).collect()
}
