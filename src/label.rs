//! Path and type-name helpers.
//!
//! Resource paths are written as globs (`/var/log/app{,/**}`); policy file
//! contexts want anchored regular expressions over canonical paths. This
//! module owns that translation together with type-name synthesis.

use sha2::{Digest, Sha256};

/// Trailing wildcard forms and their regex replacements, longest first.
const SUFFIXES: [(&str, &str); 4] = [
    ("{,/**}", "(/.*)?"),
    ("{,/*}", "(/[^/]*)?"),
    ("/**", "/.*"),
    ("/*", "/[^/]*"),
];

/// Characters escaped before wildcard rewriting.
const ESCAPED: [char; 7] = ['[', ']', '(', ')', '^', '+', '.'];

/// Regex metacharacters that end a pattern's fixed prefix.
const META: [char; 13] = [
    '.', '^', '$', '?', '*', '+', '|', '[', ']', '(', ')', '{', '}',
];

/// Symlinked directory trees and the canonical tree the system labels.
const LINKS: [(&str, &str); 20] = [
    ("/run", "/var/run"),
    ("/run/lock", "/var/lock"),
    ("/run/systemd/system", "/usr/lib/systemd/system"),
    ("/run/systemd/generator", "/usr/lib/systemd/system"),
    ("/run/systemd/generator.late", "/usr/lib/systemd/system"),
    ("/lib", "/usr/lib"),
    ("/lib64", "/usr/lib"),
    ("/usr/lib64", "/usr/lib"),
    ("/usr/local/lib64", "/usr/lib"),
    ("/usr/local/lib32", "/usr/lib"),
    ("/etc/systemd/system", "/usr/lib/systemd/system"),
    ("/var/lib/xguest/home", "/home"),
    ("/var/named/chroot/usr/lib64", "/usr/lib"),
    ("/var/named/chroot/lib64", "/usr/lib"),
    ("/var/home", "/home"),
    ("/home/home-inst", "/home"),
    ("/var/roothome", "/root"),
    ("/sbin", "/usr/sbin"),
    ("/sysroot/tmp", "/tmp"),
    ("/bin", "/usr/bin"),
];

/// Longest accepted type or domain name.
pub const MAX_NAME_LEN: usize = 50;

// ---------------------------------------------------------------------------
// Path translation
// ---------------------------------------------------------------------------

/// Rewrite a glob path into a file-context regular expression.
///
/// A single trailing wildcard form is replaced wholesale; the rest of the
/// path has regex specials escaped, `?` becomes `[^/]`, `**` becomes `.*`
/// and a lone `*` becomes `[^/]*`. Wildcards already escaped with an odd
/// number of backslashes are left alone.
pub fn translate(path: &str) -> String {
    let (body, tail) = match SUFFIXES.iter().find(|(glob, _)| path.ends_with(glob)) {
        Some((glob, regex)) => (&path[..path.len().saturating_sub(glob.len())], *regex),
        None => (path, ""),
    };

    let mut out = String::with_capacity(body.len().saturating_mul(2));
    let mut backslashes: usize = 0;
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        let escaped = backslashes % 2 == 1;
        match c {
            c if ESCAPED.contains(&c) => {
                out.push('\\');
                out.push(c);
                backslashes = 0;
                continue;
            }
            '?' if !escaped => out.push_str("[^/]"),
            '*' if !escaped => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str("[^/]*");
                }
            }
            c => out.push(c),
        }
        backslashes = if c == '\\' { backslashes.saturating_add(1) } else { 0 };
    }
    out.push_str(tail);
    out
}

/// Replace a symlinked leading directory with the tree it points to.
pub fn fold(path: &str) -> String {
    LINKS
        .iter()
        .filter(|(from, _)| {
            path.strip_prefix(from)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
        .max_by_key(|(from, _)| from.len())
        .map(|(from, to)| format!("{to}{}", &path[from.len()..]))
        .unwrap_or_else(|| path.to_owned())
}

/// The file-context pattern of a resource path.
pub fn se_path(path: &str) -> String {
    translate(&fold(path))
}

/// Longest literal prefix of a regular expression, stopping at the first
/// unescaped metacharacter. Escapes are kept as written.
pub fn fixed_prefix(pattern: &str) -> &str {
    let mut chars = pattern.char_indices();
    while let Some((idx, c)) = chars.next() {
        if c == '\\' {
            chars.next();
            continue;
        }
        if META.contains(&c) {
            return &pattern[..idx];
        }
    }
    pattern
}

/// Undo regex escaping in a literal prefix.
pub fn unescape(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    let mut chars = prefix.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Path components
// ---------------------------------------------------------------------------

fn dirname(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }
    match trimmed.rfind('/') {
        None => ".",
        Some(idx) => {
            let parent = trimmed[..idx].trim_end_matches('/');
            if parent.is_empty() {
                "/"
            } else {
                parent
            }
        }
    }
}

fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }
    match trimmed.rfind('/') {
        None => trimmed,
        Some(idx) => &trimmed[idx.saturating_add(1)..],
    }
}

/// The directory a resource lives in. Paths ending in `{,/*}` or `{,/**}`
/// name the directory itself, so their parent is one level further up.
pub fn get_dir(path: &str) -> String {
    if path.ends_with("{,/*}") || path.ends_with("{,/**}") {
        dirname(dirname(path)).to_owned()
    } else {
        dirname(path).to_owned()
    }
}

/// The file name of a resource, or empty if it ends in a wildcard form.
pub fn get_base(path: &str) -> String {
    if SUFFIXES.iter().any(|(glob, _)| path.ends_with(glob)) {
        String::new()
    } else {
        basename(path).to_owned()
    }
}

/// Whether a file name contains an unescaped `*` or `?`.
pub fn has_unescaped_wildcard(name: &str) -> bool {
    let mut backslashes: usize = 0;
    for c in name.chars() {
        if (c == '*' || c == '?') && backslashes % 2 == 0 {
            return true;
        }
        backslashes = if c == '\\' { backslashes.saturating_add(1) } else { 0 };
    }
    false
}

/// Paths written to the `resourcelist` artifact for one resource.
pub fn resource_list_paths(path: &str, is_dir: bool) -> Vec<String> {
    // `{,/**}` collapses to `{,/*}` here as well.
    let folded = fold(path).replace("/**", "/*");

    let mut paths = if folded.contains("{,/*}") {
        vec![folded.replace("{,/*}", ""), folded.replace("{,/*}", "/*")]
    } else if is_dir {
        let base = folded.trim_end_matches('/');
        vec![folded.clone(), format!("{base}/*")]
    } else {
        vec![folded]
    };
    paths.dedup();
    paths
}

// ---------------------------------------------------------------------------
// Type names
// ---------------------------------------------------------------------------

/// Readable name fragment derived from a path's last component.
fn symbol(path: &str) -> String {
    if path == "/" {
        return "root".to_owned();
    }
    let stripped = SUFFIXES
        .iter()
        .find_map(|(glob, _)| path.strip_suffix(glob))
        .unwrap_or(path);

    let name = basename(stripped).to_lowercase().replace('.', "_");
    let word: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();

    if name.contains(['*', '?']) {
        format!("{}_{word}", symbol(dirname(stripped)))
    } else {
        word
    }
}

/// First four hex digits of the SHA-256 of `path`.
fn path_hash(path: &str) -> String {
    let digest = hex::encode(Sha256::digest(path.as_bytes()));
    digest.chars().take(4).collect()
}

/// Synthesise a type name for a resource that did not name one.
///
/// `auto_<symbol>_<hash><class suffix>_t`, or `auto_<symbol>_<hash>_exec_t`
/// for executables. The hash covers the path as written.
pub fn auto_type_name(path: &str, class: crate::context::FileClass, exec: bool) -> String {
    let name = if exec {
        format!("auto_{}_{}_exec_t", symbol(path), path_hash(path))
    } else {
        format!(
            "auto_{}_{}{}_t",
            symbol(path),
            path_hash(path),
            class.type_suffix()
        )
    };
    name.to_lowercase()
}

/// Domain a process enters when executing a file labeled `file_type`.
pub fn trans_domain(file_type: &str) -> String {
    if let Some(stem) = file_type.strip_suffix("_exec_t") {
        format!("{stem}_t")
    } else if file_type.ends_with("_t") {
        format!("{file_type}rans_t")
    } else {
        format!("{file_type}_trans_t")
    }
}

/// Whether `name` is a legal type or domain identifier.
pub fn valid_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= MAX_NAME_LEN
        && first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
