//! File-context file parsing.

use std::path::Path;

use crate::context::{Context, FileClass, FileContext};

/// Parse one `pattern [class] context` line. Returns `None` for lines that
/// cannot describe an entry; an unparsable context such as `<<none>>`
/// yields an entry that never matches.
pub fn parse_line(line: &str) -> Option<FileContext> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (pattern, class, context) = match fields[..] {
        [pattern, context] => (pattern, FileClass::Any, context),
        [pattern, symbol, context] => (pattern, FileClass::from_symbol(symbol)?, context),
        _ => return None,
    };
    Some(match Context::parse(context) {
        Some(ctx) => FileContext::new(pattern, class, ctx),
        None => FileContext::unlabeled(pattern, class),
    })
}

/// Parse a whole file, skipping comments, blank lines and malformed lines.
pub fn parse(text: &str) -> Vec<FileContext> {
    text.lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_line)
        .collect()
}

/// Read and parse a file-context file.
pub fn read(path: &Path) -> std::io::Result<Vec<FileContext>> {
    Ok(parse(&std::fs::read_to_string(path)?))
}
