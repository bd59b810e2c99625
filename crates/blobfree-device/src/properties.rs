//! Parsing of device property dumps.
//!
//! The property listing has one `[key]: [value]` pair per line. Anything
//! else is ignored.

use std::collections::HashMap;

/// Property name to value.
pub type PropertyMap = HashMap<String, String>;

/// Parse a property dump into a map. Later duplicates win.
pub fn parse_properties(dump: &str) -> PropertyMap {
    dump.lines().filter_map(parse_property_line).collect()
}

/// Parse a single `[key]: [value]` line.
pub fn parse_property_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.trim().split_once(": ")?;
    let key = unwrap_brackets(key)?;
    let value = unwrap_brackets(value)?;
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

fn unwrap_brackets(token: &str) -> Option<&str> {
    token.trim().strip_prefix('[')?.strip_suffix(']')
}
