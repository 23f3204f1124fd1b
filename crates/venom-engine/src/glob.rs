//! Shell-style wildcard matching for single path components.
//!
//! Mirrors what `/bin/sh` does when expanding a pattern such as `*.y*ml`:
//! `*` matches any run of characters, `?` matches one character, and a
//! leading `.` in a file name is only matched by a literal `.`.

/// Match `name` (a file name, not a path) against `pattern`.
pub fn wildcard_match(pattern: &str, name: &str) -> bool {
    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }
    matches(pattern.as_bytes(), name.as_bytes())
}

fn matches(pattern: &[u8], name: &[u8]) -> bool {
    match (pattern.first(), name.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            matches(&pattern[1..], name) || (!name.is_empty() && matches(pattern, &name[1..]))
        }
        (Some(b'?'), Some(_)) => matches(&pattern[1..], &name[1..]),
        (Some(p), Some(n)) if p == n => matches(&pattern[1..], &name[1..]),
        _ => false,
    }
}
