//! URL-pattern resolution
//!
//! Handler lookup order for an incoming path:
//! 1. Exact match against the mapping set
//! 2. Longest prefix whose boundary falls at end-of-string or before a `/`
//! 3. The root (`/`) default mapping
//!
//! Middleware patterns reuse the same boundary rule.

/// Whether `pattern` covers `path` under the prefix-boundary rule.
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern == path {
        return true;
    }
    if !path.starts_with(pattern) {
        return false;
    }
    pattern.ends_with('/') || path.as_bytes().get(pattern.len()) == Some(&b'/')
}

/// Resolve `path` against a mapping set, returning the winning mapping's
/// value.
pub fn resolve<'a, T>(mappings: &'a [(String, T)], path: &str) -> Option<&'a T> {
    // Exact match wins outright
    if let Some((_, value)) = mappings.iter().find(|(pattern, _)| pattern == path) {
        return Some(value);
    }

    // Longest boundary prefix, root excluded so it stays the fallback
    let mut best: Option<(&str, &T)> = None;
    for (pattern, value) in mappings {
        if pattern == "/" || !pattern_matches(pattern, path) {
            continue;
        }
        if best.map_or(true, |(b, _)| pattern.len() > b.len()) {
            best = Some((pattern, value));
        }
    }
    if let Some((_, value)) = best {
        return Some(value);
    }

    // Root mapping is the catch-all default
    mappings
        .iter()
        .find(|(pattern, _)| pattern == "/")
        .map(|(_, value)| value)
}
