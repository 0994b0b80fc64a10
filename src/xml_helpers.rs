//! Shared XML attribute parsing utilities.
//!
//! All functions match on the attribute's full key (including any namespace
//! prefix) unless noted, and handle UTF-8 conversion safely.

use quick_xml::events::BytesStart;

/// Extract a string attribute value by key, unescaping XML entities.
///
/// Returns `None` if the attribute is missing or not valid UTF-8.
pub fn attr_string(e: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == key {
            return attr.unescape_value().ok().map(|s| s.into_owned());
        }
    }
    None
}

/// Extract a string attribute by local name (ignoring namespace prefix).
///
/// Used for `r:id`, which some producers write with a different prefix.
pub fn attr_string_local(e: &BytesStart, key: &[u8]) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.local_name().as_ref() == key {
            return attr.unescape_value().ok().map(|s| s.into_owned());
        }
    }
    None
}

/// Extract a `u32` attribute value by key.
pub fn attr_u32(e: &BytesStart, key: &[u8]) -> Option<u32> {
    attr_string(e, key).and_then(|s| s.trim().parse().ok())
}

/// Extract an `f64` attribute value by key.
pub fn attr_f64(e: &BytesStart, key: &[u8]) -> Option<f64> {
    attr_string(e, key).and_then(|s| s.trim().parse().ok())
}

/// Extract a boolean attribute value by key.
///
/// Returns `None` if missing. Recognizes `"1"`, `"true"` as true.
pub fn attr_bool(e: &BytesStart, key: &[u8]) -> Option<bool> {
    attr_string(e, key).map(|s| matches!(s.as_str(), "1" | "true"))
}

/// Extract a boolean attribute with a default value.
pub fn attr_bool_default(e: &BytesStart, key: &[u8], default: bool) -> bool {
    attr_bool(e, key).unwrap_or(default)
}

/// Resolve a relationship target against the `xl/` package folder.
///
/// Absolute targets (`/xl/...`) are package-rooted; relative ones are
/// relative to `xl/`, with `../` segments collapsed.
pub fn resolve_xl_target(target: &str) -> String {
    if let Some(stripped) = target.strip_prefix('/') {
        return stripped.to_string();
    }

    let mut parts: Vec<&str> = vec!["xl"];
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}
