//! Browser-conditional manifest tags.
//!
//! A manifest template may prefix object keys and array string items with
//! `{{browser}}.` to mark them as applying to a single target browser:
//!
//! ```json
//! {
//!   "{{chrome}}.action": { "default_popup": "popup.html" },
//!   "{{firefox}}.browser_action": { "default_popup": "popup.html" },
//!   "permissions": ["storage", "{{firefox}}.tabs"]
//! }
//! ```
//!
//! Resolution keeps a tagged key/item (with the prefix stripped) only when
//! the tag names the target browser, and drops it otherwise. Untagged values
//! always pass through. Unknown or non-matching tags never error: an author
//! may safely list a superset of fields across every browser they target.

use serde_json::{Map, Value};

/// Resolve `{{browser}}.`-prefixed keys and array items in `value`.
///
/// `browser` is the target identifier (e.g. `"chrome"`, `"firefox"`). When
/// `None`, only tags spelled literally `{{undefined}}` match, mirroring the
/// behavior of an unset target.
///
/// Resolution recurses to unbounded depth; arrays are compacted (filtered
/// slots are removed, not left as holes). Non-string, non-object, non-array
/// leaves pass through verbatim.
pub fn resolve_browser_tags(browser: Option<&str>, value: &Value) -> Value {
    let target = browser.unwrap_or("undefined");
    resolve_value(target, value)
}

fn resolve_value(target: &str, value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(resolve_object(target, map)),
        Value::Array(items) => Value::Array(resolve_array(target, items)),
        other => other.clone(),
    }
}

fn resolve_object(target: &str, map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in map {
        match split_tag(key) {
            Some((tag, rest)) => {
                if tag == target {
                    out.insert(rest.to_string(), resolve_value(target, value));
                }
                // Non-matching tag: field absent in the resolved manifest.
            }
            None => {
                out.insert(key.clone(), resolve_value(target, value));
            }
        }
    }
    out
}

fn resolve_array(target: &str, items: &[Value]) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(s) => match split_tag(s) {
                Some((tag, rest)) => {
                    if tag == target {
                        out.push(Value::String(rest.to_string()));
                    }
                }
                None => out.push(item.clone()),
            },
            other => out.push(resolve_value(target, other)),
        }
    }
    out
}

/// Split a `{{name}}.rest` string into `(name, rest)`.
///
/// Returns `None` for strings that do not carry a tag. The dot separator is
/// required: `{{chrome}}action` is not a tag.
fn split_tag(s: &str) -> Option<(&str, &str)> {
    let inner = s.strip_prefix("{{")?;
    let close = inner.find("}}")?;
    let rest = inner[close + 2..].strip_prefix('.')?;
    Some((&inner[..close], rest))
}
