//! Script and stylesheet reference handling for page documents.
//!
//! Rolldown has no native HTML input kind, so page and sandbox builds work
//! at one remove: the orchestrator extracts each document's `<script src>`
//! and `<link href>` references, feeds the scripts through the group's
//! shared Rolldown build, and emits the document again with its references
//! rewritten to the output names. Extraction is textual (attribute
//! patterns, not a DOM), which matches how the rest of this codebase
//! rewrites URLs and keeps the document byte-identical outside the
//! rewritten attributes.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;

static SCRIPT_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)(<script\b[^>]*?\bsrc\s*=\s*["'])([^"']+)(["'])"#).expect("valid regex")
});

static LINK_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)(<link\b[^>]*?\bhref\s*=\s*["'])([^"']+)(["'])"#).expect("valid regex")
});

/// True for references a bundler cannot and should not touch.
fn is_external_ref(value: &str) -> bool {
    value.starts_with("http://")
        || value.starts_with("https://")
        || value.starts_with("//")
        || value.starts_with("data:")
        || value.starts_with('#')
}

/// Extract the document's local `<script src>` references, in order.
pub fn script_refs(html: &str) -> Vec<String> {
    SCRIPT_SRC
        .captures_iter(html)
        .map(|c| c[2].to_string())
        .filter(|src| !is_external_ref(src))
        .collect()
}

/// Extract the document's local `<link href>` references, in order.
pub fn link_refs(html: &str) -> Vec<String> {
    LINK_HREF
        .captures_iter(html)
        .map(|c| c[2].to_string())
        .filter(|href| !is_external_ref(href))
        .collect()
}

/// Rewrite `<script src>` and `<link href>` attribute values through
/// `replacements` (keys are the attribute values exactly as written).
/// References with no replacement are left untouched.
pub fn rewrite_refs(html: &str, replacements: &FxHashMap<String, String>) -> String {
    let rewrite = |caps: &Captures<'_>| -> String {
        match replacements.get(&caps[2]) {
            Some(target) => format!("{}{}{}", &caps[1], target, &caps[3]),
            None => caps[0].to_string(),
        }
    };
    let pass1 = SCRIPT_SRC.replace_all(html, rewrite);
    LINK_HREF.replace_all(&pass1, rewrite).into_owned()
}
