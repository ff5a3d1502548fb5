//! Entrypoint extraction and build-strategy classification.
//!
//! Every path the manifest (or the additional-inputs list) references must
//! end up in exactly one build group. The strategies differ because the
//! browser loads each kind of file differently:
//!
//! - **Page**: HTML documents. Bundled together in one shared build so
//!   common chunks are deduplicated.
//! - **Sandbox**: HTML documents listed under `sandbox.pages`. Built apart
//!   from regular pages so they never receive extension-API-aware
//!   transforms or share their chunk graph.
//! - **Library**: background workers/scripts and content-script JS. Each is
//!   built standalone with no code splitting, because script injection has
//!   no module loader to resolve shared chunks.
//! - **Stylesheet**: content-script CSS. Built as named inputs of one
//!   CSS-only build; there is no "library mode" for CSS.
//! - **Other**: pass-through assets from the additional-inputs list.

use rustc_hash::FxHashSet;
use serde_json::Value;

use crate::fields::{
    self, BACKGROUND_SCRIPTS, BACKGROUND_SERVICE_WORKER, CONTENT_SCRIPTS, PAGE_FIELDS,
    SANDBOX_PAGES,
};
use crate::{Error, Result};

/// How an entrypoint must be bundled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStrategy {
    Page,
    Sandbox,
    Library,
    Stylesheet,
    Other,
}

/// The classified entrypoints of one logical build, grouped by strategy.
///
/// Lists are deduplicated and keep first-reference order.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedEntries {
    pub pages: Vec<String>,
    pub sandboxes: Vec<String>,
    pub libraries: Vec<String>,
    pub stylesheets: Vec<String>,
    pub other: Vec<String>,
}

impl ClassifiedEntries {
    /// True when no group of any kind holds an entry.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
            && self.sandboxes.is_empty()
            && self.libraries.is_empty()
            && self.stylesheets.is_empty()
            && self.other.is_empty()
    }

    /// Total number of classified entries across all groups.
    pub fn len(&self) -> usize {
        self.pages.len()
            + self.sandboxes.len()
            + self.libraries.len()
            + self.stylesheets.len()
            + self.other.len()
    }
}

/// Extract and classify every entrypoint of `manifest` plus
/// `additional_inputs`.
///
/// Classification is idempotent per source path within one call: the first
/// strategy a path is seen under wins, and later references to the same
/// path do not create duplicate group members (they remain valid manifest
/// references and resolve to the same output at render time).
///
/// `public:`-prefixed references are exempt from bundling and excluded from
/// every group; `generated:`-prefixed stylesheet references are expected to
/// appear as a side effect of a paired script's build and are likewise not
/// scheduled.
///
/// # Errors
///
/// Returns [`Error::NoEntrypoints`] when nothing at all was classified:
/// with no inputs there is nothing to build, which is a configuration
/// error rather than a trivially-successful build.
pub fn classify(manifest: &Value, additional_inputs: &[String]) -> Result<ClassifiedEntries> {
    let mut classifier = Classifier::default();

    for path in PAGE_FIELDS {
        if let Some(Value::String(source)) = fields::get_path(manifest, path) {
            classifier.add(source, BuildStrategy::Page);
        }
    }

    for source in string_items(manifest, SANDBOX_PAGES) {
        classifier.add(source, BuildStrategy::Sandbox);
    }

    if let Some(Value::String(source)) = fields::get_path(manifest, BACKGROUND_SERVICE_WORKER) {
        classifier.add(source, BuildStrategy::Library);
    }
    for source in string_items(manifest, BACKGROUND_SCRIPTS) {
        classifier.add(source, BuildStrategy::Library);
    }

    if let Some(Value::Array(blocks)) = manifest.get(CONTENT_SCRIPTS) {
        for block in blocks {
            for source in block_items(block, "js") {
                classifier.add(source, BuildStrategy::Library);
            }
            for source in block_items(block, "css") {
                if fields::strip_generated(source).is_some() {
                    // Emitted by a paired script's build; nothing to schedule.
                    continue;
                }
                classifier.add(source, BuildStrategy::Stylesheet);
            }
        }
    }

    for source in additional_inputs {
        classifier.add(source, strategy_for_extension(source));
    }

    let entries = classifier.entries;
    if entries.is_empty() {
        return Err(Error::NoEntrypoints);
    }
    Ok(entries)
}

/// Bucket an out-of-manifest input by file extension.
fn strategy_for_extension(source: &str) -> BuildStrategy {
    let ext = std::path::Path::new(source)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => BuildStrategy::Page,
        Some("js" | "jsx" | "ts" | "tsx" | "mjs" | "mts") => BuildStrategy::Library,
        Some("css" | "scss" | "sass" | "less" | "styl" | "stylus") => BuildStrategy::Stylesheet,
        _ => BuildStrategy::Other,
    }
}

#[derive(Default)]
struct Classifier {
    entries: ClassifiedEntries,
    seen: FxHashSet<String>,
}

impl Classifier {
    fn add(&mut self, source: &str, strategy: BuildStrategy) {
        if fields::strip_public(source).is_some() {
            // Pre-built: passes through to the renderer, never bundled.
            return;
        }
        if !self.seen.insert(source.to_string()) {
            // First classification wins; this reference reuses its output.
            return;
        }
        let list = match strategy {
            BuildStrategy::Page => &mut self.entries.pages,
            BuildStrategy::Sandbox => &mut self.entries.sandboxes,
            BuildStrategy::Library => &mut self.entries.libraries,
            BuildStrategy::Stylesheet => &mut self.entries.stylesheets,
            BuildStrategy::Other => &mut self.entries.other,
        };
        list.push(source.to_string());
    }
}

fn string_items<'a>(manifest: &'a Value, path: &[&str]) -> Vec<&'a str> {
    match fields::get_path(manifest, path) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

fn block_items<'a>(block: &'a Value, key: &str) -> Vec<&'a str> {
    match block.get(key) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classifies_every_known_field() {
        let manifest = json!({
            "action": { "default_popup": "pages/popup.html" },
            "options_ui": { "page": "pages/options.html" },
            "devtools_page": "pages/devtools.html",
            "sandbox": { "pages": ["sandbox/frame.html"] },
            "background": { "service_worker": "background.ts" },
            "content_scripts": [
                { "js": ["content/main.ts"], "css": ["content/main.css"] }
            ]
        });
        let entries = classify(&manifest, &[]).unwrap();
        assert_eq!(entries.pages, vec![
            "pages/popup.html",
            "pages/options.html",
            "pages/devtools.html"
        ]);
        assert_eq!(entries.sandboxes, vec!["sandbox/frame.html"]);
        assert_eq!(entries.libraries, vec!["background.ts", "content/main.ts"]);
        assert_eq!(entries.stylesheets, vec!["content/main.css"]);
        assert!(entries.other.is_empty());
    }

    #[test]
    fn test_duplicate_references_classify_once() {
        let manifest = json!({
            "action": { "default_popup": "popup.html" },
            "chrome_url_overrides": { "newtab": "popup.html" }
        });
        let entries = classify(&manifest, &[]).unwrap();
        assert_eq!(entries.pages, vec!["popup.html"]);
    }

    #[test]
    fn test_first_classification_wins_across_strategies() {
        // The same path referenced as a background script and as an
        // additional input stays in its first group only.
        let manifest = json!({
            "background": { "scripts": ["shared.js"] }
        });
        let entries = classify(&manifest, &["shared.js".to_string()]).unwrap();
        assert_eq!(entries.libraries, vec!["shared.js"]);
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_public_entries_excluded_from_groups() {
        let manifest = json!({
            "action": { "default_popup": "public:popup.html" },
            "background": { "service_worker": "bg.ts" }
        });
        let entries = classify(&manifest, &[]).unwrap();
        assert!(entries.pages.is_empty());
        assert_eq!(entries.libraries, vec!["bg.ts"]);
    }

    #[test]
    fn test_generated_css_not_scheduled() {
        let manifest = json!({
            "content_scripts": [
                { "js": ["inject.ts"], "css": ["generated:inject.css", "theme.css"] }
            ]
        });
        let entries = classify(&manifest, &[]).unwrap();
        assert_eq!(entries.stylesheets, vec!["theme.css"]);
    }

    #[test]
    fn test_additional_inputs_bucketed_by_extension() {
        let manifest = json!({ "background": { "service_worker": "bg.ts" } });
        let inputs = vec![
            "extra/page.html".to_string(),
            "extra/worker.mts".to_string(),
            "extra/theme.scss".to_string(),
            "extra/data.json".to_string(),
        ];
        let entries = classify(&manifest, &inputs).unwrap();
        assert_eq!(entries.pages, vec!["extra/page.html"]);
        assert_eq!(entries.libraries, vec!["bg.ts", "extra/worker.mts"]);
        assert_eq!(entries.stylesheets, vec!["extra/theme.scss"]);
        assert_eq!(entries.other, vec!["extra/data.json"]);
    }

    #[test]
    fn test_zero_entries_is_fatal() {
        let manifest = json!({ "name": "empty", "version": "1.0.0" });
        let err = classify(&manifest, &[]).unwrap_err();
        assert!(matches!(err, Error::NoEntrypoints));
    }

    #[test]
    fn test_public_only_manifest_is_still_fatal() {
        let manifest = json!({
            "action": { "default_popup": "public:popup.html" }
        });
        assert!(matches!(
            classify(&manifest, &[]).unwrap_err(),
            Error::NoEntrypoints
        ));
    }

    #[test]
    fn test_legacy_popup_shapes() {
        let manifest = json!({
            "browser_action": { "default_popup": "ba.html" },
            "page_action": { "default_popup": "pa.html" },
            "options_page": "legacy-options.html"
        });
        let entries = classify(&manifest, &[]).unwrap();
        assert_eq!(entries.pages, vec!["ba.html", "pa.html", "legacy-options.html"]);
    }
}
