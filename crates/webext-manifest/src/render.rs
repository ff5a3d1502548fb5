//! Manifest rendering: source paths in, bundler output paths out.
//!
//! Rendering is the terminal consumer of a build cycle. It takes the
//! browser-resolved manifest (still holding source paths) and the
//! aggregated bundle map, and produces the only manifest form that is ever
//! written to disk. It is pure: no I/O, no hidden state, and rendering the
//! same inputs twice yields identical output.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::fields::{
    self, BACKGROUND_SCRIPTS, BACKGROUND_SERVICE_WORKER, CONTENT_SCRIPTS, PAGE_FIELDS,
    SANDBOX_PAGES,
};
use crate::{Error, Result};

/// The outputs one entrypoint's build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRecord {
    /// The entry's own output filename, relative to the output root.
    pub primary: String,
    /// Every other file the build emitted for this entry: imported
    /// stylesheets, static assets pulled in transitively.
    pub auxiliary: Vec<String>,
}

impl BundleRecord {
    /// A record with no auxiliary outputs.
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            auxiliary: Vec::new(),
        }
    }

    /// A record with auxiliary outputs.
    pub fn with_auxiliary(
        primary: impl Into<String>,
        auxiliary: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            primary: primary.into(),
            auxiliary: auxiliary.into_iter().collect(),
        }
    }

    /// Auxiliary outputs that are stylesheets.
    pub fn stylesheets(&self) -> impl Iterator<Item = &str> {
        self.auxiliary
            .iter()
            .filter(|f| f.ends_with(".css"))
            .map(String::as_str)
    }
}

/// Aggregated bundle records for one build cycle, keyed by source path.
pub type BundleMap = FxHashMap<String, BundleRecord>;

/// Rewrite every entrypoint reference in `resolved` to its output path.
///
/// `public:` and `generated:` references strip their prefix and pass
/// through without a bundle lookup. Everything else must have a record in
/// `bundles`.
///
/// Content-script `js` items whose record emitted a stylesheet as a side
/// effect get that stylesheet appended to the block's `css` array (created
/// if absent): extension contexts load content-script CSS only through the
/// manifest declaration, not through script-injected style tags.
///
/// # Errors
///
/// [`Error::MissingBundle`] when a non-public entry has no record: an
/// internal inconsistency between classification and the build outputs,
/// surfaced loudly rather than silently dropping the field.
pub fn render(resolved: &Value, bundles: &BundleMap) -> Result<Value> {
    let mut rendered = resolved.clone();

    for path in PAGE_FIELDS {
        if let Some(slot) = fields::get_path_mut(&mut rendered, path) {
            substitute_slot(slot, bundles, || fields::path_name(path))?;
        }
    }

    if let Some(slot) = fields::get_path_mut(&mut rendered, SANDBOX_PAGES) {
        substitute_array(slot, bundles, || fields::path_name(SANDBOX_PAGES))?;
    }

    if let Some(slot) = fields::get_path_mut(&mut rendered, BACKGROUND_SERVICE_WORKER) {
        substitute_slot(slot, bundles, || fields::path_name(BACKGROUND_SERVICE_WORKER))?;
    }
    if let Some(slot) = fields::get_path_mut(&mut rendered, BACKGROUND_SCRIPTS) {
        substitute_array(slot, bundles, || fields::path_name(BACKGROUND_SCRIPTS))?;
    }

    if let Some(blocks) = rendered.get_mut(CONTENT_SCRIPTS) {
        let blocks = blocks.as_array_mut().ok_or(Error::MalformedField {
            field: CONTENT_SCRIPTS.to_string(),
            expected: "an array of content-script blocks",
        })?;
        for block in blocks {
            render_content_script_block(block, bundles)?;
        }
    }

    Ok(rendered)
}

/// Rewrite one content-script block's `js` and `css` arrays, attaching
/// side-effect stylesheets from the `js` records.
fn render_content_script_block(block: &mut Value, bundles: &BundleMap) -> Result<()> {
    let mut attached: Vec<String> = Vec::new();

    if let Some(js) = block.get_mut("js") {
        let items = js.as_array_mut().ok_or(Error::MalformedField {
            field: "content_scripts.js".to_string(),
            expected: "an array of script paths",
        })?;
        for item in items.iter_mut() {
            if let Value::String(source) = item {
                if let Some(record) = lookup(source, bundles, || "content_scripts.js".to_string())?
                {
                    attached.extend(record.stylesheets().map(str::to_string));
                    *item = Value::String(record.primary.clone());
                }
            }
        }
    }

    if let Some(css) = block.get_mut("css") {
        substitute_array(css, bundles, || "content_scripts.css".to_string())?;
    }

    if !attached.is_empty() {
        let css = block
            .as_object_mut()
            .ok_or(Error::MalformedField {
                field: CONTENT_SCRIPTS.to_string(),
                expected: "an object block",
            })?
            .entry("css")
            .or_insert_with(|| Value::Array(Vec::new()));
        let items = css.as_array_mut().ok_or(Error::MalformedField {
            field: "content_scripts.css".to_string(),
            expected: "an array of stylesheet paths",
        })?;
        for file in attached {
            if !items.iter().any(|v| v.as_str() == Some(file.as_str())) {
                items.push(Value::String(file));
            }
        }
    }

    Ok(())
}

/// Replace one string slot in place. Non-string slots are left alone.
fn substitute_slot(
    slot: &mut Value,
    bundles: &BundleMap,
    field: impl Fn() -> String,
) -> Result<()> {
    if let Value::String(source) = slot {
        if let Some(record) = lookup(source, bundles, field)? {
            *slot = Value::String(record.primary.clone());
        }
    }
    Ok(())
}

/// Replace every string item of an array slot in place.
fn substitute_array(
    slot: &mut Value,
    bundles: &BundleMap,
    field: impl Fn() -> String + Copy,
) -> Result<()> {
    if let Value::Array(items) = slot {
        for item in items {
            substitute_slot(item, bundles, field)?;
        }
    }
    Ok(())
}

/// Resolve one source reference.
///
/// Returns `Ok(None)` when the reference is prefix-exempt (the slot is
/// rewritten to the stripped path directly by the caller via the returned
/// record-free mutation), `Ok(Some(record))` for bundled entries.
fn lookup<'a>(
    source: &mut String,
    bundles: &'a BundleMap,
    field: impl Fn() -> String,
) -> Result<Option<&'a BundleRecord>> {
    if let Some(rest) = fields::strip_public(source) {
        let stripped = rest.to_string();
        *source = stripped;
        return Ok(None);
    }
    if let Some(rest) = fields::strip_generated(source) {
        let stripped = rest.to_string();
        *source = stripped;
        return Ok(None);
    }
    match bundles.get(source.as_str()) {
        Some(record) => Ok(Some(record)),
        None => Err(Error::MissingBundle {
            entry: format!("{} (referenced by {})", source, field()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, &str, &[&str])]) -> BundleMap {
        pairs
            .iter()
            .map(|(source, primary, aux)| {
                (
                    source.to_string(),
                    BundleRecord::with_auxiliary(
                        primary.to_string(),
                        aux.iter().map(|s| s.to_string()),
                    ),
                )
            })
            .collect()
    }

    #[test]
    fn test_round_trips_fixed_mappings() {
        let bundles = map(&[("bg1.ts", "bg1.js", &[]), ("bg2.html", "bg2.html", &[])]);
        let manifest = json!({
            "background": { "service_worker": "bg1.ts", "page": "bg2.html" }
        });
        let rendered = render(&manifest, &bundles).unwrap();
        assert_eq!(
            rendered,
            json!({ "background": { "service_worker": "bg1.js", "page": "bg2.html" } })
        );
    }

    #[test]
    fn test_content_script_css_auto_attachment() {
        let bundles = map(&[("script1.cs.ts", "script1.cs.js", &["style.css"])]);
        let manifest = json!({
            "content_scripts": [{ "js": ["script1.cs.ts"] }]
        });
        let rendered = render(&manifest, &bundles).unwrap();
        assert_eq!(
            rendered,
            json!({
                "content_scripts": [{ "js": ["script1.cs.js"], "css": ["style.css"] }]
            })
        );
    }

    #[test]
    fn test_attachment_appends_to_existing_css_without_duplicates() {
        let bundles = map(&[
            ("inject.ts", "inject.js", &["inject.css"]),
            ("theme.css", "theme.css", &[]),
        ]);
        let manifest = json!({
            "content_scripts": [{ "js": ["inject.ts"], "css": ["theme.css"] }]
        });
        let rendered = render(&manifest, &bundles).unwrap();
        assert_eq!(
            rendered["content_scripts"][0]["css"],
            json!(["theme.css", "inject.css"])
        );

        // Rendering again from the same inputs is byte-identical.
        assert_eq!(render(&manifest, &bundles).unwrap(), rendered);
    }

    #[test]
    fn test_public_passthrough_without_lookup() {
        let bundles = BundleMap::default();
        let manifest = json!({ "action": { "default_popup": "public:popup.html" } });
        let rendered = render(&manifest, &bundles).unwrap();
        assert_eq!(rendered, json!({ "action": { "default_popup": "popup.html" } }));
    }

    #[test]
    fn test_generated_css_prefix_stripped() {
        let bundles = map(&[("inject.ts", "inject.js", &[])]);
        let manifest = json!({
            "content_scripts": [{ "js": ["inject.ts"], "css": ["generated:inject.css"] }]
        });
        let rendered = render(&manifest, &bundles).unwrap();
        assert_eq!(
            rendered["content_scripts"][0]["css"],
            json!(["inject.css"])
        );
    }

    #[test]
    fn test_missing_bundle_is_fatal_and_named() {
        let bundles = BundleMap::default();
        let manifest = json!({ "devtools_page": "devtools.html" });
        let err = render(&manifest, &bundles).unwrap_err();
        match err {
            Error::MissingBundle { entry } => {
                assert!(entry.contains("devtools.html"), "got: {entry}");
                assert!(entry.contains("devtools_page"), "got: {entry}");
            }
            other => panic!("expected MissingBundle, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_references_render_identically() {
        let bundles = map(&[("popup.html", "popup.html", &[])]);
        let manifest = json!({
            "action": { "default_popup": "popup.html" },
            "chrome_url_overrides": { "newtab": "popup.html" }
        });
        let rendered = render(&manifest, &bundles).unwrap();
        assert_eq!(
            rendered["action"]["default_popup"],
            rendered["chrome_url_overrides"]["newtab"]
        );
    }

    #[test]
    fn test_sandbox_and_background_arrays() {
        let bundles = map(&[
            ("sandbox/eval.html", "sandbox/eval.html", &[]),
            ("bg/a.ts", "bg/a.js", &[]),
            ("bg/b.ts", "bg/b.js", &[]),
        ]);
        let manifest = json!({
            "sandbox": { "pages": ["sandbox/eval.html"] },
            "background": { "scripts": ["bg/a.ts", "bg/b.ts"] }
        });
        let rendered = render(&manifest, &bundles).unwrap();
        assert_eq!(rendered["sandbox"]["pages"], json!(["sandbox/eval.html"]));
        assert_eq!(rendered["background"]["scripts"], json!(["bg/a.js", "bg/b.js"]));
    }

    #[test]
    fn test_unknown_fields_untouched() {
        let bundles = map(&[("bg.ts", "bg.js", &[])]);
        let manifest = json!({
            "name": "ext",
            "version": "1.2.3",
            "permissions": ["storage"],
            "background": { "service_worker": "bg.ts" }
        });
        let rendered = render(&manifest, &bundles).unwrap();
        assert_eq!(rendered["name"], json!("ext"));
        assert_eq!(rendered["permissions"], json!(["storage"]));
    }
}
