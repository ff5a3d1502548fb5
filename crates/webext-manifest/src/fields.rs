//! The single source of truth for which manifest fields reference
//! entrypoints.
//!
//! Both the classifier and the renderer walk these tables, so an entry can
//! never be scheduled for bundling without also being rewritten on output
//! (or vice versa).

use serde_json::Value;

/// Reserved prefix marking a pre-built file: copied through untouched,
/// never bundled.
pub const PUBLIC_PREFIX: &str = "public:";

/// Reserved prefix marking a file that is emitted as a side effect of a
/// paired entry's build and therefore must not be scheduled itself.
pub const GENERATED_PREFIX: &str = "generated:";

/// Single-string manifest fields that reference an HTML document.
///
/// Each row is a key path from the manifest root. Covers the MV3 action
/// popup, the two legacy MV2 popup shapes, both options-page shapes, the
/// devtools page, side panel/sidebar defaults, the background page, and the
/// fixed set of override pages.
pub const PAGE_FIELDS: &[&[&str]] = &[
    &["action", "default_popup"],
    &["browser_action", "default_popup"],
    &["page_action", "default_popup"],
    &["options_page"],
    &["options_ui", "page"],
    &["devtools_page"],
    &["side_panel", "default_path"],
    &["sidebar_action", "default_panel"],
    &["background", "page"],
    &["chrome_url_overrides", "newtab"],
    &["chrome_url_overrides", "history"],
    &["chrome_url_overrides", "bookmarks"],
    &["chrome_settings_overrides", "homepage"],
];

/// Array field listing sandboxed HTML pages.
pub const SANDBOX_PAGES: &[&str] = &["sandbox", "pages"];

/// Single-string field naming the background service worker.
pub const BACKGROUND_SERVICE_WORKER: &[&str] = &["background", "service_worker"];

/// Array field listing background scripts (MV2 shape).
pub const BACKGROUND_SCRIPTS: &[&str] = &["background", "scripts"];

/// Array field of content-script blocks; each block carries `js` and `css`
/// arrays.
pub const CONTENT_SCRIPTS: &str = "content_scripts";

/// Look up a nested value by key path.
pub fn get_path<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for key in path {
        current = current.as_object()?.get(*key)?;
    }
    Some(current)
}

/// Look up a nested value mutably by key path.
pub fn get_path_mut<'a>(root: &'a mut Value, path: &[&str]) -> Option<&'a mut Value> {
    let mut current = root;
    for key in path {
        current = current.as_object_mut()?.get_mut(*key)?;
    }
    Some(current)
}

/// Join a key path for error messages (`["action", "default_popup"]` →
/// `"action.default_popup"`).
pub fn path_name(path: &[&str]) -> String {
    path.join(".")
}

/// Strip the `public:` prefix if present.
pub fn strip_public(path: &str) -> Option<&str> {
    path.strip_prefix(PUBLIC_PREFIX)
}

/// Strip the `generated:` prefix if present.
pub fn strip_generated(path: &str) -> Option<&str> {
    path.strip_prefix(GENERATED_PREFIX)
}
