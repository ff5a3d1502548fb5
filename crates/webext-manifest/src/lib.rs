//! # webext-manifest
//!
//! The pure, I/O-free half of the webext toolchain: everything that can be
//! said about a browser-extension manifest without running a bundler.
//!
//! Three operations live here, in pipeline order:
//!
//! 1. [`tags::resolve_browser_tags`] strips/selects `{{browser}}.`-prefixed
//!    keys and array items, producing a browser-specific manifest.
//! 2. [`entries::classify`] extracts every entrypoint reference from the
//!    resolved manifest and bucket it by the build strategy it requires.
//! 3. [`render::render`] rewrites the resolved manifest's source paths into
//!    bundler output paths once every group has been built.
//!
//! All three operate on `serde_json::Value`: manifests are open-shaped by
//! nature (browsers keep adding fields), so a typed struct would silently
//! drop the fields we do not know about.
//!
//! ```
//! use serde_json::json;
//! use webext_manifest::tags::resolve_browser_tags;
//!
//! let template = json!({ "{{chrome}}.action": { "default_popup": "popup.html" } });
//! let resolved = resolve_browser_tags(Some("chrome"), &template);
//! assert_eq!(resolved, json!({ "action": { "default_popup": "popup.html" } }));
//! ```

pub mod entries;
pub mod fields;
pub mod render;
pub mod tags;

pub use entries::{classify, BuildStrategy, ClassifiedEntries};
pub use render::{render, BundleMap, BundleRecord};
pub use tags::resolve_browser_tags;

/// Error types for manifest processing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Classification found nothing to build.
    #[error("no entrypoints found: the manifest declares no pages, scripts, or styles and no additional inputs were given")]
    NoEntrypoints,

    /// An entry was classified into a build group but no bundle output was
    /// recorded for it by render time.
    #[error("no bundled output recorded for manifest entry '{entry}'")]
    MissingBundle { entry: String },

    /// A known manifest field did not have the JSON shape we require.
    #[error("manifest field '{field}' has an unexpected shape (expected {expected})")]
    MalformedField {
        field: String,
        expected: &'static str,
    },
}

/// Result type alias for manifest operations.
pub type Result<T> = std::result::Result<T, Error>;
