//! # webext-bundler
//!
//! Multi-build browser-extension bundling on top of Rolldown.
//!
//! An extension is never one bundle. A single `manifest.json` fans out into
//! HTML pages that may share chunks, sandboxed pages that must not, content
//! scripts that have to be self-contained because the browser injects them
//! without a module loader, plain stylesheets, and pre-built assets. This
//! crate partitions a manifest into those groups, drives one nested Rolldown
//! build per group, tracks every file each build emits, and rewrites the
//! manifest's source paths into the output names before writing it,
//! atomically and only after every nested build has settled.
//!
//! ## Quick Start
//!
//! ```no_run
//! use webext_bundler::ExtensionOptions;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let summary = ExtensionOptions::new("./extension", "manifest.json")
//!     .browser("chrome")
//!     .out_dir("dist")
//!     .build()
//!     .await?;
//!
//! println!("wrote {} files to {}", summary.files.len(), summary.out_dir.display());
//! # Ok(()) }
//! ```
//!
//! ## Watch mode
//!
//! ```no_run
//! use std::sync::Arc;
//! use webext_bundler::{ExtensionOptions, runner::ProcessRunner};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = ExtensionOptions::new("./extension", "manifest.json").browser("firefox");
//! webext_bundler::watch::watch(options, Arc::new(ProcessRunner::new())).await?;
//! # Ok(()) }
//! ```

pub mod assets;
pub mod coordinator;
pub mod css;
pub mod groups;
pub mod hooks;
pub mod html;
pub mod multibuild;
pub mod options;
pub mod orchestrator;
pub mod runner;
pub mod schema;
pub mod tracker;
pub mod watch;
pub mod writer;

// Re-export the manifest domain for callers that work with bundle maps
// directly.
pub use webext_manifest::{
    classify, render, resolve_browser_tags, BuildStrategy, BundleMap, BundleRecord,
    ClassifiedEntries,
};

// Re-export the Rolldown surface nested builds are configured with.
pub use rolldown::{
    BundleOutput, Bundler, BundlerBuilder, BundlerOptions, InputItem, IsExternal, OutputFormat,
    Platform, SourceMapType,
};
pub use rolldown_common::{ModuleType, Output, OutputAsset, OutputChunk};

pub use coordinator::{CompletionCoordinator, HookStage, SlotHandle};
pub use hooks::{BuildDescriptor, BuildHooks, OutputFile, OutputFileKind};
pub use multibuild::MultibuildManager;
pub use options::{BuildMode, ExtensionOptions, GroupOverrides, ManifestSource};
pub use orchestrator::{build, BuildSummary};
pub use runner::{BrowserFamily, ExtensionRunner, NoopRunner, ProcessRunner};
pub use tracker::BundleTracker;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
pub mod logging;

#[cfg(feature = "logging")]
pub use logging::{init_logging, init_logging_from_env, LogLevel};

/// Error types for webext-bundler operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from the manifest domain (classification, rendering).
    #[error(transparent)]
    Manifest(#[from] webext_manifest::Error),

    /// Error from a nested Rolldown build.
    #[error("Rolldown bundler error: {0}")]
    Bundler(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The manifest source (file or generator) could not produce a manifest.
    #[error("Manifest source error: {0}")]
    ManifestSource(String),

    /// The rendered manifest failed schema validation.
    #[error("Manifest failed validation:\n{diagnostics}")]
    ManifestInvalid { diagnostics: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid output path (e.g., directory traversal attempt).
    #[error("Invalid output path: {0}")]
    InvalidOutputPath(String),

    /// File write operation failed.
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// File watcher error.
    #[error("File watcher error: {0}")]
    Watch(String),
}

/// Result type alias for webext-bundler operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a bundler error from a Rolldown error value.
    ///
    /// Rolldown reports batches of diagnostics through its own error types;
    /// we keep the formatted batch for display.
    pub fn from_rolldown(error: &dyn std::fmt::Debug) -> Self {
        Error::Bundler(format!("{error:?}"))
    }
}

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::Manifest(webext_manifest::Error::NoEntrypoints) => "NO_ENTRYPOINTS",
            Error::Manifest(webext_manifest::Error::MissingBundle { .. }) => "MISSING_BUNDLE",
            Error::Manifest(_) => "MANIFEST_ERROR",
            Error::Bundler(_) => "BUNDLER_ERROR",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::ManifestSource(_) => "MANIFEST_SOURCE",
            Error::ManifestInvalid { .. } => "MANIFEST_INVALID",
            Error::Io(_) => "IO_ERROR",
            Error::InvalidOutputPath(_) => "INVALID_OUTPUT_PATH",
            Error::WriteFailure(_) => "WRITE_FAILURE",
            Error::Watch(_) => "WATCH_ERROR",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::Manifest(webext_manifest::Error::NoEntrypoints) => Some(Box::new(
                "The manifest declares no pages, scripts, or styles. Add entrypoint fields \
                 (action.default_popup, background.service_worker, content_scripts, ...) or \
                 pass additional inputs."
                    .to_string(),
            )),
            Error::Manifest(webext_manifest::Error::MissingBundle { entry }) => Some(Box::new(
                format!(
                    "'{entry}' was classified for bundling but no build output matched it. \
                     Check that the file exists and its extension is bundleable."
                ),
            )),
            Error::ManifestInvalid { .. } => Some(Box::new(
                "The rendered manifest does not conform to the extension manifest schema. \
                 Pass skip_manifest_validation(true) to bypass validation.".to_string(),
            )),
            Error::InvalidOutputPath(path) => Some(Box::new(format!(
                "The output path '{path}' escapes the output directory. Entry names must stay \
                 within the project."
            ))),
            Error::WriteFailure(msg) => Some(Box::new(format!(
                "Failed to write output. Check disk space and permissions.\nError: {msg}"
            ))),
            _ => None,
        }
    }
}
