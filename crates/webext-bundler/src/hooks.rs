//! Nested-build lifecycle hooks.
//!
//! Each Build Group runs as its own nested Rolldown build, and several
//! observers need to follow its lifecycle: the bundle tracker records the
//! written file set, the multibuild manager aggregates success/failure
//! across groups, and the completion coordinator gates external consumers.
//! Rather than teach each observer about the orchestrator, the orchestrator
//! fires this plugin-like trait at the nested build's lifecycle stages, in
//! order:
//!
//! `on_build_start` → (bundling) → `on_build_end` → `on_bundle_written`
//!
//! plus, in watch mode, `on_watch_change` whenever a source file of that
//! build changed (a rebuild is about to happen) and `on_close` when the
//! build's watchers are torn down.

use std::path::Path;

use async_trait::async_trait;

use crate::groups::GroupKind;

/// Identity and position of one nested build within a build cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDescriptor {
    /// Stable identity of the build across watch-mode rebuilds
    /// (e.g. `"pages"`, `"lib:content/main.ts"`).
    pub id: String,
    /// The kind of group this build bundles.
    pub kind: GroupKind,
    /// Zero-based position in the cycle's build sequence.
    pub index: usize,
    /// Total nested builds in the cycle.
    pub total: usize,
}

/// What kind of output file a nested build emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFileKind {
    /// A chunk that is the compiled form of an entrypoint.
    EntryChunk {
        /// The module the chunk was generated from, when the bundler
        /// reported one (an absolute or normalized path).
        facade: Option<String>,
    },
    /// A shared, non-entry chunk.
    Chunk,
    /// A raw emitted asset (stylesheet, image, rewritten document).
    Asset,
}

/// One file a nested build wrote, with its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Output-root-relative filename.
    pub filename: String,
    pub kind: OutputFileKind,
    pub contents: Vec<u8>,
}

impl OutputFile {
    pub fn entry_chunk(
        filename: impl Into<String>,
        facade: Option<String>,
        contents: Vec<u8>,
    ) -> Self {
        Self {
            filename: filename.into(),
            kind: OutputFileKind::EntryChunk { facade },
            contents,
        }
    }

    pub fn chunk(filename: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            kind: OutputFileKind::Chunk,
            contents,
        }
    }

    pub fn asset(filename: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            kind: OutputFileKind::Asset,
            contents,
        }
    }

    /// True when this file is the compiled form of an entrypoint.
    pub fn is_entry(&self) -> bool {
        matches!(self.kind, OutputFileKind::EntryChunk { .. })
    }
}

/// Observer of one nested build's lifecycle.
///
/// All methods default to no-ops so observers implement only the stages
/// they care about.
#[async_trait]
pub trait BuildHooks: Send + Sync {
    /// Observer name, for logging.
    fn name(&self) -> &str;

    /// The nested build is about to run.
    async fn on_build_start(&self, _build: &BuildDescriptor) {}

    /// The nested build finished bundling, successfully or not.
    async fn on_build_end(&self, _build: &BuildDescriptor, _error: Option<&str>) {}

    /// The nested build's output files are final.
    ///
    /// Not fired when the build errored.
    async fn on_bundle_written(&self, _build: &BuildDescriptor, _files: &[OutputFile]) {}

    /// A watched source of this build changed; a rebuild is imminent.
    async fn on_watch_change(&self, _build: &BuildDescriptor, _path: &Path) {}

    /// The build's watchers are being torn down.
    async fn on_close(&self, _build: &BuildDescriptor) {}
}
