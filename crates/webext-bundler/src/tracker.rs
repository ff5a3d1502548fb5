//! Bundle tracking: which files each nested build actually wrote.
//!
//! The manifest renderer needs to know, for every classified entry, the
//! output filename the bundler chose and any auxiliary files the build
//! emitted alongside it. A tracker attaches to one nested build as a
//! lifecycle observer; aggregation into the global [`BundleMap`] happens
//! once all builds of a cycle have reported.

use parking_lot::Mutex;
use rolldown::BundleOutput;
use rolldown_common::Output;

use webext_manifest::{BuildStrategy, BundleMap, BundleRecord};

use crate::groups::{output_filename, GroupBuild, GroupKind};
use crate::hooks::{BuildDescriptor, BuildHooks, OutputFile};

/// Records the final written file set of one nested build.
#[derive(Debug, Default)]
pub struct BundleTracker {
    files: Mutex<Option<Vec<OutputFile>>>,
}

impl BundleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// The build's final file set, or `None` until its write stage ran.
    pub fn files(&self) -> Option<Vec<OutputFile>> {
        self.files.lock().clone()
    }
}

#[async_trait::async_trait]
impl BuildHooks for BundleTracker {
    fn name(&self) -> &str {
        "bundle-tracker"
    }

    async fn on_build_start(&self, _build: &BuildDescriptor) {
        // A rebuild invalidates the previous cycle's file set.
        *self.files.lock() = None;
    }

    async fn on_bundle_written(&self, _build: &BuildDescriptor, files: &[OutputFile]) {
        *self.files.lock() = Some(files.to_vec());
    }
}

/// Convert a Rolldown bundle into our output-file representation.
pub fn outputs_from_bundle(bundle: &BundleOutput) -> Vec<OutputFile> {
    let mut files = Vec::with_capacity(bundle.assets.len());
    for output in &bundle.assets {
        match output {
            Output::Chunk(chunk) => {
                let contents = chunk.code.as_bytes().to_vec();
                if chunk.is_entry {
                    files.push(OutputFile::entry_chunk(
                        chunk.filename.as_str(),
                        chunk.facade_module_id.as_ref().map(|id| id.to_string()),
                        contents,
                    ));
                } else {
                    files.push(OutputFile::chunk(chunk.filename.as_str(), contents));
                }
            }
            Output::Asset(asset) => {
                files.push(OutputFile::asset(
                    asset.filename.as_str(),
                    asset.source.as_bytes().to_vec(),
                ));
            }
        }
    }
    files
}

/// The build strategy a group kind bundles for.
pub fn strategy_for(kind: GroupKind) -> BuildStrategy {
    match kind {
        GroupKind::Page => BuildStrategy::Page,
        GroupKind::Sandbox => BuildStrategy::Sandbox,
        GroupKind::Library => BuildStrategy::Library,
        GroupKind::Stylesheet => BuildStrategy::Stylesheet,
    }
}

/// Fold one nested build's file set into the cycle's bundle map.
///
/// Every entry of the group gets a [`BundleRecord`]: the primary output is
/// matched by canonical filename first, then by the bundler-reported facade
/// module; auxiliary files are the same-stem siblings (and, for isolated
/// library builds, everything else the build emitted, since a single-entry build
/// only produces files on that entry's behalf). Entries with no match get
/// no record, which the renderer later reports as a fatal inconsistency.
///
/// Duplicate keys are overwritten rather than rejected: the classifier's
/// dedup invariant makes them impossible in practice, and a stale record is
/// strictly worse than a refreshed one.
pub fn collect_records(build: &GroupBuild, files: &[OutputFile], map: &mut BundleMap) {
    let strategy = strategy_for(build.kind);
    for entry in &build.entries {
        let expected = output_filename(&entry.name, strategy);

        let primary = files
            .iter()
            .find(|f| f.filename == expected)
            .or_else(|| {
                files.iter().find(|f| match &f.kind {
                    crate::hooks::OutputFileKind::EntryChunk { facade: Some(facade) } => {
                        facade_matches(facade, &entry.source)
                    }
                    _ => false,
                })
            });

        let Some(primary) = primary else {
            continue;
        };

        let auxiliary: Vec<String> = files
            .iter()
            .filter(|f| f.filename != primary.filename)
            .filter(|f| {
                if build.kind == GroupKind::Library {
                    // Isolated build: every emitted file belongs to the entry.
                    true
                } else {
                    stem(&f.filename) == entry.name
                }
            })
            .map(|f| f.filename.clone())
            .collect();

        map.insert(
            entry.source.clone(),
            BundleRecord::with_auxiliary(primary.filename.clone(), auxiliary),
        );
    }
}

fn facade_matches(facade: &str, source: &str) -> bool {
    let facade = facade.replace('\\', "/");
    facade.ends_with(source) || facade.ends_with(&format!("/{source}"))
}

fn stem(filename: &str) -> &str {
    filename.rsplit_once('.').map_or(filename, |(s, _)| s)
}
