//! One extension build cycle, start to finish.
//!
//! The orchestrator is the single boundary between the pure collaborators
//! (tag resolver, classifier, renderer) and the world: it resolves the
//! manifest, drives one nested Rolldown build per group, aggregates the
//! bundle map, validates, renders, and writes, with the manifest as the
//! last file to land, so a failed cycle never leaves output that looks
//! complete.
//!
//! Nested builds run one after another in deterministic group order,
//! matching the host bundler's cooperative execution model; each fires its
//! lifecycle hooks (`on_build_start` → `on_build_end` → `on_bundle_written`)
//! at the attached observers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use path_clean::PathClean;
use rolldown::BundlerBuilder;
use rolldown_plugin::__inner::SharedPluginable;
use rustc_hash::FxHashMap;
use serde_json::Value;

use webext_manifest::{classify, render, resolve_browser_tags, BundleMap, BundleRecord,
    ClassifiedEntries};

use crate::css::{CssLoadPlugin, CssOptions};
use crate::groups::{self, announce, build_group_configs, GroupBuild, GroupContext, GroupKind};
use crate::hooks::{BuildDescriptor, BuildHooks, OutputFile};
use crate::html;
use crate::options::ExtensionOptions;
use crate::tracker::{collect_records, outputs_from_bundle, strategy_for};
use crate::writer::{self, WriteOp};
use crate::{assets, schema, Error, Result};

/// The outcome of one successful build cycle.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    /// The rendered manifest, as written to disk.
    pub manifest: Value,
    /// Absolute output directory.
    pub out_dir: PathBuf,
    /// Every file written, relative to `out_dir`.
    pub files: Vec<String>,
    /// Non-fatal degradations (e.g. validation skipped while offline).
    pub warnings: Vec<String>,
}

/// Factory providing the lifecycle observers for one nested build.
pub type HooksFor<'a> = &'a (dyn Fn(&BuildDescriptor) -> Vec<Arc<dyn BuildHooks>> + Send + Sync);

/// Execute a one-shot extension build.
pub async fn build(options: ExtensionOptions) -> Result<BuildSummary> {
    options.validate()?;
    let cycle = BuildCycle::prepare(&options).await?;
    cycle.run(&options, &|_| Vec::new(), false).await
}

/// The per-page document state gathered while preparing a cycle.
#[derive(Debug)]
struct PageDocument {
    /// Raw document text.
    text: String,
    /// Raw reference value → reference with its extension normalized to
    /// the output extension.
    rewrites: FxHashMap<String, String>,
}

/// One fully-prepared build cycle: manifest resolved, entries classified,
/// nested-build configs synthesized. Watch mode prepares a fresh cycle for
/// every manifest-affecting change.
#[derive(Debug)]
pub struct BuildCycle {
    resolved_manifest: Value,
    entries: ClassifiedEntries,
    builds: Vec<GroupBuild>,
    documents: FxHashMap<String, PageDocument>,
}

impl BuildCycle {
    /// Resolve the manifest, classify entries, and synthesize group
    /// configs. Fails before any nested build starts on configuration
    /// errors (unreadable manifest, missing page sources, zero entries).
    pub async fn prepare(options: &ExtensionOptions) -> Result<Self> {
        let template = options.manifest.resolve(&options.root).await?;
        let resolved_manifest = resolve_browser_tags(options.browser.as_deref(), &template);
        let entries = classify(&resolved_manifest, &options.additional_inputs)?;

        let mut documents = FxHashMap::default();
        let mut page_scripts: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for source in entries.pages.iter().chain(entries.sandboxes.iter()) {
            let (document, scripts) = scan_document(&options.root, source).await?;
            documents.insert(source.clone(), document);
            page_scripts.insert(source.clone(), scripts);
        }

        let ctx = GroupContext {
            root: &options.root,
            page_scripts: &page_scripts,
            page_overrides: &options.page_overrides,
            library_overrides: &options.library_overrides,
            mode: options.mode,
        };
        let builds = build_group_configs(&entries, &ctx);

        Ok(Self {
            resolved_manifest,
            entries,
            builds,
            documents,
        })
    }

    /// Identities of the cycle's nested builds, in run order.
    pub fn descriptors(&self) -> Vec<BuildDescriptor> {
        let total = self.builds.len();
        self.builds
            .iter()
            .enumerate()
            .map(|(index, build)| BuildDescriptor {
                id: build.key.clone(),
                kind: build.kind,
                index,
                total,
            })
            .collect()
    }

    /// Drive every nested build, then validate, render, and write.
    ///
    /// `hooks_for` supplies the lifecycle observers attached to each
    /// nested build (watch mode adds completion slots and multibuild
    /// adapters; one-shot builds need none). `rebuild` marks a watch-mode
    /// re-run: announcements shorten and the output directory is not
    /// wiped again.
    pub async fn run(
        mut self,
        options: &ExtensionOptions,
        hooks_for: HooksFor<'_>,
        rebuild: bool,
    ) -> Result<BuildSummary> {
        let out_dir = options.resolved_out_dir();
        if options.empty_out_dir && !rebuild {
            match tokio::fs::remove_dir_all(&out_dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let css_options = CssOptions {
            minify: options.page_overrides.minify,
        };

        let descriptors = self.descriptors();
        let total = self.builds.len();
        let mut bundle_map = BundleMap::default();
        let mut ops: Vec<WriteOp> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        for (index, mut build) in std::mem::take(&mut self.builds).into_iter().enumerate() {
            let descriptor = descriptors[index].clone();
            let hooks = hooks_for(&descriptor);
            announce(&build, index, total, rebuild);

            for hook in &hooks {
                hook.on_build_start(&descriptor).await;
            }

            let result = self.run_nested_build(&mut build, css_options).await;
            match result {
                Ok(files) => {
                    for hook in &hooks {
                        hook.on_build_end(&descriptor, None).await;
                    }
                    for hook in &hooks {
                        hook.on_bundle_written(&descriptor, &files).await;
                    }
                    collect_records(&build, &files, &mut bundle_map);
                    for file in files {
                        ops.push((file.filename, file.contents));
                    }
                }
                Err(error) => {
                    let message = error.to_string();
                    for hook in &hooks {
                        hook.on_build_end(&descriptor, Some(&message)).await;
                    }
                    return Err(error);
                }
            }
        }

        // Pass-through entries: copied verbatim, recorded under their own
        // path so manifest references to them resolve.
        for source in &self.entries.other {
            let contents = tokio::fs::read(options.root.join(source))
                .await
                .map_err(|e| {
                    Error::InvalidConfig(format!("additional input '{source}' is unreadable: {e}"))
                })?;
            ops.push((source.clone(), contents));
            bundle_map.insert(source.clone(), BundleRecord::new(source.clone()));
        }

        let rendered = render(&self.resolved_manifest, &bundle_map)?;

        if options.skip_manifest_validation {
            tracing::debug!("manifest validation skipped by configuration");
        } else {
            match schema::validate_manifest(&rendered).await? {
                schema::ValidationOutcome::Valid => {}
                schema::ValidationOutcome::Skipped(reason) => {
                    warnings.push(format!("manifest validation skipped: {reason}"));
                }
            }
        }

        // The manifest is appended last so its rename is the final commit
        // of the cycle.
        let mut manifest_bytes = serde_json::to_vec_pretty(&rendered)
            .map_err(|e| Error::WriteFailure(format!("failed to serialize manifest: {e}")))?;
        manifest_bytes.push(b'\n');
        ops.push((options.manifest_out.clone(), manifest_bytes));

        writer::write_files(&out_dir, &ops)?;
        let mut files: Vec<String> = ops.into_iter().map(|(name, _)| name).collect();

        if let Some(assets_dir) = &options.assets_dir {
            let assets_dir = if assets_dir.is_absolute() {
                assets_dir.clone()
            } else {
                options.root.join(assets_dir)
            };
            files.extend(assets::copy_assets(&assets_dir, &out_dir, &options.assets_out)?);
        }

        tracing::info!(
            "extension build complete: {} files in {}",
            files.len(),
            out_dir.display()
        );

        Ok(BuildSummary {
            manifest: rendered,
            out_dir,
            files,
            warnings,
        })
    }

    /// Run one group through Rolldown and return its final file set.
    ///
    /// Page and sandbox groups additionally emit their rewritten documents:
    /// Rolldown bundles the scripts the documents reference, and the
    /// documents land as assets with normalized extensions.
    async fn run_nested_build(
        &self,
        build: &mut GroupBuild,
        css_options: CssOptions,
    ) -> Result<Vec<OutputFile>> {
        let options = std::mem::take(&mut build.options);
        let has_inputs = options.input.as_ref().is_some_and(|inputs| !inputs.is_empty());

        let mut files = if has_inputs {
            let plugins: Vec<SharedPluginable> =
                vec![Arc::new(CssLoadPlugin::new(css_options))];
            let mut bundler = BundlerBuilder::default()
                .with_options(options)
                .with_plugins(plugins)
                .build()
                .map_err(|e| Error::from_rolldown(&e))?;
            let bundle = bundler
                .generate()
                .await
                .map_err(|e| Error::from_rolldown(&e))?;
            outputs_from_bundle(&bundle)
        } else {
            // A document group whose pages reference no local scripts
            // still emits the documents themselves.
            Vec::new()
        };

        if matches!(build.kind, GroupKind::Page | GroupKind::Sandbox) {
            let strategy = strategy_for(build.kind);
            for entry in &build.entries {
                let document = self.documents.get(&entry.source).ok_or_else(|| {
                    Error::InvalidConfig(format!("page '{}' was not scanned", entry.source))
                })?;
                let rewritten = html::rewrite_refs(&document.text, &document.rewrites);
                files.push(OutputFile::asset(
                    groups::output_filename(&entry.name, strategy),
                    rewritten.into_bytes(),
                ));
            }
        }

        Ok(files)
    }
}

/// Read a page document and resolve its local references.
///
/// Returns the document state plus the root-relative script paths feeding
/// the group's Rolldown inputs. A missing document is a configuration
/// error: the manifest names a page that does not exist.
async fn scan_document(root: &Path, source: &str) -> Result<(PageDocument, Vec<String>)> {
    let path = root.join(source);
    let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
        Error::InvalidConfig(format!(
            "manifest references page '{source}' but {} is unreadable: {e}",
            path.display()
        ))
    })?;

    let page_dir = Path::new(source).parent().unwrap_or(Path::new(""));
    let mut scripts = Vec::new();
    let mut rewrites = FxHashMap::default();

    for script in html::script_refs(&text) {
        scripts.push(resolve_page_ref(page_dir, &script));
        rewrites.insert(script.clone(), swap_extension(&script, "js"));
    }
    for link in html::link_refs(&text) {
        scripts.push(resolve_page_ref(page_dir, &link));
        rewrites.insert(link.clone(), swap_extension(&link, "css"));
    }

    Ok((PageDocument { text, rewrites }, scripts))
}

/// Resolve a document-relative reference to a root-relative path.
fn resolve_page_ref(page_dir: &Path, reference: &str) -> String {
    page_dir
        .join(reference)
        .clean()
        .to_string_lossy()
        .replace('\\', "/")
}

/// Swap a reference's extension for the canonical output extension,
/// leaving the directory part untouched.
fn swap_extension(reference: &str, ext: &str) -> String {
    match reference.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{ext}"),
        None => format!("{reference}.{ext}"),
    }
}
