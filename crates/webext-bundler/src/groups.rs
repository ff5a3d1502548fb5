//! Per-group nested-build configuration.
//!
//! The classifier's output is abstract ("these paths need the library
//! strategy"); this module turns each group into a concrete Rolldown
//! configuration. Page, sandbox, and stylesheet groups each become one
//! multi-input build; every library entry becomes its own single-input
//! build with a self-contained output format, because extension script
//! injection has no module loader to resolve shared chunks.

use std::path::{Path, PathBuf};

use path_clean::PathClean;
use rolldown::{
    BundlerOptions, InputItem, IsExternal, OutputFormat, Platform, RawMinifyOptions,
    ResolveOptions,
};
use rustc_hash::FxHashMap;

use webext_manifest::{BuildStrategy, ClassifiedEntries};

use crate::options::{BuildMode, GroupOverrides};

/// The kind of nested build a group runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Page,
    Sandbox,
    Library,
    Stylesheet,
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKind::Page => f.write_str("pages"),
            GroupKind::Sandbox => f.write_str("sandbox"),
            GroupKind::Library => f.write_str("scripts"),
            GroupKind::Stylesheet => f.write_str("styles"),
        }
    }
}

/// One entrypoint inside a group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    /// Root-relative source path as the manifest references it.
    pub source: String,
    /// Output stem: the source path with its extension stripped and the
    /// directory preserved (`pages/popup.html` → `pages/popup`), so equal
    /// basenames in different directories never collide.
    pub name: String,
}

/// Settings the generated configs force regardless of user overrides.
///
/// The orchestrator owns output-directory cleanup and static-asset copying
/// for the whole logical build; a nested build doing either would clobber
/// sibling groups' output or duplicate work on every group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForcedOverrides {
    /// Nested builds never wipe the output directory.
    pub empty_out_dir: bool,
    /// Nested builds never copy the static assets tree.
    pub copy_public_assets: bool,
    /// Whether this build participates in watch mode.
    pub watch: bool,
}

/// One nested build: its identity, its entries, and the Rolldown
/// configuration that bundles them.
pub struct GroupBuild {
    pub kind: GroupKind,
    /// Stable identity across watch-mode rebuilds. Library builds are
    /// keyed by source path so file-only changes rebuild in place.
    pub key: String,
    pub entries: Vec<GroupEntry>,
    pub options: BundlerOptions,
    pub forced: ForcedOverrides,
}

impl std::fmt::Debug for GroupBuild {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupBuild")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .field("entries", &self.entries)
            .field("forced", &self.forced)
            .finish()
    }
}

/// Inputs the config builder needs beyond the classified entries.
pub struct GroupContext<'a> {
    /// Project root; nested-build imports resolve against it.
    pub root: &'a Path,
    /// For each page/sandbox entry, the root-relative script paths its
    /// document references. Pages without scripts map to an empty list.
    pub page_scripts: &'a FxHashMap<String, Vec<String>>,
    pub page_overrides: &'a GroupOverrides,
    pub library_overrides: &'a GroupOverrides,
    pub mode: BuildMode,
}

/// Synthesize the ordered nested-build list for one cycle.
///
/// Order is deterministic: pages, sandbox, stylesheets, then one build per
/// library entry in classification order. (`other` entries are pass-through
/// and never get a config.)
pub fn build_group_configs(entries: &ClassifiedEntries, ctx: &GroupContext<'_>) -> Vec<GroupBuild> {
    let mut builds = Vec::new();

    if !entries.pages.is_empty() {
        builds.push(document_group(GroupKind::Page, &entries.pages, ctx));
    }
    if !entries.sandboxes.is_empty() {
        builds.push(document_group(GroupKind::Sandbox, &entries.sandboxes, ctx));
    }
    if !entries.stylesheets.is_empty() {
        builds.push(stylesheet_group(&entries.stylesheets, ctx));
    }
    for source in &entries.libraries {
        builds.push(library_build(source, ctx));
    }

    builds
}

/// One multi-input build for a set of HTML documents.
///
/// The Rolldown inputs are the scripts the documents reference (shared
/// chunks deduplicate across pages); the documents themselves are emitted
/// by the orchestrator after reference rewriting.
fn document_group(kind: GroupKind, sources: &[String], ctx: &GroupContext<'_>) -> GroupBuild {
    let entries: Vec<GroupEntry> = sources.iter().map(|s| group_entry(s)).collect();

    let mut script_inputs: Vec<InputItem> = Vec::new();
    let mut seen = rustc_hash::FxHashSet::default();
    for source in sources {
        if let Some(scripts) = ctx.page_scripts.get(source) {
            for script in scripts {
                if seen.insert(script.clone()) {
                    script_inputs.push(InputItem {
                        name: Some(entry_name(script)),
                        import: ctx.root.join(script).to_string_lossy().into_owned(),
                    });
                }
            }
        }
    }

    let mut options = base_options(ctx.root, ctx.page_overrides, OutputFormat::Esm);
    options.input = Some(script_inputs);

    GroupBuild {
        kind,
        key: kind.to_string(),
        entries,
        options,
        forced: forced(ctx.mode),
    }
}

/// One multi-input CSS build. CSS has no equivalent of library mode, so
/// the multi-page strategy applies with named inputs.
fn stylesheet_group(sources: &[String], ctx: &GroupContext<'_>) -> GroupBuild {
    let entries: Vec<GroupEntry> = sources.iter().map(|s| group_entry(s)).collect();
    let inputs: Vec<InputItem> = entries
        .iter()
        .map(|entry| InputItem {
            name: Some(entry.name.clone()),
            import: ctx.root.join(&entry.source).to_string_lossy().into_owned(),
        })
        .collect();

    let mut options = base_options(ctx.root, ctx.page_overrides, OutputFormat::Esm);
    options.input = Some(inputs);

    GroupBuild {
        kind: GroupKind::Stylesheet,
        key: GroupKind::Stylesheet.to_string(),
        entries,
        options,
        forced: forced(ctx.mode),
    }
}

/// One standalone build for a single library entry: single input, single
/// self-contained output file, no code splitting.
fn library_build(source: &str, ctx: &GroupContext<'_>) -> GroupBuild {
    let entry = group_entry(source);
    let mut options = base_options(ctx.root, ctx.library_overrides, OutputFormat::Iife);
    options.input = Some(vec![InputItem {
        name: Some(entry.name.clone()),
        import: ctx.root.join(source).to_string_lossy().into_owned(),
    }]);

    GroupBuild {
        kind: GroupKind::Library,
        key: format!("lib:{source}"),
        entries: vec![entry],
        options,
        forced: forced(ctx.mode),
    }
}

fn forced(mode: BuildMode) -> ForcedOverrides {
    ForcedOverrides {
        empty_out_dir: false,
        copy_public_assets: false,
        watch: mode == BuildMode::Watch,
    }
}

fn group_entry(source: &str) -> GroupEntry {
    GroupEntry {
        source: source.to_string(),
        name: entry_name(source),
    }
}

/// Shared Rolldown options for a group, with user overrides merged in
/// below the forced settings.
fn base_options(root: &Path, overrides: &GroupOverrides, format: OutputFormat) -> BundlerOptions {
    let mut options = BundlerOptions {
        format: Some(format),
        sourcemap: overrides.sourcemap.clone(),
        ..Default::default()
    };

    options.cwd = Some(root.to_path_buf());
    options.platform = Some(Platform::Browser);
    options.external = Some(IsExternal::from(overrides.external.clone()));
    if overrides.minify {
        options.minify = Some(RawMinifyOptions::from(true));
    }
    options.resolve = Some(configure_resolution(root, &overrides.path_aliases));

    options
}

/// Module resolution for browser-targeted extension code.
fn configure_resolution(root: &Path, path_aliases: &FxHashMap<String, String>) -> ResolveOptions {
    let mut modules = Vec::new();
    let mut current = root;
    loop {
        modules.push(current.join("node_modules").to_string_lossy().to_string());
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    modules.push("node_modules".to_string());

    let alias = if path_aliases.is_empty() {
        None
    } else {
        Some(
            path_aliases
                .iter()
                .map(|(alias, target)| {
                    let target_path = Path::new(target);
                    let absolute = if target_path.is_absolute() {
                        target_path.to_path_buf()
                    } else {
                        root.join(target_path)
                    };
                    (
                        alias.clone(),
                        vec![Some(absolute.to_string_lossy().to_string())],
                    )
                })
                .collect(),
        )
    };

    ResolveOptions {
        alias,
        main_fields: Some(vec![
            "browser".to_string(),
            "module".to_string(),
            "main".to_string(),
        ]),
        condition_names: Some(vec![
            "browser".to_string(),
            "import".to_string(),
            "default".to_string(),
        ]),
        extensions: Some(vec![
            ".js".to_string(),
            ".json".to_string(),
            ".mjs".to_string(),
            ".ts".to_string(),
            ".tsx".to_string(),
        ]),
        modules: Some(modules),
        symlinks: Some(true),
        ..Default::default()
    }
}

/// Output stem for a source path: extension stripped, directories kept.
pub fn entry_name(source: &str) -> String {
    let cleaned: PathBuf = Path::new(source).to_path_buf().clean();
    let stem = cleaned
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    match cleaned.parent() {
        Some(parent) if parent != Path::new("") => {
            format!("{}/{}", parent.to_string_lossy().replace('\\', "/"), stem)
        }
        _ => stem,
    }
}

/// Canonical output filename for an entry under a strategy.
pub fn output_filename(name: &str, strategy: BuildStrategy) -> String {
    match strategy {
        BuildStrategy::Page | BuildStrategy::Sandbox => format!("{name}.html"),
        BuildStrategy::Library => format!("{name}.js"),
        BuildStrategy::Stylesheet => format!("{name}.css"),
        BuildStrategy::Other => name.to_string(),
    }
}

/// Announce a nested build before it runs.
///
/// First builds list every source being bundled; rebuild announcements stay
/// short because the listing has not changed since the first cycle.
pub fn announce(build: &GroupBuild, index: usize, total: usize, rebuild: bool) {
    if rebuild {
        tracing::info!("rebuilding {} ({} of {})", build.key, index + 1, total);
        return;
    }
    let sources: Vec<&str> = build.entries.iter().map(|e| e.source.as_str()).collect();
    tracing::info!(
        "bundling {} [{}] ({} of {})",
        build.key,
        sources.join(", "),
        index + 1,
        total
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use webext_manifest::ClassifiedEntries;

    fn context<'a>(
        root: &'a Path,
        page_scripts: &'a FxHashMap<String, Vec<String>>,
        overrides: &'a GroupOverrides,
    ) -> GroupContext<'a> {
        GroupContext {
            root,
            page_scripts,
            page_overrides: overrides,
            library_overrides: overrides,
            mode: BuildMode::Build,
        }
    }

    #[test]
    fn test_entry_name_preserves_directories() {
        assert_eq!(entry_name("pages/popup.html"), "pages/popup");
        assert_eq!(entry_name("background.ts"), "background");
        assert_eq!(entry_name("./content/main.ts"), "content/main");
        assert_eq!(entry_name("a/b/c.module.css"), "a/b/c.module");
    }

    #[test]
    fn test_output_filename_normalizes_extensions() {
        assert_eq!(output_filename("pages/popup", BuildStrategy::Page), "pages/popup.html");
        assert_eq!(output_filename("bg", BuildStrategy::Library), "bg.js");
        assert_eq!(output_filename("content/main", BuildStrategy::Stylesheet), "content/main.css");
    }

    #[test]
    fn test_same_basename_different_directories_do_not_collide() {
        assert_ne!(entry_name("popup/index.html"), entry_name("options/index.html"));
    }

    #[test]
    fn test_each_library_entry_gets_own_iife_config() {
        let entries = ClassifiedEntries {
            libraries: vec!["bg.ts".to_string(), "content/main.ts".to_string()],
            ..Default::default()
        };
        let scripts = FxHashMap::default();
        let overrides = GroupOverrides::default();
        let builds = build_group_configs(&entries, &context(Path::new("/p"), &scripts, &overrides));

        assert_eq!(builds.len(), 2);
        for build in &builds {
            assert_eq!(build.kind, GroupKind::Library);
            assert_eq!(build.options.format, Some(OutputFormat::Iife));
            assert_eq!(build.options.input.as_ref().unwrap().len(), 1);
        }
        assert_eq!(builds[0].key, "lib:bg.ts");
        assert_eq!(builds[1].key, "lib:content/main.ts");
    }

    #[test]
    fn test_page_group_bundles_referenced_scripts_together() {
        let entries = ClassifiedEntries {
            pages: vec!["popup/index.html".to_string(), "options/index.html".to_string()],
            ..Default::default()
        };
        let mut scripts = FxHashMap::default();
        scripts.insert(
            "popup/index.html".to_string(),
            vec!["popup/main.ts".to_string()],
        );
        scripts.insert(
            "options/index.html".to_string(),
            vec!["options/main.ts".to_string(), "popup/main.ts".to_string()],
        );
        let overrides = GroupOverrides::default();
        let builds = build_group_configs(&entries, &context(Path::new("/p"), &scripts, &overrides));

        assert_eq!(builds.len(), 1);
        let build = &builds[0];
        assert_eq!(build.kind, GroupKind::Page);
        assert_eq!(build.entries.len(), 2);

        // Scripts referenced by two pages appear once.
        let inputs = build.options.input.as_ref().unwrap();
        let names: Vec<_> = inputs.iter().filter_map(|i| i.name.as_deref()).collect();
        assert_eq!(names, vec!["popup/main", "options/main"]);
    }

    #[test]
    fn test_sandbox_is_a_separate_build() {
        let entries = ClassifiedEntries {
            pages: vec!["popup.html".to_string()],
            sandboxes: vec!["sandbox/eval.html".to_string()],
            ..Default::default()
        };
        let scripts = FxHashMap::default();
        let overrides = GroupOverrides::default();
        let builds = build_group_configs(&entries, &context(Path::new("/p"), &scripts, &overrides));

        assert_eq!(builds.len(), 2);
        assert_eq!(builds[0].kind, GroupKind::Page);
        assert_eq!(builds[1].kind, GroupKind::Sandbox);
        assert_eq!(builds[1].key, "sandbox");
    }

    #[test]
    fn test_stylesheet_group_uses_named_inputs() {
        let entries = ClassifiedEntries {
            stylesheets: vec!["content/a.css".to_string(), "content/b.css".to_string()],
            ..Default::default()
        };
        let scripts = FxHashMap::default();
        let overrides = GroupOverrides::default();
        let builds = build_group_configs(&entries, &context(Path::new("/p"), &scripts, &overrides));

        assert_eq!(builds.len(), 1);
        let inputs = builds[0].options.input.as_ref().unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].name.as_deref(), Some("content/a"));
    }

    #[test]
    fn test_forced_overrides_always_win() {
        let entries = ClassifiedEntries {
            libraries: vec!["bg.ts".to_string()],
            ..Default::default()
        };
        let scripts = FxHashMap::default();
        let overrides = GroupOverrides {
            minify: true,
            ..Default::default()
        };
        let builds = build_group_configs(&entries, &context(Path::new("/p"), &scripts, &overrides));

        let build = &builds[0];
        // User override applied...
        assert!(build.options.minify.is_some());
        // ...but the orchestrator-owned settings cannot be turned on.
        assert!(!build.forced.empty_out_dir);
        assert!(!build.forced.copy_public_assets);
    }

    #[test]
    fn test_build_order_is_deterministic() {
        let entries = ClassifiedEntries {
            pages: vec!["p.html".to_string()],
            sandboxes: vec!["s.html".to_string()],
            libraries: vec!["l1.ts".to_string(), "l2.ts".to_string()],
            stylesheets: vec!["c.css".to_string()],
            ..Default::default()
        };
        let scripts = FxHashMap::default();
        let overrides = GroupOverrides::default();
        let builds = build_group_configs(&entries, &context(Path::new("/p"), &scripts, &overrides));
        let keys: Vec<_> = builds.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["pages", "sandbox", "styles", "lib:l1.ts", "lib:l2.ts"]);
    }
}
