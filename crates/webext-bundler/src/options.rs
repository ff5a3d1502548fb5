//! Configuration options for an extension build.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::runner::BrowserFamily;
use crate::{Error, Result};

/// Build modes the orchestrator runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    /// One-shot: build everything once and return.
    #[default]
    Build,
    /// Rebuild on file changes until the process exits.
    Watch,
}

/// A synchronous manifest generator function.
pub type ManifestGenerator = Arc<dyn Fn() -> anyhow::Result<Value> + Send + Sync>;

/// An asynchronous manifest generator function.
pub type AsyncManifestGenerator =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = anyhow::Result<Value>> + Send>> + Send + Sync>;

/// Where the manifest template comes from.
///
/// Either a JSON file (resolved relative to the project root) or a
/// user-supplied generator function, sync or async. Both may use
/// `{{browser}}.`-tagged keys and values.
#[derive(Clone)]
pub enum ManifestSource {
    File(PathBuf),
    Generator(ManifestGenerator),
    AsyncGenerator(AsyncManifestGenerator),
}

impl std::fmt::Debug for ManifestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ManifestSource::Generator(_) => f.write_str("Generator(..)"),
            ManifestSource::AsyncGenerator(_) => f.write_str("AsyncGenerator(..)"),
        }
    }
}

impl ManifestSource {
    /// Produce the manifest template.
    pub async fn resolve(&self, root: &Path) -> Result<Value> {
        match self {
            ManifestSource::File(path) => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    root.join(path)
                };
                let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
                    Error::ManifestSource(format!("failed to read {}: {e}", path.display()))
                })?;
                serde_json::from_str(&text).map_err(|e| {
                    Error::ManifestSource(format!("{} is not valid JSON: {e}", path.display()))
                })
            }
            ManifestSource::Generator(generate) => generate()
                .map_err(|e| Error::ManifestSource(format!("manifest generator failed: {e}"))),
            ManifestSource::AsyncGenerator(generate) => generate()
                .await
                .map_err(|e| Error::ManifestSource(format!("manifest generator failed: {e}"))),
        }
    }

    /// The file backing this source, when there is one (it is watched in
    /// watch mode).
    pub fn file(&self) -> Option<&Path> {
        match self {
            ManifestSource::File(path) => Some(path),
            _ => None,
        }
    }
}

/// Per-group user overrides merged into generated nested-build configs.
///
/// These merge below the forced overrides: nested builds never wipe the
/// output directory and never copy static assets, regardless of what is
/// set here.
#[derive(Debug, Clone, Default)]
pub struct GroupOverrides {
    /// Packages to treat as external (not bundled).
    pub external: Vec<String>,
    /// Minify the group's JavaScript output.
    pub minify: bool,
    /// Source map generation strategy.
    pub sourcemap: Option<crate::SourceMapType>,
    /// Path aliases for import resolution (e.g., "@" → "src").
    pub path_aliases: FxHashMap<String, String>,
}

/// Configuration for one logical extension build.
///
/// Use the builder methods for ergonomic configuration, or construct
/// directly for full control.
#[derive(Debug, Clone)]
pub struct ExtensionOptions {
    /// Project root all source paths resolve against.
    pub root: PathBuf,

    /// Where the manifest template comes from.
    pub manifest: ManifestSource,

    /// Target browser identifier used for `{{browser}}.` tag resolution
    /// (e.g. "chrome", "firefox"). `None` resolves only `{{undefined}}` tags.
    pub browser: Option<String>,

    /// Entrypoints to build that the manifest does not reference
    /// (root-relative paths, bucketed by extension).
    pub additional_inputs: Vec<String>,

    /// Output directory (root-relative unless absolute). Default `dist`.
    pub out_dir: PathBuf,

    /// Relative path of the emitted manifest inside `out_dir`.
    /// Default `manifest.json`.
    pub manifest_out: String,

    /// Directory of pre-built static assets to copy beneath the output
    /// root, when present.
    pub assets_dir: Option<PathBuf>,

    /// Relative root the static assets tree is copied under.
    /// Default `assets`.
    pub assets_out: String,

    /// Remove the output directory before the first build cycle.
    pub empty_out_dir: bool,

    /// Extra absolute paths that trigger a full rebuild cycle in watch
    /// mode even though no bundler module graph tracks them.
    pub watched_files: Vec<PathBuf>,

    /// Skip manifest schema validation entirely.
    pub skip_manifest_validation: bool,

    /// Build mode.
    pub mode: BuildMode,

    /// Overrides merged into the page/sandbox/stylesheet group configs.
    pub page_overrides: GroupOverrides,

    /// Overrides merged into each library entry's config.
    pub library_overrides: GroupOverrides,
}

impl ExtensionOptions {
    /// Create options for a project rooted at `root` with a manifest file.
    pub fn new(root: impl Into<PathBuf>, manifest: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            manifest: ManifestSource::File(manifest.into()),
            browser: None,
            additional_inputs: Vec::new(),
            out_dir: PathBuf::from("dist"),
            manifest_out: "manifest.json".to_string(),
            assets_dir: None,
            assets_out: "assets".to_string(),
            empty_out_dir: true,
            watched_files: Vec::new(),
            skip_manifest_validation: false,
            mode: BuildMode::Build,
            page_overrides: GroupOverrides::default(),
            library_overrides: GroupOverrides::default(),
        }
    }

    /// Create options with a generator function instead of a manifest file.
    pub fn with_generator(root: impl Into<PathBuf>, generate: ManifestGenerator) -> Self {
        let mut options = Self::new(root, "manifest.json");
        options.manifest = ManifestSource::Generator(generate);
        options
    }

    /// Set the target browser.
    pub fn browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = Some(browser.into());
        self
    }

    /// Set the output directory.
    pub fn out_dir(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = out_dir.into();
        self
    }

    /// Add entrypoints the manifest does not reference.
    pub fn additional_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_inputs
            .extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Set the static assets directory to copy.
    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(dir.into());
        self
    }

    /// Add absolute paths that force a full rebuild when changed.
    pub fn watched_files<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.watched_files.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Skip manifest schema validation.
    pub fn skip_manifest_validation(mut self, skip: bool) -> Self {
        self.skip_manifest_validation = skip;
        self
    }

    /// Set the build mode.
    pub fn mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    /// The browser family the runner needs to launch a real instance.
    pub fn browser_family(&self) -> BrowserFamily {
        match self.browser.as_deref() {
            Some(b) if b.eq_ignore_ascii_case("firefox") || b.eq_ignore_ascii_case("gecko") => {
                BrowserFamily::Firefox
            }
            _ => BrowserFamily::Chromium,
        }
    }

    /// The absolute output directory.
    pub fn resolved_out_dir(&self) -> PathBuf {
        if self.out_dir.is_absolute() {
            self.out_dir.clone()
        } else {
            self.root.join(&self.out_dir)
        }
    }

    /// Validate the configuration before building.
    pub fn validate(&self) -> Result<()> {
        if self.manifest_out.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "manifest_out must be a relative file name".to_string(),
            ));
        }
        if Path::new(&self.manifest_out).is_absolute() {
            return Err(Error::InvalidConfig(format!(
                "manifest_out must be relative to the output directory, got '{}'",
                self.manifest_out
            )));
        }
        Ok(())
    }

    /// Execute a one-shot build with these options.
    pub async fn build(self) -> Result<crate::BuildSummary> {
        crate::orchestrator::build(self).await
    }
}
