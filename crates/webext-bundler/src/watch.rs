//! Watch mode: rebuild on file changes, reload the browser on settlement.
//!
//! The watcher observes the whole project tree (minus the output
//! directory, `node_modules`, and hidden paths) plus the explicit
//! watched-file list; the manifest itself and asset directories are not
//! part of any bundler module graph, so they must be declared.
//!
//! Each relevant change re-arms the completion slots of the affected
//! builds and re-runs the cycle. A manifest-affecting change (the manifest
//! file or a watched file) tears the previous cycle's registrations down
//! first and re-classifies from scratch; a source-only change keeps the
//! slot identities so per-build state survives. The extension runner is
//! only driven once the coordinator confirms the cycle settled with every
//! nested build succeeded. Errors keep the loop alive, waiting for the
//! next change.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;

use crate::coordinator::{CompletionCoordinator, HookStage};
use crate::hooks::{BuildDescriptor, BuildHooks};
use crate::multibuild::MultibuildManager;
use crate::options::{BuildMode, ExtensionOptions};
use crate::orchestrator::BuildCycle;
use crate::runner::ExtensionRunner;
use crate::{Error, Result};

/// Debounce window for file-change events.
const DEBOUNCE: Duration = Duration::from_millis(150);

/// File watcher with debouncing and filtering.
///
/// Sends changed paths through a channel; the watch loop decides what a
/// change means.
pub struct FileWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `root` recursively plus every path in `extra`, filtering out
    /// `ignore`d subtrees, hidden paths, and debounced duplicates.
    pub fn new(
        root: PathBuf,
        extra: Vec<PathBuf>,
        ignore: Vec<String>,
    ) -> Result<(Self, mpsc::Receiver<PathBuf>)> {
        let (tx, rx) = mpsc::channel(100);

        let explicit = extra.clone();
        let root_clone = root.clone();
        let mut last_event: Option<(PathBuf, Instant)> = None;

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            if !matches!(
                event.kind,
                notify::EventKind::Create(_)
                    | notify::EventKind::Modify(_)
                    | notify::EventKind::Remove(_)
            ) {
                return;
            }
            for path in &event.paths {
                let is_explicit = explicit.iter().any(|p| p == path);
                if !is_explicit && Self::should_ignore(path, &root_clone, &ignore) {
                    continue;
                }

                let now = Instant::now();
                if let Some((last_path, last_time)) = &last_event {
                    if last_path == path && now.duration_since(*last_time) < DEBOUNCE {
                        continue;
                    }
                }
                last_event = Some((path.clone(), now));

                let _ = tx.blocking_send(path.clone());
            }
        })
        .map_err(|e| Error::Watch(e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::Watch(e.to_string()))?;
        for path in &extra {
            if !path.starts_with(&root) {
                watcher
                    .watch(path, RecursiveMode::NonRecursive)
                    .map_err(|e| Error::Watch(e.to_string()))?;
            }
        }

        Ok((Self { _watcher: watcher }, rx))
    }

    fn should_ignore(path: &Path, root: &Path, ignore: &[String]) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return true;
        };
        let relative_str = relative.to_string_lossy();

        for pattern in ignore {
            if relative_str.starts_with(pattern.as_str())
                || relative_str.contains(&format!("/{pattern}"))
            {
                return true;
            }
        }

        relative.components().any(|component| {
            component
                .as_os_str()
                .to_str()
                .is_some_and(|name| name.starts_with('.') && name != "." && name != "..")
        })
    }
}

/// Run the watch loop until the change channel closes.
///
/// Builds a first cycle immediately, then rebuilds on every relevant
/// change. The `runner` is told to open a browser after the first settled
/// cycle and to reload after each subsequent one.
pub async fn watch(options: ExtensionOptions, runner: Arc<dyn ExtensionRunner>) -> Result<()> {
    let mut options = options;
    options.mode = BuildMode::Watch;
    options.validate()?;

    let root = options.root.clone();
    let mut ignore = vec!["node_modules".to_string()];
    if let Ok(out_rel) = options.resolved_out_dir().strip_prefix(&root) {
        ignore.push(out_rel.to_string_lossy().into_owned());
    }

    let manifest_file = options
        .manifest
        .file()
        .map(|p| if p.is_absolute() { p.to_path_buf() } else { root.join(p) });
    let mut extra = options.watched_files.clone();
    if let Some(manifest) = &manifest_file {
        extra.push(manifest.clone());
    }

    let (_watcher, mut changes) = FileWatcher::new(root.clone(), extra, ignore)?;

    let coordinator = CompletionCoordinator::new();
    let settled_ok = Arc::new(AtomicBool::new(false));
    let manager = {
        let settled_ok = Arc::clone(&settled_ok);
        MultibuildManager::new(Arc::new(move || {
            settled_ok.store(true, Ordering::SeqCst);
            tracing::info!("all nested builds succeeded");
        }))
    };

    // Slot identity persists across source-only rebuilds so watchers are
    // not torn down unnecessarily; manifest-affecting changes clear it.
    let slots: Arc<Mutex<FxHashMap<String, Arc<dyn BuildHooks>>>> =
        Arc::new(Mutex::new(FxHashMap::default()));
    let mut last_descriptors: Vec<BuildDescriptor> = Vec::new();
    let mut first_cycle = true;

    loop {
        settled_ok.store(false, Ordering::SeqCst);

        let outcome = match BuildCycle::prepare(&options).await {
            Ok(cycle) => {
                last_descriptors = cycle.descriptors();
                let hooks_for = {
                    let slots = Arc::clone(&slots);
                    let coordinator = coordinator.clone();
                    let manager = &manager;
                    move |descriptor: &BuildDescriptor| -> Vec<Arc<dyn BuildHooks>> {
                        let slot = {
                            let mut slots = slots.lock();
                            Arc::clone(slots.entry(descriptor.id.clone()).or_insert_with(|| {
                                Arc::new(
                                    coordinator
                                        .register(descriptor.id.clone(), HookStage::BundleWritten),
                                )
                            }))
                        };
                        vec![slot, Arc::new(manager.adapter())]
                    }
                };
                cycle.run(&options, &hooks_for, !first_cycle).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(summary) => {
                coordinator.wait_for_all().await?;
                if settled_ok.load(Ordering::SeqCst) {
                    let result = if first_cycle {
                        runner.open_browser(&summary.out_dir, options.browser_family())
                    } else {
                        runner.reload()
                    };
                    if let Err(e) = result {
                        tracing::warn!("extension runner failed: {e}");
                    }
                }
                first_cycle = false;
            }
            Err(e) => {
                // Watch mode stays alive across broken states; the next
                // change gets a fresh chance.
                tracing::error!("extension build failed: {e}");
            }
        }

        let Some(changed) = changes.recv().await else {
            runner.exit();
            return Ok(());
        };
        tracing::debug!("change detected: {}", changed.display());

        let manifest_affecting = manifest_file.as_deref() == Some(changed.as_path())
            || options.watched_files.iter().any(|p| p == &changed);

        // Re-arm the affected slots before the rebuild so late waiters
        // cannot resolve against the stale cycle.
        let rearm_targets: Vec<(Arc<dyn BuildHooks>, BuildDescriptor)> = {
            let slots = slots.lock();
            last_descriptors
                .iter()
                .filter_map(|descriptor| {
                    slots
                        .get(&descriptor.id)
                        .map(|slot| (Arc::clone(slot), descriptor.clone()))
                })
                .collect()
        };
        for (slot, descriptor) in &rearm_targets {
            slot.on_watch_change(descriptor, &changed).await;
        }

        if manifest_affecting {
            tracing::info!("manifest changed, reclassifying entrypoints");
            for (slot, descriptor) in &rearm_targets {
                slot.on_close(descriptor).await;
            }
            slots.lock().clear();
            coordinator.clear();
        }
    }
}
