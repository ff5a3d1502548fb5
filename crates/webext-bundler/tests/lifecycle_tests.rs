//! Lifecycle integration tests: hook ordering, completion gating, and
//! watch-style settlement over real nested builds.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use webext_bundler::orchestrator::BuildCycle;
use webext_bundler::{
    BuildDescriptor, BuildHooks, BundleTracker, CompletionCoordinator, ExtensionOptions, HookStage,
    MultibuildManager, OutputFile,
};

fn write(dir: &TempDir, path: &str, contents: &str) {
    let full = dir.path().join(path);
    if let Some(parent) = full.parent() {
        std::fs::create_dir_all(parent).expect("create dirs");
    }
    std::fs::write(full, contents).expect("write file");
}

fn two_library_project() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    write(&dir, "bg.js", "export const bg = true;\n");
    write(&dir, "content.js", "console.log('cs');\n");
    write(
        &dir,
        "manifest.json",
        &serde_json::to_string(&json!({
            "manifest_version": 3,
            "name": "lifecycle",
            "version": "1.0.0",
            "background": { "service_worker": "bg.js" },
            "content_scripts": [{ "js": ["content.js"], "matches": ["<all_urls>"] }]
        }))
        .unwrap(),
    );
    dir
}

fn options(dir: &TempDir) -> ExtensionOptions {
    ExtensionOptions::new(dir.path(), "manifest.json").skip_manifest_validation(true)
}

/// Records every lifecycle event it sees, in order.
#[derive(Default)]
struct RecordingHooks {
    events: Mutex<Vec<String>>,
}

#[async_trait::async_trait]
impl BuildHooks for RecordingHooks {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_build_start(&self, build: &BuildDescriptor) {
        self.events.lock().push(format!("start:{}", build.id));
    }

    async fn on_build_end(&self, build: &BuildDescriptor, error: Option<&str>) {
        let status = if error.is_some() { "err" } else { "ok" };
        self.events.lock().push(format!("end:{}:{status}", build.id));
    }

    async fn on_bundle_written(&self, build: &BuildDescriptor, files: &[OutputFile]) {
        self.events
            .lock()
            .push(format!("written:{}:{}", build.id, files.len()));
    }

    async fn on_watch_change(&self, build: &BuildDescriptor, _path: &Path) {
        self.events.lock().push(format!("change:{}", build.id));
    }
}

#[tokio::test]
async fn hooks_fire_in_lifecycle_order_per_build() {
    let project = two_library_project();
    let options = options(&project);

    let recorder = Arc::new(RecordingHooks::default());
    let cycle = BuildCycle::prepare(&options).await.expect("prepare");
    let hooks_recorder = Arc::clone(&recorder);
    cycle
        .run(
            &options,
            &move |_| vec![Arc::clone(&hooks_recorder) as Arc<dyn BuildHooks>],
            false,
        )
        .await
        .expect("run");

    let events = recorder.events.lock().clone();
    assert_eq!(
        events,
        vec![
            "start:lib:bg.js",
            "end:lib:bg.js:ok",
            "written:lib:bg.js:1",
            "start:lib:content.js",
            "end:lib:content.js:ok",
            "written:lib:content.js:1",
        ]
    );
}

#[tokio::test]
async fn tracker_and_coordinator_settle_after_full_cycle() {
    let project = two_library_project();
    let options = options(&project);

    let coordinator = CompletionCoordinator::new();
    let trackers: Arc<Mutex<Vec<Arc<BundleTracker>>>> = Arc::new(Mutex::new(Vec::new()));

    let cycle = BuildCycle::prepare(&options).await.expect("prepare");
    {
        let coordinator = coordinator.clone();
        let trackers = Arc::clone(&trackers);
        let hooks_for = move |d: &BuildDescriptor| -> Vec<Arc<dyn BuildHooks>> {
            let tracker = Arc::new(BundleTracker::new());
            trackers.lock().push(Arc::clone(&tracker));
            vec![
                tracker,
                Arc::new(coordinator.register(d.id.clone(), HookStage::BundleWritten)),
            ]
        };
        cycle.run(&options, &hooks_for, false).await.expect("run");
    }

    // Every build settled, so the gate opens immediately.
    coordinator.wait_for_all().await.expect("settled");

    // Each tracker saw its build's written file set.
    let trackers = trackers.lock();
    assert_eq!(trackers.len(), 2);
    for tracker in trackers.iter() {
        let files = tracker.files().expect("files recorded");
        assert_eq!(files.len(), 1);
        assert!(files[0].filename.ends_with(".js"));
    }
}

#[tokio::test]
async fn multibuild_manager_confirms_whole_cycle_success() {
    let project = two_library_project();
    let options = options(&project);

    let fired = Arc::new(AtomicUsize::new(0));
    let manager = {
        let fired = Arc::clone(&fired);
        MultibuildManager::new(Arc::new(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        }))
    };

    let cycle = BuildCycle::prepare(&options).await.expect("prepare");
    cycle
        .run(
            &options,
            &|_| vec![Arc::new(manager.adapter()) as Arc<dyn BuildHooks>],
            false,
        )
        .await
        .expect("run");

    assert_eq!(fired.load(Ordering::SeqCst), 1, "exactly one settle notification");
}

#[tokio::test]
async fn failed_group_reports_through_hooks_and_aborts() {
    let dir = TempDir::new().expect("temp dir");
    write(&dir, "ok.js", "export {};\n");
    write(&dir, "bad.js", "import { nope } from './missing.js';\nnope();\n");
    write(
        &dir,
        "manifest.json",
        &serde_json::to_string(&json!({
            "manifest_version": 3,
            "name": "partial",
            "version": "1.0.0",
            "background": { "scripts": ["ok.js", "bad.js"] }
        }))
        .unwrap(),
    );
    let options = options(&dir);

    let recorder = Arc::new(RecordingHooks::default());
    let cycle = BuildCycle::prepare(&options).await.expect("prepare");
    let hooks_recorder = Arc::clone(&recorder);
    let result = cycle
        .run(
            &options,
            &move |_| vec![Arc::clone(&hooks_recorder) as Arc<dyn BuildHooks>],
            false,
        )
        .await;

    assert!(result.is_err());
    let events = recorder.events.lock().clone();
    assert!(events.contains(&"end:lib:bad.js:err".to_string()), "got: {events:?}");
    // The written stage never fires for the failed build.
    assert!(!events.iter().any(|e| e.starts_with("written:lib:bad.js")));
}

#[tokio::test]
async fn rebuild_cycle_reuses_slot_identity() {
    let project = two_library_project();
    let options = options(&project);

    let coordinator = CompletionCoordinator::new();
    let slots: Arc<Mutex<rustc_hash::FxHashMap<String, Arc<dyn BuildHooks>>>> =
        Arc::new(Mutex::new(rustc_hash::FxHashMap::default()));

    let hooks_for = {
        let coordinator = coordinator.clone();
        let slots = Arc::clone(&slots);
        move |d: &BuildDescriptor| -> Vec<Arc<dyn BuildHooks>> {
            let mut slots = slots.lock();
            let slot = slots.entry(d.id.clone()).or_insert_with(|| {
                Arc::new(coordinator.register(d.id.clone(), HookStage::BundleWritten))
                    as Arc<dyn BuildHooks>
            });
            vec![Arc::clone(slot)]
        }
    };

    // First cycle.
    let cycle = BuildCycle::prepare(&options).await.expect("prepare");
    let descriptors = cycle.descriptors();
    cycle.run(&options, &hooks_for, false).await.expect("first run");
    coordinator.wait_for_all().await.expect("first settle");
    assert_eq!(coordinator.len(), 2);

    // Source change: re-arm, then rebuild with the same slot set.
    let rearm_targets: Vec<(Arc<dyn BuildHooks>, BuildDescriptor)> = {
        let slots = slots.lock();
        descriptors
            .iter()
            .map(|d| (Arc::clone(&slots[&d.id]), d.clone()))
            .collect()
    };
    for (slot, descriptor) in &rearm_targets {
        slot.on_watch_change(descriptor, Path::new("bg.js")).await;
    }
    let cycle = BuildCycle::prepare(&options).await.expect("re-prepare");
    cycle.run(&options, &hooks_for, true).await.expect("second run");
    coordinator.wait_for_all().await.expect("second settle");
    assert_eq!(coordinator.len(), 2, "no duplicate slots across rebuilds");
}
