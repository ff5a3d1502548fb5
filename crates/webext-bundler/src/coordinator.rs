//! Build-completion coordination across nested builds.
//!
//! Nested builds only expose one-shot lifecycle callbacks, but watch mode
//! replays those callbacks on every rebuild. This primitive converts N
//! independent signals, each potentially replayed, into a single composable
//! "everything is currently settled" gate: each registered slot mirrors one
//! lifecycle stage of one nested build, a watch-change event re-arms the
//! slot before its rebuild fires it again, and [`CompletionCoordinator::wait_for_all`]
//! resolves only once every slot has fired for the current cycle. Without
//! the re-arm step there would be a race between "a file change just made a
//! slot stale" and "an old waiter already resolved against the stale fire".

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::hooks::{BuildDescriptor, BuildHooks, OutputFile};
use crate::{Error, Result};

/// The nested-build lifecycle stage a slot mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// Fire when bundling finished (before outputs are written).
    BuildEnd,
    /// Fire when the build's outputs are final.
    BundleWritten,
}

#[derive(Debug, Default)]
struct SlotState {
    /// Incremented on every (re-)arm. Starts at 1: a freshly registered
    /// slot is armed.
    armed_epoch: u64,
    /// The epoch the slot last fired for. A slot is settled when
    /// `fired_epoch == armed_epoch`.
    fired_epoch: u64,
    /// Failure message when the slot settled with an error.
    failure: Option<String>,
}

#[derive(Debug)]
struct SlotInner {
    label: String,
    stage: HookStage,
    state: Mutex<SlotState>,
}

#[derive(Debug, Default)]
struct CoordinatorShared {
    slots: Mutex<Vec<Arc<SlotInner>>>,
    notify: Notify,
}

/// Aggregates completion slots for one "wait for everything" consumer.
#[derive(Debug, Clone, Default)]
pub struct CompletionCoordinator {
    shared: Arc<CoordinatorShared>,
}

impl CompletionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new slot bound to `stage` of one nested build.
    ///
    /// The returned handle is a lifecycle observer ([`BuildHooks`]) to
    /// attach to that build. The slot starts armed.
    pub fn register(&self, label: impl Into<String>, stage: HookStage) -> SlotHandle {
        let slot = Arc::new(SlotInner {
            label: label.into(),
            stage,
            state: Mutex::new(SlotState {
                armed_epoch: 1,
                ..SlotState::default()
            }),
        });
        self.shared.slots.lock().push(Arc::clone(&slot));
        SlotHandle {
            slot,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Drop every registered slot.
    ///
    /// Used when a watch cycle tears down its nested builds and the next
    /// cycle will register a fresh set.
    pub fn clear(&self) {
        self.shared.slots.lock().clear();
        self.shared.notify.notify_waiters();
    }

    /// Number of registered slots.
    pub fn len(&self) -> usize {
        self.shared.slots.lock().len()
    }

    /// True when no slots are registered.
    pub fn is_empty(&self) -> bool {
        self.shared.slots.lock().is_empty()
    }

    /// Resolve once every registered slot has fired for its current arm
    /// epoch.
    ///
    /// Slots that settled with a failure make the wait resolve with an
    /// error once nothing is pending anymore. In one-shot mode this
    /// resolves exactly once, after all initial fires; in watch mode it can
    /// be called again after re-arms and will wait for the new fires.
    pub async fn wait_for_all(&self) -> Result<()> {
        loop {
            // Create the wakeup future before inspecting state so a fire
            // that lands between the check and the await still wakes us.
            let notified = self.shared.notify.notified();

            {
                let slots = self.shared.slots.lock();
                let mut pending = false;
                let mut failures: Vec<String> = Vec::new();
                for slot in slots.iter() {
                    let state = slot.state.lock();
                    if state.fired_epoch < state.armed_epoch {
                        pending = true;
                        break;
                    }
                    if let Some(failure) = &state.failure {
                        failures.push(format!("{}: {failure}", slot.label));
                    }
                }
                if !pending {
                    if failures.is_empty() {
                        return Ok(());
                    }
                    return Err(Error::Bundler(failures.join("; ")));
                }
            }

            notified.await;
        }
    }
}

/// Handle for one completion slot; attach to the nested build it mirrors.
#[derive(Debug)]
pub struct SlotHandle {
    slot: Arc<SlotInner>,
    shared: Arc<CoordinatorShared>,
}

impl SlotHandle {
    fn fire(&self, failure: Option<String>) {
        {
            let mut state = self.slot.state.lock();
            state.fired_epoch = state.armed_epoch;
            state.failure = failure;
        }
        self.shared.notify.notify_waiters();
    }

    fn rearm(&self) {
        {
            let mut state = self.slot.state.lock();
            state.armed_epoch += 1;
            state.failure = None;
        }
        self.shared.notify.notify_waiters();
    }
}

#[async_trait]
impl BuildHooks for SlotHandle {
    fn name(&self) -> &str {
        "completion-slot"
    }

    async fn on_build_end(&self, _build: &BuildDescriptor, error: Option<&str>) {
        match (self.slot.stage, error) {
            (HookStage::BuildEnd, _) => self.fire(error.map(str::to_string)),
            // A failed build never reaches the written stage; settle the
            // slot here so waiters observe the failure instead of hanging.
            (HookStage::BundleWritten, Some(message)) => self.fire(Some(message.to_string())),
            (HookStage::BundleWritten, None) => {}
        }
    }

    async fn on_bundle_written(&self, _build: &BuildDescriptor, _files: &[OutputFile]) {
        if self.slot.stage == HookStage::BundleWritten {
            self.fire(None);
        }
    }

    async fn on_watch_change(&self, _build: &BuildDescriptor, _path: &Path) {
        self.rearm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupKind;
    use std::time::Duration;
    use tokio::time::timeout;

    fn descriptor() -> BuildDescriptor {
        BuildDescriptor {
            id: "pages".to_string(),
            kind: GroupKind::Page,
            index: 0,
            total: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_every_slot() {
        let coordinator = CompletionCoordinator::new();
        let a = coordinator.register("a", HookStage::BundleWritten);
        let b = coordinator.register("b", HookStage::BundleWritten);
        let d = descriptor();

        a.on_bundle_written(&d, &[]).await;
        assert!(
            timeout(Duration::from_millis(20), coordinator.wait_for_all())
                .await
                .is_err(),
            "must still wait for slot b"
        );

        b.on_bundle_written(&d, &[]).await;
        coordinator.wait_for_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_blocks_subsequent_waiters() {
        let coordinator = CompletionCoordinator::new();
        let slot = coordinator.register("lib:bg.ts", HookStage::BundleWritten);
        let d = descriptor();

        slot.on_bundle_written(&d, &[]).await;
        coordinator.wait_for_all().await.unwrap();

        // File changed: the slot re-arms and the fired state is stale.
        slot.on_watch_change(&d, Path::new("/src/bg.ts")).await;
        assert!(
            timeout(Duration::from_millis(20), coordinator.wait_for_all())
                .await
                .is_err(),
            "re-armed slot must block wait_for_all"
        );

        slot.on_bundle_written(&d, &[]).await;
        coordinator.wait_for_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_registered_before_fire_is_woken() {
        let coordinator = CompletionCoordinator::new();
        let slot = coordinator.register("styles", HookStage::BundleWritten);
        let d = descriptor();

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait_for_all().await })
        };
        tokio::task::yield_now().await;

        slot.on_bundle_written(&d, &[]).await;
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_build_surfaces_as_error() {
        let coordinator = CompletionCoordinator::new();
        let slot = coordinator.register("lib:bad.ts", HookStage::BundleWritten);
        let d = descriptor();

        slot.on_build_end(&d, Some("parse error")).await;
        let err = coordinator.wait_for_all().await.unwrap_err();
        assert!(err.to_string().contains("lib:bad.ts"));
        assert!(err.to_string().contains("parse error"));

        // A re-arm clears the failure; the next cycle can succeed.
        slot.on_watch_change(&d, Path::new("/src/bad.ts")).await;
        slot.on_bundle_written(&d, &[]).await;
        coordinator.wait_for_all().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_build_end_stage() {
        let coordinator = CompletionCoordinator::new();
        let slot = coordinator.register("pages", HookStage::BuildEnd);
        let d = descriptor();

        assert!(
            timeout(Duration::from_millis(20), coordinator.wait_for_all())
                .await
                .is_err()
        );
        slot.on_build_end(&d, None).await;
        coordinator.wait_for_all().await.unwrap();
    }
}
