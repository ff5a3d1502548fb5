//! Success aggregation across concurrently running nested builds.
//!
//! Where the coordinator answers "has everything settled", this manager
//! answers "did the whole multi-group build succeed". It tracks an
//! active-build counter and a per-build error map across however many
//! nested builds are in flight (including overlapping rebuilds from rapid
//! file changes), and fires an all-succeeded callback exactly once per
//! settle point. The counter and error map are the only state in the crate
//! mutated from overlapping asynchronous call sites, so every
//! read-modify-write goes through one mutex: two builds finishing in
//! adjacent ticks must not both observe `active > 0` (nobody fires) or
//! both observe zero (double fire).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::hooks::{BuildDescriptor, BuildHooks, OutputFile};

/// Callback invoked when a cohort of nested builds has fully succeeded.
pub type AllSucceeded = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct CohortState {
    /// Nested builds currently between start and end.
    active: usize,
    /// Latest error per build identity; cleared when that build succeeds.
    errors: FxHashMap<String, String>,
    /// Whether the callback already fired for the current cohort.
    notified: bool,
}

/// Tracks a cohort of nested builds and fires `on_all_succeeded` exactly
/// once when the cohort settles cleanly.
pub struct MultibuildManager {
    state: Arc<Mutex<CohortState>>,
    on_all_succeeded: AllSucceeded,
    first_adapter_created: AtomicBool,
}

impl std::fmt::Debug for MultibuildManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MultibuildManager")
            .field("active", &state.active)
            .field("errors", &state.errors.len())
            .field("notified", &state.notified)
            .finish()
    }
}

impl MultibuildManager {
    pub fn new(on_all_succeeded: AllSucceeded) -> Self {
        Self {
            state: Arc::new(Mutex::new(CohortState::default())),
            on_all_succeeded,
            first_adapter_created: AtomicBool::new(false),
        }
    }

    /// Create a lifecycle adapter for one nested build.
    ///
    /// The very first adapter pre-increments the active counter at creation
    /// time: by the time a manager exists, one build is already known to be
    /// queued, and counting it only at its start would let an earlier
    /// build's completion observe a spuriously settled cohort.
    pub fn adapter(&self) -> MultibuildAdapter {
        let pre_counted = !self.first_adapter_created.swap(true, Ordering::SeqCst);
        if pre_counted {
            let mut state = self.state.lock();
            state.active += 1;
            state.notified = false;
        }
        MultibuildAdapter {
            state: Arc::clone(&self.state),
            on_all_succeeded: Arc::clone(&self.on_all_succeeded),
            pre_counted: AtomicBool::new(pre_counted),
        }
    }

    /// Nested builds currently in flight.
    pub fn active(&self) -> usize {
        self.state.lock().active
    }
}

/// Lifecycle adapter attaching one nested build to a [`MultibuildManager`].
pub struct MultibuildAdapter {
    state: Arc<Mutex<CohortState>>,
    on_all_succeeded: AllSucceeded,
    /// Consumed by the first `on_build_start` when the manager already
    /// counted this build at adapter creation.
    pre_counted: AtomicBool,
}

impl std::fmt::Debug for MultibuildAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MultibuildAdapter")
    }
}

#[async_trait]
impl BuildHooks for MultibuildAdapter {
    fn name(&self) -> &str {
        "multibuild-manager"
    }

    async fn on_build_start(&self, _build: &BuildDescriptor) {
        if self.pre_counted.swap(false, Ordering::SeqCst) {
            return;
        }
        let mut state = self.state.lock();
        state.active += 1;
        // A new increment opens the next cohort.
        state.notified = false;
    }

    async fn on_build_end(&self, build: &BuildDescriptor, error: Option<&str>) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        match error {
            Some(message) => {
                state.errors.insert(build.id.clone(), message.to_string());
            }
            None => {
                state.errors.remove(&build.id);
            }
        }
    }

    async fn on_bundle_written(&self, _build: &BuildDescriptor, _files: &[OutputFile]) {
        let fire = {
            let mut state = self.state.lock();
            if state.active == 0 && state.errors.is_empty() && !state.notified {
                state.notified = true;
                true
            } else {
                false
            }
        };
        // Invoke outside the lock: the callback may itself inspect builds.
        if fire {
            (self.on_all_succeeded)();
        }
    }
}
