//! Debounced, last-writer-wins backpack sync.
//!
//! Every backpack mutation hands the engine a full snapshot. The engine
//! keeps one pending slot per slug: a new snapshot replaces the previous
//! one and restarts the timer, so a burst of mutations inside the debounce
//! window produces exactly one `PUT` carrying the final state.
//!
//! Each slot carries a generation number. A timer only pushes if its
//! generation still owns the slot when it wakes, which makes a superseded
//! timer harmless even if aborting it races with its wake-up. Once a push
//! has claimed its snapshot it is no longer cancellable; later snapshots
//! simply start a new slot.
//!
//! Push failures are logged and dropped. The local copy stays
//! authoritative and the next mutation pushes the whole state again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trailhead_types::{BackpackState, Slug};

use crate::remote::RemoteBackend;

/// Debounce window applied when none is configured.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(600);

/// Push outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Snapshots the remote accepted.
    pub pushed: u64,
    /// Snapshots the remote rejected or never received.
    pub failed: u64,
}

#[derive(Debug)]
struct PendingSync {
    generation: u64,
    snapshot: BackpackState,
    /// `None` when scheduled outside a runtime; only `flush` pushes it.
    timer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct SyncInner {
    remote: RemoteBackend,
    debounce: Duration,
    pending: Mutex<HashMap<Slug, PendingSync>>,
    next_generation: AtomicU64,
    pushed: AtomicU64,
    failed: AtomicU64,
}

/// Per-slug debounced push scheduler.
///
/// Cheap to clone; clones share pending slots.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    inner: Arc<SyncInner>,
}

impl SyncEngine {
    /// Create an engine pushing to `remote` after `debounce` of quiet.
    pub fn new(remote: RemoteBackend, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                remote,
                debounce,
                pending: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
                pushed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// The remote this engine pushes to.
    pub fn remote(&self) -> &RemoteBackend {
        &self.inner.remote
    }

    /// The configured debounce window.
    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// Queue `snapshot` for `slug`, superseding any pending snapshot and
    /// restarting the debounce timer.
    ///
    /// Outside a Tokio runtime the snapshot is held until [`Self::flush`].
    pub fn schedule(&self, slug: &Slug, snapshot: BackpackState) {
        let generation = self
            .inner
            .next_generation
            .fetch_add(1, Ordering::Relaxed);

        let timer = Handle::try_current().ok().map(|handle| {
            let engine = self.clone();
            let slug = slug.clone();
            let debounce = self.inner.debounce;
            handle.spawn(async move {
                tokio::time::sleep(debounce).await;
                engine.fire(&slug, generation).await;
            })
        });
        if timer.is_none() {
            debug!(slug = %slug, "no runtime; sync held until flush");
        }

        let previous = self.lock().insert(
            slug.clone(),
            PendingSync {
                generation,
                snapshot,
                timer,
            },
        );
        if let Some(timer) = previous.and_then(|p| p.timer) {
            timer.abort();
        }
    }

    /// Push every pending snapshot now, bypassing the debounce. Returns the
    /// number of snapshots attempted.
    pub async fn flush(&self) -> usize {
        let drained: Vec<(Slug, PendingSync)> = self.lock().drain().collect();
        let count = drained.len();
        for (slug, pending) in drained {
            if let Some(timer) = pending.timer {
                timer.abort();
            }
            self.push(&slug, &pending.snapshot).await;
        }
        if count > 0 {
            info!(count, "flushed pending backpack syncs");
        }
        count
    }

    /// Drop every pending snapshot without pushing. Returns how many were
    /// discarded.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<PendingSync> = self.lock().drain().map(|(_, p)| p).collect();
        for timer in drained.iter().filter_map(|p| p.timer.as_ref()) {
            timer.abort();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "cancelled pending backpack syncs");
        }
        drained.len()
    }

    /// Number of slugs with a snapshot waiting to be pushed.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    /// Push outcome counters since creation.
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            pushed: self.inner.pushed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    /// Timer callback: push if this generation still owns the slot.
    async fn fire(&self, slug: &Slug, generation: u64) {
        let snapshot = {
            let mut pending = self.lock();
            match pending.get(slug) {
                Some(p) if p.generation == generation => pending.remove(slug).map(|p| p.snapshot),
                _ => None,
            }
        };
        if let Some(snapshot) = snapshot {
            self.push(slug, &snapshot).await;
        }
    }

    async fn push(&self, slug: &Slug, snapshot: &BackpackState) {
        match self.inner.remote.push_backpack(slug, snapshot).await {
            Ok(()) => {
                self.inner.pushed.fetch_add(1, Ordering::Relaxed);
                debug!(slug = %slug, points = snapshot.points, "backpack pushed");
            }
            Err(e) => {
                self.inner.failed.fetch_add(1, Ordering::Relaxed);
                warn!(slug = %slug, remote = self.inner.remote.name(), error = %e, "backpack push failed");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Slug, PendingSync>> {
        self.inner.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::remote::MemoryRemote;

    fn state(points: i64) -> BackpackState {
        BackpackState {
            points,
            ..BackpackState::default()
        }
    }

    fn engine() -> (SyncEngine, MemoryRemote) {
        let memory = MemoryRemote::new();
        (
            SyncEngine::new(RemoteBackend::from(memory.clone()), DEFAULT_DEBOUNCE),
            memory,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn burst_coalesces_into_one_push() {
        let (engine, memory) = engine();
        let slug = Slug::from("hunt");
        for points in 1..=5 {
            engine.schedule(&slug, state(points));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(memory.push_count(), 0);
        assert_eq!(engine.pending_count(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(memory.pushes_for(&slug), vec![state(5)]);
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(engine.stats().pushed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slugs_debounce_independently() {
        let (engine, memory) = engine();
        engine.schedule(&Slug::from("a"), state(1));
        engine.schedule(&Slug::from("b"), state(2));
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(memory.push_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_prevents_pushes() {
        let (engine, memory) = engine();
        engine.schedule(&Slug::from("a"), state(1));
        assert_eq!(engine.cancel_all(), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(memory.push_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn flush_pushes_immediately() {
        let (engine, memory) = engine();
        engine.schedule(&Slug::from("a"), state(3));
        assert_eq!(engine.flush().await, 1);
        assert_eq!(memory.push_count(), 1);
        // The aborted timer must not push a second time.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(memory.push_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_counted_not_retried() {
        let (engine, memory) = engine();
        memory.set_offline(true);
        engine.schedule(&Slug::from("a"), state(1));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(engine.stats(), SyncStats { pushed: 0, failed: 1 });
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn without_runtime_snapshot_waits_for_flush() {
        let (engine, memory) = engine();
        engine.schedule(&Slug::from("a"), state(1));
        engine.schedule(&Slug::from("a"), state(2));
        assert_eq!(engine.pending_count(), 1);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(engine.flush());
        assert_eq!(memory.pushes_for(&Slug::from("a")), vec![state(2)]);
    }
}
