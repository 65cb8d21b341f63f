//! Slug-scoped backpack persistence and mutation.
//!
//! Every mutation runs the same pipeline under a store-wide lock: read the
//! stored state, apply the change, normalize, persist, then hand a snapshot
//! to the [`SyncEngine`]. Persistence failures are logged and never
//! surfaced; the returned state is what the player sees either way.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};
use trailhead_types::{
    Answer, BackpackState, FeatureId, MissionId, Pocket, PocketItem, Slug, generate_item_id,
};

use crate::normalize::{normalize, normalize_str, normalize_value};
use crate::storage::{KeyValueStore, backpack_key, write_json};
use crate::sync::SyncEngine;

/// Backpack state for every game, backed by a [`KeyValueStore`].
///
/// Cheap to clone; clones share storage, sync engine and the mutation lock.
#[derive(Debug, Clone)]
pub struct BackpackStore {
    storage: Arc<dyn KeyValueStore>,
    sync: SyncEngine,
    write_lock: Arc<Mutex<()>>,
}

impl BackpackStore {
    /// Create a store persisting to `storage` and syncing through `sync`.
    pub fn new(storage: Arc<dyn KeyValueStore>, sync: SyncEngine) -> Self {
        Self {
            storage,
            sync,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The sync engine mutations are scheduled on.
    pub const fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    /// The underlying storage.
    pub fn storage(&self) -> &dyn KeyValueStore {
        self.storage.as_ref()
    }

    /// Current state for a game. Absent or corrupt storage reads as an
    /// empty backpack.
    pub fn read(&self, slug: &Slug) -> BackpackState {
        match self.storage.get(&backpack_key(slug)) {
            Ok(Some(raw)) => normalize_str(&raw),
            Ok(None) => BackpackState::default(),
            Err(e) => {
                warn!(slug = %slug, error = %e, "backpack read failed; using empty state");
                BackpackState::default()
            }
        }
    }

    /// Replace the whole state.
    pub fn write(&self, slug: &Slug, state: BackpackState) -> BackpackState {
        self.mutate(slug, |current| *current = state)
    }

    /// Add (or with a negative `delta`, subtract) points.
    pub fn add_points(&self, slug: &Slug, delta: i64) -> BackpackState {
        self.mutate(slug, |s| s.points = s.points.saturating_add(delta))
    }

    /// Prepend an item to the finds pocket.
    pub fn add_find(&self, slug: &Slug, item: PocketItem) -> BackpackState {
        self.add_item(slug, Pocket::Finds, item)
    }

    /// Prepend an item to the photos pocket.
    pub fn add_photo(&self, slug: &Slug, item: PocketItem) -> BackpackState {
        self.add_item(slug, Pocket::Photos, item)
    }

    /// Prepend an item to the rewards pocket.
    pub fn add_reward(&self, slug: &Slug, item: PocketItem) -> BackpackState {
        self.add_item(slug, Pocket::Rewards, item)
    }

    /// Prepend an item to the utilities pocket.
    pub fn add_utility(&self, slug: &Slug, item: PocketItem) -> BackpackState {
        self.add_item(slug, Pocket::Utilities, item)
    }

    /// Prepend an item to the clues pocket.
    pub fn add_clue(&self, slug: &Slug, item: PocketItem) -> BackpackState {
        self.add_item(slug, Pocket::Clues, item)
    }

    /// Prepend an item to `pocket`.
    ///
    /// An empty id is replaced with a generated one, a missing `addedAt` is
    /// stamped now, and an existing item with the same id is replaced.
    pub fn add_item(&self, slug: &Slug, pocket: Pocket, mut item: PocketItem) -> BackpackState {
        if item.id.is_empty() {
            item.id = generate_item_id();
        }
        item.added_at.get_or_insert_with(now_ms);
        debug!(slug = %slug, pocket = %pocket, item = %item.id, "adding pocket item");
        self.mutate(slug, |s| {
            let items = s.pockets.get_mut(pocket);
            items.retain(|existing| existing.id != item.id);
            items.insert(0, item);
        })
    }

    /// Remove an item by id. Unknown ids leave the state untouched.
    pub fn remove_pocket_item(&self, slug: &Slug, pocket: Pocket, id: &str) -> BackpackState {
        self.take_pocket_item(slug, pocket, id)
            .map_or_else(|| self.read(slug), |(_, state)| state)
    }

    /// Remove an item and return it along with the new state.
    ///
    /// `None` (and no write, no sync) when the pocket holds no such item.
    pub fn take_pocket_item(
        &self,
        slug: &Slug,
        pocket: Pocket,
        id: &str,
    ) -> Option<(PocketItem, BackpackState)> {
        let _guard = self.lock();
        let mut state = self.read(slug);
        let items = state.pockets.get_mut(pocket);
        let index = items.iter().position(|item| item.id == id)?;
        let item = items.remove(index);
        let state = self.commit(slug, state);
        Some((item, state))
    }

    /// Record an answer to a mission, replacing any earlier answer.
    pub fn record_answer(
        &self,
        slug: &Slug,
        mission: &MissionId,
        correct: bool,
        value: Value,
    ) -> BackpackState {
        info!(slug = %slug, mission = %mission, correct, "answer recorded");
        self.mutate(slug, |s| {
            s.answers.insert(
                mission.clone(),
                Answer {
                    correct,
                    value,
                    ts: now_ms(),
                },
            );
        })
    }

    /// Stamp the most recent entry into a geofence.
    pub fn mark_geofence_visit(&self, slug: &Slug, feature: &FeatureId) -> BackpackState {
        self.mutate(slug, |s| {
            s.visits.geofences.insert(feature.clone(), now_ms());
        })
    }

    /// Clear the backpack. The empty state is persisted and pushed like
    /// any other mutation.
    pub fn reset(&self, slug: &Slug) -> BackpackState {
        info!(slug = %slug, "backpack reset");
        self.write(slug, BackpackState::default())
    }

    /// Pull the remote copy and adopt it.
    ///
    /// A remote state overwrites local state without scheduling a push. A
    /// remote with no state for the slug, or any remote failure, keeps the
    /// local state.
    pub async fn load(&self, slug: &Slug) -> BackpackState {
        match self.sync.remote().fetch_backpack(slug).await {
            Ok(Some(remote)) => {
                let state = normalize_value(&remote);
                let _guard = self.lock();
                self.persist(slug, &state);
                info!(slug = %slug, points = state.points, items = state.pockets.item_count(), "backpack loaded from remote");
                state
            }
            Ok(None) => {
                debug!(slug = %slug, "remote has no backpack; keeping local state");
                self.read(slug)
            }
            Err(e) => {
                warn!(slug = %slug, error = %e, "backpack load failed; keeping local state");
                self.read(slug)
            }
        }
    }

    fn mutate(&self, slug: &Slug, apply: impl FnOnce(&mut BackpackState)) -> BackpackState {
        let _guard = self.lock();
        let mut state = self.read(slug);
        apply(&mut state);
        self.commit(slug, state)
    }

    /// Normalize, persist and schedule sync. Caller holds the lock.
    fn commit(&self, slug: &Slug, state: BackpackState) -> BackpackState {
        let state = normalize(state);
        self.persist(slug, &state);
        self.sync.schedule(slug, state.clone());
        state
    }

    fn persist(&self, slug: &Slug, state: &BackpackState) {
        if let Err(e) = write_json(self.storage.as_ref(), &backpack_key(slug), state) {
            warn!(slug = %slug, error = %e, "backpack persist failed");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
