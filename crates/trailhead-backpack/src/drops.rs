//! Offline-first drop log.
//!
//! Dropping an item removes it from its pocket and appends a record to the
//! remote log. Whatever the remote says, the drop lands in a bounded local
//! cache: the server's entry when the append succeeds, a `local-` entry
//! synthesized on the client when it does not. Listing prefers the remote
//! log and falls back to the cache so a flaky connection never makes the
//! player's drops vanish.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};
use trailhead_types::{DropLocation, DropLogEntry, Pocket, Slug};

use crate::remote::DropRequest;
use crate::storage::{drops_key, read_json, write_json};
use crate::store::BackpackStore;

/// Most entries kept in a game's local drop cache.
pub const DROP_CACHE_CAP: usize = 50;

/// Drop actions and listings for every game.
#[derive(Debug, Clone)]
pub struct DropLog {
    store: BackpackStore,
    cap: usize,
    cache_lock: Arc<Mutex<()>>,
}

impl DropLog {
    /// Create a drop log over `store`, sharing its storage and remote.
    pub fn new(store: BackpackStore) -> Self {
        Self::with_capacity(store, DROP_CACHE_CAP)
    }

    /// Like [`Self::new`] with a custom cache bound.
    pub fn with_capacity(store: BackpackStore, cap: usize) -> Self {
        Self {
            store,
            cap: cap.max(1),
            cache_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Drop an item at `location`.
    ///
    /// Returns the recorded entry, or `None` when the pocket name is not
    /// recognized or the pocket holds no such item. Nothing is removed or
    /// logged in that case.
    pub async fn drop_pocket_item(
        &self,
        slug: &Slug,
        pocket: &str,
        item_id: &str,
        location: DropLocation,
    ) -> Option<DropLogEntry> {
        let Some(pocket) = Pocket::parse(pocket) else {
            warn!(slug = %slug, pocket, "drop from unknown pocket ignored");
            return None;
        };
        let Some((item, _)) = self.store.take_pocket_item(slug, pocket, item_id) else {
            debug!(slug = %slug, pocket = %pocket, item = item_id, "drop of absent item ignored");
            return None;
        };

        let request = DropRequest {
            slug: slug.clone(),
            pocket,
            item: item.to_snapshot(),
            location,
        };
        let entry = match self.store.sync().remote().append_drop(&request).await {
            Ok(entry) => {
                info!(slug = %slug, entry = %entry.id, item = item_id, "drop recorded remotely");
                entry
            }
            Err(e) => {
                let entry =
                    DropLogEntry::synthesize(request.slug, request.pocket, request.item, location);
                warn!(slug = %slug, entry = %entry.id, error = %e, "drop append failed; cached locally");
                entry
            }
        };

        self.cache_entry(slug, entry.clone());
        Some(entry)
    }

    /// Drops for a game, newest first.
    ///
    /// Falls back to the local cache when the remote fails or answers with
    /// an empty list and an error. On a clean answer, locally synthesized
    /// entries the server has never seen are merged in.
    pub async fn list_dropped_items(&self, slug: &Slug) -> Vec<DropLogEntry> {
        match self.store.sync().remote().list_drops(slug).await {
            Ok(listing) if listing.items.is_empty() && listing.error.is_some() => {
                warn!(
                    slug = %slug,
                    error = listing.error.as_deref().unwrap_or_default(),
                    "remote drop log degraded; using local cache"
                );
                self.cached(slug)
            }
            Ok(listing) => merge(listing.items, self.cached(slug)),
            Err(e) => {
                warn!(slug = %slug, error = %e, "drop listing failed; using local cache");
                self.cached(slug)
            }
        }
    }

    /// The local cache, newest first. Corrupt entries are skipped.
    pub fn cached(&self, slug: &Slug) -> Vec<DropLogEntry> {
        read_json::<Vec<Value>>(self.store.storage(), &drops_key(slug))
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| serde_json::from_value(raw).ok())
            .collect()
    }

    fn cache_entry(&self, slug: &Slug, entry: DropLogEntry) {
        let _guard = self.cache_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.cached(slug);
        entries.retain(|e| e.id != entry.id);
        entries.insert(0, entry);
        entries.truncate(self.cap);
        if let Err(e) = write_json(self.store.storage(), &drops_key(slug), &entries) {
            warn!(slug = %slug, error = %e, "drop cache persist failed");
        }
    }
}

/// Server entries plus local-only entries, newest first.
fn merge(server: Vec<DropLogEntry>, cached: Vec<DropLogEntry>) -> Vec<DropLogEntry> {
    let known: HashSet<_> = server.iter().map(|e| e.id.clone()).collect();
    let mut merged = server;
    merged.extend(
        cached
            .into_iter()
            .filter(|e| e.id.is_local() && !known.contains(&e.id)),
    );
    merged.sort_by(|a, b| b.dropped_at.cmp(&a.dropped_at));
    merged
}
