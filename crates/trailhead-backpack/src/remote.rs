//! Remote backpack API.
//!
//! Enum dispatch instead of an async trait, so the backend stays
//! dyn-free and cheap to clone into spawned sync tasks. [`HttpRemote`]
//! talks to the real service; [`MemoryRemote`] is an in-process stand-in
//! used for offline play and tests, with switchable failure modes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use trailhead_types::{BackpackState, DropId, DropLocation, DropLogEntry, Pocket, Slug};

use crate::error::RemoteError;

/// Body of `POST /backpack/drop`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropRequest {
    /// Game the drop belongs to.
    pub slug: Slug,
    /// Pocket the item came from.
    pub pocket: Pocket,
    /// Snapshot of the dropped item.
    pub item: Value,
    /// Where it was dropped.
    pub location: DropLocation,
}

/// Result of `GET /backpack/drops`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DropListing {
    /// Entries as the server returned them.
    pub items: Vec<DropLogEntry>,
    /// Error reported alongside the items, if any.
    pub error: Option<String>,
}

#[derive(Serialize)]
struct PushBody<'a> {
    slug: &'a Slug,
    state: &'a BackpackState,
}

#[derive(Deserialize)]
struct DropResponse {
    entry: DropLogEntry,
}

// ---------------------------------------------------------------------------
// Unified backend enum
// ---------------------------------------------------------------------------

/// A remote backpack service.
#[derive(Debug, Clone)]
pub enum RemoteBackend {
    /// HTTP API reached over `reqwest`.
    Http(HttpRemote),
    /// In-process stand-in.
    Memory(MemoryRemote),
}

impl RemoteBackend {
    /// Fetch the stored backpack for a game.
    ///
    /// `Ok(None)` means the server has no backpack for the slug yet. The
    /// state is returned raw; callers normalize it.
    pub async fn fetch_backpack(&self, slug: &Slug) -> Result<Option<Value>, RemoteError> {
        match self {
            Self::Http(remote) => remote.fetch_backpack(slug).await,
            Self::Memory(remote) => remote.fetch_backpack(slug),
        }
    }

    /// Replace the stored backpack with a full snapshot.
    pub async fn push_backpack(
        &self,
        slug: &Slug,
        state: &BackpackState,
    ) -> Result<(), RemoteError> {
        match self {
            Self::Http(remote) => remote.push_backpack(slug, state).await,
            Self::Memory(remote) => remote.push_backpack(slug, state),
        }
    }

    /// Append an entry to the drop log and return the server's record.
    pub async fn append_drop(&self, request: &DropRequest) -> Result<DropLogEntry, RemoteError> {
        match self {
            Self::Http(remote) => remote.append_drop(request).await,
            Self::Memory(remote) => remote.append_drop(request),
        }
    }

    /// List a game's drop log.
    pub async fn list_drops(&self, slug: &Slug) -> Result<DropListing, RemoteError> {
        match self {
            Self::Http(remote) => remote.list_drops(slug).await,
            Self::Memory(remote) => remote.list_drops(slug),
        }
    }

    /// Human-readable name for logging.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Memory(_) => "memory",
        }
    }
}

impl From<HttpRemote> for RemoteBackend {
    fn from(remote: HttpRemote) -> Self {
        Self::Http(remote)
    }
}

impl From<MemoryRemote> for RemoteBackend {
    fn from(remote: MemoryRemote) -> Self {
        Self::Memory(remote)
    }
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

/// Client for the backpack HTTP API rooted at a base URL.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    /// Create a client for `base_url` (e.g. `https://example.com/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn fetch_backpack(&self, slug: &Slug) -> Result<Option<Value>, RemoteError> {
        let response = self
            .client
            .get(self.url("/backpack"))
            .query(&[("slug", slug.as_str())])
            .send()
            .await
            .map_err(|e| RemoteError::Request(format!("backpack fetch failed: {e}")))?;
        let json = read_json(response).await?;
        Ok(json.get("state").filter(|s| !s.is_null()).cloned())
    }

    async fn push_backpack(&self, slug: &Slug, state: &BackpackState) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.url("/backpack"))
            .json(&PushBody { slug, state })
            .send()
            .await
            .map_err(|e| RemoteError::Request(format!("backpack push failed: {e}")))?;
        check_status(response).await?;
        Ok(())
    }

    async fn append_drop(&self, request: &DropRequest) -> Result<DropLogEntry, RemoteError> {
        let response = self
            .client
            .post(self.url("/backpack/drop"))
            .json(request)
            .send()
            .await
            .map_err(|e| RemoteError::Request(format!("drop append failed: {e}")))?;
        let response = check_status(response).await?;
        let body: DropResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(format!("drop entry: {e}")))?;
        Ok(body.entry)
    }

    async fn list_drops(&self, slug: &Slug) -> Result<DropListing, RemoteError> {
        let response = self
            .client
            .get(self.url("/backpack/drops"))
            .query(&[("slug", slug.as_str())])
            .send()
            .await
            .map_err(|e| RemoteError::Request(format!("drop list failed: {e}")))?;
        let json = read_json(response).await?;
        parse_listing(&json)
    }
}

/// Turn a non-success response into [`RemoteError::Status`].
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_owned());
    Err(RemoteError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_json(response: reqwest::Response) -> Result<Value, RemoteError> {
    check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| RemoteError::Decode(e.to_string()))
}

/// Parse a drop listing, skipping entries that do not decode.
fn parse_listing(json: &Value) -> Result<DropListing, RemoteError> {
    let items = json
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| RemoteError::Decode("drop listing without items".to_owned()))?;
    let entries: Vec<DropLogEntry> = items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect();
    if entries.len() != items.len() {
        debug!(
            skipped = items.len().saturating_sub(entries.len()),
            "skipped undecodable drop entries"
        );
    }
    Ok(DropListing {
        items: entries,
        error: json
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryRemoteState {
    backpacks: HashMap<Slug, BackpackState>,
    /// Newest first.
    drops: HashMap<Slug, Vec<DropLogEntry>>,
    pushes: Vec<(Slug, BackpackState)>,
    next_drop: u64,
    offline: bool,
    drop_log_unavailable: bool,
}

/// In-process backpack service.
///
/// Clones share state, so a test can keep one handle to inspect pushes
/// while the store owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<MemoryRemoteState>>,
}

impl MemoryRemote {
    /// Create an empty, reachable remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`RemoteError::Unreachable`].
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Make drop appends fail and drop listings come back empty with an
    /// error field, as a degraded server does.
    pub fn set_drop_log_unavailable(&self, unavailable: bool) {
        self.lock().drop_log_unavailable = unavailable;
    }

    /// Store a backpack as if another device had pushed it.
    pub fn seed_backpack(&self, slug: &Slug, state: BackpackState) {
        self.lock().backpacks.insert(slug.clone(), state);
    }

    /// The backpack currently stored for a slug.
    pub fn stored_backpack(&self, slug: &Slug) -> Option<BackpackState> {
        self.lock().backpacks.get(slug).cloned()
    }

    /// Total number of accepted pushes.
    pub fn push_count(&self) -> usize {
        self.lock().pushes.len()
    }

    /// Snapshots pushed for a slug, oldest first.
    pub fn pushes_for(&self, slug: &Slug) -> Vec<BackpackState> {
        self.lock()
            .pushes
            .iter()
            .filter(|(s, _)| s == slug)
            .map(|(_, state)| state.clone())
            .collect()
    }

    /// The drop log held for a slug, newest first.
    pub fn drops_for(&self, slug: &Slug) -> Vec<DropLogEntry> {
        self.lock().drops.get(slug).cloned().unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRemoteState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reachable(&self) -> Result<std::sync::MutexGuard<'_, MemoryRemoteState>, RemoteError> {
        let state = self.lock();
        if state.offline {
            Err(RemoteError::Unreachable)
        } else {
            Ok(state)
        }
    }

    fn fetch_backpack(&self, slug: &Slug) -> Result<Option<Value>, RemoteError> {
        let state = self.reachable()?;
        state
            .backpacks
            .get(slug)
            .map(|b| serde_json::to_value(b).map_err(|e| RemoteError::Decode(e.to_string())))
            .transpose()
    }

    fn push_backpack(&self, slug: &Slug, snapshot: &BackpackState) -> Result<(), RemoteError> {
        let mut state = self.reachable()?;
        state.backpacks.insert(slug.clone(), snapshot.clone());
        state.pushes.push((slug.clone(), snapshot.clone()));
        Ok(())
    }

    fn append_drop(&self, request: &DropRequest) -> Result<DropLogEntry, RemoteError> {
        let mut state = self.reachable()?;
        if state.drop_log_unavailable {
            return Err(RemoteError::Status {
                status: 503,
                body: "drop log unavailable".to_owned(),
            });
        }
        state.next_drop = state.next_drop.saturating_add(1);
        let entry = DropLogEntry {
            id: DropId::new(format!("drop-{}", state.next_drop)),
            slug: request.slug.clone(),
            pocket: request.pocket,
            item: request.item.clone(),
            lat: request.location.lat,
            lng: request.location.lng,
            accuracy: request.location.accuracy,
            dropped_at: Utc::now(),
        };
        state
            .drops
            .entry(request.slug.clone())
            .or_default()
            .insert(0, entry.clone());
        Ok(entry)
    }

    fn list_drops(&self, slug: &Slug) -> Result<DropListing, RemoteError> {
        let state = self.reachable()?;
        if state.drop_log_unavailable {
            return Ok(DropListing {
                items: Vec::new(),
                error: Some("drop log unavailable".to_owned()),
            });
        }
        Ok(DropListing {
            items: state.drops.get(slug).cloned().unwrap_or_default(),
            error: None,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let remote = HttpRemote::new("http://localhost:8080/api/");
        assert_eq!(remote.base_url(), "http://localhost:8080/api");
        assert_eq!(remote.url("/backpack"), "http://localhost:8080/api/backpack");
    }

    #[test]
    fn listing_skips_bad_entries_and_keeps_error() {
        let json = json!({
            "items": [
                {
                    "id": "d1", "slug": "s", "pocket": "finds", "item": {"id": "x"},
                    "lat": 1.0, "lng": 2.0, "droppedAt": "2026-01-01T00:00:00Z"
                },
                { "id": "broken" }
            ],
            "error": "partial"
        });
        let listing = parse_listing(&json).unwrap();
        assert_eq!(listing.items.len(), 1);
        assert_eq!(listing.error.as_deref(), Some("partial"));
        assert!(parse_listing(&json!({ "error": "down" })).is_err());
    }

    #[tokio::test]
    async fn memory_remote_records_pushes_and_drops() {
        let memory = MemoryRemote::new();
        let remote = RemoteBackend::from(memory.clone());
        let slug = Slug::from("hunt");

        assert!(remote.fetch_backpack(&slug).await.unwrap().is_none());
        let state = BackpackState {
            points: 5,
            ..BackpackState::default()
        };
        remote.push_backpack(&slug, &state).await.unwrap();
        assert_eq!(memory.push_count(), 1);
        assert_eq!(remote.fetch_backpack(&slug).await.unwrap().unwrap()["points"], 5);

        let request = DropRequest {
            slug: slug.clone(),
            pocket: Pocket::Finds,
            item: json!({"id": "x"}),
            location: DropLocation::new(1.0, 2.0),
        };
        let first = remote.append_drop(&request).await.unwrap();
        let second = remote.append_drop(&request).await.unwrap();
        assert!(!first.id.is_local());
        let listed = remote.list_drops(&slug).await.unwrap();
        assert_eq!(listed.items.first().map(|e| &e.id), Some(&second.id));
    }

    #[tokio::test]
    async fn memory_remote_failure_modes() {
        let memory = MemoryRemote::new();
        let remote = RemoteBackend::from(memory.clone());
        let slug = Slug::from("hunt");

        memory.set_offline(true);
        assert!(matches!(
            remote.list_drops(&slug).await,
            Err(RemoteError::Unreachable)
        ));
        memory.set_offline(false);

        memory.set_drop_log_unavailable(true);
        let listing = remote.list_drops(&slug).await.unwrap();
        assert!(listing.items.is_empty());
        assert!(listing.error.is_some());
    }
}
