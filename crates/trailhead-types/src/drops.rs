//! Drop-log records: items a player left behind at a location.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backpack::Pocket;
use crate::ids::{DropId, Slug};

/// Where an item was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DropLocation {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Horizontal accuracy in meters, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl DropLocation {
    /// A location without an accuracy estimate.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            accuracy: None,
        }
    }
}

/// One append-only entry in a game's drop log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropLogEntry {
    /// Entry id (server-assigned, or `local-` prefixed when synthesized).
    pub id: DropId,
    /// Game the drop belongs to.
    pub slug: Slug,
    /// Pocket the item was taken from.
    pub pocket: Pocket,
    /// Snapshot of the item at the time of the drop.
    pub item: Value,
    /// Latitude of the drop.
    pub lat: f64,
    /// Longitude of the drop.
    pub lng: f64,
    /// Accuracy of the position fix, when known.
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// When the drop happened.
    pub dropped_at: DateTime<Utc>,
}

impl DropLogEntry {
    /// Build an entry with a client-generated id, stamped now.
    pub fn synthesize(slug: Slug, pocket: Pocket, item: Value, location: DropLocation) -> Self {
        Self {
            id: DropId::local(),
            slug,
            pocket,
            item,
            lat: location.lat,
            lng: location.lng,
            accuracy: location.accuracy,
            dropped_at: Utc::now(),
        }
    }

    /// Id of the dropped item, read from the snapshot.
    pub fn item_id(&self) -> Option<&str> {
        self.item.get("id").and_then(Value::as_str)
    }
}
