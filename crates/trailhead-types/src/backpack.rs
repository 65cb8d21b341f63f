//! The player's backpack: points, pockets of collected items, answers and
//! visit history.
//!
//! The wire format is the camelCase JSON the remote API stores, so every
//! struct here carries `#[serde(default)]` and tolerates missing fields.
//! Stricter repair of malformed content lives in the backpack crate's
//! normalizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{FeatureId, MissionId};

/// One of the five fixed pockets in a backpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pocket {
    /// Items found in the world.
    Finds,
    /// Photos taken during play.
    Photos,
    /// Rewards granted by missions.
    Rewards,
    /// Usable tools.
    Utilities,
    /// Clues towards a solution.
    Clues,
}

impl Pocket {
    /// Every pocket, in display order.
    pub const ALL: [Self; 5] = [
        Self::Finds,
        Self::Photos,
        Self::Rewards,
        Self::Utilities,
        Self::Clues,
    ];

    /// Lowercase name as used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Finds => "finds",
            Self::Photos => "photos",
            Self::Rewards => "rewards",
            Self::Utilities => "utilities",
            Self::Clues => "clues",
        }
    }

    /// Parse a pocket name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

impl core::fmt::Display for Pocket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An item stored in a pocket.
///
/// Apart from `id` and `addedAt` the item is free-form JSON authored by the
/// content bundle (name, image, description and so on).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PocketItem {
    /// Item identifier, unique within its pocket.
    pub id: String,
    /// When the item was added, in Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_at: Option<i64>,
    /// Remaining authored fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl PocketItem {
    /// Create an item with the given id and no extra fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            added_at: None,
            fields: Map::new(),
        }
    }

    /// Attach an authored field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// JSON snapshot of the whole item, as recorded in drop logs.
    pub fn to_snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// The five pockets of a backpack.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pockets {
    /// Items found in the world.
    pub finds: Vec<PocketItem>,
    /// Photos taken during play.
    pub photos: Vec<PocketItem>,
    /// Rewards granted by missions.
    pub rewards: Vec<PocketItem>,
    /// Usable tools.
    pub utilities: Vec<PocketItem>,
    /// Clues towards a solution.
    pub clues: Vec<PocketItem>,
}

impl Pockets {
    /// Borrow a pocket's items.
    pub const fn get(&self, pocket: Pocket) -> &Vec<PocketItem> {
        match pocket {
            Pocket::Finds => &self.finds,
            Pocket::Photos => &self.photos,
            Pocket::Rewards => &self.rewards,
            Pocket::Utilities => &self.utilities,
            Pocket::Clues => &self.clues,
        }
    }

    /// Mutably borrow a pocket's items.
    pub const fn get_mut(&mut self, pocket: Pocket) -> &mut Vec<PocketItem> {
        match pocket {
            Pocket::Finds => &mut self.finds,
            Pocket::Photos => &mut self.photos,
            Pocket::Rewards => &mut self.rewards,
            Pocket::Utilities => &mut self.utilities,
            Pocket::Clues => &mut self.clues,
        }
    }

    /// Total number of items across all pockets.
    pub fn item_count(&self) -> usize {
        Pocket::ALL.iter().map(|p| self.get(*p).len()).sum()
    }
}

/// A recorded answer to a mission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    /// Whether the answer was judged correct.
    pub correct: bool,
    /// The submitted value (text, choice index, coordinates, ...).
    #[serde(default)]
    pub value: Value,
    /// When the answer was recorded, in Unix milliseconds.
    #[serde(default)]
    pub ts: i64,
}

/// Visit history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Visits {
    /// Most recent entry time per geofence, in Unix milliseconds.
    pub geofences: BTreeMap<FeatureId, i64>,
}

/// Everything a player has collected, answered or visited in one game.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackpackState {
    /// Score.
    pub points: i64,
    /// Collected items.
    pub pockets: Pockets,
    /// Answers keyed by mission.
    pub answers: BTreeMap<MissionId, Answer>,
    /// Visit history.
    pub visits: Visits,
}

impl BackpackState {
    /// Find an item by id within a pocket.
    pub fn find_item(&self, pocket: Pocket, id: &str) -> Option<&PocketItem> {
        self.pockets.get(pocket).iter().find(|item| item.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pocket_names_round_trip() {
        for pocket in Pocket::ALL {
            assert_eq!(Pocket::parse(pocket.as_str()), Some(pocket));
        }
        assert_eq!(Pocket::parse("satchel"), None);
    }

    #[test]
    fn item_flattens_authored_fields() {
        let item = PocketItem::new("x").with_field("name", "Coin");
        let json = item.to_snapshot();
        assert_eq!(json["id"], "x");
        assert_eq!(json["name"], "Coin");
        assert!(json.get("addedAt").is_none());
    }

    #[test]
    fn missing_fields_default() {
        let state: BackpackState =
            serde_json::from_str(r#"{"points": 3}"#).unwrap_or_default();
        assert_eq!(state.points, 3);
        assert!(state.pockets.finds.is_empty());
        assert!(state.answers.is_empty());
    }
}
