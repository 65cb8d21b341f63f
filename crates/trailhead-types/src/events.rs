//! The event taxonomy carried by the engine's event channel.
//!
//! Events flow one way: position samples in, geofence transitions and UI
//! action hints out. Renderers and game logic subscribe by [`EventKind`].

use serde::{Deserialize, Serialize};

use crate::feature::MediaType;
use crate::geo::PositionSample;
use crate::ids::FeatureId;

/// Subscription key: the discriminant of an [`EngineEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A new position sample.
    Position,
    /// A feature became visible.
    Enter,
    /// A feature became hidden.
    Exit,
    /// A player setting was toggled.
    Settings,
    /// A UI action hint derived from a transition.
    Action,
}

/// A state change of one geofence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceTransition {
    /// The feature that changed state.
    pub feature_id: FeatureId,
    /// Media type of the feature.
    pub media_type: MediaType,
    /// Distance from the sample to the feature's center, in meters.
    pub distance_m: f64,
    /// Timestamp of the sample that caused the transition.
    pub timestamp_ms: i64,
}

/// A toggled player setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettingsChange {
    /// Audio playback enabled or muted.
    Audio(bool),
    /// Diagnostic overlays on or off.
    Debug(bool),
    /// Pointer-driven simulated position on or off.
    Simulate(bool),
}

/// What a renderer should do with a feature's media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UiActionKind {
    /// Reveal the overlay.
    Show,
    /// Remove the overlay.
    Hide,
    /// Start playback.
    Play,
    /// Pause playback.
    Pause,
}

/// A UI hint for one feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiAction {
    /// Target feature.
    pub feature_id: FeatureId,
    /// Requested action.
    pub action: UiActionKind,
}

/// Everything published on the event channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A position sample from the active source.
    Position(PositionSample),
    /// A feature transitioned hidden → visible.
    Enter(GeofenceTransition),
    /// A feature transitioned visible → hidden.
    Exit(GeofenceTransition),
    /// A setting changed.
    Settings(SettingsChange),
    /// A UI hint derived from an enter or exit.
    Action(UiAction),
}

impl EngineEvent {
    /// The subscription key for this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Position(_) => EventKind::Position,
            Self::Enter(_) => EventKind::Enter,
            Self::Exit(_) => EventKind::Exit,
            Self::Settings(_) => EventKind::Settings,
            Self::Action(_) => EventKind::Action,
        }
    }
}
