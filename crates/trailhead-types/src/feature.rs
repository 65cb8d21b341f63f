//! Geofence features as authored in a game's content bundle.
//!
//! Features are immutable for the lifetime of a loaded game. The engine only
//! reads them; the authoring tool owns them.

use serde::{Deserialize, Serialize};

use crate::geo::LatLng;
use crate::ids::FeatureId;

/// Kind of media a feature reveals when the player enters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// A still image overlay.
    Image,
    /// A video overlay.
    Video,
    /// A text card.
    Text,
    /// An audio clip.
    Audio,
}

impl MediaType {
    /// Whether the media has a play/pause lifecycle.
    pub const fn is_playable(self) -> bool {
        matches!(self, Self::Video | Self::Audio)
    }

    /// Lowercase name as used on the wire.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }
}

/// A circular geofence and the media it triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeofenceFeature {
    /// Feature identifier.
    pub id: FeatureId,
    /// Center of the circle.
    pub coordinates: LatLng,
    /// Radius of the circle in meters.
    pub radius_meters: f64,
    /// Media revealed on entry.
    #[serde(rename = "type")]
    pub media_type: MediaType,
    /// Minimum time after an exit before the feature can fire again.
    #[serde(default)]
    pub cooldown_seconds: Option<u32>,
    /// Start playback immediately on entry (audio and video only).
    #[serde(default)]
    pub autoplay: bool,
    /// Loop playback (audio and video only).
    #[serde(default, rename = "loop")]
    pub looping: bool,
    /// Media reference resolved by the renderer.
    #[serde(default)]
    pub media_url: Option<String>,
    /// Display title.
    #[serde(default)]
    pub title: Option<String>,
    /// Body text for text cards.
    #[serde(default)]
    pub text: Option<String>,
    /// Points awarded the first time the player enters the feature.
    #[serde(default)]
    pub points: i64,
}

impl GeofenceFeature {
    /// Create a feature with no cooldown, media reference or points.
    pub fn new(
        id: impl Into<FeatureId>,
        coordinates: LatLng,
        radius_meters: f64,
        media_type: MediaType,
    ) -> Self {
        Self {
            id: id.into(),
            coordinates,
            radius_meters,
            media_type,
            cooldown_seconds: None,
            autoplay: false,
            looping: false,
            media_url: None,
            title: None,
            text: None,
            points: 0,
        }
    }

    /// Set the re-entry cooldown.
    #[must_use]
    pub const fn with_cooldown(mut self, seconds: u32) -> Self {
        self.cooldown_seconds = Some(seconds);
        self
    }

    /// Enable autoplay.
    #[must_use]
    pub const fn with_autoplay(mut self) -> Self {
        self.autoplay = true;
        self
    }

    /// Cooldown in milliseconds, if one is configured and non-zero.
    pub fn cooldown_ms(&self) -> Option<i64> {
        self.cooldown_seconds
            .filter(|s| *s > 0)
            .map(|s| i64::from(s).saturating_mul(1000))
    }
}
