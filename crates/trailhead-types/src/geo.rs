//! Coordinates and position samples.

use serde::{Deserialize, Serialize};

/// A point on the Earth's surface in decimal degrees (WGS84).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    /// Latitude in degrees, positive north.
    pub lat: f64,
    /// Longitude in degrees, positive east.
    pub lng: f64,
}

impl LatLng {
    /// Create a coordinate pair.
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// One raw reading from a position source.
///
/// Transient: the geofence evaluator consumes each sample once and keeps
/// only the most recent one. Platform watches and the simulated pointer
/// produce the same shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Reported horizontal accuracy radius in meters.
    #[serde(default)]
    pub accuracy_meters: f64,
    /// Wall-clock time of the reading in Unix milliseconds.
    pub timestamp_ms: i64,
}

impl PositionSample {
    /// Create a sample from explicit parts.
    pub const fn new(lat: f64, lng: f64, accuracy_meters: f64, timestamp_ms: i64) -> Self {
        Self {
            lat,
            lng,
            accuracy_meters,
            timestamp_ms,
        }
    }

    /// Create a sample stamped with the current wall-clock time.
    pub fn now(lat: f64, lng: f64, accuracy_meters: f64) -> Self {
        Self::new(
            lat,
            lng,
            accuracy_meters,
            chrono::Utc::now().timestamp_millis(),
        )
    }

    /// The sample's coordinates.
    pub const fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}
