//! Error types for the `trailhead-geo` crate.

/// Reasons a position source cannot deliver samples.
///
/// None of these are fatal to the engine: the sampler logs them and stops,
/// and geofences keep their last known visibility.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    /// The player (or platform policy) denied location access.
    #[error("location permission denied")]
    PermissionDenied,

    /// The platform could not produce a fix.
    #[error("location unavailable: {0}")]
    Unavailable(String),

    /// The watch was asked to start while already running.
    #[error("position watch already started")]
    AlreadyStarted,
}
