//! Geofence evaluation and position sampling for the Trailhead engine.
//!
//! Position samples enter through a [`GeoSampler`], are published on the
//! engine's event channel, and are evaluated by a [`GeofenceMonitor`]
//! against the game's circular geofences. Transitions go back out on the
//! same channel for renderers and game logic.
//!
//! # Modules
//!
//! - [`error`] -- Location failures; the sampler logs them and stops
//! - [`geodesy`] -- Haversine distance, destination point, radius polygons
//! - [`evaluator`] -- Per-feature enter/exit state machine with cooldown
//! - [`monitor`] -- Evaluator bound to an event channel, UI action hints
//! - [`sampler`] -- Position watch contract, simulated pointer, sampler task

pub mod error;
pub mod evaluator;
pub mod geodesy;
pub mod monitor;
pub mod sampler;

// Re-export primary types at crate root.
pub use error::LocationError;
pub use evaluator::{GeofenceEvaluator, GeofenceRuntimeState, Transition};
pub use geodesy::{
    DEFAULT_POLYGON_STEPS, EARTH_RADIUS_M, destination_point, haversine_distance_m,
    radius_polygon,
};
pub use monitor::GeofenceMonitor;
pub use sampler::{
    GeoSampler, PositionWatch, SIMULATED_ACCURACY_M, SampleSink, SamplerGuard, SimulatedPointer,
    WatchUpdate,
};
