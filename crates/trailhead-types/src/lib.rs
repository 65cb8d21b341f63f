//! Shared type definitions for the Trailhead scavenger-hunt engine.
//!
//! This crate is the single source of truth for the data model shared by
//! the geofence engine, the event channel and the backpack store. Every
//! type serializes to the camelCase JSON the remote API speaks.
//!
//! # Modules
//!
//! - [`ids`] -- String newtypes for slugs, features, missions and drops
//! - [`geo`] -- Coordinates and position samples
//! - [`feature`] -- Geofence features from the content bundle
//! - [`backpack`] -- Backpack state: points, pockets, answers, visits
//! - [`drops`] -- Drop-log entries
//! - [`events`] -- Events published on the engine's event channel

pub mod backpack;
pub mod drops;
pub mod events;
pub mod feature;
pub mod geo;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use backpack::{Answer, BackpackState, Pocket, PocketItem, Pockets, Visits};
pub use drops::{DropLocation, DropLogEntry};
pub use events::{
    EngineEvent, EventKind, GeofenceTransition, SettingsChange, UiAction, UiActionKind,
};
pub use feature::{GeofenceFeature, MediaType};
pub use geo::{LatLng, PositionSample};
pub use ids::{DropId, FeatureId, LOCAL_DROP_PREFIX, MissionId, Slug, generate_item_id};
