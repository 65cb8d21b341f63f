//! Records geofence entries in the backpack.

use std::collections::HashMap;

use tracing::info;
use trailhead_backpack::BackpackStore;
use trailhead_events::{EventChannel, Subscription};
use trailhead_types::{EngineEvent, EventKind, FeatureId, GeofenceFeature, Slug};

/// On every ENTER, stamp the visit and award the feature's points.
pub fn record_visits(
    channel: &EventChannel,
    store: BackpackStore,
    slug: Slug,
    features: &[GeofenceFeature],
) -> Subscription {
    let points: HashMap<FeatureId, i64> = features
        .iter()
        .filter(|f| f.points != 0)
        .map(|f| (f.id.clone(), f.points))
        .collect();

    channel.on(EventKind::Enter, move |event| {
        let EngineEvent::Enter(transition) = event else {
            return;
        };
        let id = &transition.feature_id;
        let mut state = store.mark_geofence_visit(&slug, id);
        if let Some(award) = points.get(id).copied() {
            state = store.add_points(&slug, award);
            info!(feature = %id, award, total = state.points, "points awarded");
        }
        info!(
            feature = %id,
            visits = state.visits.geofences.len(),
            "visit recorded"
        );
    })
}
