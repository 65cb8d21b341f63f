//! Per-feature enter/exit state machine with re-entry cooldown.
//!
//! Each feature is either hidden or visible. A sample inside the radius
//! turns a hidden feature visible (ENTER) unless the feature is still
//! cooling down from its last exit; a sample outside the radius turns a
//! visible feature hidden (EXIT). Cooldown only ever gates ENTER: an exit
//! fires as soon as the player leaves, so a feature can never get stuck
//! visible.
//!
//! "Now" is the timestamp of the sample being evaluated. Samples are
//! processed in arrival order, even if a platform delivers a timestamp older
//! than the previous one.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};
use trailhead_types::{
    FeatureId, GeofenceFeature, GeofenceTransition, PositionSample,
};

use crate::geodesy::haversine_distance_m;

/// Runtime bookkeeping for one feature.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeofenceRuntimeState {
    /// Whether the feature's content is currently shown.
    pub visible: bool,
    /// Timestamp of the most recent EXIT, in Unix milliseconds.
    pub last_exit_ms: Option<i64>,
}

/// A state change produced by [`GeofenceEvaluator::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// hidden → visible.
    Enter(GeofenceTransition),
    /// visible → hidden.
    Exit(GeofenceTransition),
}

impl Transition {
    /// The transition payload regardless of direction.
    pub const fn detail(&self) -> &GeofenceTransition {
        match self {
            Self::Enter(t) | Self::Exit(t) => t,
        }
    }
}

/// Evaluates position samples against a fixed set of geofences.
#[derive(Debug, Default)]
pub struct GeofenceEvaluator {
    features: Vec<GeofenceFeature>,
    states: BTreeMap<FeatureId, GeofenceRuntimeState>,
    last_sample: Option<PositionSample>,
}

impl GeofenceEvaluator {
    /// Create an evaluator for `features`. Runtime state starts empty and
    /// is created lazily on first evaluation.
    pub fn new(features: Vec<GeofenceFeature>) -> Self {
        Self {
            features,
            states: BTreeMap::new(),
            last_sample: None,
        }
    }

    /// Replace the feature set (e.g. on game reload), discarding all
    /// runtime state.
    pub fn set_features(&mut self, features: Vec<GeofenceFeature>) {
        info!(count = features.len(), "geofence feature set rebuilt");
        self.features = features;
        self.states.clear();
        self.last_sample = None;
    }

    /// The configured features, in evaluation order.
    pub fn features(&self) -> &[GeofenceFeature] {
        &self.features
    }

    /// Look up a feature by id.
    pub fn feature(&self, id: &FeatureId) -> Option<&GeofenceFeature> {
        self.features.iter().find(|f| &f.id == id)
    }

    /// Runtime state of a feature, if it has been evaluated at least once.
    pub fn state(&self, id: &FeatureId) -> Option<GeofenceRuntimeState> {
        self.states.get(id).copied()
    }

    /// Whether a feature is currently visible.
    pub fn is_visible(&self, id: &FeatureId) -> bool {
        self.states.get(id).is_some_and(|s| s.visible)
    }

    /// Ids of every visible feature.
    pub fn visible_features(&self) -> Vec<FeatureId> {
        self.states
            .iter()
            .filter(|(_, s)| s.visible)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// The most recently evaluated sample.
    pub const fn last_sample(&self) -> Option<&PositionSample> {
        self.last_sample.as_ref()
    }

    /// Evaluate one sample against every feature and return the resulting
    /// transitions in feature order.
    ///
    /// Samples with non-finite coordinates are ignored.
    pub fn evaluate(&mut self, sample: &PositionSample) -> Vec<Transition> {
        if !(sample.lat.is_finite() && sample.lng.is_finite()) {
            warn!(lat = sample.lat, lng = sample.lng, "ignoring non-finite position sample");
            return Vec::new();
        }

        let now = sample.timestamp_ms;
        let here = sample.location();
        let mut transitions = Vec::new();

        for feature in &self.features {
            let distance_m = haversine_distance_m(here, feature.coordinates);
            let state = self.states.entry(feature.id.clone()).or_default();
            let inside = distance_m <= feature.radius_meters;

            let detail = || GeofenceTransition {
                feature_id: feature.id.clone(),
                media_type: feature.media_type,
                distance_m,
                timestamp_ms: now,
            };

            if inside && !state.visible {
                if cooldown_elapsed(feature, state, now) {
                    state.visible = true;
                    info!(feature = %feature.id, distance_m, "geofence enter");
                    transitions.push(Transition::Enter(detail()));
                } else {
                    debug!(
                        feature = %feature.id,
                        distance_m,
                        last_exit_ms = ?state.last_exit_ms,
                        "re-entry suppressed by cooldown"
                    );
                }
            } else if !inside && state.visible {
                state.visible = false;
                state.last_exit_ms = Some(now);
                info!(feature = %feature.id, distance_m, "geofence exit");
                transitions.push(Transition::Exit(detail()));
            }
        }

        self.last_sample = Some(*sample);
        transitions
    }
}

/// Whether a feature may fire ENTER at `now`.
fn cooldown_elapsed(feature: &GeofenceFeature, state: &GeofenceRuntimeState, now: i64) -> bool {
    match (feature.cooldown_ms(), state.last_exit_ms) {
        (Some(cooldown), Some(exited)) => now.saturating_sub(exited) >= cooldown,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use trailhead_types::{LatLng, MediaType};

    use super::*;
    use crate::geodesy::destination_point;

    const CENTER: LatLng = LatLng::new(44.9778, -93.2650);

    fn sample_at(distance_m: f64, timestamp_ms: i64) -> PositionSample {
        let p = destination_point(CENTER, 90.0, distance_m);
        PositionSample::new(p.lat, p.lng, 5.0, timestamp_ms)
    }

    fn feature(cooldown: Option<u32>) -> GeofenceFeature {
        let f = GeofenceFeature::new("f1", CENTER, 50.0, MediaType::Image);
        match cooldown {
            Some(s) => f.with_cooldown(s),
            None => f,
        }
    }

    #[test]
    fn state_is_created_lazily() {
        let mut eval = GeofenceEvaluator::new(vec![feature(None)]);
        let id = FeatureId::from("f1");
        assert_eq!(eval.state(&id), None);
        eval.evaluate(&sample_at(500.0, 0));
        assert_eq!(eval.state(&id), Some(GeofenceRuntimeState::default()));
    }

    #[test]
    fn enter_and_exit_without_cooldown() {
        let mut eval = GeofenceEvaluator::new(vec![feature(None)]);
        let id = FeatureId::from("f1");

        let t = eval.evaluate(&sample_at(10.0, 0));
        assert!(matches!(t.as_slice(), [Transition::Enter(_)]));
        assert!(eval.is_visible(&id));

        let t = eval.evaluate(&sample_at(80.0, 1_000));
        assert!(matches!(t.as_slice(), [Transition::Exit(_)]));
        assert!(!eval.is_visible(&id));
        assert_eq!(eval.state(&id).and_then(|s| s.last_exit_ms), Some(1_000));

        // No cooldown: immediate re-entry.
        let t = eval.evaluate(&sample_at(10.0, 1_001));
        assert!(matches!(t.as_slice(), [Transition::Enter(_)]));
    }

    #[test]
    fn repeated_samples_are_idempotent() {
        let mut eval = GeofenceEvaluator::new(vec![feature(None)]);
        assert_eq!(eval.evaluate(&sample_at(10.0, 0)).len(), 1);
        assert!(eval.evaluate(&sample_at(20.0, 100)).is_empty());
        assert!(eval.evaluate(&sample_at(30.0, 200)).is_empty());
        assert_eq!(eval.evaluate(&sample_at(90.0, 300)).len(), 1);
        assert!(eval.evaluate(&sample_at(95.0, 400)).is_empty());
    }

    #[test]
    fn boundary_counts_as_inside() {
        let mut eval = GeofenceEvaluator::new(vec![GeofenceFeature::new(
            "edge",
            CENTER,
            50.0,
            MediaType::Text,
        )]);
        let t = eval.evaluate(&sample_at(49.999, 0));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn cooldown_blocks_enter_but_never_exit() {
        let mut eval = GeofenceEvaluator::new(vec![feature(Some(30))]);
        let id = FeatureId::from("f1");

        eval.evaluate(&sample_at(10.0, 0));
        eval.evaluate(&sample_at(70.0, 1_000));
        // Inside again during cooldown: stays hidden.
        assert!(eval.evaluate(&sample_at(10.0, 2_000)).is_empty());
        assert!(!eval.is_visible(&id));
        // Leaving while hidden is not an exit.
        assert!(eval.evaluate(&sample_at(70.0, 3_000)).is_empty());
        assert_eq!(eval.state(&id).and_then(|s| s.last_exit_ms), Some(1_000));
        // Cooldown elapsed exactly.
        let t = eval.evaluate(&sample_at(10.0, 31_000));
        assert!(matches!(t.as_slice(), [Transition::Enter(_)]));
        // Exit fires immediately even though the previous exit was recent.
        let t = eval.evaluate(&sample_at(70.0, 31_500));
        assert!(matches!(t.as_slice(), [Transition::Exit(_)]));
        assert!(!eval.is_visible(&id));
    }

    #[test]
    fn transitions_follow_feature_order() {
        let near = GeofenceFeature::new("b", CENTER, 100.0, MediaType::Audio);
        let far = GeofenceFeature::new("a", CENTER, 200.0, MediaType::Video);
        let mut eval = GeofenceEvaluator::new(vec![near, far]);
        let t = eval.evaluate(&sample_at(50.0, 0));
        let ids: Vec<&str> = t.iter().map(|t| t.detail().feature_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert_eq!(eval.visible_features().len(), 2);
    }

    #[test]
    fn rebuilding_features_discards_state() {
        let mut eval = GeofenceEvaluator::new(vec![feature(Some(30))]);
        eval.evaluate(&sample_at(10.0, 0));
        eval.evaluate(&sample_at(70.0, 1_000));
        eval.set_features(vec![feature(Some(30))]);
        assert!(eval.last_sample().is_none());
        // Fresh state: no cooldown history.
        assert_eq!(eval.evaluate(&sample_at(10.0, 2_000)).len(), 1);
    }

    #[test]
    fn non_finite_samples_are_ignored() {
        let mut eval = GeofenceEvaluator::new(vec![feature(None)]);
        eval.evaluate(&sample_at(10.0, 0));
        let t = eval.evaluate(&PositionSample::new(f64::NAN, 0.0, 5.0, 10));
        assert!(t.is_empty());
        assert!(eval.is_visible(&FeatureId::from("f1")));
    }
}
