//! Binds a [`GeofenceEvaluator`] to an [`EventChannel`].
//!
//! The monitor subscribes to position events, runs the evaluator, and
//! publishes each transition followed by the UI action hints derived from
//! it:
//!
//! | Transition | Hints |
//! |------------|-------|
//! | ENTER | `Show`, then `Play` for autoplaying audio/video |
//! | EXIT | `Pause` for audio/video, then `Hide` |

use std::sync::{Arc, Mutex, PoisonError};

use trailhead_events::{EventChannel, Subscription, WeakEventChannel};
use trailhead_types::{
    EngineEvent, EventKind, FeatureId, GeofenceFeature, UiAction, UiActionKind,
};

use crate::evaluator::{GeofenceEvaluator, GeofenceRuntimeState, Transition};

/// Live geofence evaluation wired to an event channel.
///
/// Dropping the monitor (or calling [`GeofenceMonitor::detach`]) removes
/// its position subscription.
#[derive(Debug)]
pub struct GeofenceMonitor {
    evaluator: Arc<Mutex<GeofenceEvaluator>>,
    subscription: Option<Subscription>,
}

impl GeofenceMonitor {
    /// Subscribe `evaluator` to position events on `channel`.
    pub fn attach(channel: &EventChannel, evaluator: GeofenceEvaluator) -> Self {
        let evaluator = Arc::new(Mutex::new(evaluator));
        let shared = Arc::clone(&evaluator);
        let out = channel.downgrade();

        let subscription = channel.on(EventKind::Position, move |event| {
            let EngineEvent::Position(sample) = event else {
                return;
            };
            // Evaluate under the lock, publish after releasing it so
            // handlers can query the monitor.
            let outcomes: Vec<(Transition, bool)> = {
                let mut eval = shared.lock().unwrap_or_else(PoisonError::into_inner);
                let transitions = eval.evaluate(sample);
                transitions
                    .into_iter()
                    .map(|t| {
                        let autoplay = eval
                            .feature(&t.detail().feature_id)
                            .is_some_and(|f| f.autoplay);
                        (t, autoplay)
                    })
                    .collect()
            };
            for (transition, autoplay) in outcomes {
                publish(&out, transition, autoplay);
            }
        });

        Self {
            evaluator,
            subscription: Some(subscription),
        }
    }

    /// Replace the feature set, discarding runtime state.
    pub fn set_features(&self, features: Vec<GeofenceFeature>) {
        self.lock().set_features(features);
    }

    /// Runtime state of a feature.
    pub fn state(&self, id: &FeatureId) -> Option<GeofenceRuntimeState> {
        self.lock().state(id)
    }

    /// Whether a feature is currently visible.
    pub fn is_visible(&self, id: &FeatureId) -> bool {
        self.lock().is_visible(id)
    }

    /// Ids of every visible feature.
    pub fn visible_features(&self) -> Vec<FeatureId> {
        self.lock().visible_features()
    }

    /// A copy of the configured features.
    pub fn features(&self) -> Vec<GeofenceFeature> {
        self.lock().features().to_vec()
    }

    /// Whether the monitor still receives position events.
    pub fn is_attached(&self) -> bool {
        self.subscription.as_ref().is_some_and(Subscription::is_active)
    }

    /// Stop receiving position events. Idempotent.
    pub fn detach(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GeofenceEvaluator> {
        self.evaluator.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Emit a transition and its derived UI hints.
fn publish(channel: &WeakEventChannel, transition: Transition, autoplay: bool) {
    let playable = transition.detail().media_type.is_playable();
    let feature_id = transition.detail().feature_id.clone();
    let hint = |action| {
        EngineEvent::Action(UiAction {
            feature_id: feature_id.clone(),
            action,
        })
    };

    match transition {
        Transition::Enter(detail) => {
            channel.emit(&EngineEvent::Enter(detail));
            channel.emit(&hint(UiActionKind::Show));
            if playable && autoplay {
                channel.emit(&hint(UiActionKind::Play));
            }
        }
        Transition::Exit(detail) => {
            channel.emit(&EngineEvent::Exit(detail));
            if playable {
                channel.emit(&hint(UiActionKind::Pause));
            }
            channel.emit(&hint(UiActionKind::Hide));
        }
    }
}
