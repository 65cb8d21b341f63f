//! Headless overlay renderer.
//!
//! Applies UI action hints the way the map view would (show, hide, play,
//! pause) and logs each change. Playback honors the audio setting, which
//! arrives as a settings event like everything else. Current overlay state
//! is kept for the end-of-run summary.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};
use trailhead_events::{EventChannel, Subscription};
use trailhead_geo::{DEFAULT_POLYGON_STEPS, radius_polygon};
use trailhead_types::{
    EngineEvent, EventKind, FeatureId, GeofenceFeature, SettingsChange, UiAction, UiActionKind,
};

#[derive(Debug, Default)]
struct OverlayState {
    visible: BTreeSet<FeatureId>,
    playing: BTreeSet<FeatureId>,
    audio: bool,
    shown_total: u64,
}

/// Overlay state driven by action and settings events.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    state: Arc<Mutex<OverlayState>>,
}

impl OverlayRenderer {
    /// Create a renderer with audio on or muted.
    pub fn new(audio: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(OverlayState {
                audio,
                ..OverlayState::default()
            })),
        }
    }

    /// Subscribe to action and settings events.
    pub fn subscribe(&self, channel: &EventChannel) -> Vec<Subscription> {
        let actions = self.clone();
        let settings = self.clone();
        vec![
            channel.on(EventKind::Action, move |event| {
                if let EngineEvent::Action(action) = event {
                    actions.apply(action);
                }
            }),
            channel.on(EventKind::Settings, move |event| {
                if let EngineEvent::Settings(change) = event {
                    settings.apply_setting(*change);
                }
            }),
        ]
    }

    /// Features whose overlay is shown.
    pub fn visible(&self) -> Vec<FeatureId> {
        self.lock().visible.iter().cloned().collect()
    }

    /// Features whose media is playing.
    pub fn playing(&self) -> Vec<FeatureId> {
        self.lock().playing.iter().cloned().collect()
    }

    /// How many times any overlay has been shown.
    pub fn shown_total(&self) -> u64 {
        self.lock().shown_total
    }

    fn apply(&self, action: &UiAction) {
        let mut state = self.lock();
        let id = &action.feature_id;
        match action.action {
            UiActionKind::Show => {
                state.visible.insert(id.clone());
                state.shown_total = state.shown_total.saturating_add(1);
                info!(feature = %id, "overlay shown");
            }
            UiActionKind::Hide => {
                state.visible.remove(id);
                state.playing.remove(id);
                info!(feature = %id, "overlay hidden");
            }
            UiActionKind::Play if state.audio => {
                state.playing.insert(id.clone());
                info!(feature = %id, "media playing");
            }
            UiActionKind::Play => debug!(feature = %id, "autoplay skipped, audio muted"),
            UiActionKind::Pause => {
                if state.playing.remove(id) {
                    info!(feature = %id, "media paused");
                }
            }
        }
    }

    fn apply_setting(&self, change: SettingsChange) {
        if let SettingsChange::Audio(on) = change {
            let mut state = self.lock();
            state.audio = on;
            if !on && !state.playing.is_empty() {
                info!(count = state.playing.len(), "audio muted; pausing media");
                state.playing.clear();
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OverlayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Log each feature's radius as a closed `[lng, lat]` ring.
pub fn log_radius_polygons(features: &[GeofenceFeature]) {
    for feature in features {
        let ring: Vec<[f64; 2]> =
            radius_polygon(feature.coordinates, feature.radius_meters, DEFAULT_POLYGON_STEPS)
                .into_iter()
                .map(|p| [p.lng, p.lat])
                .collect();
        let polygon = serde_json::to_string(&ring).unwrap_or_default();
        info!(
            feature = %feature.id,
            radius_m = feature.radius_meters,
            vertices = ring.len(),
            polygon,
            "debug radius polygon"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, action: UiActionKind) -> EngineEvent {
        EngineEvent::Action(UiAction {
            feature_id: FeatureId::from(id),
            action,
        })
    }

    #[test]
    fn show_play_pause_hide() {
        let channel = EventChannel::new();
        let renderer = OverlayRenderer::new(true);
        let _subs = renderer.subscribe(&channel);

        channel.emit(&action("a", UiActionKind::Show));
        channel.emit(&action("a", UiActionKind::Play));
        assert_eq!(renderer.visible(), vec![FeatureId::from("a")]);
        assert_eq!(renderer.playing(), vec![FeatureId::from("a")]);

        channel.emit(&action("a", UiActionKind::Pause));
        channel.emit(&action("a", UiActionKind::Hide));
        assert!(renderer.visible().is_empty());
        assert!(renderer.playing().is_empty());
        assert_eq!(renderer.shown_total(), 1);
    }

    #[test]
    fn muted_audio_skips_playback() {
        let channel = EventChannel::new();
        let renderer = OverlayRenderer::new(true);
        let _subs = renderer.subscribe(&channel);

        channel.emit(&action("a", UiActionKind::Show));
        channel.emit(&action("a", UiActionKind::Play));
        channel.emit(&EngineEvent::Settings(SettingsChange::Audio(false)));
        assert!(renderer.playing().is_empty());

        channel.emit(&action("b", UiActionKind::Play));
        assert!(renderer.playing().is_empty());
        assert_eq!(renderer.visible(), vec![FeatureId::from("a")]);
    }
}
