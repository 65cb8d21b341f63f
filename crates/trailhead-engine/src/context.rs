//! The engine's runtime context.
//!
//! Owns everything a running game needs: the event channel, the geofence
//! monitor, the backpack store and drop log, the active position sampler,
//! and the subscriptions wired between them. Nothing here is global;
//! tests build as many contexts as they like.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use trailhead_backpack::{
    BackpackStore, DropLog, FileStore, HttpRemote, KeyValueStore, MemoryRemote, RemoteBackend,
    SyncEngine, SyncStats,
};
use trailhead_events::{EventChannel, Subscription};
use trailhead_geo::{
    GeoSampler, GeofenceEvaluator, GeofenceMonitor, PositionWatch, SamplerGuard, SimulatedPointer,
};
use trailhead_types::{BackpackState, EngineEvent, GeofenceFeature, SettingsChange, Slug};

use crate::config::{EngineConfig, SettingsConfig};
use crate::renderer::log_radius_polygons;

/// What teardown left behind, for the final log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeardownSummary {
    /// Pending syncs pushed by the final flush.
    pub flushed: usize,
    /// Handlers still registered when the channel was cleared.
    pub cleared_handlers: usize,
    /// Push outcomes over the whole run.
    pub sync: SyncStats,
}

/// A running game.
#[derive(Debug)]
pub struct EngineContext {
    slug: Slug,
    channel: EventChannel,
    monitor: GeofenceMonitor,
    store: BackpackStore,
    drops: DropLog,
    settings: SettingsConfig,
    pointer: SimulatedPointer,
    sampler: Option<SamplerGuard>,
    subscriptions: Vec<Subscription>,
}

impl EngineContext {
    /// Build a context from configuration: file storage under
    /// `storage.dir`, the HTTP remote when `remote.base_url` is set and an
    /// in-memory remote otherwise.
    pub fn init(config: &EngineConfig, slug: Slug, features: Vec<GeofenceFeature>) -> Self {
        let remote = config.remote.base_url.as_ref().map_or_else(
            || RemoteBackend::from(MemoryRemote::new()),
            |url| RemoteBackend::from(HttpRemote::new(url.as_str())),
        );
        let storage: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.storage.dir.clone()));
        info!(
            slug = %slug,
            remote = remote.name(),
            storage = %config.storage.dir.display(),
            debounce_ms = config.sync.debounce_ms,
            "engine context initialized"
        );
        Self::with_parts(
            slug,
            features,
            storage,
            remote,
            config.sync.debounce(),
            config.settings,
        )
    }

    /// Build a context from explicit parts.
    pub fn with_parts(
        slug: Slug,
        features: Vec<GeofenceFeature>,
        storage: Arc<dyn KeyValueStore>,
        remote: RemoteBackend,
        debounce: Duration,
        settings: SettingsConfig,
    ) -> Self {
        let channel = EventChannel::new();
        let monitor = GeofenceMonitor::attach(&channel, GeofenceEvaluator::new(features));
        let store = BackpackStore::new(storage, SyncEngine::new(remote, debounce));
        let drops = DropLog::new(store.clone());
        Self {
            slug,
            channel,
            monitor,
            store,
            drops,
            settings,
            pointer: SimulatedPointer::new(),
            sampler: None,
            subscriptions: Vec::new(),
        }
    }

    /// The game slug.
    pub const fn slug(&self) -> &Slug {
        &self.slug
    }

    /// The event channel.
    pub const fn channel(&self) -> &EventChannel {
        &self.channel
    }

    /// The geofence monitor.
    pub const fn monitor(&self) -> &GeofenceMonitor {
        &self.monitor
    }

    /// The backpack store.
    pub const fn store(&self) -> &BackpackStore {
        &self.store
    }

    /// The drop log.
    pub const fn drops(&self) -> &DropLog {
        &self.drops
    }

    /// Current player settings.
    pub const fn settings(&self) -> SettingsConfig {
        self.settings
    }

    /// The simulated pointer; it only moves while simulate mode is on.
    pub fn pointer(&self) -> SimulatedPointer {
        self.pointer.clone()
    }

    /// Keep a subscription alive for the lifetime of the context.
    pub fn hold(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Pull the remote backpack for this game.
    pub async fn load_backpack(&self) -> BackpackState {
        self.store.load(&self.slug).await
    }

    /// Replace the active position source. Any previous sampler stops.
    pub fn start_sampler(&mut self, watch: Box<dyn PositionWatch>) {
        self.stop_sampler();
        self.sampler = Some(GeoSampler::start(watch, &self.channel));
    }

    /// Stop the active position source, if any.
    pub fn stop_sampler(&mut self) {
        if let Some(mut sampler) = self.sampler.take() {
            sampler.stop();
        }
    }

    /// Wait for the active source to end on its own.
    pub async fn sampler_finished(&mut self) {
        if let Some(sampler) = self.sampler.as_mut() {
            sampler.finished().await;
        }
    }

    /// Name of the active position source.
    pub fn sampler_source(&self) -> Option<&'static str> {
        self.sampler
            .as_ref()
            .filter(|s| s.is_running())
            .map(SamplerGuard::source)
    }

    /// Toggle audio and announce it.
    pub fn set_audio(&mut self, on: bool) {
        self.settings.audio = on;
        self.announce(SettingsChange::Audio(on));
    }

    /// Toggle diagnostics and announce it. Turning it on logs every
    /// feature's radius polygon.
    pub fn set_debug(&mut self, on: bool) {
        self.settings.debug = on;
        if on {
            log_radius_polygons(&self.monitor.features());
        }
        self.announce(SettingsChange::Debug(on));
    }

    /// Toggle simulate mode and announce it.
    ///
    /// Turning it on replaces the active source with the simulated
    /// pointer. Turning it off stops the pointer; restarting a platform
    /// watch is up to the caller.
    pub fn set_simulate(&mut self, on: bool) {
        if on == self.settings.simulate && (!on || self.pointer.is_running()) {
            return;
        }
        self.settings.simulate = on;
        if on {
            self.start_sampler(Box::new(self.pointer.clone()));
        } else if self.sampler_source() == Some("simulated-pointer") {
            self.stop_sampler();
        }
        self.announce(SettingsChange::Simulate(on));
    }

    fn announce(&self, change: SettingsChange) {
        info!(?change, "setting changed");
        self.channel.emit(&EngineEvent::Settings(change));
    }

    /// Flush pending backpack syncs, then release everything: sampler,
    /// subscriptions, channel handlers and debounce timers.
    pub async fn shutdown(&mut self) -> TeardownSummary {
        self.stop_sampler();
        let flushed = self.store.sync().flush().await;
        self.monitor.detach();
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        let cleared_handlers = self.channel.total_subscribers();
        self.channel.clear();
        self.store.sync().cancel_all();
        TeardownSummary {
            flushed,
            cleared_handlers,
            sync: self.store.sync().stats(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use trailhead_backpack::MemoryStore;
    use trailhead_types::{EventKind, FeatureId, LatLng, MediaType};

    use super::*;
    use crate::renderer::OverlayRenderer;
    use crate::visits::record_visits;

    const CENTER: LatLng = LatLng::new(44.9778, -93.2650);

    fn context(memory: &MemoryRemote) -> EngineContext {
        let mut feature = GeofenceFeature::new("f1", CENTER, 50.0, MediaType::Audio).with_autoplay();
        feature.points = 5;
        EngineContext::with_parts(
            Slug::from("hunt"),
            vec![feature],
            Arc::new(MemoryStore::new()),
            RemoteBackend::from(memory.clone()),
            Duration::from_millis(600),
            SettingsConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_walk_awards_points_and_syncs_on_shutdown() {
        let memory = MemoryRemote::new();
        let mut ctx = context(&memory);
        let renderer = OverlayRenderer::new(true);
        for sub in renderer.subscribe(ctx.channel()) {
            ctx.hold(sub);
        }
        let features = ctx.monitor().features();
        let visits = record_visits(ctx.channel(), ctx.store().clone(), ctx.slug().clone(), &features);
        ctx.hold(visits);

        ctx.set_simulate(true);
        assert_eq!(ctx.sampler_source(), Some("simulated-pointer"));
        assert!(ctx.pointer().move_to(CENTER.lat, CENTER.lng));

        // Let the sampler task drain the move.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(ctx.monitor().is_visible(&FeatureId::from("f1")));
        assert_eq!(renderer.playing(), vec![FeatureId::from("f1")]);
        assert_eq!(ctx.store().read(ctx.slug()).points, 5);

        assert!(ctx.channel().total_subscribers() > 0);
        let summary = ctx.shutdown().await;
        assert_eq!(summary.flushed, 1);
        assert_eq!(summary.cleared_handlers, 0);
        assert_eq!(summary.sync.pushed, 1);
        assert_eq!(ctx.channel().total_subscribers(), 0);
        assert_eq!(memory.pushes_for(&Slug::from("hunt"))[0].points, 5);
        assert!(ctx.sampler_source().is_none());
    }

    #[tokio::test]
    async fn settings_toggles_are_announced() {
        let memory = MemoryRemote::new();
        let mut ctx = context(&memory);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sub = ctx.channel().on(EventKind::Settings, move |e| {
            if let EngineEvent::Settings(change) = e {
                let _ = tx.send(*change);
            }
        });
        ctx.hold(sub);

        ctx.set_audio(false);
        ctx.set_debug(true);
        ctx.set_simulate(true);
        ctx.set_simulate(true);
        ctx.set_simulate(false);

        let mut seen = Vec::new();
        while let Ok(change) = rx.try_recv() {
            seen.push(change);
        }
        assert_eq!(
            seen,
            vec![
                SettingsChange::Audio(false),
                SettingsChange::Debug(true),
                SettingsChange::Simulate(true),
                SettingsChange::Simulate(false),
            ]
        );
        assert!(!ctx.settings().audio);
        assert!(ctx.sampler_source().is_none());
        ctx.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn applied_settings_reach_the_renderer() {
        let memory = MemoryRemote::new();
        let mut ctx = context(&memory);
        let renderer = OverlayRenderer::new(true);
        for sub in renderer.subscribe(ctx.channel()) {
            ctx.hold(sub);
        }

        ctx.set_audio(false);
        ctx.set_debug(true);
        assert!(ctx.settings().debug);

        ctx.set_simulate(true);
        assert!(ctx.pointer().move_to(CENTER.lat, CENTER.lng));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(renderer.visible(), vec![FeatureId::from("f1")]);
        assert!(renderer.playing().is_empty());
        ctx.shutdown().await;
    }
}
