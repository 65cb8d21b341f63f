//! Trailhead engine binary.
//!
//! Runs one game headlessly: positions come from a recorded track (or the
//! simulated pointer walking it), geofence transitions drive the overlay
//! renderer and the backpack, and backpack changes sync to the remote.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing); `RUST_LOG` wins, otherwise
//!    `info` until the configuration is read
//! 2. Load configuration from `trailhead.yaml` (first CLI argument or
//!    `TRAILHEAD_CONFIG` overrides the path) and apply `logging.level`
//! 3. Load the content bundle and the recorded track
//! 4. Build the engine context and pull the remote backpack
//! 5. Subscribe the overlay renderer and the visit recorder, then apply
//!    the configured settings
//! 6. Start the position source and wait for the track to end
//! 7. Flush pending syncs, tear down, log the summary

mod bundle;
mod config;
mod context;
mod error;
mod renderer;
mod replay;
mod visits;

use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, reload};
use trailhead_types::{PositionSample, Slug};

use crate::bundle::ContentBundle;
use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::renderer::OverlayRenderer;
use crate::replay::{ReplayWatch, load_track, walk_pointer};

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if the configuration, content bundle or track cannot
/// be loaded. Nothing after startup is fatal.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize structured logging.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new(BOOTSTRAP_LOG_LEVEL)));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    // 2. Load configuration.
    let config_path = EngineConfig::resolve_path(
        std::env::args().nth(1),
        std::env::var("TRAILHEAD_CONFIG").ok(),
    );
    let config = load_config(&config_path).inspect_err(|e| {
        error!(path = %config_path.display(), error = %e, "failed to load configuration");
    })?;
    apply_log_level(&filter_handle, from_env, &config.logging.level)?;

    info!(
        path = %config_path.display(),
        slug = config.game.slug,
        simulate = config.settings.simulate,
        debug = config.settings.debug,
        "trailhead-engine starting"
    );

    // 3. Content bundle and track.
    let bundle = ContentBundle::load(&config.game.features_path)
        .context("loading content bundle")?;
    let slug = Slug::from(config.game.slug.as_str());
    if let Some(declared) = bundle.slug.as_ref().filter(|s| **s != slug) {
        warn!(configured = %slug, bundle = %declared, "bundle slug differs from configured slug");
    }
    let track = load_optional_track(config.game.track_path.as_deref())
        .context("loading position track")?;

    // 4. Engine context and remote backpack.
    let mut ctx = EngineContext::init(&config, slug, bundle.features);
    let state = ctx.load_backpack().await;
    info!(
        points = state.points,
        items = state.pockets.item_count(),
        visits = state.visits.geofences.len(),
        "backpack ready"
    );

    // 5. Renderer, visit recorder, settings.
    let features = ctx.monitor().features();
    let renderer = OverlayRenderer::new(config.settings.audio);
    for subscription in renderer.subscribe(ctx.channel()) {
        ctx.hold(subscription);
    }
    let recorder = visits::record_visits(
        ctx.channel(),
        ctx.store().clone(),
        ctx.slug().clone(),
        &features,
    );
    ctx.hold(recorder);
    ctx.set_audio(config.settings.audio);
    ctx.set_debug(config.settings.debug);

    // 6. Position source.
    let speed = config.game.replay_speed;
    if ctx.settings().simulate {
        ctx.set_simulate(true);
        let moved = walk_pointer(ctx.pointer(), track, speed)
            .await
            .unwrap_or_default();
        // Let the sampler drain the final move before stopping it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        info!(moves = moved, "simulated walk finished");
    } else {
        ctx.start_sampler(Box::new(ReplayWatch::new(track, speed)));
        ctx.sampler_finished().await;
        info!("track replay finished");
    }

    // 7. Teardown and summary.
    let final_state = ctx.store().read(ctx.slug());
    let dropped = ctx.drops().list_dropped_items(ctx.slug()).await;
    let summary = ctx.shutdown().await;
    info!(
        points = final_state.points,
        visits = final_state.visits.geofences.len(),
        overlays_shown = renderer.shown_total(),
        still_visible = renderer.visible().len(),
        still_playing = renderer.playing().len(),
        dropped_items = dropped.len(),
        flushed = summary.flushed,
        leftover_handlers = summary.cleared_handlers,
        pushed = summary.sync.pushed,
        push_failures = summary.sync.failed,
        "trailhead-engine shutdown complete"
    );

    Ok(())
}

const BOOTSTRAP_LOG_LEVEL: &str = "info";

/// Swap the bootstrap filter for the configured level unless `RUST_LOG`
/// already chose one.
fn apply_log_level(
    handle: &reload::Handle<EnvFilter, Registry>,
    from_env: bool,
    level: &str,
) -> anyhow::Result<()> {
    let Some(directive) = configured_directive(from_env, level) else {
        return Ok(());
    };
    handle
        .reload(EnvFilter::new(directive))
        .context("applying logging.level")
}

/// The filter directive the configuration asks for, if it should apply.
fn configured_directive(from_env: bool, level: &str) -> Option<&str> {
    let level = level.trim();
    (!from_env && !level.is_empty()).then_some(level)
}

/// Load configuration, falling back to defaults when the file is absent.
fn load_config(path: &Path) -> Result<EngineConfig, EngineError> {
    if path.exists() {
        Ok(EngineConfig::from_file(path)?)
    } else {
        let mut config = EngineConfig::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }
}

fn load_optional_track(path: Option<&Path>) -> Result<Vec<PositionSample>, EngineError> {
    path.map_or_else(|| Ok(Vec::new()), load_track)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_applies_only_without_rust_log() {
        assert_eq!(configured_directive(false, "debug"), Some("debug"));
        assert_eq!(
            configured_directive(false, " trailhead_geo=trace "),
            Some("trailhead_geo=trace")
        );
        assert_eq!(configured_directive(true, "debug"), None);
        assert_eq!(configured_directive(false, "  "), None);
    }
}
