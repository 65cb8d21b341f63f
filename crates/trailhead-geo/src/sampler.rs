//! Position sources and the sampler that publishes their readings.
//!
//! A [`PositionWatch`] is the producer contract: it mirrors a platform's
//! `watchPosition`/`clearWatch` pair. Once started it pushes readings into a
//! [`SampleSink`] from whatever context the platform calls back on.
//! [`GeoSampler::start`] drains that sink on a tokio task and publishes
//! every reading on the event channel as [`EngineEvent::Position`]; it is
//! the only origin of position events.
//!
//! Two kinds of watch exist behind the one contract: platform watches (real
//! GPS, or a recorded track replayed with its original timing) and the
//! [`SimulatedPointer`], where a user-driven pointer replaces the platform
//! entirely. Downstream code cannot tell which one is active.
//!
//! The [`SamplerGuard`] owns the watch. Stopping or dropping the guard
//! clears the watch and ends the draining task on every exit path.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use trailhead_events::EventChannel;
use trailhead_types::{EngineEvent, PositionSample};

use crate::error::LocationError;

/// Nominal accuracy reported by the simulated pointer, in meters.
pub const SIMULATED_ACCURACY_M: f64 = 5.0;

/// One update from a watch: a fix or a failure.
pub type WatchUpdate = Result<PositionSample, LocationError>;

/// Where a running watch delivers its readings.
///
/// Cheap to clone. Pushing after the sampler has stopped is a no-op that
/// returns `false`.
#[derive(Debug, Clone)]
pub struct SampleSink {
    tx: mpsc::UnboundedSender<WatchUpdate>,
}

impl SampleSink {
    /// Create a sink and the receiver that drains it.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WatchUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Deliver a reading.
    pub fn push(&self, sample: PositionSample) -> bool {
        self.tx.send(Ok(sample)).is_ok()
    }

    /// Report a failure. The sampler stops after the first failure.
    pub fn fail(&self, error: LocationError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }

    /// Whether the sampler has stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A continuous position source with a start/stop lifecycle.
pub trait PositionWatch: Send + 'static {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Begin delivering readings into `sink`.
    ///
    /// # Errors
    ///
    /// Returns a [`LocationError`] if the source cannot start (permission
    /// denied, no hardware, already running).
    fn start(&mut self, sink: SampleSink) -> Result<(), LocationError>;

    /// Stop delivering readings and release platform resources. Must be
    /// idempotent.
    fn stop(&mut self);
}

/// Pointer-driven position override.
///
/// Clones share one pointer: hand one clone to [`GeoSampler::start`] and
/// keep another to move the pointer. Moves made while the pointer is not
/// running are ignored.
#[derive(Debug, Clone, Default)]
pub struct SimulatedPointer {
    sink: Arc<Mutex<Option<SampleSink>>>,
}

impl SimulatedPointer {
    /// Create an idle pointer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the pointer, emitting a sample stamped with the current time.
    ///
    /// Returns `false` if the pointer is not running.
    pub fn move_to(&self, lat: f64, lng: f64) -> bool {
        let guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().is_some_and(|sink| {
            sink.push(PositionSample::now(lat, lng, SIMULATED_ACCURACY_M))
        })
    }

    /// Whether a sampler is currently listening to this pointer.
    pub fn is_running(&self) -> bool {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|sink| !sink.is_closed())
    }
}

impl PositionWatch for SimulatedPointer {
    fn name(&self) -> &'static str {
        "simulated-pointer"
    }

    fn start(&mut self, sink: SampleSink) -> Result<(), LocationError> {
        let mut slot = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|s| !s.is_closed()) {
            return Err(LocationError::AlreadyStarted);
        }
        *slot = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

type SharedWatch = Arc<Mutex<Box<dyn PositionWatch>>>;

/// Starts position watches and publishes their samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoSampler;

impl GeoSampler {
    /// Start `watch` and publish its samples on `channel`.
    ///
    /// Must be called from within a tokio runtime. If the watch fails to
    /// start, the failure is logged and the returned guard is inert.
    pub fn start(watch: Box<dyn PositionWatch>, channel: &EventChannel) -> SamplerGuard {
        let source = watch.name();
        let watch: SharedWatch = Arc::new(Mutex::new(watch));
        let (sink, mut rx) = SampleSink::channel();

        let started = watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .start(sink);
        if let Err(error) = started {
            warn!(source, %error, "position watch failed to start; no samples will arrive");
            return SamplerGuard {
                watch,
                task: None,
                source,
            };
        }
        info!(source, "position watch started");

        let channel = channel.clone();
        let task_watch = Arc::clone(&watch);
        let task = tokio::spawn(async move {
            let mut delivered: u64 = 0;
            while let Some(update) = rx.recv().await {
                match update {
                    Ok(sample) => {
                        delivered = delivered.saturating_add(1);
                        debug!(
                            source,
                            lat = sample.lat,
                            lng = sample.lng,
                            accuracy_m = sample.accuracy_meters,
                            "position sample"
                        );
                        channel.emit(&EngineEvent::Position(sample));
                    }
                    Err(error) => {
                        warn!(source, %error, "position watch failed; sampler stopped");
                        task_watch
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .stop();
                        break;
                    }
                }
            }
            debug!(source, delivered, "sampler task finished");
        });

        SamplerGuard {
            watch,
            task: Some(task),
            source,
        }
    }
}

/// Owns a running watch and its draining task.
///
/// Dropping the guard stops the watch.
pub struct SamplerGuard {
    watch: SharedWatch,
    task: Option<JoinHandle<()>>,
    source: &'static str,
}

impl SamplerGuard {
    /// Name of the underlying watch.
    pub const fn source(&self) -> &'static str {
        self.source
    }

    /// Whether samples are still being published.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Wait until the watch ends on its own (track exhausted, failure).
    ///
    /// Returns immediately if the sampler never started or was stopped.
    pub async fn finished(&mut self) {
        if let Some(task) = self.task.as_mut() {
            if let Err(error) = task.await {
                if !error.is_cancelled() {
                    warn!(source = self.source, %error, "sampler task panicked");
                }
            }
            self.task = None;
        }
    }

    /// Stop the watch and the draining task. Idempotent.
    pub fn stop(&mut self) {
        self.watch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
        if let Some(task) = self.task.take() {
            task.abort();
            info!(source = self.source, "position watch stopped");
        }
    }
}

impl Drop for SamplerGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

impl core::fmt::Debug for SamplerGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SamplerGuard")
            .field("source", &self.source)
            .field("running", &self.is_running())
            .finish()
    }
}
