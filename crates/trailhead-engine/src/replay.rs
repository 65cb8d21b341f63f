//! Recorded position tracks.
//!
//! A track is a list of [`PositionSample`]s, stored either as a JSON array
//! or as JSON lines. [`ReplayWatch`] plays a track back as a platform
//! position watch, preserving the gaps between sample timestamps (scaled
//! by a speed factor). [`walk_pointer`] drives a [`SimulatedPointer`]
//! along the same path instead, for simulate mode.

use std::path::Path;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use trailhead_geo::{LocationError, PositionWatch, SampleSink, SimulatedPointer};
use trailhead_types::PositionSample;

use crate::error::EngineError;

/// Longest pause honored between two samples; longer recording gaps are
/// shortened to this.
pub const MAX_REPLAY_GAP: Duration = Duration::from_secs(60);

/// Read a track file.
pub fn load_track(path: &Path) -> Result<Vec<PositionSample>, EngineError> {
    let raw = std::fs::read_to_string(path).map_err(|e| EngineError::Track {
        path: path.to_path_buf(),
        message: format!("failed to read: {e}"),
    })?;
    let samples = parse_track(&raw).map_err(|message| EngineError::Track {
        path: path.to_path_buf(),
        message,
    })?;
    info!(path = %path.display(), samples = samples.len(), "track loaded");
    Ok(samples)
}

/// Parse a JSON array of samples, or one sample per line. Blank lines are
/// ignored.
pub fn parse_track(raw: &str) -> Result<Vec<PositionSample>, String> {
    if raw.trim_start().starts_with('[') {
        return serde_json::from_str(raw).map_err(|e| format!("invalid track JSON: {e}"));
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| format!("line {}: {e}", n.saturating_add(1)))
        })
        .collect()
}

/// Real-time delay between two recorded timestamps at `speed`.
fn replay_delay(from_ms: i64, to_ms: i64, speed: f64) -> Duration {
    let gap = u64::try_from(to_ms.saturating_sub(from_ms)).unwrap_or(0);
    let gap = Duration::from_millis(gap).min(MAX_REPLAY_GAP);
    if speed.is_finite() && speed >= 0.01 {
        gap.div_f64(speed)
    } else {
        gap
    }
}

/// Replays a recorded track as if it came from the platform.
///
/// The track ends by dropping the sink, so the sampler finishes on its own
/// after the last sample.
#[derive(Debug)]
pub struct ReplayWatch {
    samples: Vec<PositionSample>,
    speed: f64,
    task: Option<JoinHandle<()>>,
}

impl ReplayWatch {
    /// Replay `samples` at `speed` times real time.
    pub const fn new(samples: Vec<PositionSample>, speed: f64) -> Self {
        Self {
            samples,
            speed,
            task: None,
        }
    }
}

impl PositionWatch for ReplayWatch {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn start(&mut self, sink: SampleSink) -> Result<(), LocationError> {
        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Err(LocationError::AlreadyStarted);
        }
        let handle = Handle::try_current()
            .map_err(|e| LocationError::Unavailable(format!("no runtime for replay: {e}")))?;

        let samples = self.samples.clone();
        let speed = self.speed;
        self.task = Some(handle.spawn(async move {
            let mut previous: Option<i64> = None;
            for sample in samples {
                if let Some(prev) = previous {
                    tokio::time::sleep(replay_delay(prev, sample.timestamp_ms, speed)).await;
                }
                previous = Some(sample.timestamp_ms);
                if !sink.push(sample) {
                    debug!("replay sink closed early");
                    return;
                }
            }
            debug!("replay track exhausted");
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Move `pointer` along `samples` with the recorded timing. Returns the
/// number of moves the pointer accepted.
pub fn walk_pointer(
    pointer: SimulatedPointer,
    samples: Vec<PositionSample>,
    speed: f64,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut accepted: usize = 0;
        let mut previous: Option<i64> = None;
        for sample in samples {
            if let Some(prev) = previous {
                tokio::time::sleep(replay_delay(prev, sample.timestamp_ms, speed)).await;
            }
            previous = Some(sample.timestamp_ms);
            if !pointer.move_to(sample.lat, sample.lng) {
                debug!("simulated pointer stopped; walk ends");
                break;
            }
            accepted = accepted.saturating_add(1);
        }
        accepted
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use trailhead_events::EventChannel;
    use trailhead_geo::GeoSampler;
    use trailhead_types::{EngineEvent, EventKind};

    use super::*;

    #[test]
    fn parses_array_and_lines() {
        let array = r#"[{"lat":1,"lng":2,"accuracyMeters":4,"timestampMs":0},
                        {"lat":1.1,"lng":2.1,"timestampMs":1000}]"#;
        assert_eq!(parse_track(array).unwrap().len(), 2);

        let lines = "{\"lat\":1,\"lng\":2,\"timestampMs\":0}\n\n{\"lat\":3,\"lng\":4,\"timestampMs\":5}\n";
        let track = parse_track(lines).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.last().map(|s| s.timestamp_ms), Some(5));

        let err = parse_track("{\"lat\":1,\"lng\":2,\"timestampMs\":0}\nnot json").unwrap_err();
        assert!(err.starts_with("line 2"), "{err}");
    }

    #[test]
    fn delays_scale_and_clamp() {
        assert_eq!(replay_delay(0, 1_000, 1.0), Duration::from_secs(1));
        assert_eq!(replay_delay(0, 1_000, 4.0), Duration::from_millis(250));
        assert_eq!(replay_delay(1_000, 0, 1.0), Duration::ZERO);
        assert_eq!(replay_delay(0, 10_000_000, 1.0), MAX_REPLAY_GAP);
        assert_eq!(replay_delay(0, 1_000, 0.0), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn replay_publishes_track_then_finishes() {
        let channel = EventChannel::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _sub = channel.on(EventKind::Position, move |e| {
            if let EngineEvent::Position(s) = e {
                let _ = tx.send(s.timestamp_ms);
            }
        });

        let track = vec![
            PositionSample::new(1.0, 1.0, 5.0, 0),
            PositionSample::new(1.0, 1.0, 5.0, 2_000),
            PositionSample::new(1.0, 1.0, 5.0, 3_000),
        ];
        let started = tokio::time::Instant::now();
        let mut guard = GeoSampler::start(Box::new(ReplayWatch::new(track, 1.0)), &channel);
        guard.finished().await;

        assert!(started.elapsed() >= Duration::from_secs(3));
        let mut seen = Vec::new();
        while let Ok(ts) = rx.try_recv() {
            seen.push(ts);
        }
        assert_eq!(seen, vec![0, 2_000, 3_000]);
    }

    #[tokio::test(start_paused = true)]
    async fn pointer_walk_stops_with_pointer() {
        let pointer = SimulatedPointer::new();
        let walk = walk_pointer(
            pointer.clone(),
            vec![PositionSample::new(1.0, 1.0, 5.0, 0)],
            1.0,
        );
        // Not running: the first move is refused.
        assert_eq!(walk.await.expect("walk task"), 0);
    }
}
