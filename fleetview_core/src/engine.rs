//! The engine context object - animation loop and poll-loop glue.
//!
//! `FleetEngine` owns all engine state explicitly (no module-level
//! globals): store, interpolator, active renderer backend, label layer and
//! the snapshot channel. The poll loop is an explicit cooperating task
//! spawned through the environment; it publishes snapshots over a
//! `tokio::sync::watch` channel, so a slow render side always observes the
//! newest snapshot and intermediate ones coalesce away. All store
//! mutation happens on the tick side, which realizes the single-writer
//! field discipline as plain message passing.
//!
//! The host drives `tick` from its per-frame draw callback; it runs far
//! faster than the poll loop, which is the core technique producing smooth
//! motion from coarse network updates. While a fetch is outstanding, ticks
//! keep interpolating against stale targets - motion coasts, never
//! freezes.

use crate::config::EngineConfig;
use crate::fetcher::{SnapshotFetcher, TelemetrySource};
use crate::interp::Interpolator;
use crate::labels::{DecimatedLabels, LabelSink};
use crate::render::{collect_sprites, EntitySprite, GpuFrame, RenderBackend, RenderError};
use crate::snapshot::VehicleRecord;
use crate::store::{EntityStore, StoreConfig};
use fleetview_env::FleetEnv;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The fleet visualization engine.
pub struct FleetEngine {
    store: EntityStore,
    interp: Interpolator,
    backend: Box<dyn RenderBackend>,
    labels: DecimatedLabels,
    label_sink: Box<dyn LabelSink>,

    snapshot_rx: watch::Receiver<Vec<VehicleRecord>>,
    shutdown: Arc<AtomicBool>,

    /// Reused sprite scratch, sized on first frame
    sprites: Vec<EntitySprite>,
    last_tick: Option<Duration>,
}

impl FleetEngine {
    /// Assembles an engine around an existing snapshot channel.
    ///
    /// This is the seam for tests and for hosts that deliver snapshots
    /// themselves; production setups use [`FleetEngine::launch`].
    pub fn new(
        config: &EngineConfig,
        backend: Box<dyn RenderBackend>,
        label_sink: Box<dyn LabelSink>,
        snapshot_rx: watch::Receiver<Vec<VehicleRecord>>,
    ) -> Self {
        Self {
            store: EntityStore::new(StoreConfig {
                noise_threshold: config.noise_threshold,
                fade_epsilon: config.fade_epsilon,
            }),
            interp: Interpolator::from_config(config),
            backend,
            labels: DecimatedLabels::from_config(config),
            label_sink,
            snapshot_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
            sprites: Vec::new(),
            last_tick: None,
        }
    }

    /// Assembles an engine and spawns its telemetry poll loop on `env`.
    pub fn launch<E: FleetEnv>(
        config: &EngineConfig,
        env: &Arc<E>,
        source: Arc<dyn TelemetrySource>,
        backend: Box<dyn RenderBackend>,
        label_sink: Box<dyn LabelSink>,
    ) -> Self {
        let (tx, rx) = watch::channel(Vec::new());
        let engine = Self::new(config, backend, label_sink, rx);

        let fetcher = SnapshotFetcher::new(source, config.poll_interval);
        env.spawn(
            "telemetry-poll",
            poll_loop(
                Arc::clone(env),
                fetcher,
                tx,
                Arc::clone(&engine.shutdown),
                config.poll_interval,
            ),
        );

        engine
    }

    /// One animation tick, driven by the host's per-frame callback.
    ///
    /// Applies the newest pending snapshot, advances interpolation,
    /// delegates to the active backend, refreshes labels, then purges
    /// entities that finished fading out.
    pub fn tick(
        &mut self,
        now: Duration,
        gpu: Option<GpuFrame<'_, '_>>,
    ) -> Result<(), RenderError> {
        if self.snapshot_rx.has_changed().unwrap_or(false) {
            let records = self.snapshot_rx.borrow_and_update().clone();
            self.store.apply_snapshot(&records, now);
        }

        let dt = match self.last_tick {
            Some(last) => now.saturating_sub(last),
            None => Duration::ZERO,
        };
        self.last_tick = Some(now);

        for entity in self.store.entities_mut() {
            self.interp.advance(entity, now, dt);
        }

        collect_sprites(&self.store, &mut self.sprites);
        self.backend.draw(&self.sprites, gpu)?;
        self.labels.refresh(&self.store, now, self.label_sink.as_mut());

        self.store.purge();
        Ok(())
    }

    /// Swaps the active renderer backend, returning the previous one.
    ///
    /// In-flight draw state of the old backend is discarded, not awaited.
    pub fn swap_backend(&mut self, backend: Box<dyn RenderBackend>) -> Box<dyn RenderBackend> {
        std::mem::replace(&mut self.backend, backend)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Stops the poll loop. The engine itself stays usable; further ticks
    /// coast on the last delivered snapshot.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for FleetEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The telemetry poll loop: fetch, publish if materially changed, sleep.
async fn poll_loop<E: FleetEnv>(
    env: Arc<E>,
    mut fetcher: SnapshotFetcher,
    tx: watch::Sender<Vec<VehicleRecord>>,
    shutdown: Arc<AtomicBool>,
    interval: Duration,
) {
    while !shutdown.load(Ordering::Relaxed) {
        let snapshot = fetcher.fetch_latest(env.now()).await;
        if snapshot.changed {
            // watch is latest-wins: a render side that fell behind only
            // ever sees the newest snapshot
            if tx.send(snapshot.records.clone()).is_err() {
                break; // engine dropped
            }
        }
        env.sleep(interval).await;
    }
    tracing::debug!("telemetry poll loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::TelemetryError;
    use crate::labels::LabelFeature;
    use async_trait::async_trait;
    use fleetview_env::TokioEnv;
    use std::sync::Mutex;

    /// Backend double that records every sprite batch it is handed.
    #[derive(Clone, Default)]
    struct RecordingBackend {
        frames: Arc<Mutex<Vec<Vec<EntitySprite>>>>,
    }

    impl RenderBackend for RecordingBackend {
        fn draw(
            &mut self,
            sprites: &[EntitySprite],
            _gpu: Option<GpuFrame<'_, '_>>,
        ) -> Result<(), RenderError> {
            self.frames.lock().unwrap().push(sprites.to_vec());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    #[derive(Default)]
    struct NullSink;

    impl LabelSink for NullSink {
        fn set_data(&mut self, _features: &[LabelFeature]) {}
    }

    fn record(id: &str, lon: f64, lat: f64) -> VehicleRecord {
        VehicleRecord {
            id: id.to_string(),
            lon,
            lat,
            is_ev: false,
            battery_percent: 100.0,
            is_charging: false,
            is_queued: false,
            is_stranded: false,
            is_circling: false,
            assigned_station: None,
            v2g_active: false,
        }
    }

    fn t(ms: u64) -> Duration {
        Duration::from_millis(ms)
    }

    fn engine_with_channel() -> (
        FleetEngine,
        watch::Sender<Vec<VehicleRecord>>,
        Arc<Mutex<Vec<Vec<EntitySprite>>>>,
    ) {
        let backend = RecordingBackend::default();
        let frames = Arc::clone(&backend.frames);
        let (tx, rx) = watch::channel(Vec::new());
        let engine = FleetEngine::new(
            &EngineConfig::default(),
            Box::new(backend),
            Box::new(NullSink),
            rx,
        );
        (engine, tx, frames)
    }

    #[test]
    fn test_tick_applies_newest_snapshot_only() {
        let (mut engine, tx, frames) = engine_with_channel();

        tx.send(vec![record("v1", 13.4, 52.5)]).unwrap();
        tx.send(vec![record("v2", 13.5, 52.5)]).unwrap();
        engine.tick(t(16), None).unwrap();

        // v1's snapshot was coalesced away before the tick saw it
        assert!(engine.store().get("v1").is_none());
        assert!(engine.store().get("v2").is_some());
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_motion_coasts_between_snapshots() {
        let (mut engine, tx, frames) = engine_with_channel();

        tx.send(vec![record("v1", 13.40, 52.5)]).unwrap();
        engine.tick(t(0), None).unwrap();
        tx.send(vec![record("v1", 13.41, 52.5)]).unwrap();
        engine.tick(t(500), None).unwrap();

        let start = crate::space::project(13.40, 52.5);
        let target = crate::space::project(13.41, 52.5);

        // Three ticks after snapshot B: strictly between the endpoints and
        // monotonically approaching the target, with no snapshot arriving
        let mut last_x = start.x;
        for tick in 1..=3 {
            engine.tick(t(500 + tick * 16), None).unwrap();
            let x = engine.store().get("v1").unwrap().curr_pos.x;
            assert!(x > last_x, "not advancing at tick {}", tick);
            assert!(x < target.x);
            last_x = x;
        }
        // Every tick delegated to the backend
        assert_eq!(frames.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_disappearing_entity_fades_over_multiple_ticks() {
        let (mut engine, tx, _frames) = engine_with_channel();

        tx.send(vec![record("v1", 13.4, 52.5)]).unwrap();
        engine.tick(t(0), None).unwrap();

        // Let the spawn fade finish
        for tick in 1..=40 {
            engine.tick(t(tick * 16), None).unwrap();
        }
        assert!(engine.store().get("v1").unwrap().opacity > 0.9);

        // Gone from the next snapshot: still present, fading
        tx.send(Vec::new()).unwrap();
        engine.tick(t(800), None).unwrap();
        assert!(engine.store().get("v1").is_some());

        let mut removal_tick = None;
        for tick in 1..=120 {
            engine.tick(t(800 + tick * 16), None).unwrap();
            if engine.store().get("v1").is_none() {
                removal_tick = Some(tick);
                break;
            }
        }

        let removal_tick = removal_tick.expect("entity never purged");
        assert!(
            removal_tick > 3,
            "faded out too fast: removed at tick {}",
            removal_tick
        );
    }

    #[test]
    fn test_swap_backend_discards_previous() {
        let (mut engine, tx, _frames) = engine_with_channel();
        tx.send(vec![record("v1", 13.4, 52.5)]).unwrap();
        engine.tick(t(0), None).unwrap();

        let replacement = RecordingBackend::default();
        let replacement_frames = Arc::clone(&replacement.frames);
        let old = engine.swap_backend(Box::new(replacement));
        assert_eq!(old.name(), "recording");

        engine.tick(t(16), None).unwrap();
        assert_eq!(replacement_frames.lock().unwrap().len(), 1);
    }

    /// Source double for the launched poll loop.
    struct StaticSource {
        records: Vec<VehicleRecord>,
    }

    #[async_trait]
    impl TelemetrySource for StaticSource {
        async fn fetch(&self) -> Result<Vec<VehicleRecord>, TelemetryError> {
            Ok(self.records.clone())
        }
    }

    #[tokio::test]
    async fn test_launch_polls_and_shuts_down() {
        let env = TokioEnv::shared();
        let source = Arc::new(StaticSource {
            records: vec![record("v1", 13.4, 52.5)],
        });
        let config = EngineConfig {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };

        let mut engine = FleetEngine::launch(
            &config,
            &env,
            source,
            Box::new(RecordingBackend::default()),
            Box::new(NullSink),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        engine.tick(env.now(), None).unwrap();
        assert_eq!(engine.store().len(), 1);

        engine.shutdown();
    }
}
