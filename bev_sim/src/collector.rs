//! Collection runner: drives the world and the BEV engine tick by tick.
//!
//! Per tick: step the world, take one snapshot, capture a frame and open a
//! record for every live pedestrian, let the policy decide, attach the
//! decisions, then check whether the round should be refreshed.

use bev_core::{
    to_tensor, BevConfig, BevFrameBuilder, CompleteRecord, EgoState, FeatureEncoder, FrameSnapshot,
    PooledOccupancyEncoder, RecordBook,
};
use bev_env::{ActorCategory, ActorId, SimulatorSession};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::SimError;
use crate::exporter::RunExport;
use crate::map::CrossroadMap;
use crate::monitor::{RefreshLimits, RefreshMonitor, RefreshReason};
use crate::policy::PedestrianPolicy;
use crate::world::{IntersectionWorld, SimConfig};

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectorStats {
    pub ticks: u64,
    pub frames_captured: u64,
    pub frames_skipped: u64,
    pub records_completed: u64,
    pub records_dropped: u64,
    pub refreshes: u64,
}

/// What one tick produced.
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub records: Vec<CompleteRecord>,
    pub refresh: Option<RefreshReason>,
}

pub struct Collector {
    world: IntersectionWorld,
    builder: BevFrameBuilder,
    encoder: Box<dyn FeatureEncoder>,
    policy: PedestrianPolicy,
    monitor: RefreshMonitor,
    book: RecordBook,
    stats: CollectorStats,

    /// Pedestrian whose frames are kept for inspection
    watched: Option<ActorId>,
    last_frame: Option<FrameSnapshot>,
}

impl Collector {
    pub fn new(config: SimConfig, bev: &BevConfig) -> Result<Self, SimError> {
        let map = CrossroadMap::default();
        let encoder = PooledOccupancyEncoder::new(config.encoder_cells)?;
        let policy = PedestrianPolicy::new(config.yield_distance);
        let monitor = RefreshMonitor::new(RefreshLimits::default(), map.center);
        let builder = BevFrameBuilder::new(bev)?;
        let world = IntersectionWorld::new(config, map)?;

        Ok(Self {
            world,
            builder,
            encoder: Box::new(encoder),
            policy,
            monitor,
            book: RecordBook::new(),
            stats: CollectorStats::default(),
            watched: None,
            last_frame: None,
        })
    }

    /// Replaces the feature encoder.
    pub fn with_encoder(mut self, encoder: Box<dyn FeatureEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_refresh_limits(mut self, limits: RefreshLimits) -> Self {
        self.monitor = RefreshMonitor::new(limits, self.world.map().center);
        self
    }

    pub fn world(&self) -> &IntersectionWorld {
        &self.world
    }

    /// Direct access to the world, e.g. to place actors before a run.
    pub fn world_mut(&mut self) -> &mut IntersectionWorld {
        &mut self.world
    }

    pub fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// Latest frame of the first pedestrian seen this run.
    pub fn last_frame(&self) -> Option<&FrameSnapshot> {
        self.last_frame.as_ref()
    }

    pub fn pending_records(&self) -> usize {
        self.book.pending()
    }

    /// Runs one tick.
    ///
    /// Capture failures skip that pedestrian's frame and never abort the
    /// tick; world query failures do.
    pub fn tick(&mut self) -> Result<TickOutcome, SimError> {
        self.world.step();
        self.stats.ticks += 1;

        let snapshot = self.world.snapshot()?;
        let tick = snapshot.tick;

        for dead in snapshot.actors.iter().filter(|a| !a.alive) {
            self.book.forget_actor(dead.id);
        }

        let pedestrians: Vec<_> = snapshot.alive_of(ActorCategory::Pedestrian).cloned().collect();
        if self.watched.is_none() {
            self.watched = pedestrians.first().map(|p| p.id);
        }

        for walker in &pedestrians {
            let frame = match self.builder.capture_frame(walker.id, &snapshot, &self.world) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(tick, actor = %walker.id, error = %e, "frame skipped");
                    self.stats.frames_skipped += 1;
                    continue;
                }
            };
            self.stats.frames_captured += 1;

            let tensor = to_tensor(&frame, self.builder.layer_order());
            let features = self.encoder.encode(&tensor);
            let state = EgoState::derive(walker, &snapshot, tensor).with_features(features);
            self.book.open(walker.id, tick, snapshot.timestamp, state)?;

            if self.watched == Some(walker.id) {
                self.last_frame = Some(frame);
            }
        }

        for walker in &pedestrians {
            let Some(plan) = self.world.walker_plan(walker.id) else {
                continue;
            };
            let action = self.policy.decide(walker, &plan, &snapshot);
            self.world.command(walker.id, action.target_velocity)?;

            // Skipped frames have no record to complete
            if let Err(e) = self.book.decide(walker.id, tick, action) {
                debug!(tick, actor = %walker.id, error = %e, "decision not recorded");
            }
        }

        let records = self.book.drain_complete();
        self.stats.records_completed += records.len() as u64;
        self.book.expire(tick);

        let refresh = self.monitor.observe(&snapshot);
        if let Some(reason) = refresh {
            info!(tick, time = snapshot.timestamp, %reason, "round ended, refreshing");
            for id in self.world.cleanup() {
                self.book.forget_actor(id);
            }
            self.world.respawn();
            self.monitor.reset(self.world.timestamp());
            self.stats.refreshes += 1;
        }

        self.stats.records_dropped = self.book.dropped();
        Ok(TickOutcome { records, refresh })
    }

    /// Runs `ticks` ticks, summarizing every record into an export.
    pub fn run(&mut self, ticks: u64) -> Result<RunExport, SimError> {
        let mut export = RunExport::new(self.world.config().seed);

        for _ in 0..ticks {
            let outcome = self.tick()?;
            for record in &outcome.records {
                export.add_record(record);
            }
            if let Some(reason) = outcome.refresh {
                export.add_refresh(self.world.tick(), self.world.timestamp(), reason);
            }
        }

        export.finalize(self.stats, self.world.timestamp());
        info!(
            ticks = self.stats.ticks,
            captured = self.stats.frames_captured,
            skipped = self.stats.frames_skipped,
            completed = self.stats.records_completed,
            dropped = self.stats.records_dropped,
            refreshes = self.stats.refreshes,
            "run finished"
        );
        Ok(export)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bev_core::Layer;

    fn bev() -> BevConfig {
        BevConfig {
            size: [48, 48],
            pixels_per_meter: 3.0,
            sample_step: 0.5,
            ..BevConfig::default()
        }
    }

    fn sim() -> SimConfig {
        SimConfig {
            vehicles: 4,
            pedestrians: 3,
            encoder_cells: 4,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_every_pedestrian_recorded_each_tick() {
        let mut collector = Collector::new(sim(), &bev()).unwrap();
        let outcome = collector.tick().unwrap();

        assert_eq!(outcome.records.len(), 3);
        for record in &outcome.records {
            assert_eq!(record.tick, 1);
            assert_eq!(record.action.tick, 1);
            assert_eq!(record.state.tensor.shape(), [48, 48, 5]);
            assert_eq!(record.state.features.len(), 5 * 4 * 4);
        }
        assert_eq!(collector.pending_records(), 0);

        let stats = collector.stats();
        assert_eq!(stats.ticks, 1);
        assert_eq!(stats.frames_captured, 3);
        assert_eq!(stats.records_completed, 3);
    }

    #[test]
    fn test_hero_frames_show_sidewalk_under_pedestrian() {
        let mut collector = Collector::new(sim(), &bev()).unwrap();
        collector.tick().unwrap();

        let frame = collector.last_frame().unwrap();
        // Pedestrians spawn on sidewalks
        assert!(frame.layer(Layer::Sidewalk).is_occupied(24, 24));
        assert!(frame.layer(Layer::Lane).occupied_count() > 0);
    }

    #[test]
    fn test_run_is_deterministic() {
        let a = Collector::new(sim(), &bev()).unwrap().run(30).unwrap();
        let b = Collector::new(sim(), &bev()).unwrap().run(30).unwrap();

        assert_eq!(a.stats, b.stats);
        assert_eq!(
            serde_json::to_string(&a.records).unwrap(),
            serde_json::to_string(&b.records).unwrap()
        );
        assert_eq!(a.stats.ticks, 30);
    }

    #[test]
    fn test_low_pedestrians_triggers_refresh() {
        // Three pedestrians is always below the default minimum of eight
        let limits = RefreshLimits {
            warmup: 0.2,
            ..RefreshLimits::default()
        };
        let mut collector = Collector::new(sim(), &bev()).unwrap().with_refresh_limits(limits);
        let export = collector.run(6).unwrap();

        assert!(collector.stats().refreshes >= 1);
        assert!(matches!(
            export.refreshes[0].reason,
            RefreshReason::LowPedestrians { .. }
        ));
        assert_eq!(collector.world().count(ActorCategory::Pedestrian), 3);
    }

    #[test]
    fn test_walking_direction_renders_up() {
        let config = SimConfig { vehicles: 0, ..sim() };
        let mut collector = Collector::new(config, &bev()).unwrap();
        collector.tick().unwrap();
        let outcome = collector.tick().unwrap();

        let frame = collector.last_frame().unwrap();
        assert_eq!(frame.tick, 2);
        let snapshot = collector.world().snapshot().unwrap();
        let hero = snapshot.actor(frame.hero_id).unwrap();
        assert!(hero.speed() > 0.1);
        let dir = hero.velocity / hero.speed();

        // Five meters along the walking direction: center column, 15 px up
        let ahead = hero.pose.position + dir * 5.0;
        let px = bev_core::world_to_pixel(&frame.hero_pose, ahead, &frame.canvas).unwrap();
        assert_eq!((px.x, px.y), (24, 9));

        let record = outcome.records.iter().find(|r| r.actor_id == frame.hero_id).unwrap();
        assert!((record.state.heading - dir).norm() < 1e-9);
    }

    #[test]
    fn test_queued_traffic_triggers_deadlock() {
        let config = SimConfig { vehicles: 0, ..sim() };
        let limits = RefreshLimits {
            stuck_time: 1.0,
            stuck_count: 5,
            timeout: 1000.0,
            warmup: 1000.0,
            ..RefreshLimits::default()
        };
        let mut collector = Collector::new(config, &bev()).unwrap().with_refresh_limits(limits);

        // A stalled vehicle with four more closing in behind it
        let world = collector.world_mut();
        world.spawn_vehicle(1, 20.0, 0.0);
        for distance in [27.0, 34.0, 41.0, 48.0] {
            world.spawn_vehicle(1, distance, 8.0);
        }

        let export = collector.run(60).unwrap();
        assert_eq!(export.refreshes.len(), 1);
        assert!(matches!(
            export.refreshes[0].reason,
            RefreshReason::Deadlock { stuck } if stuck >= 5
        ));
        // Respawned with the configured zero vehicles
        assert_eq!(collector.world().count(ActorCategory::Vehicle), 0);
    }

    #[test]
    fn test_layer_order_flows_into_records() {
        let mut config = bev();
        config.layer_order = vec![Layer::Pedestrian, Layer::Vehicle];
        let mut collector = Collector::new(sim(), &config).unwrap();
        let outcome = collector.tick().unwrap();

        let record = &outcome.records[0];
        assert_eq!(record.state.tensor.channels(), &[Layer::Pedestrian, Layer::Vehicle]);
        assert_eq!(record.state.features.len(), 2 * 4 * 4);
        assert_eq!(collector.stats().frames_skipped, 0);
    }

    struct ShapeEncoder;

    impl FeatureEncoder for ShapeEncoder {
        fn output_len(&self, _channels: usize) -> usize {
            3
        }

        fn encode(&self, tensor: &bev_core::BevTensor) -> Vec<f32> {
            tensor.shape().iter().map(|d| *d as f32).collect()
        }
    }

    #[test]
    fn test_custom_encoder() {
        let mut collector = Collector::new(sim(), &bev()).unwrap().with_encoder(Box::new(ShapeEncoder));
        let outcome = collector.tick().unwrap();
        assert_eq!(outcome.records[0].state.features, vec![48.0, 48.0, 5.0]);
    }
}
