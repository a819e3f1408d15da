//! Per-tick frame capture.

use bev_env::{ActorId, LaneMap, Pose, SimulatorSession, WorldSnapshot};
use tracing::debug;

use crate::config::{BevConfig, Canvas};
use crate::error::BevError;
use crate::layer::{Layer, LayerKind, LayerOrder, SemanticLayer};
use crate::raster::LayerRasterizer;
use crate::transform::CoordinateTransformer;

/// Every semantic layer for one hero at one tick.
///
/// All layers share the canvas and the hero pose recorded here.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSnapshot {
    pub tick: u64,
    pub timestamp: f64,
    pub hero_id: ActorId,
    pub hero_pose: Pose,
    pub canvas: Canvas,
    layers: [SemanticLayer; Layer::COUNT],
}

impl FrameSnapshot {
    pub fn layer(&self, layer: Layer) -> &SemanticLayer {
        &self.layers[layer.index()]
    }

    /// Layers in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Layer, &SemanticLayer)> {
        Layer::ALL.iter().map(move |l| (*l, &self.layers[l.index()]))
    }
}

/// Validated engine settings plus the capture entry points.
#[derive(Debug, Clone)]
pub struct BevFrameBuilder {
    canvas: Canvas,
    layer_order: LayerOrder,
    sample_step: f64,
    actor_radius: u32,
    raster_workers: usize,
}

impl BevFrameBuilder {
    pub fn new(config: &BevConfig) -> Result<Self, BevError> {
        config.validate()?;
        Ok(Self {
            canvas: config.canvas()?,
            layer_order: config.layer_order()?,
            sample_step: config.sample_step,
            actor_radius: config.actor_radius,
            raster_workers: config.raster_workers,
        })
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn layer_order(&self) -> &LayerOrder {
        &self.layer_order
    }

    /// Renders every configured layer for `hero` from one snapshot.
    ///
    /// The hero pose is read once, up front. Layers not in the configured
    /// order stay empty. Any map failure discards the whole frame.
    pub fn capture_frame<M: LaneMap + Sync + ?Sized>(
        &self,
        hero: ActorId,
        snapshot: &WorldSnapshot,
        map: &M,
    ) -> Result<FrameSnapshot, BevError> {
        let hero_pose = snapshot
            .actor(hero)
            .filter(|a| a.alive)
            .map(|a| a.pose)
            .ok_or(BevError::MissingHero(hero))?;

        let rasterizer = LayerRasterizer::new(
            CoordinateTransformer::new(hero_pose, self.canvas),
            self.actor_radius,
            self.sample_step,
        );

        let mut layers: [SemanticLayer; Layer::COUNT] =
            std::array::from_fn(|_| SemanticLayer::new(self.canvas.width, self.canvas.height));

        if self.layer_order.contains(Layer::Lane) || self.layer_order.contains(Layer::Sidewalk) {
            let surface = rasterizer.rasterize_surface_parallel(map, self.raster_workers)?;
            if self.layer_order.contains(Layer::Lane) {
                layers[Layer::Lane.index()] = surface.lane;
            }
            if self.layer_order.contains(Layer::Sidewalk) {
                layers[Layer::Sidewalk.index()] = surface.sidewalk;
            }
        }

        for layer in Layer::ALL {
            if let LayerKind::Point(category) = layer.kind() {
                if self.layer_order.contains(layer) {
                    layers[layer.index()] = rasterizer.rasterize_points(snapshot, hero, category);
                }
            }
        }

        debug!(
            tick = snapshot.tick,
            %hero,
            lane = layers[Layer::Lane.index()].occupied_count(),
            vehicle = layers[Layer::Vehicle.index()].occupied_count(),
            pedestrian = layers[Layer::Pedestrian.index()].occupied_count(),
            "frame captured"
        );

        Ok(FrameSnapshot {
            tick: snapshot.tick,
            timestamp: snapshot.timestamp,
            hero_id: hero,
            hero_pose,
            canvas: self.canvas,
            layers,
        })
    }

    /// Takes one snapshot from a live session, then captures against it.
    pub fn capture_from_session<S: SimulatorSession + Sync>(
        &self,
        hero: ActorId,
        session: &S,
    ) -> Result<FrameSnapshot, BevError> {
        let snapshot = session.snapshot()?;
        self.capture_frame(hero, &snapshot, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bev_env::{ActorCategory, ActorFilter, ActorState, EnvError, LaneType};
    use nalgebra::{Point2, Vector2};

    struct CrossMap;

    impl LaneMap for CrossMap {
        fn lane_type_at(&self, p: Point2<f64>) -> Result<Option<LaneType>, EnvError> {
            if p.x.abs() < 3.0 || p.y.abs() < 3.0 {
                Ok(Some(LaneType::Driving))
            } else if p.x.abs() < 5.0 || p.y.abs() < 5.0 {
                Ok(Some(LaneType::Sidewalk))
            } else {
                Ok(None)
            }
        }
    }

    struct FailingMap;

    impl LaneMap for FailingMap {
        fn lane_type_at(&self, _p: Point2<f64>) -> Result<Option<LaneType>, EnvError> {
            Err(EnvError::query("map server gone"))
        }
    }

    fn actor(id: u32, category: ActorCategory, x: f64, y: f64, yaw: f64) -> ActorState {
        ActorState::new(ActorId(id), category, Pose::new(x, y, yaw), Vector2::zeros())
    }

    fn snapshot() -> WorldSnapshot {
        WorldSnapshot::new(
            40,
            2.0,
            vec![
                actor(1, ActorCategory::Pedestrian, 0.0, 0.0, 0.0),
                actor(2, ActorCategory::Vehicle, 0.0, 5.0, 90.0),
                actor(3, ActorCategory::Vehicle, 5.0, 0.0, 0.0),
                actor(4, ActorCategory::Pedestrian, -4.0, 4.0, 0.0),
                actor(5, ActorCategory::TrafficLight, 6.0, 6.0, 0.0),
            ],
        )
    }

    fn builder() -> BevFrameBuilder {
        BevFrameBuilder::new(&BevConfig::default()).unwrap()
    }

    #[test]
    fn test_capture_scenario() {
        let frame = builder().capture_frame(ActorId(1), &snapshot(), &CrossMap).unwrap();

        assert_eq!(frame.tick, 40);
        assert_eq!(frame.hero_pose, Pose::new(0.0, 0.0, 0.0));
        assert!(frame.layer(Layer::Vehicle).is_occupied(160, 60));
        assert!(frame.layer(Layer::Vehicle).is_occupied(260, 160));
        assert!(frame.layer(Layer::Lane).is_occupied(160, 160));
        assert!(frame.layer(Layer::Sidewalk).is_occupied(80, 80)); // world (−4, 4)
        assert!(frame.layer(Layer::Pedestrian).is_occupied(80, 80));
        assert!(!frame.layer(Layer::Pedestrian).is_occupied(160, 160));
        assert!(frame.layer(Layer::TrafficLight).is_occupied(280, 40));

        for (_, layer) in frame.iter() {
            assert!(layer.is_binary());
            assert_eq!((layer.width(), layer.height()), (320, 320));
        }
    }

    #[test]
    fn test_capture_idempotent() {
        let b = builder();
        let first = b.capture_frame(ActorId(1), &snapshot(), &CrossMap).unwrap();
        let second = b.capture_frame(ActorId(1), &snapshot(), &CrossMap).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_parallel_capture_identical() {
        let mut config = BevConfig::default();
        config.raster_workers = 4;
        let parallel = BevFrameBuilder::new(&config).unwrap();

        let a = builder().capture_frame(ActorId(4), &snapshot(), &CrossMap).unwrap();
        let b = parallel.capture_frame(ActorId(4), &snapshot(), &CrossMap).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_or_dead_hero() {
        let b = builder();
        let err = b.capture_frame(ActorId(77), &snapshot(), &CrossMap).unwrap_err();
        assert!(matches!(err, BevError::MissingHero(ActorId(77))));

        let mut snap = snapshot();
        snap.actors[0].alive = false;
        let err = b.capture_frame(ActorId(1), &snap, &CrossMap).unwrap_err();
        assert!(matches!(err, BevError::MissingHero(ActorId(1))));
    }

    #[test]
    fn test_map_failure_discards_frame() {
        let err = builder().capture_frame(ActorId(1), &snapshot(), &FailingMap).unwrap_err();
        assert!(matches!(err, BevError::Collaborator(EnvError::Query(_))));
    }

    #[test]
    fn test_unconfigured_layers_stay_empty() {
        let mut config = BevConfig::default();
        config.layer_order = vec![Layer::Vehicle];
        let b = BevFrameBuilder::new(&config).unwrap();

        // Surface pass is skipped, so a failing map is never queried
        let frame = b.capture_frame(ActorId(1), &snapshot(), &FailingMap).unwrap();
        assert_eq!(frame.layer(Layer::Lane).occupied_count(), 0);
        assert_eq!(frame.layer(Layer::Pedestrian).occupied_count(), 0);
        assert!(frame.layer(Layer::Vehicle).occupied_count() > 0);
    }

    struct StaticSession(WorldSnapshot);

    impl LaneMap for StaticSession {
        fn lane_type_at(&self, p: Point2<f64>) -> Result<Option<LaneType>, EnvError> {
            CrossMap.lane_type_at(p)
        }
    }

    impl SimulatorSession for StaticSession {
        fn tick(&self) -> u64 {
            self.0.tick
        }

        fn timestamp(&self) -> f64 {
            self.0.timestamp
        }

        fn actors(&self, filter: ActorFilter) -> Result<Vec<ActorState>, EnvError> {
            Ok(self.0.actors.iter().filter(|a| filter.matches(a)).cloned().collect())
        }
    }

    #[test]
    fn test_capture_from_session() {
        let session = StaticSession(snapshot());
        let frame = builder().capture_from_session(ActorId(1), &session).unwrap();
        let direct = builder().capture_frame(ActorId(1), &snapshot(), &CrossMap).unwrap();
        assert_eq!(frame, direct);
    }
}
