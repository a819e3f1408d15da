//! Simulator-session traits consumed by the BEV engine.

use crate::error::EnvError;
use crate::types::{ActorFilter, ActorId, ActorState, LaneType, Pose, WorldSnapshot};
use nalgebra::Point2;

/// Static map geometry queries.
///
/// Split from [`SimulatorSession`] so that a rasterizer can be handed a map
/// without getting access to live actors.
pub trait LaneMap {
    /// Returns the lane classification at a world point.
    ///
    /// No snapping to the nearest road: `Ok(None)` means the point is off
    /// any classified lane and must be skipped.
    fn lane_type_at(&self, point: Point2<f64>) -> Result<Option<LaneType>, EnvError>;
}

impl<M: LaneMap + ?Sized> LaneMap for &M {
    fn lane_type_at(&self, point: Point2<f64>) -> Result<Option<LaneType>, EnvError> {
        (**self).lane_type_at(point)
    }
}

/// The simulator seen from the engine.
///
/// # Implementations
///
/// - **Simulation**: `IntersectionWorld` in `bev_sim` (seeded, deterministic)
/// - **Live**: a CARLA telemetry feed plus a map provider
///
/// The engine never holds a session across ticks; it asks for one
/// [`WorldSnapshot`] per tick and works from that.
pub trait SimulatorSession: LaneMap {
    /// Current simulation step.
    fn tick(&self) -> u64;

    /// Current simulation time in seconds.
    fn timestamp(&self) -> f64;

    /// Returns every actor passing `filter`.
    ///
    /// Order only has to be stable within one call.
    fn actors(&self, filter: ActorFilter) -> Result<Vec<ActorState>, EnvError>;

    /// Returns the pose of a live actor, `None` if absent or destroyed.
    fn hero_pose(&self, id: ActorId) -> Result<Option<Pose>, EnvError> {
        Ok(self
            .actors(ActorFilter::All)?
            .into_iter()
            .find(|a| a.id == id && a.alive)
            .map(|a| a.pose))
    }

    /// Takes an immutable snapshot of the whole world at the current tick.
    fn snapshot(&self) -> Result<WorldSnapshot, EnvError> {
        let actors = self.actors(ActorFilter::All)?;
        Ok(WorldSnapshot::new(self.tick(), self.timestamp(), actors))
    }
}
