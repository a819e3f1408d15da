//! Common types shared between the simulator session and the BEV engine.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Simulator-assigned actor identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActorId(pub u32);

impl ActorId {
    /// Returns the raw simulator id.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Closed set of actor kinds the engine knows how to draw.
///
/// Resolved once from the simulator blueprint id when an actor is first
/// seen, never re-matched per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorCategory {
    Vehicle,
    Pedestrian,
    TrafficLight,
    /// AI controllers attached to walkers (never drawn)
    Controller,
    Other,
}

impl ActorCategory {
    /// Classifies a blueprint type id such as `vehicle.tesla.model3` or
    /// `walker.pedestrian.0001`.
    pub fn from_type_id(type_id: &str) -> Self {
        let type_id = type_id.trim().to_ascii_lowercase();
        let mut parts = type_id.split('.');
        match (parts.next(), parts.next()) {
            (Some("vehicle"), _) => ActorCategory::Vehicle,
            (Some("walker"), _) => ActorCategory::Pedestrian,
            (Some("traffic"), Some(kind)) if kind.starts_with("traffic_light") => {
                ActorCategory::TrafficLight
            }
            (Some("controller"), _) => ActorCategory::Controller,
            _ => ActorCategory::Other,
        }
    }

    /// Returns the category name.
    pub fn name(&self) -> &'static str {
        match self {
            ActorCategory::Vehicle => "vehicle",
            ActorCategory::Pedestrian => "pedestrian",
            ActorCategory::TrafficLight => "traffic_light",
            ActorCategory::Controller => "controller",
            ActorCategory::Other => "other",
        }
    }
}

impl std::fmt::Display for ActorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lane classification returned by a map query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneType {
    Driving,
    Sidewalk,
    Shoulder,
    Parking,
    Bidirectional,
    Median,
    Other,
}

/// 2D pose in the simulator world frame.
///
/// Yaw is in degrees, counter-clockwise, with yaw 0 facing world +y. The
/// forward unit vector is `(−sin yaw, cos yaw)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Position in meters
    pub position: Point2<f64>,

    /// Heading in degrees
    pub yaw_degrees: f64,
}

impl Pose {
    /// Creates a pose from coordinates and a yaw in degrees.
    pub fn new(x: f64, y: f64, yaw_degrees: f64) -> Self {
        Self {
            position: Point2::new(x, y),
            yaw_degrees,
        }
    }

    /// Returns the yaw in radians.
    pub fn yaw_radians(&self) -> f64 {
        self.yaw_degrees.to_radians()
    }

    /// Unit vector the pose faces, in the world frame.
    pub fn forward(&self) -> Vector2<f64> {
        let yaw = self.yaw_radians();
        Vector2::new(-yaw.sin(), yaw.cos())
    }

    /// Yaw (degrees) that faces along `direction`.
    pub fn yaw_toward(direction: Vector2<f64>) -> f64 {
        (-direction.x).atan2(direction.y).to_degrees()
    }

    /// Converts a yaw measured from world +x, as CARLA reports it.
    pub fn yaw_from_x_axis(yaw_degrees: f64) -> f64 {
        yaw_degrees - 90.0
    }
}

/// State of one actor at a single tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorState {
    pub id: ActorId,
    pub category: ActorCategory,
    pub pose: Pose,

    /// Planar velocity (vx, vy) in m/s
    pub velocity: Vector2<f64>,

    /// False once the simulator has destroyed the actor
    pub alive: bool,
}

impl ActorState {
    /// Creates a live actor.
    pub fn new(id: ActorId, category: ActorCategory, pose: Pose, velocity: Vector2<f64>) -> Self {
        Self {
            id,
            category,
            pose,
            velocity,
            alive: true,
        }
    }

    /// Planar speed in m/s.
    pub fn speed(&self) -> f64 {
        self.velocity.norm()
    }
}

/// Category filter for actor queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorFilter {
    All,
    Category(ActorCategory),
}

impl ActorFilter {
    /// Returns true if the actor passes this filter.
    pub fn matches(&self, actor: &ActorState) -> bool {
        match self {
            ActorFilter::All => true,
            ActorFilter::Category(category) => actor.category == *category,
        }
    }
}

/// Immutable view of every actor at one tick.
///
/// Everything rasterized into a frame comes from a single snapshot, so no
/// layer can mix two ticks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Simulation step this snapshot was taken at
    pub tick: u64,

    /// Simulation time in seconds
    pub timestamp: f64,

    pub actors: Vec<ActorState>,
}

impl WorldSnapshot {
    /// Creates a snapshot.
    pub fn new(tick: u64, timestamp: f64, actors: Vec<ActorState>) -> Self {
        Self {
            tick,
            timestamp,
            actors,
        }
    }

    /// Looks up an actor by id (alive or not).
    pub fn actor(&self, id: ActorId) -> Option<&ActorState> {
        self.actors.iter().find(|a| a.id == id)
    }

    /// Iterates over alive actors of one category.
    pub fn alive_of(&self, category: ActorCategory) -> impl Iterator<Item = &ActorState> {
        self.actors
            .iter()
            .filter(move |a| a.alive && a.category == category)
    }

    /// Number of alive actors.
    pub fn alive_count(&self) -> usize {
        self.actors.iter().filter(|a| a.alive).count()
    }
}
