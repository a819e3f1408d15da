//! IntersectionWorld - the seeded stand-in for a live simulator.
//!
//! Traffic enters along the four approach lanes at a cruise speed, ignores
//! pedestrians and lights, and only stops to keep a gap to the vehicle
//! ahead. Pedestrians walk back and forth across the road next to the
//! junction, each followed by a walker controller. Four traffic lights sit
//! at the corners.

use bev_env::{
    ActorCategory, ActorFilter, ActorId, ActorState, EnvError, LaneMap, LaneType, Pose, SimulatorSession,
};
use nalgebra::{Point2, Vector2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::SimError;
use crate::map::CrossroadMap;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    pub vehicles: usize,
    pub pedestrians: usize,

    /// Fixed step in seconds
    pub delta: f64,

    /// Pedestrians spawn within this distance of the junction (meters)
    pub spawn_radius: f64,

    /// Actors beyond this distance are destroyed (meters)
    pub despawn_radius: f64,

    pub vehicle_speed_mean: f64,
    pub vehicle_speed_std: f64,
    pub pedestrian_speed_mean: f64,
    pub pedestrian_speed_std: f64,

    /// Pedestrians stop when a vehicle is this close ahead (meters)
    pub yield_distance: f64,

    /// Vehicles stop when the gap to the vehicle ahead shrinks to this (meters)
    pub lead_distance: f64,

    /// Pooling grid side for record features
    pub encoder_cells: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            vehicles: 30,
            pedestrians: 30,
            delta: 0.05,
            spawn_radius: 25.0,
            despawn_radius: 60.0,
            vehicle_speed_mean: 9.0,
            vehicle_speed_std: 1.5,
            pedestrian_speed_mean: 1.4,
            pedestrian_speed_std: 0.2,
            yield_distance: 6.0,
            lead_distance: 2.0,
            encoder_cells: 8,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if !(self.delta.is_finite() && self.delta > 0.0) {
            return Err(SimError::InvalidConfig(format!("delta must be positive, got {}", self.delta)));
        }
        if self.spawn_radius >= self.despawn_radius {
            return Err(SimError::InvalidConfig(format!(
                "spawn radius {} must be inside despawn radius {}",
                self.spawn_radius, self.despawn_radius
            )));
        }
        if !(self.lead_distance.is_finite() && self.lead_distance >= 0.0) {
            return Err(SimError::InvalidConfig(format!(
                "lead distance must be non-negative, got {}",
                self.lead_distance
            )));
        }
        if self.encoder_cells == 0 {
            return Err(SimError::InvalidConfig("encoder_cells must be at least 1".into()));
        }
        Ok(())
    }
}

/// Where a pedestrian is walking and how fast it likes to go.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkerPlan {
    pub goal: Point2<f64>,

    /// The far side of the crossing; swapped with `goal` on arrival
    pub origin: Point2<f64>,

    pub preferred_speed: f64,
}

#[derive(Debug, Clone)]
struct SimActor {
    state: ActorState,
    plan: Option<WalkerPlan>,

    /// Walker a controller is attached to
    attached_to: Option<ActorId>,

    /// Velocity chosen by the policy, applied on the next step
    command: Option<Vector2<f64>>,

    /// Speed a vehicle returns to once the road ahead clears
    cruise_speed: f64,
}

/// Goal radius for walkers (meters)
const ARRIVAL_TOLERANCE: f64 = 0.3;

/// Vehicles never spawn within this distance of the despawn radius (meters)
const SPAWN_MARGIN: f64 = 5.0;

/// Footprint used for gap keeping (meters)
const VEHICLE_LENGTH: f64 = 4.5;
const VEHICLE_WIDTH: f64 = 2.0;

pub struct IntersectionWorld {
    config: SimConfig,
    map: CrossroadMap,
    rng: ChaCha8Rng,
    vehicle_speed: Normal<f64>,
    pedestrian_speed: Normal<f64>,
    actors: BTreeMap<ActorId, SimActor>,
    next_id: u32,
    tick: u64,
    time: f64,
}

impl IntersectionWorld {
    /// Builds the static scene and the first round of traffic.
    pub fn new(config: SimConfig, map: CrossroadMap) -> Result<Self, SimError> {
        config.validate()?;
        if config.despawn_radius - SPAWN_MARGIN <= map.road_half_width {
            return Err(SimError::InvalidConfig(format!(
                "despawn radius {} leaves no room for vehicles beyond the junction (half width {})",
                config.despawn_radius, map.road_half_width
            )));
        }

        // Keep physics entropy independent from anything else keyed on the seed
        let physics_seed = config.seed.wrapping_mul(0x9e3779b97f4a7c15);

        let mut world = Self {
            vehicle_speed: Normal::new(config.vehicle_speed_mean, config.vehicle_speed_std)?,
            pedestrian_speed: Normal::new(config.pedestrian_speed_mean, config.pedestrian_speed_std)?,
            rng: ChaCha8Rng::seed_from_u64(physics_seed),
            config,
            map,
            actors: BTreeMap::new(),
            next_id: 1,
            tick: 0,
            time: 0.0,
        };

        world.spawn_traffic_lights();
        world.respawn();
        Ok(world)
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn map(&self) -> &CrossroadMap {
        &self.map
    }

    pub fn walker_plan(&self, id: ActorId) -> Option<WalkerPlan> {
        self.actors.get(&id).and_then(|a| a.plan)
    }

    /// Number of live actors of a category.
    pub fn count(&self, category: ActorCategory) -> usize {
        self.actors
            .values()
            .filter(|a| a.state.alive && a.state.category == category)
            .count()
    }

    fn next_actor_id(&mut self) -> ActorId {
        let id = ActorId(self.next_id);
        self.next_id += 1;
        id
    }

    fn insert(&mut self, state: ActorState, plan: Option<WalkerPlan>, attached_to: Option<ActorId>) {
        self.actors.insert(
            state.id,
            SimActor {
                state,
                plan,
                attached_to,
                command: None,
                cruise_speed: 0.0,
            },
        );
    }

    fn spawn_traffic_lights(&mut self) {
        let offset = self.map.sidewalk_inner() + 0.5 * self.map.sidewalk_width;
        for (sx, sy, yaw) in [(1.0, 1.0, 180.0), (-1.0, 1.0, 270.0), (-1.0, -1.0, 0.0), (1.0, -1.0, 90.0)] {
            let p = self.map.center + Vector2::new(sx * offset, sy * offset);
            let id = self.next_actor_id();
            let state = ActorState::new(id, ActorCategory::TrafficLight, Pose::new(p.x, p.y, yaw), Vector2::zeros());
            self.insert(state, None, None);
        }
    }

    /// Spawns vehicles on the approach lanes, heading into the junction.
    pub fn spawn_vehicles(&mut self, count: usize) -> Vec<ActorId> {
        let max_distance = self.config.despawn_radius - SPAWN_MARGIN;
        let mut spawned = Vec::with_capacity(count);

        for _ in 0..count {
            let approach = self.rng.gen_range(0..4);
            let distance = self.rng.gen_range(self.map.road_half_width..max_distance);
            let speed = self.vehicle_speed.sample(&mut self.rng).max(0.0);
            spawned.push(self.spawn_vehicle(approach, distance, speed));
        }
        spawned
    }

    /// Spawns one vehicle in the right-hand lane of `approach` (0..4, a
    /// quarter turn apart), `distance` meters before the junction center.
    pub fn spawn_vehicle(&mut self, approach: usize, distance: f64, cruise_speed: f64) -> ActorId {
        let yaw = 90.0 * (approach % 4) as f64;
        let dir = Pose::new(0.0, 0.0, yaw).forward();
        // Right-hand traffic
        let right = Vector2::new(dir.y, -dir.x);
        let p = self.map.center - dir * distance + right * (0.5 * self.map.road_half_width);

        let id = self.next_actor_id();
        let state = ActorState::new(id, ActorCategory::Vehicle, Pose::new(p.x, p.y, yaw), dir * cruise_speed);
        self.insert(state, None, None);
        if let Some(actor) = self.actors.get_mut(&id) {
            actor.cruise_speed = cruise_speed;
        }
        id
    }

    /// Spawns pedestrians on the sidewalks beside the junction, each about
    /// to cross the adjacent road, with a walker controller attached.
    pub fn spawn_pedestrians(&mut self, count: usize) -> Vec<ActorId> {
        let (inner, outer) = (self.map.sidewalk_inner(), self.map.sidewalk_outer());
        let along_max = self.config.spawn_radius.max(outer + 1.0);
        let mut spawned = Vec::with_capacity(count);

        for _ in 0..count {
            let side = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            let across = side * self.rng.gen_range(inner..outer);
            let along_sign = if self.rng.gen_bool(0.5) { 1.0 } else { -1.0 };
            let along = along_sign * self.rng.gen_range(outer..along_max);

            // Beside the east-west road or the north-south one
            let (start, goal) = if self.rng.gen_bool(0.5) {
                (Vector2::new(along, across), Vector2::new(along, -across))
            } else {
                (Vector2::new(across, along), Vector2::new(-across, along))
            };
            let start = self.map.center + start;
            let goal = self.map.center + goal;

            let preferred_speed = self.pedestrian_speed.sample(&mut self.rng).max(0.3);
            let heading = goal - start;
            let yaw = Pose::yaw_toward(heading);

            let id = self.next_actor_id();
            let walker = ActorState::new(id, ActorCategory::Pedestrian, Pose::new(start.x, start.y, yaw), Vector2::zeros());
            let plan = WalkerPlan {
                goal,
                origin: start,
                preferred_speed,
            };
            self.insert(walker, Some(plan), None);

            let controller_id = self.next_actor_id();
            let controller = ActorState::new(controller_id, ActorCategory::Controller, Pose::new(start.x, start.y, yaw), Vector2::zeros());
            self.insert(controller, None, Some(id));

            spawned.push(id);
        }
        spawned
    }

    /// Queues a velocity for a pedestrian, applied on the next step.
    pub fn command(&mut self, id: ActorId, velocity: Vector2<f64>) -> Result<(), EnvError> {
        match self.actors.get_mut(&id) {
            Some(actor) if actor.state.alive && actor.state.category == ActorCategory::Pedestrian => {
                actor.command = Some(velocity);
                Ok(())
            }
            _ => Err(EnvError::query(format!("no live pedestrian {}", id))),
        }
    }

    /// Advances one fixed step.
    ///
    /// Actors marked dead on the previous step are destroyed first. Then
    /// every live actor moves at constant velocity and anything beyond the
    /// despawn radius is marked dead.
    pub fn step(&mut self) {
        self.tick += 1;
        self.time += self.config.delta;
        let dt = self.config.delta;

        self.actors.retain(|_, a| a.state.alive);
        self.follow_leaders();

        for actor in self.actors.values_mut() {
            if let Some(v) = actor.command.take() {
                actor.state.velocity = v;
            }
            if actor.state.category == ActorCategory::TrafficLight || actor.attached_to.is_some() {
                continue;
            }

            actor.state.pose.position += actor.state.velocity * dt;
            if actor.state.speed() > 1e-6 {
                actor.state.pose.yaw_degrees = Pose::yaw_toward(actor.state.velocity);
            }

            if let Some(plan) = actor.plan.as_mut() {
                if (plan.goal - actor.state.pose.position).norm() < ARRIVAL_TOLERANCE {
                    std::mem::swap(&mut plan.goal, &mut plan.origin);
                }
            }

            if (actor.state.pose.position - self.map.center).norm() > self.config.despawn_radius {
                actor.state.alive = false;
            }
        }

        // Controllers follow their walkers
        let walkers: BTreeMap<ActorId, ActorState> = self
            .actors
            .values()
            .filter(|a| a.state.category == ActorCategory::Pedestrian)
            .map(|a| (a.state.id, a.state.clone()))
            .collect();
        for actor in self.actors.values_mut() {
            if let Some(walker) = actor.attached_to.and_then(|w| walkers.get(&w)) {
                actor.state.pose = walker.pose;
                actor.state.velocity = walker.velocity;
                actor.state.alive = walker.alive;
            }
        }
    }

    /// Stops every vehicle whose gap to a vehicle ahead is within the lead
    /// distance and sends the rest back to cruise speed.
    fn follow_leaders(&mut self) {
        let vehicles: Vec<(ActorId, Point2<f64>)> = self
            .actors
            .values()
            .filter(|a| a.state.category == ActorCategory::Vehicle)
            .map(|a| (a.state.id, a.state.pose.position))
            .collect();
        let lead_distance = self.config.lead_distance;

        for actor in self.actors.values_mut() {
            if actor.state.category != ActorCategory::Vehicle {
                continue;
            }
            let forward = actor.state.pose.forward();
            let blocked = vehicles.iter().any(|&(id, position)| {
                if id == actor.state.id {
                    return false;
                }
                let rel = position - actor.state.pose.position;
                let ahead = rel.dot(&forward);
                let lateral = rel.perp(&forward).abs();
                ahead > 0.0 && lateral < VEHICLE_WIDTH && ahead - VEHICLE_LENGTH <= lead_distance
            });

            actor.state.velocity = if blocked {
                Vector2::zeros()
            } else {
                forward * actor.cruise_speed
            };
        }
    }

    /// Destroys every walker, controller and vehicle. Traffic lights stay.
    pub fn cleanup(&mut self) -> Vec<ActorId> {
        let destroyed: Vec<ActorId> = self
            .actors
            .values()
            .filter(|a| a.state.category != ActorCategory::TrafficLight)
            .map(|a| a.state.id)
            .collect();
        for id in &destroyed {
            self.actors.remove(id);
        }
        debug!(destroyed = destroyed.len(), tick = self.tick, "world cleaned up");
        destroyed
    }

    /// Repopulates vehicles and pedestrians to the configured counts.
    pub fn respawn(&mut self) {
        let vehicles = self.config.vehicles.saturating_sub(self.count(ActorCategory::Vehicle));
        let pedestrians = self.config.pedestrians.saturating_sub(self.count(ActorCategory::Pedestrian));
        self.spawn_vehicles(vehicles);
        self.spawn_pedestrians(pedestrians);
        debug!(vehicles, pedestrians, tick = self.tick, "actors spawned");
    }
}

impl LaneMap for IntersectionWorld {
    fn lane_type_at(&self, point: Point2<f64>) -> Result<Option<LaneType>, EnvError> {
        self.map.lane_type_at(point)
    }
}

impl SimulatorSession for IntersectionWorld {
    fn tick(&self) -> u64 {
        self.tick
    }

    fn timestamp(&self) -> f64 {
        self.time
    }

    fn actors(&self, filter: ActorFilter) -> Result<Vec<ActorState>, EnvError> {
        Ok(self
            .actors
            .values()
            .map(|a| &a.state)
            .filter(|s| filter.matches(s))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SimConfig {
        SimConfig {
            vehicles: 6,
            pedestrians: 5,
            ..SimConfig::default()
        }
    }

    fn world(config: SimConfig) -> IntersectionWorld {
        IntersectionWorld::new(config, CrossroadMap::default()).unwrap()
    }

    #[test]
    fn test_initial_population() {
        let w = world(small());
        assert_eq!(w.count(ActorCategory::Vehicle), 6);
        assert_eq!(w.count(ActorCategory::Pedestrian), 5);
        assert_eq!(w.count(ActorCategory::Controller), 5);
        assert_eq!(w.count(ActorCategory::TrafficLight), 4);
        assert_eq!(w.tick(), 0);
    }

    #[test]
    fn test_pedestrians_start_on_sidewalk_and_cross() {
        let w = world(small());
        for ped in w.actors(ActorFilter::Category(ActorCategory::Pedestrian)).unwrap() {
            assert_eq!(w.lane_type_at(ped.pose.position).unwrap(), Some(LaneType::Sidewalk));
            assert!((ped.pose.position - w.map().center).norm() <= 25.0 * std::f64::consts::SQRT_2);

            let plan = w.walker_plan(ped.id).unwrap();
            assert_eq!(w.lane_type_at(plan.goal).unwrap(), Some(LaneType::Sidewalk));
            assert!(plan.preferred_speed >= 0.3);
        }
    }

    #[test]
    fn test_vehicles_spawn_on_driving_lanes() {
        let w = world(small());
        for v in w.actors(ActorFilter::Category(ActorCategory::Vehicle)).unwrap() {
            assert_eq!(w.lane_type_at(v.pose.position).unwrap(), Some(LaneType::Driving));
            // Heading toward the junction
            let to_center = w.map().center - v.pose.position;
            assert!(v.velocity.dot(&to_center) >= 0.0);
        }
    }

    #[test]
    fn test_same_seed_same_world() {
        let mut a = world(small());
        let mut b = world(small());
        for _ in 0..20 {
            a.step();
            b.step();
        }
        assert_eq!(a.snapshot().unwrap().actors, b.snapshot().unwrap().actors);

        let c = world(SimConfig { seed: 7, ..small() });
        assert_ne!(world(small()).snapshot().unwrap().actors, c.snapshot().unwrap().actors);
    }

    #[test]
    fn test_step_applies_command_and_moves_controller() {
        let mut w = world(small());
        let ped = w.actors(ActorFilter::Category(ActorCategory::Pedestrian)).unwrap()[0].clone();
        w.command(ped.id, Vector2::new(1.0, 0.0)).unwrap();
        w.step();

        let snap = w.snapshot().unwrap();
        let moved = snap.actor(ped.id).unwrap();
        assert!((moved.pose.position.x - ped.pose.position.x - 0.05).abs() < 1e-9);
        // Walking toward +x faces yaw -90
        assert!((moved.pose.yaw_degrees + 90.0).abs() < 1e-9);
        assert!((moved.pose.forward() - Vector2::new(1.0, 0.0)).norm() < 1e-9);

        let controller = snap.alive_of(ActorCategory::Controller).find(|c| c.pose == moved.pose);
        assert!(controller.is_some());
        assert_eq!(w.tick(), 1);
        assert!((w.timestamp() - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_command_rejects_non_pedestrians() {
        let mut w = world(small());
        let vehicle = w.actors(ActorFilter::Category(ActorCategory::Vehicle)).unwrap()[0].id;
        assert!(w.command(vehicle, Vector2::zeros()).is_err());
        assert!(w.command(ActorId(9999), Vector2::zeros()).is_err());
    }

    #[test]
    fn test_despawn_marks_then_destroys() {
        let mut w = world(SimConfig {
            pedestrians: 0,
            vehicles: 0,
            ..small()
        });
        // Facing +x, just short of the despawn radius
        let id = w.spawn_vehicle(3, 10.0, 10.0);
        w.actors.get_mut(&id).unwrap().state.pose.position = w.map.center + Vector2::new(59.9, 0.0);

        w.step();
        assert!(!w.snapshot().unwrap().actor(id).unwrap().alive);
        w.step();
        assert!(w.snapshot().unwrap().actor(id).is_none());
    }

    #[test]
    fn test_vehicle_heading_matches_velocity() {
        let w = world(small());
        for v in w.actors(ActorFilter::Category(ActorCategory::Vehicle)).unwrap() {
            let forward = v.pose.forward();
            assert!((forward * v.speed() - v.velocity).norm() < 1e-9);
        }
    }

    #[test]
    fn test_vehicles_queue_behind_stalled_leader() {
        let mut w = world(SimConfig {
            vehicles: 0,
            pedestrians: 0,
            ..small()
        });
        let leader = w.spawn_vehicle(0, 20.0, 0.0);
        let follower = w.spawn_vehicle(0, 30.0, 8.0);
        // Oncoming lane, never blocked by the queue
        let oncoming = w.spawn_vehicle(2, 40.0, 8.0);

        for _ in 0..40 {
            w.step();
        }

        let snap = w.snapshot().unwrap();
        let lead = snap.actor(leader).unwrap();
        let follow = snap.actor(follower).unwrap();
        let gap = (lead.pose.position - follow.pose.position).norm() - VEHICLE_LENGTH;
        assert!(follow.speed() < 1e-9);
        assert!(gap > 0.0 && gap <= 2.0, "gap {}", gap);
        assert!((snap.actor(oncoming).unwrap().speed() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_follower_resumes_when_leader_clears() {
        let mut w = world(SimConfig {
            vehicles: 0,
            pedestrians: 0,
            ..small()
        });
        let leader = w.spawn_vehicle(3, 20.0, 0.0);
        let follower = w.spawn_vehicle(3, 25.0, 6.0);
        w.step();
        assert!(w.snapshot().unwrap().actor(follower).unwrap().speed() < 1e-9);

        w.actors.get_mut(&leader).unwrap().cruise_speed = 6.0;
        for _ in 0..10 {
            w.step();
        }
        assert!((w.snapshot().unwrap().actor(follower).unwrap().speed() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_cleanup_and_respawn() {
        let mut w = world(small());
        let destroyed = w.cleanup();
        assert_eq!(destroyed.len(), 6 + 5 + 5);
        assert_eq!(w.count(ActorCategory::TrafficLight), 4);
        assert_eq!(w.count(ActorCategory::Vehicle), 0);

        w.respawn();
        assert_eq!(w.count(ActorCategory::Vehicle), 6);
        assert_eq!(w.count(ActorCategory::Pedestrian), 5);
    }

    #[test]
    fn test_invalid_config() {
        let bad = SimConfig {
            delta: 0.0,
            ..SimConfig::default()
        };
        assert!(IntersectionWorld::new(bad, CrossroadMap::default()).is_err());

        let bad = SimConfig {
            pedestrian_speed_std: -1.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            IntersectionWorld::new(bad, CrossroadMap::default()),
            Err(SimError::Distribution(_))
        ));
    }

    #[test]
    fn test_despawn_radius_too_small_for_vehicles() {
        // Vehicle spawn range would be [7, 5)
        let bad = SimConfig {
            spawn_radius: 5.0,
            despawn_radius: 10.0,
            ..SimConfig::default()
        };
        assert!(matches!(
            IntersectionWorld::new(bad, CrossroadMap::default()),
            Err(SimError::InvalidConfig(_))
        ));

        let tight = SimConfig {
            spawn_radius: 5.0,
            despawn_radius: 12.5,
            ..small()
        };
        let w = world(tight);
        assert_eq!(w.count(ActorCategory::Vehicle), 6);
    }
}
