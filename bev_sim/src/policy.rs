//! Pedestrian decision rule.

use bev_core::Action;
use bev_env::{ActorCategory, ActorState, WorldSnapshot};
use nalgebra::Vector2;

use crate::world::WalkerPlan;

/// Walks toward the goal at the preferred speed, and stands still while a
/// vehicle is close ahead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PedestrianPolicy {
    /// Vehicles closer than this, inside the view cone, block the walker (meters)
    pub yield_distance: f64,

    /// Half-angle of the view cone (degrees)
    pub view_half_angle: f64,
}

impl Default for PedestrianPolicy {
    fn default() -> Self {
        Self {
            yield_distance: 6.0,
            view_half_angle: 45.0,
        }
    }
}

impl PedestrianPolicy {
    pub fn new(yield_distance: f64) -> Self {
        Self {
            yield_distance,
            ..Self::default()
        }
    }

    /// Target velocity for one walker at this snapshot.
    pub fn target_velocity(&self, walker: &ActorState, plan: &WalkerPlan, snapshot: &WorldSnapshot) -> Vector2<f64> {
        let to_goal = plan.goal - walker.pose.position;
        let distance = to_goal.norm();
        if distance < 1e-6 {
            return Vector2::zeros();
        }
        let dir = to_goal / distance;

        if self.vehicle_ahead(walker, &dir, snapshot) {
            return Vector2::zeros();
        }

        // Do not overshoot the goal within one second
        dir * plan.preferred_speed.min(distance)
    }

    /// Builds the action for the snapshot's tick.
    pub fn decide(&self, walker: &ActorState, plan: &WalkerPlan, snapshot: &WorldSnapshot) -> Action {
        Action {
            target_velocity: self.target_velocity(walker, plan, snapshot),
            timestamp: snapshot.timestamp,
            tick: snapshot.tick,
        }
    }

    fn vehicle_ahead(&self, walker: &ActorState, dir: &Vector2<f64>, snapshot: &WorldSnapshot) -> bool {
        let min_cos = self.view_half_angle.to_radians().cos();
        snapshot.alive_of(ActorCategory::Vehicle).any(|v| {
            let rel = v.pose.position - walker.pose.position;
            let d = rel.norm();
            d <= self.yield_distance && (d < 1e-6 || rel.dot(dir) / d >= min_cos)
        })
    }
}
