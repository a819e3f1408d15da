//! Round refresh heuristics.
//!
//! A round ends on timeout, when enough vehicles have been stuck for a
//! while, or when too few pedestrians remain near the junction.

use bev_env::{ActorCategory, ActorId, WorldSnapshot};
use nalgebra::Point2;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RefreshReason {
    Timeout,
    Deadlock { stuck: usize },
    LowPedestrians { count: usize },
}

impl fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshReason::Timeout => write!(f, "TIMEOUT"),
            RefreshReason::Deadlock { stuck } => write!(f, "DEADLOCK: {} vehicles stuck", stuck),
            RefreshReason::LowPedestrians { count } => {
                write!(f, "LOW PEDESTRIANS: only {} pedestrians in intersection", count)
            }
        }
    }
}

/// Thresholds for ending a round. Times are simulation seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshLimits {
    pub timeout: f64,
    pub stuck_speed: f64,
    pub stuck_time: f64,
    pub stuck_count: usize,
    pub min_pedestrians: usize,
    pub pedestrian_radius: f64,

    /// Grace period before the pedestrian check applies
    pub warmup: f64,
}

impl Default for RefreshLimits {
    fn default() -> Self {
        Self {
            timeout: 60.0,
            stuck_speed: 0.1,
            stuck_time: 5.0,
            stuck_count: 5,
            min_pedestrians: 8,
            pedestrian_radius: 25.0,
            warmup: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshMonitor {
    limits: RefreshLimits,
    center: Point2<f64>,
    round_start: f64,

    /// When each slow vehicle first dropped below the stuck speed
    stuck_since: HashMap<ActorId, f64>,
}

impl RefreshMonitor {
    pub fn new(limits: RefreshLimits, center: Point2<f64>) -> Self {
        Self {
            limits,
            center,
            round_start: 0.0,
            stuck_since: HashMap::new(),
        }
    }

    pub fn limits(&self) -> &RefreshLimits {
        &self.limits
    }

    /// Checks one snapshot. Timeout wins over deadlock, deadlock over low
    /// pedestrians.
    pub fn observe(&mut self, snapshot: &WorldSnapshot) -> Option<RefreshReason> {
        let now = snapshot.timestamp;
        let elapsed = now - self.round_start;

        let mut stuck = 0;
        let mut seen = Vec::new();
        for vehicle in snapshot.alive_of(ActorCategory::Vehicle) {
            seen.push(vehicle.id);
            if vehicle.speed() < self.limits.stuck_speed {
                let since = *self.stuck_since.entry(vehicle.id).or_insert(now);
                if now - since > self.limits.stuck_time {
                    stuck += 1;
                }
            } else {
                self.stuck_since.remove(&vehicle.id);
            }
        }
        self.stuck_since.retain(|id, _| seen.contains(id));

        let pedestrians = snapshot
            .alive_of(ActorCategory::Pedestrian)
            .filter(|p| (p.pose.position - self.center).norm() < self.limits.pedestrian_radius)
            .count();

        if elapsed > self.limits.timeout {
            Some(RefreshReason::Timeout)
        } else if stuck >= self.limits.stuck_count {
            Some(RefreshReason::Deadlock { stuck })
        } else if elapsed > self.limits.warmup && pedestrians <= self.limits.min_pedestrians {
            Some(RefreshReason::LowPedestrians { count: pedestrians })
        } else {
            None
        }
    }

    /// Starts a new round at `now`.
    pub fn reset(&mut self, now: f64) {
        self.round_start = now;
        self.stuck_since.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bev_env::{ActorState, Pose};
    use nalgebra::Vector2;

    fn snapshot(t: f64, stopped: usize, moving: usize, pedestrians: usize) -> WorldSnapshot {
        let mut actors = Vec::new();
        let mut id = 0;
        for i in 0..stopped + moving {
            id += 1;
            let v = if i < stopped { Vector2::zeros() } else { Vector2::new(8.0, 0.0) };
            actors.push(ActorState::new(ActorId(id), ActorCategory::Vehicle, Pose::new(0.0, 0.0, 0.0), v));
        }
        for _ in 0..pedestrians {
            id += 1;
            actors.push(ActorState::new(ActorId(id), ActorCategory::Pedestrian, Pose::new(5.0, 5.0, 0.0), Vector2::zeros()));
        }
        WorldSnapshot::new((t / 0.05) as u64, t, actors)
    }

    fn monitor() -> RefreshMonitor {
        RefreshMonitor::new(RefreshLimits::default(), Point2::origin())
    }

    #[test]
    fn test_quiet_round() {
        let mut m = monitor();
        for step in 0..100 {
            assert_eq!(m.observe(&snapshot(step as f64 * 0.05, 2, 10, 20)), None);
        }
    }

    #[test]
    fn test_timeout() {
        let mut m = monitor();
        assert_eq!(m.observe(&snapshot(60.05, 0, 10, 20)), Some(RefreshReason::Timeout));

        m.reset(60.05);
        assert_eq!(m.observe(&snapshot(61.0, 0, 10, 20)), None);
    }

    #[test]
    fn test_deadlock_needs_sustained_stop() {
        let mut m = monitor();
        assert_eq!(m.observe(&snapshot(0.0, 5, 0, 20)), None);
        assert_eq!(m.observe(&snapshot(5.0, 5, 0, 20)), None);
        assert_eq!(m.observe(&snapshot(5.05, 5, 0, 20)), Some(RefreshReason::Deadlock { stuck: 5 }));
    }

    #[test]
    fn test_moving_vehicle_resets_timer() {
        let mut m = monitor();
        m.observe(&snapshot(0.0, 5, 0, 20));
        // Everyone moves again
        m.observe(&snapshot(3.0, 0, 5, 20));
        assert_eq!(m.observe(&snapshot(5.5, 5, 0, 20)), None);
        assert_eq!(m.observe(&snapshot(10.6, 5, 0, 20)), Some(RefreshReason::Deadlock { stuck: 5 }));
    }

    #[test]
    fn test_low_pedestrians_after_warmup() {
        let mut m = monitor();
        assert_eq!(m.observe(&snapshot(4.0, 0, 3, 8)), None);
        assert_eq!(m.observe(&snapshot(5.5, 0, 3, 8)), Some(RefreshReason::LowPedestrians { count: 8 }));
        assert_eq!(m.observe(&snapshot(5.5, 0, 3, 9)), None);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(RefreshReason::Deadlock { stuck: 6 }.to_string(), "DEADLOCK: 6 vehicles stuck");
        assert_eq!(RefreshReason::Timeout.to_string(), "TIMEOUT");
    }
}
