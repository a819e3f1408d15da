//! Procedural four-way crossroad.
//!
//! Two perpendicular roads cross at `center`. Each road edge carries a thin
//! shoulder strip and then a sidewalk band; everything beyond is
//! unclassified.

use bev_env::{EnvError, LaneMap, LaneType};
use nalgebra::{Point2, Vector2};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossroadMap {
    pub center: Point2<f64>,

    /// Distance from a road's centerline to its edge (meters)
    pub road_half_width: f64,

    pub shoulder_width: f64,
    pub sidewalk_width: f64,
}

impl Default for CrossroadMap {
    fn default() -> Self {
        Self::new(Point2::new(-43.5, 21.0))
    }
}

impl CrossroadMap {
    pub fn new(center: Point2<f64>) -> Self {
        Self {
            center,
            road_half_width: 7.0,
            shoulder_width: 0.5,
            sidewalk_width: 3.0,
        }
    }

    /// Offset from a road centerline to the inner edge of its sidewalk.
    pub fn sidewalk_inner(&self) -> f64 {
        self.road_half_width + self.shoulder_width
    }

    /// Offset from a road centerline to the outer edge of its sidewalk.
    pub fn sidewalk_outer(&self) -> f64 {
        self.sidewalk_inner() + self.sidewalk_width
    }

    pub fn classify(&self, point: Point2<f64>) -> Option<LaneType> {
        let d: Vector2<f64> = point - self.center;
        let (ax, ay) = (d.x.abs(), d.y.abs());

        if ax < self.road_half_width || ay < self.road_half_width {
            return Some(LaneType::Driving);
        }

        // Distance to the nearest road centerline
        let edge = ax.min(ay);
        if edge < self.sidewalk_inner() {
            Some(LaneType::Shoulder)
        } else if edge < self.sidewalk_outer() {
            Some(LaneType::Sidewalk)
        } else {
            None
        }
    }
}

impl LaneMap for CrossroadMap {
    fn lane_type_at(&self, point: Point2<f64>) -> Result<Option<LaneType>, EnvError> {
        Ok(self.classify(point))
    }
}
