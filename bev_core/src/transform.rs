//! World ↔ hero-local ↔ pixel transforms.
//!
//! The hero is pinned to the canvas center and the world rotates under it:
//!
//! ```text
//! (dx, dy) = target − hero.position
//! (rx, ry) = R(−yaw) · (dx, dy)          R(a) = [cos a  −sin a]
//!                                               [sin a   cos a]
//! px = width/2  + rx · pixels_per_meter
//! py = height/2 − ry · pixels_per_meter   (image rows grow downward)
//! ```
//!
//! Hero-local +y is "forward" and is drawn toward the top of the image.
//! Points outside the canvas are reported as `None` and must be dropped by
//! callers; they are never clamped.

use bev_env::Pose;
use nalgebra::{Point2, Rotation2, Vector2};

use crate::config::Canvas;
use crate::layer::PixelCoord;

/// Absorbs trigonometric round-off so cardinal headings land on exact
/// integer pixels (cos 90° is 6e-17, not 0).
const SNAP_EPSILON: f64 = 1e-9;

/// Transformer bound to one hero pose and one canvas.
///
/// Rebuilt for every capture; it never outlives the tick it was made for.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateTransformer {
    hero: Pose,
    canvas: Canvas,

    /// world → hero-local
    to_local: Rotation2<f64>,

    /// hero-local → world
    to_world: Rotation2<f64>,
}

impl CoordinateTransformer {
    pub fn new(hero: Pose, canvas: Canvas) -> Self {
        let rad = -hero.yaw_radians();
        Self {
            hero,
            canvas,
            to_local: Rotation2::new(rad),
            to_world: Rotation2::new(-rad),
        }
    }

    pub fn hero(&self) -> &Pose {
        &self.hero
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Translates and rotates a world point into the hero frame (meters).
    pub fn world_to_local(&self, target: Point2<f64>) -> Vector2<f64> {
        self.to_local * (target - self.hero.position)
    }

    /// Maps a hero-local offset back to the world frame.
    pub fn local_to_world(&self, local: Vector2<f64>) -> Point2<f64> {
        self.hero.position + self.to_world * local
    }

    /// Scales and discretizes a hero-local offset.
    pub fn local_to_pixel(&self, local: Vector2<f64>) -> Option<PixelCoord> {
        let (cx, cy) = self.canvas.center();
        let ppm = self.canvas.pixels_per_meter;

        let px = cx as f64 + local.x * ppm;
        let py = cy as f64 - local.y * ppm;

        Some(PixelCoord::new(
            discretize(px, self.canvas.width)?,
            discretize(py, self.canvas.height)?,
        ))
    }

    /// Full world → pixel mapping, `None` when off-canvas.
    pub fn world_to_pixel(&self, target: Point2<f64>) -> Option<PixelCoord> {
        self.local_to_pixel(self.world_to_local(target))
    }
}

/// One-shot `world_to_pixel(heroPose, target, canvas)`.
pub fn world_to_pixel(hero: &Pose, target: Point2<f64>, canvas: &Canvas) -> Option<PixelCoord> {
    CoordinateTransformer::new(*hero, *canvas).world_to_pixel(target)
}

/// Bounds check then truncation to an index in `[0, limit)`.
fn discretize(value: f64, limit: usize) -> Option<usize> {
    let snapped = value + SNAP_EPSILON;
    if !snapped.is_finite() || snapped < 0.0 || snapped >= limit as f64 {
        return None;
    }
    Some(snapped.floor() as usize)
}
