//! Semantic layer rasterization.
//!
//! Two modes, both binary and idempotent:
//! - **Point**: one filled disk per actor of a category (hero excluded)
//! - **Surface**: dense hero-local sampling of the lane map, one square
//!   brush per classified sample
//!
//! Surface sampling costs `O((bev_range / step)²)` map queries per tick and
//! dominates the engine; rows can be split across scoped worker threads.

use bev_env::{ActorCategory, ActorId, LaneMap, WorldSnapshot};
use nalgebra::Vector2;
use std::ops::Range;
use tracing::trace;

use crate::error::BevError;
use crate::layer::{Layer, SemanticLayer};
use crate::transform::CoordinateTransformer;

/// Brush half-width (pixels) that leaves no gap between samples `step`
/// meters apart: `⌈step · ppm⌉ / 2 + 1`.
///
/// The stamped square is `2·half + 1` pixels wide, which is always at
/// least `step · ppm`.
pub fn brush_half_width(step: f64, pixels_per_meter: f64) -> usize {
    let span = (step * pixels_per_meter - 1e-9).ceil().max(0.0) as usize;
    span / 2 + 1
}

/// Lane and sidewalk grids produced by one surface pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceLayers {
    pub lane: SemanticLayer,
    pub sidewalk: SemanticLayer,
}

impl SurfaceLayers {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            lane: SemanticLayer::new(width, height),
            sidewalk: SemanticLayer::new(width, height),
        }
    }

    fn layer_mut(&mut self, layer: Layer) -> Option<&mut SemanticLayer> {
        match layer {
            Layer::Lane => Some(&mut self.lane),
            Layer::Sidewalk => Some(&mut self.sidewalk),
            _ => None,
        }
    }

    fn merge(&mut self, other: &SurfaceLayers) {
        self.lane.merge(&other.lane);
        self.sidewalk.merge(&other.sidewalk);
    }
}

/// Draws layers for one hero pose.
#[derive(Debug, Clone, Copy)]
pub struct LayerRasterizer {
    transformer: CoordinateTransformer,

    /// Disk radius for point actors (pixels)
    actor_radius: u32,

    /// Surface sampling step (meters)
    sample_step: f64,
}

impl LayerRasterizer {
    pub fn new(transformer: CoordinateTransformer, actor_radius: u32, sample_step: f64) -> Self {
        Self {
            transformer,
            actor_radius,
            sample_step,
        }
    }

    pub fn transformer(&self) -> &CoordinateTransformer {
        &self.transformer
    }

    fn blank(&self) -> SemanticLayer {
        let canvas = self.transformer.canvas();
        SemanticLayer::new(canvas.width, canvas.height)
    }

    /// Point mode: stamps every alive actor of `category` except the hero.
    pub fn rasterize_points(
        &self,
        snapshot: &WorldSnapshot,
        hero: ActorId,
        category: ActorCategory,
    ) -> SemanticLayer {
        let mut layer = self.blank();
        let mut drawn = 0usize;

        for actor in snapshot.alive_of(category).filter(|a| a.id != hero) {
            if let Some(pixel) = self.transformer.world_to_pixel(actor.pose.position) {
                layer.stamp_disk(pixel, self.actor_radius);
                drawn += 1;
            }
        }

        trace!(%category, drawn, "point layer rasterized");
        layer
    }

    /// Half-extent of the sample lattice: samples sit at `i · step` for
    /// `i ∈ [−n, n]`, so the hero's own position is always sampled.
    fn lattice_extent(&self) -> i64 {
        let half_range = self.transformer.canvas().bev_range / 2.0;
        (half_range / self.sample_step).round() as i64
    }

    /// Surface mode over the whole lattice, on the calling thread.
    pub fn rasterize_surface<M: LaneMap + ?Sized>(&self, map: &M) -> Result<SurfaceLayers, BevError> {
        let n = self.lattice_extent();
        let canvas = self.transformer.canvas();
        let mut out = SurfaceLayers::new(canvas.width, canvas.height);
        self.sample_rows(map, -n..n + 1, n, &mut out)?;
        Ok(out)
    }

    /// Surface mode with lattice rows split across `workers` scoped threads.
    ///
    /// Each worker fills private grids that are OR-merged after the join, so
    /// the output is bit-identical to [`Self::rasterize_surface`].
    pub fn rasterize_surface_parallel<M: LaneMap + Sync + ?Sized>(
        &self,
        map: &M,
        workers: usize,
    ) -> Result<SurfaceLayers, BevError> {
        if workers <= 1 {
            return self.rasterize_surface(map);
        }

        let n = self.lattice_extent();
        let rows = (2 * n + 1) as usize;
        let chunk = rows.div_ceil(workers);
        let canvas = *self.transformer.canvas();

        let bands: Vec<Range<i64>> = (0..workers)
            .map(|w| {
                let start = -n + (w * chunk) as i64;
                let end = (start + chunk as i64).min(n + 1);
                start..end
            })
            .filter(|band| band.start < band.end)
            .collect();

        let results = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = bands
                .into_iter()
                .map(|band| {
                    scope.spawn(move |_| {
                        let mut part = SurfaceLayers::new(canvas.width, canvas.height);
                        self.sample_rows(map, band, n, &mut part).map(|_| part)
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(_) => Err(BevError::Worker("surface worker panicked".into())),
                })
                .collect::<Result<Vec<_>, BevError>>()
        })
        .map_err(|_| BevError::Worker("surface scope panicked".into()))??;

        let mut out = SurfaceLayers::new(canvas.width, canvas.height);
        for part in &results {
            out.merge(part);
        }
        Ok(out)
    }

    /// Samples lattice rows `rows` (local y index) across all columns.
    fn sample_rows<M: LaneMap + ?Sized>(
        &self,
        map: &M,
        rows: Range<i64>,
        n: i64,
        out: &mut SurfaceLayers,
    ) -> Result<(), BevError> {
        let step = self.sample_step;
        let half = brush_half_width(step, self.transformer.canvas().pixels_per_meter);

        for j in rows {
            let ly = j as f64 * step;
            for i in -n..=n {
                let local = Vector2::new(i as f64 * step, ly);
                let world = self.transformer.local_to_world(local);

                let Some(lane) = map.lane_type_at(world)? else {
                    continue;
                };
                let Some(layer) = Layer::for_lane_type(lane).and_then(|l| out.layer_mut(l)) else {
                    continue;
                };
                if let Some(pixel) = self.transformer.local_to_pixel(local) {
                    layer.stamp_square(pixel, half);
                }
            }
        }
        Ok(())
    }
}
