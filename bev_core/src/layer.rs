//! Semantic layer identities and binary occupancy grids.

use bev_env::{ActorCategory, LaneType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::BevError;

/// Cell value of an occupied pixel.
pub const OCCUPIED: u8 = 255;

/// Cell value of a free pixel.
pub const FREE: u8 = 0;

/// Closed set of semantic classes rendered into a frame.
///
/// Declaration order is the rasterization order and the index into a
/// frame's layer array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Drivable surface
    #[serde(alias = "road")]
    Lane,
    Sidewalk,
    Vehicle,
    Pedestrian,
    TrafficLight,
}

/// How a layer is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Dense map sampling around the hero
    Surface,
    /// One disk per actor of the given category
    Point(ActorCategory),
}

impl Layer {
    pub const COUNT: usize = 5;

    pub const ALL: [Layer; Layer::COUNT] = [
        Layer::Lane,
        Layer::Sidewalk,
        Layer::Vehicle,
        Layer::Pedestrian,
        Layer::TrafficLight,
    ];

    /// Index into per-layer arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(&self) -> &'static str {
        match self {
            Layer::Lane => "lane",
            Layer::Sidewalk => "sidewalk",
            Layer::Vehicle => "vehicle",
            Layer::Pedestrian => "pedestrian",
            Layer::TrafficLight => "traffic_light",
        }
    }

    pub fn kind(&self) -> LayerKind {
        match self {
            Layer::Lane | Layer::Sidewalk => LayerKind::Surface,
            Layer::Vehicle => LayerKind::Point(ActorCategory::Vehicle),
            Layer::Pedestrian => LayerKind::Point(ActorCategory::Pedestrian),
            Layer::TrafficLight => LayerKind::Point(ActorCategory::TrafficLight),
        }
    }

    /// Surface layer a lane classification is routed to, if any.
    pub fn for_lane_type(lane: LaneType) -> Option<Layer> {
        match lane {
            LaneType::Driving => Some(Layer::Lane),
            LaneType::Sidewalk | LaneType::Shoulder => Some(Layer::Sidewalk),
            _ => None,
        }
    }
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lane" | "road" => Ok(Layer::Lane),
            "sidewalk" => Ok(Layer::Sidewalk),
            "vehicle" => Ok(Layer::Vehicle),
            "pedestrian" | "walker" => Ok(Layer::Pedestrian),
            "traffic_light" | "trafficlight" => Ok(Layer::TrafficLight),
            _ => Err(format!("Unknown layer: {}", s)),
        }
    }
}

/// Pixel index on the canvas (column, row).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PixelCoord {
    pub x: usize,
    pub y: usize,
}

impl PixelCoord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// A `width × height` binary grid (row-major, values 0 or 255).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticLayer {
    width: usize,
    height: usize,
    cells: Vec<u8>,
}

impl SemanticLayer {
    /// Creates an all-free grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![FREE; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Cell value, `None` outside the grid.
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        if x < self.width && y < self.height {
            Some(self.cells[y * self.width + x])
        } else {
            None
        }
    }

    pub fn is_occupied(&self, x: usize, y: usize) -> bool {
        self.get(x, y) == Some(OCCUPIED)
    }

    /// Marks one cell; out-of-grid cells are ignored.
    pub fn mark(&mut self, x: i64, y: i64) {
        if x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height {
            self.cells[y as usize * self.width + x as usize] = OCCUPIED;
        }
    }

    /// Fills a disk of `radius` pixels (`dx² + dy² ≤ r²`) clipped to the grid.
    pub fn stamp_disk(&mut self, center: PixelCoord, radius: u32) {
        let r = radius as i64;
        let (cx, cy) = (center.x as i64, center.y as i64);
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy <= r * r {
                    self.mark(cx + dx, cy + dy);
                }
            }
        }
    }

    /// Fills a `(2·half + 1)²` square clipped to the grid.
    pub fn stamp_square(&mut self, center: PixelCoord, half_width: usize) {
        let h = half_width as i64;
        let (cx, cy) = (center.x as i64, center.y as i64);
        for y in (cy - h)..=(cy + h) {
            for x in (cx - h)..=(cx + h) {
                self.mark(x, y);
            }
        }
    }

    /// ORs another grid of the same size into this one.
    pub fn merge(&mut self, other: &SemanticLayer) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        for (dst, src) in self.cells.iter_mut().zip(&other.cells) {
            *dst |= *src;
        }
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == OCCUPIED).count()
    }

    /// True if every cell is exactly 0 or 255.
    pub fn is_binary(&self) -> bool {
        self.cells.iter().all(|&c| c == FREE || c == OCCUPIED)
    }

    /// Row-major cell values.
    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }
}

impl std::fmt::Debug for SemanticLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticLayer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("occupied", &self.occupied_count())
            .finish()
    }
}

/// Validated channel order: non-empty, no repeated layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerOrder(Vec<Layer>);

impl LayerOrder {
    pub fn new(layers: Vec<Layer>) -> Result<Self, BevError> {
        if layers.is_empty() {
            return Err(BevError::config("layer order is empty"));
        }
        let mut seen = HashSet::new();
        for layer in &layers {
            if !seen.insert(*layer) {
                return Err(BevError::config(format!("layer '{}' listed twice", layer)));
            }
        }
        Ok(Self(layers))
    }

    pub fn as_slice(&self) -> &[Layer] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, layer: Layer) -> bool {
        self.0.contains(&layer)
    }

    /// Channel index of a layer.
    pub fn position(&self, layer: Layer) -> Option<usize> {
        self.0.iter().position(|l| *l == layer)
    }

    pub fn iter(&self) -> impl Iterator<Item = Layer> + '_ {
        self.0.iter().copied()
    }
}

impl Default for LayerOrder {
    fn default() -> Self {
        Self(Layer::ALL.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_routing() {
        assert_eq!(Layer::for_lane_type(LaneType::Driving), Some(Layer::Lane));
        assert_eq!(Layer::for_lane_type(LaneType::Sidewalk), Some(Layer::Sidewalk));
        assert_eq!(Layer::for_lane_type(LaneType::Shoulder), Some(Layer::Sidewalk));
        assert_eq!(Layer::for_lane_type(LaneType::Parking), None);
        assert_eq!(Layer::for_lane_type(LaneType::Median), None);
    }

    #[test]
    fn test_layer_indices_follow_declaration() {
        for (i, layer) in Layer::ALL.iter().enumerate() {
            assert_eq!(layer.index(), i);
        }
        assert_eq!("road".parse::<Layer>().unwrap(), Layer::Lane);
        assert!("sky".parse::<Layer>().is_err());
    }

    #[test]
    fn test_disk_stamp_radius_three() {
        let mut layer = SemanticLayer::new(20, 20);
        layer.stamp_disk(PixelCoord::new(10, 10), 3);

        assert!(layer.is_occupied(10, 10));
        assert!(layer.is_occupied(13, 10));
        assert!(layer.is_occupied(10, 7));
        assert!(!layer.is_occupied(13, 13)); // 9 + 9 > 9
        assert!(!layer.is_occupied(14, 10));
        // 29 lattice points inside a radius-3 circle
        assert_eq!(layer.occupied_count(), 29);
        assert!(layer.is_binary());
    }

    #[test]
    fn test_stamps_clip_at_edges() {
        let mut layer = SemanticLayer::new(8, 8);
        layer.stamp_square(PixelCoord::new(0, 7), 2);
        assert_eq!(layer.occupied_count(), 9);

        layer.stamp_disk(PixelCoord::new(7, 0), 3);
        assert!(layer.is_occupied(7, 0));
        assert!(layer.is_binary());
    }

    #[test]
    fn test_merge_is_union() {
        let mut a = SemanticLayer::new(4, 4);
        let mut b = SemanticLayer::new(4, 4);
        a.mark(0, 0);
        b.mark(3, 3);
        b.mark(0, 0);
        a.merge(&b);
        assert_eq!(a.occupied_count(), 2);
    }

    #[test]
    fn test_layer_order_validation() {
        assert!(LayerOrder::new(vec![]).is_err());
        assert!(LayerOrder::new(vec![Layer::Lane, Layer::Lane]).is_err());

        let order = LayerOrder::new(vec![Layer::Vehicle, Layer::Lane]).unwrap();
        assert_eq!(order.position(Layer::Lane), Some(1));
        assert_eq!(order.position(Layer::Sidewalk), None);
        assert_eq!(LayerOrder::default().len(), Layer::COUNT);
    }
}
