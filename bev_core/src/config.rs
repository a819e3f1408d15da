//! Engine configuration.
//!
//! Recognized keys (JSON): `size`, `bevRange` / `BEV_range`,
//! `pixelsPerMeter`, `sampleStep`, `actorRadius`, `layerOrder`,
//! `rasterWorkers`. Missing keys fall back to the defaults below
//! (a 16 m × 16 m window at 20 px/m, i.e. 320 × 320).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::BevError;
use crate::layer::{Layer, LayerOrder};

/// Canvas geometry shared by every layer of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Canvas {
    pub width: usize,
    pub height: usize,
    pub pixels_per_meter: f64,

    /// Side of the ground square sampled for surface layers (meters)
    pub bev_range: f64,
}

impl Canvas {
    /// Pixel the hero is pinned to.
    pub fn center(&self) -> (usize, usize) {
        (self.width / 2, self.height / 2)
    }
}

/// Raw, user-facing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BevConfig {
    /// [width, height] in pixels
    pub size: [usize; 2],

    #[serde(alias = "BEV_range", alias = "bev_range")]
    pub bev_range: f64,

    #[serde(alias = "pixels_per_meter")]
    pub pixels_per_meter: f64,

    /// Surface sampling step in meters
    #[serde(alias = "sample_step")]
    pub sample_step: f64,

    /// Disk radius for point actors, in pixels
    #[serde(alias = "actor_radius")]
    pub actor_radius: u32,

    /// Tensor channel order
    #[serde(alias = "layer_order")]
    pub layer_order: Vec<Layer>,

    /// Worker threads for surface sampling (1 = sequential)
    #[serde(alias = "raster_workers")]
    pub raster_workers: usize,
}

impl Default for BevConfig {
    fn default() -> Self {
        Self {
            size: [320, 320],
            bev_range: 16.0,
            pixels_per_meter: 20.0,
            sample_step: 0.1,
            actor_radius: 3,
            layer_order: Layer::ALL.to_vec(),
            raster_workers: 1,
        }
    }
}

impl BevConfig {
    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, BevError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BevError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Validates geometry and returns the canvas.
    pub fn canvas(&self) -> Result<Canvas, BevError> {
        let [width, height] = self.size;
        if width == 0 || height == 0 {
            return Err(BevError::config(format!("size must be non-zero, got {}x{}", width, height)));
        }
        if !(self.pixels_per_meter.is_finite() && self.pixels_per_meter > 0.0) {
            return Err(BevError::config(format!("pixelsPerMeter must be positive, got {}", self.pixels_per_meter)));
        }
        if !(self.bev_range.is_finite() && self.bev_range > 0.0) {
            return Err(BevError::config(format!("bevRange must be positive, got {}", self.bev_range)));
        }

        Ok(Canvas {
            width,
            height,
            pixels_per_meter: self.pixels_per_meter,
            bev_range: self.bev_range,
        })
    }

    /// Validates the channel order.
    pub fn layer_order(&self) -> Result<LayerOrder, BevError> {
        LayerOrder::new(self.layer_order.clone())
    }

    /// Checks every field.
    pub fn validate(&self) -> Result<(), BevError> {
        self.canvas()?;
        self.layer_order()?;
        if !(self.sample_step.is_finite() && self.sample_step > 0.0) {
            return Err(BevError::config(format!("sampleStep must be positive, got {}", self.sample_step)));
        }
        if self.sample_step > self.bev_range {
            return Err(BevError::config("sampleStep larger than bevRange"));
        }
        if self.raster_workers == 0 {
            return Err(BevError::config("rasterWorkers must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_window() {
        let config = BevConfig::default();
        let canvas = config.canvas().unwrap();

        assert_eq!(canvas.center(), (160, 160));
        assert_eq!(canvas.bev_range * canvas.pixels_per_meter, 320.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bev_range_aliases() {
        let camel = BevConfig::from_json_str(r#"{"bevRange": 24.0}"#).unwrap();
        let legacy = BevConfig::from_json_str(r#"{"BEV_range": 24.0}"#).unwrap();

        assert_eq!(camel.bev_range, 24.0);
        assert_eq!(legacy.bev_range, 24.0);
        assert_eq!(legacy.size, [320, 320]);
    }

    #[test]
    fn test_full_document() {
        let config = BevConfig::from_json_str(
            r#"{
                "size": [200, 100],
                "pixelsPerMeter": 10,
                "BEV_range": 20,
                "layerOrder": ["vehicle", "road", "pedestrian"],
                "rasterWorkers": 4
            }"#,
        )
        .unwrap();

        assert_eq!(config.size, [200, 100]);
        assert_eq!(config.layer_order, vec![Layer::Vehicle, Layer::Lane, Layer::Pedestrian]);
        assert_eq!(config.raster_workers, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = BevConfig::default();
        config.size = [0, 320];
        assert!(matches!(config.canvas(), Err(BevError::InvalidConfig(_))));

        let mut config = BevConfig::default();
        config.pixels_per_meter = -1.0;
        assert!(config.validate().is_err());

        let mut config = BevConfig::default();
        config.sample_step = 0.0;
        assert!(config.validate().is_err());

        let mut config = BevConfig::default();
        config.layer_order = vec![Layer::Vehicle, Layer::Vehicle];
        assert!(config.validate().is_err());

        let mut config = BevConfig::default();
        config.raster_workers = 0;
        assert!(config.validate().is_err());

        assert!(matches!(BevConfig::from_json_str("{"), Err(BevError::Config(_))));
    }
}
