//! Color rendering of a frame for human inspection.
//!
//! Debug only: the learning pipeline consumes [`crate::tensor::BevTensor`],
//! never this image.

use image::{Rgb, RgbImage};
use std::path::Path;

use crate::error::BevError;
use crate::frame::FrameSnapshot;
use crate::layer::Layer;

/// Draw order, back to front. Later entries overwrite earlier ones.
pub const DRAW_ORDER: [(Layer, [u8; 3]); Layer::COUNT] = [
    (Layer::Lane, [64, 64, 64]),          // Dark gray
    (Layer::Sidewalk, [140, 140, 140]),   // Gray
    (Layer::TrafficLight, [255, 200, 0]), // Yellow
    (Layer::Vehicle, [0, 120, 255]),      // Blue
    (Layer::Pedestrian, [255, 40, 40]),   // Red
];

const BACKGROUND: [u8; 3] = [0, 0, 0];

/// Display color of a layer.
pub fn layer_color(layer: Layer) -> [u8; 3] {
    DRAW_ORDER
        .iter()
        .find(|(l, _)| *l == layer)
        .map(|(_, c)| *c)
        .unwrap_or(BACKGROUND)
}

/// Paints every layer onto a black canvas in [`DRAW_ORDER`].
pub fn to_visualization(frame: &FrameSnapshot) -> RgbImage {
    let (width, height) = (frame.canvas.width as u32, frame.canvas.height as u32);
    let mut img = RgbImage::from_pixel(width, height, Rgb(BACKGROUND));

    for (layer, color) in DRAW_ORDER {
        let grid = frame.layer(layer);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            if grid.is_occupied(x as usize, y as usize) {
                *pixel = Rgb(color);
            }
        }
    }

    img
}

/// Renders and writes a PNG.
pub fn save_png(frame: &FrameSnapshot, path: impl AsRef<Path>) -> Result<(), BevError> {
    to_visualization(frame).save(path)?;
    Ok(())
}
