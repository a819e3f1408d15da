//! Channel stacking of frame layers.

use serde::{Deserialize, Serialize};

use crate::frame::FrameSnapshot;
use crate::layer::{Layer, LayerOrder};

/// Multi-channel occupancy tensor, laid out `[height][width][channel]`.
///
/// Channel `i` is always `channels[i]`, whatever order the frame stores its
/// layers in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BevTensor {
    width: usize,
    height: usize,
    channels: Vec<Layer>,
    data: Vec<u8>,
}

impl BevTensor {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> &[Layer] {
        &self.channels
    }

    /// `[H, W, N]`
    pub fn shape(&self) -> [usize; 3] {
        [self.height, self.width, self.channels.len()]
    }

    pub fn get(&self, x: usize, y: usize, channel: usize) -> Option<u8> {
        let n = self.channels.len();
        if x < self.width && y < self.height && channel < n {
            Some(self.data[(y * self.width + x) * n + channel])
        } else {
            None
        }
    }

    /// Channel index of a layer.
    pub fn channel_of(&self, layer: Layer) -> Option<usize> {
        self.channels.iter().position(|l| *l == layer)
    }

    /// Copies one channel out as a row-major plane.
    pub fn channel(&self, channel: usize) -> Option<Vec<u8>> {
        let n = self.channels.len();
        if channel >= n {
            return None;
        }
        Some(self.data.iter().skip(channel).step_by(n).copied().collect())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Stacks `frame`'s layers in `order`.
pub fn to_tensor(frame: &FrameSnapshot, order: &LayerOrder) -> BevTensor {
    let (width, height) = (frame.canvas.width, frame.canvas.height);
    let planes: Vec<&[u8]> = order.iter().map(|l| frame.layer(l).as_slice()).collect();
    let n = planes.len();

    let mut data = Vec::with_capacity(width * height * n);
    for cell in 0..width * height {
        for plane in &planes {
            data.push(plane[cell]);
        }
    }

    BevTensor {
        width,
        height,
        channels: order.as_slice().to_vec(),
        data,
    }
}
