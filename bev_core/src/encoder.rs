//! Feature encoders that turn a tensor into a flat policy input.

use crate::error::BevError;
use crate::layer::OCCUPIED;
use crate::tensor::BevTensor;

/// Maps a BEV tensor to a feature vector.
pub trait FeatureEncoder: Send + Sync {
    /// Length of every vector this encoder produces for `tensor`'s channels.
    fn output_len(&self, channels: usize) -> usize;

    fn encode(&self, tensor: &BevTensor) -> Vec<f32>;
}

/// Average-pools each channel onto a `cells × cells` grid.
///
/// Output is channel-major, then row-major within a channel. Values are
/// occupied fractions in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PooledOccupancyEncoder {
    cells: usize,
}

impl PooledOccupancyEncoder {
    pub fn new(cells: usize) -> Result<Self, BevError> {
        if cells == 0 {
            return Err(BevError::config("encoder needs at least one cell"));
        }
        Ok(Self { cells })
    }

    pub fn cells(&self) -> usize {
        self.cells
    }

    /// Half-open pixel span `[start, end)` covered by cell `i` along an
    /// axis of `len` pixels.
    fn span(&self, i: usize, len: usize) -> (usize, usize) {
        (i * len / self.cells, (i + 1) * len / self.cells)
    }
}

impl FeatureEncoder for PooledOccupancyEncoder {
    fn output_len(&self, channels: usize) -> usize {
        channels * self.cells * self.cells
    }

    fn encode(&self, tensor: &BevTensor) -> Vec<f32> {
        let channels = tensor.channels().len();
        let (width, height) = (tensor.width(), tensor.height());
        let mut out = Vec::with_capacity(self.output_len(channels));

        for c in 0..channels {
            for cy in 0..self.cells {
                let (y0, y1) = self.span(cy, height);
                for cx in 0..self.cells {
                    let (x0, x1) = self.span(cx, width);
                    let area = (y1 - y0) * (x1 - x0);
                    if area == 0 {
                        out.push(0.0);
                        continue;
                    }

                    let mut occupied = 0usize;
                    for y in y0..y1 {
                        for x in x0..x1 {
                            if tensor.get(x, y, c) == Some(OCCUPIED) {
                                occupied += 1;
                            }
                        }
                    }
                    out.push(occupied as f32 / area as f32);
                }
            }
        }

        out
    }
}
