//! Crossroad BEV Core - Hero-Centric Bird's-Eye-View Rasterization
//!
//! This library turns one simulator snapshot into per-actor training input:
//! 1. **Transform**: world points into a fixed canvas centered on the hero, heading up
//! 2. **Rasterize**: lane and sidewalk surfaces plus vehicle, pedestrian and
//!    traffic-light occupancy as binary layers
//! 3. **Record**: stack layers into a tensor and pair it with the action
//!    chosen for the same tick

pub mod config;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod layer;
pub mod raster;
pub mod record;
pub mod tensor;
pub mod transform;
pub mod visualization;

// Re-export key types for convenience
pub use config::{BevConfig, Canvas};
pub use encoder::{FeatureEncoder, PooledOccupancyEncoder};
pub use error::{BevError, RecordError};
pub use frame::{BevFrameBuilder, FrameSnapshot};
pub use layer::{Layer, LayerOrder, PixelCoord, SemanticLayer, FREE, OCCUPIED};
pub use raster::{LayerRasterizer, SurfaceLayers};
pub use record::{Action, ActorDistance, CompleteRecord, EgoState, RecordBook, RecordPhase, StateActionRecord};
pub use tensor::{to_tensor, BevTensor};
pub use transform::{world_to_pixel, CoordinateTransformer};
pub use visualization::{save_png, to_visualization};
