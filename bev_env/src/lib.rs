//! Crossroad BEV Environment Abstraction Layer
//!
//! This crate is everything the BEV engine knows about the simulator:
//! - **Types**: actor ids, poses, closed actor/lane enumerations, snapshots
//! - **Session**: the `SimulatorSession` / `LaneMap` query traits
//! - **Telemetry**: decoding of CARLA bridge packets into snapshots
//!
//! # Core Concept: Snapshots, not handles
//!
//! The engine never keeps a live world handle between ticks. Each tick the
//! caller takes one immutable [`WorldSnapshot`] and passes it in, so every
//! layer of a frame is drawn from the same tick.
//!
//! # Example
//!
//! ```ignore
//! use bev_core::{BevFrameBuilder, FrameSnapshot};
//! use bev_env::{ActorId, SimulatorSession};
//!
//! fn tick<S: SimulatorSession + Sync>(
//!     builder: &BevFrameBuilder,
//!     session: &S,
//!     hero: ActorId,
//! ) -> Result<FrameSnapshot, Box<dyn std::error::Error>> {
//!     let snapshot = session.snapshot()?;
//!     let frame = builder.capture_frame(hero, &snapshot, session)?;
//!     Ok(frame)
//! }
//! ```

mod error;
mod session;
mod types;
pub mod telemetry;

pub use error::EnvError;
pub use session::{LaneMap, SimulatorSession};
pub use types::{ActorCategory, ActorFilter, ActorId, ActorState, LaneType, Pose, WorldSnapshot};
