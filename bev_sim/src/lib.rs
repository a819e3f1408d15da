//! Crossroad BEV Deterministic Collection Harness
//!
//! This crate plays the simulator for the BEV engine: a procedural crossroad,
//! seeded traffic and crossing pedestrians, and a runner that turns every
//! tick into state/action records.
//!
//! # Core Principle: One seed, one run
//!
//! All entropy comes from a single 64-bit seed and every actor table is
//! ordered, so the same seed and configuration reproduce the same records.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Collector                           │
//! │  ┌───────────────────┐   snapshot   ┌────────────────────┐  │
//! │  │ IntersectionWorld │─────────────►│  BevFrameBuilder   │  │
//! │  │  (CrossroadMap)   │              │  → tensor, record  │  │
//! │  └─────────▲─────────┘              └─────────┬──────────┘  │
//! │            │ commands                         │             │
//! │  ┌─────────┴─────────┐              ┌─────────▼──────────┐  │
//! │  │ PedestrianPolicy  │─── actions ─►│     RecordBook     │  │
//! │  └───────────────────┘              └────────────────────┘  │
//! │                 RefreshMonitor (cleanup + respawn)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use bev_sim::{Collector, SimConfig};
//! use bev_core::BevConfig;
//!
//! let mut collector = Collector::new(SimConfig::default(), &BevConfig::default())?;
//! let export = collector.run(400)?;
//! export.write_to_file("run.json")?;
//! ```

mod collector;
mod error;
mod exporter;
mod map;
mod monitor;
mod policy;
mod world;

pub use collector::{Collector, CollectorStats, TickOutcome};
pub use error::SimError;
pub use exporter::{RecordSummary, RefreshEvent, RunExport};
pub use map::CrossroadMap;
pub use monitor::{RefreshLimits, RefreshMonitor, RefreshReason};
pub use policy::PedestrianPolicy;
pub use world::{IntersectionWorld, SimConfig, WalkerPlan};
