//! Error types for the BEV engine.

use bev_env::{ActorId, EnvError};
use thiserror::Error;

use crate::record::RecordPhase;

/// Errors raised while configuring the engine or capturing a frame.
///
/// Out-of-bounds points and unclassified map samples are not errors; they
/// are skipped during rasterization.
#[derive(Debug, Error)]
pub enum BevError {
    /// The hero is absent from the snapshot or no longer alive
    #[error("Hero {0} missing or not alive at capture time")]
    MissingHero(ActorId),

    /// A world or map query failed; the whole capture is discarded
    #[error("Collaborator query failed: {0}")]
    Collaborator(#[from] EnvError),

    /// Configuration values that cannot produce a canvas
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// A surface sampling worker panicked
    #[error("Raster worker failed: {0}")]
    Worker(String),
}

impl BevError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Misuse of the state/action record lifecycle.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("Cannot move record from {from:?} to {to:?}")]
    InvalidTransition { from: RecordPhase, to: RecordPhase },

    /// The action belongs to a tick the record cannot accept
    #[error("Action for tick {action_tick} does not fit record at tick {record_tick}")]
    StaleAction { record_tick: u64, action_tick: u64 },

    #[error("Record is still {0:?}")]
    Incomplete(RecordPhase),

    #[error("No open record for actor {actor} at tick {tick}")]
    UnknownRecord { actor: ActorId, tick: u64 },
}
