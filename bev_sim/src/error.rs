//! Harness errors.

use bev_core::{BevError, RecordError};
use bev_env::EnvError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("Invalid harness configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Bev(#[from] BevError),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Distribution error: {0}")]
    Distribution(#[from] rand_distr::NormalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
