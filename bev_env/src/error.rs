//! Error types for the simulator-session abstraction.

use thiserror::Error;

/// Failures reported by a simulator collaborator (world, map or telemetry).
///
/// None of these are retried by the BEV engine; they surface to the caller,
/// which decides whether to retry the whole tick or skip it.
#[derive(Debug, Error)]
pub enum EnvError {
    /// A world or map query failed on the simulator side
    #[error("Query failed: {0}")]
    Query(String),

    /// The simulator did not answer in time
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// The session is gone (server closed, socket dropped, etc.)
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// A telemetry packet or metadata message could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl EnvError {
    /// Creates a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Creates a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}
