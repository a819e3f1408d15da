//! JSON export of a collection run.
//!
//! Records are exported as metadata only; tensors stay out of the file.

use bev_core::{ActorDistance, CompleteRecord};
use bev_env::ActorCategory;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::collector::CollectorStats;
use crate::monitor::RefreshReason;

/// Metadata of one completed record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSummary {
    pub actor_id: u32,
    pub tick: u64,
    pub timestamp: f64,
    pub velocity: [f64; 2],
    pub heading: [f64; 2],
    pub action: [f64; 2],
    pub action_tick: u64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_vehicle: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest_pedestrian: Option<f64>,

    /// Tensor shape `[H, W, N]`
    pub tensor_shape: [usize; 3],

    pub feature_len: usize,
}

impl RecordSummary {
    pub fn from_record(record: &CompleteRecord) -> Self {
        let state = &record.state;
        let nearest = |c: ActorCategory| state.nearest(c).map(|d: &ActorDistance| d.distance);
        Self {
            actor_id: record.actor_id.raw(),
            tick: record.tick,
            timestamp: record.timestamp,
            velocity: [state.velocity.x, state.velocity.y],
            heading: [state.heading.x, state.heading.y],
            action: [record.action.target_velocity.x, record.action.target_velocity.y],
            action_tick: record.action.tick,
            nearest_vehicle: nearest(ActorCategory::Vehicle),
            nearest_pedestrian: nearest(ActorCategory::Pedestrian),
            tensor_shape: state.tensor.shape(),
            feature_len: state.features.len(),
        }
    }
}

/// A round ending.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshEvent {
    pub tick: u64,
    pub time_sec: f64,
    pub reason: RefreshReason,
    pub message: String,
}

/// Complete run export.
#[derive(Debug, Clone, Serialize)]
pub struct RunExport {
    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    pub stats: CollectorStats,
    pub refreshes: Vec<RefreshEvent>,
    pub records: Vec<RecordSummary>,
}

impl RunExport {
    /// Creates a new export container.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration_sec: 0.0,
            stats: CollectorStats::default(),
            refreshes: Vec::new(),
            records: Vec::new(),
        }
    }

    pub fn add_record(&mut self, record: &CompleteRecord) {
        self.duration_sec = self.duration_sec.max(record.timestamp);
        self.records.push(RecordSummary::from_record(record));
    }

    pub fn add_refresh(&mut self, tick: u64, time_sec: f64, reason: RefreshReason) {
        self.refreshes.push(RefreshEvent {
            tick,
            time_sec,
            reason,
            message: reason.to_string(),
        });
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, stats: CollectorStats, duration_sec: f64) {
        self.stats = stats;
        self.duration_sec = duration_sec;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
