//! State/action records handed to the training-set builder.
//!
//! A record is opened when a frame is captured for an actor and completed
//! once the policy has chosen that actor's action for the same tick:
//!
//! ```text
//! Empty ──attach_state──► StateCaptured ──attach_action──► Complete
//! ```
//!
//! The decision may arrive one tick late. Records that never complete
//! (actor destroyed, decision lost) are dropped, never persisted.

use bev_env::{ActorCategory, ActorId, ActorState, WorldSnapshot};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::RecordError;
use crate::tensor::BevTensor;

/// Ticks a decision may trail its frame by.
pub const MAX_DECISION_LATENCY: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordPhase {
    Empty,
    StateCaptured,
    Complete,
}

/// Distance from the hero to another actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorDistance {
    pub id: ActorId,
    pub category: ActorCategory,
    pub distance: f64,
}

/// State half of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgoState {
    pub tensor: BevTensor,

    /// Encoded tensor features (empty when no encoder is attached)
    pub features: Vec<f32>,

    /// (vx, vy) in m/s
    pub velocity: Vector2<f64>,

    /// Unit heading vector in the world frame
    pub heading: Vector2<f64>,

    /// Every other alive actor, nearest first
    pub distances: Vec<ActorDistance>,
}

impl EgoState {
    /// Derives kinematics and distances for `hero` from the snapshot its
    /// frame was captured from.
    pub fn derive(hero: &ActorState, snapshot: &WorldSnapshot, tensor: BevTensor) -> Self {
        let mut distances: Vec<ActorDistance> = snapshot
            .actors
            .iter()
            .filter(|a| a.alive && a.id != hero.id && a.category != ActorCategory::Controller)
            .map(|a| ActorDistance {
                id: a.id,
                category: a.category,
                distance: (a.pose.position - hero.pose.position).norm(),
            })
            .collect();
        distances.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));

        Self {
            tensor,
            features: Vec::new(),
            velocity: hero.velocity,
            heading: hero.pose.forward(),
            distances,
        }
    }

    pub fn with_features(mut self, features: Vec<f32>) -> Self {
        self.features = features;
        self
    }

    /// Closest actor of a category.
    pub fn nearest(&self, category: ActorCategory) -> Option<&ActorDistance> {
        self.distances.iter().find(|d| d.category == category)
    }
}

/// Action half of a record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Commanded (vx, vy) in m/s
    pub target_velocity: Vector2<f64>,

    /// Simulation time the decision was made at
    pub timestamp: f64,

    /// Tick the decision applies to
    pub tick: u64,
}

/// A record under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct StateActionRecord {
    pub actor_id: ActorId,
    pub tick: u64,
    pub timestamp: f64,
    state: Option<EgoState>,
    action: Option<Action>,
}

impl StateActionRecord {
    pub fn new(actor_id: ActorId, tick: u64, timestamp: f64) -> Self {
        Self {
            actor_id,
            tick,
            timestamp,
            state: None,
            action: None,
        }
    }

    pub fn phase(&self) -> RecordPhase {
        match (&self.state, &self.action) {
            (None, _) => RecordPhase::Empty,
            (Some(_), None) => RecordPhase::StateCaptured,
            (Some(_), Some(_)) => RecordPhase::Complete,
        }
    }

    pub fn state(&self) -> Option<&EgoState> {
        self.state.as_ref()
    }

    pub fn attach_state(&mut self, state: EgoState) -> Result<(), RecordError> {
        if self.phase() != RecordPhase::Empty {
            return Err(RecordError::InvalidTransition {
                from: self.phase(),
                to: RecordPhase::StateCaptured,
            });
        }
        self.state = Some(state);
        Ok(())
    }

    /// Accepts a decision for this tick or the one after.
    pub fn attach_action(&mut self, action: Action) -> Result<(), RecordError> {
        if self.phase() != RecordPhase::StateCaptured {
            return Err(RecordError::InvalidTransition {
                from: self.phase(),
                to: RecordPhase::Complete,
            });
        }
        if action.tick < self.tick || action.tick > self.tick + MAX_DECISION_LATENCY {
            return Err(RecordError::StaleAction {
                record_tick: self.tick,
                action_tick: action.tick,
            });
        }
        self.action = Some(action);
        Ok(())
    }

    pub fn into_complete(self) -> Result<CompleteRecord, RecordError> {
        let phase = self.phase();
        match (self.state, self.action) {
            (Some(state), Some(action)) => Ok(CompleteRecord {
                actor_id: self.actor_id,
                tick: self.tick,
                timestamp: self.timestamp,
                state,
                action,
            }),
            _ => Err(RecordError::Incomplete(phase)),
        }
    }
}

/// A finished, immutable state/action pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteRecord {
    pub actor_id: ActorId,
    pub tick: u64,
    pub timestamp: f64,
    pub state: EgoState,
    pub action: Action,
}

/// Open records keyed by (actor, tick), plus the completed queue.
#[derive(Debug, Default)]
pub struct RecordBook {
    open: BTreeMap<(ActorId, u64), StateActionRecord>,
    complete: Vec<CompleteRecord>,
    dropped: u64,
}

impl RecordBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a record and attaches its state in one step.
    pub fn open(&mut self, actor: ActorId, tick: u64, timestamp: f64, state: EgoState) -> Result<(), RecordError> {
        if let Some(existing) = self.open.get(&(actor, tick)) {
            return Err(RecordError::InvalidTransition {
                from: existing.phase(),
                to: RecordPhase::StateCaptured,
            });
        }
        let mut record = StateActionRecord::new(actor, tick, timestamp);
        record.attach_state(state)?;
        self.open.insert((actor, tick), record);
        Ok(())
    }

    /// Attaches the action for `(actor, tick)` and moves the record to the
    /// completed queue.
    pub fn decide(&mut self, actor: ActorId, tick: u64, action: Action) -> Result<(), RecordError> {
        let mut record = self
            .open
            .remove(&(actor, tick))
            .ok_or(RecordError::UnknownRecord { actor, tick })?;

        if let Err(e) = record.attach_action(action) {
            self.open.insert((actor, tick), record);
            return Err(e);
        }
        self.complete.push(record.into_complete()?);
        Ok(())
    }

    /// Drops records that can no longer receive a decision at `current_tick`.
    pub fn expire(&mut self, current_tick: u64) -> usize {
        let before = self.open.len();
        self.open
            .retain(|(_, tick), _| tick + MAX_DECISION_LATENCY >= current_tick);
        let expired = before - self.open.len();
        if expired > 0 {
            debug!(expired, current_tick, "stale records dropped");
        }
        self.dropped += expired as u64;
        expired
    }

    /// Drops every open record of a destroyed actor.
    pub fn forget_actor(&mut self, actor: ActorId) -> usize {
        let before = self.open.len();
        self.open.retain(|(id, _), _| *id != actor);
        let forgotten = before - self.open.len();
        self.dropped += forgotten as u64;
        forgotten
    }

    /// Takes every completed record, oldest first.
    pub fn drain_complete(&mut self) -> Vec<CompleteRecord> {
        std::mem::take(&mut self.complete)
    }

    pub fn pending(&self) -> usize {
        self.open.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
