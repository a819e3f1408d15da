//! CARLA telemetry decoding
//!
//! Turns the binary actor-state packets published by the CARLA bridge into
//! [`WorldSnapshot`]s:
//! - Little-endian fixed-layout records (no allocation per field)
//! - Spawn metadata resolves each actor's category exactly once
//! - Optional ZeroMQ subscriber behind the `carla` feature

use crate::error::EnvError;
use crate::types::{ActorCategory, ActorId, ActorState, Pose, WorldSnapshot};
use nalgebra::Vector2;
use serde::Deserialize;
use std::collections::HashMap;

/// Leading block of a telemetry packet: the simulator frame, its time, and
/// how many actor records follow. Four trailing bytes are reserved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketHeader {
    pub frame_id: u64,

    /// Simulation time in seconds
    pub timestamp: f64,
    pub actor_count: u32,
}

impl PacketHeader {
    pub const SIZE: usize = 24;

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }

        let frame_id = u64::from_le_bytes(data[0..8].try_into().ok()?);
        let timestamp = f64::from_le_bytes(data[8..16].try_into().ok()?);
        let actor_count = u32::from_le_bytes(data[16..20].try_into().ok()?);

        Some(Self {
            frame_id,
            timestamp,
            actor_count,
        })
    }
}

/// One actor's raw state as the bridge sends it: an id, then position,
/// rotation and velocity as `f32` triplets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActorUpdate {
    pub id: u32,
    pub pos: [f32; 3],

    /// Pitch, yaw, roll in degrees
    pub rot: [f32; 3],
    pub vel: [f32; 3],
}

fn f32_triplet(data: &[u8]) -> Option<[f32; 3]> {
    Some([
        f32::from_le_bytes(data[0..4].try_into().ok()?),
        f32::from_le_bytes(data[4..8].try_into().ok()?),
        f32::from_le_bytes(data[8..12].try_into().ok()?),
    ])
}

impl ActorUpdate {
    pub const SIZE: usize = 40;

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }

        Some(Self {
            id: u32::from_le_bytes(data[0..4].try_into().ok()?),
            pos: f32_triplet(&data[4..16])?,
            rot: f32_triplet(&data[16..28])?,
            vel: f32_triplet(&data[28..40])?,
        })
    }

    /// Raw simulator yaw in degrees, measured from world +x.
    pub fn yaw(&self) -> f64 {
        self.rot[1] as f64
    }

    /// Planar pose (z, pitch and roll dropped), yaw converted to the
    /// [`Pose`] convention.
    pub fn pose(&self) -> Pose {
        Pose::new(self.pos[0] as f64, self.pos[1] as f64, Pose::yaw_from_x_axis(self.yaw()))
    }

    /// Planar velocity.
    pub fn planar_velocity(&self) -> Vector2<f64> {
        Vector2::new(self.vel[0] as f64, self.vel[1] as f64)
    }
}

/// Complete telemetry packet
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPacket {
    pub header: PacketHeader,
    pub actors: Vec<ActorUpdate>,
}

impl TelemetryPacket {
    /// Parses a packet, rejecting truncated actor sections.
    pub fn from_bytes(data: &[u8]) -> Result<Self, EnvError> {
        let header = PacketHeader::from_bytes(data)
            .ok_or_else(|| EnvError::decode(format!("header needs {} bytes, got {}", PacketHeader::SIZE, data.len())))?;

        let count = header.actor_count as usize;
        let body = &data[PacketHeader::SIZE..];
        if body.len() < count * ActorUpdate::SIZE {
            return Err(EnvError::decode(format!(
                "packet announces {} actors but carries {} bytes",
                count,
                body.len()
            )));
        }

        let actors = body
            .chunks_exact(ActorUpdate::SIZE)
            .take(count)
            .filter_map(ActorUpdate::from_bytes)
            .collect();

        Ok(Self { header, actors })
    }
}

/// Spawn metadata (JSON, low frequency)
#[derive(Debug, Clone, Deserialize)]
pub struct ActorMetadata {
    pub actor_id: u32,
    pub type_id: String,  // "vehicle.tesla.model3"
}

/// Accumulates actor categories and converts packets into snapshots.
#[derive(Debug, Default)]
pub struct TelemetryFeed {
    known_actors: HashMap<u32, ActorCategory>,
}

impl TelemetryFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a spawned actor, classifying its blueprint once.
    pub fn register(&mut self, metadata: &ActorMetadata) -> ActorCategory {
        let category = ActorCategory::from_type_id(&metadata.type_id);
        self.known_actors.insert(metadata.actor_id, category);
        category
    }

    /// Registers from a raw JSON metadata message.
    pub fn register_json(&mut self, payload: &[u8]) -> Result<ActorCategory, EnvError> {
        let metadata: ActorMetadata =
            serde_json::from_slice(payload).map_err(|e| EnvError::decode(e.to_string()))?;
        Ok(self.register(&metadata))
    }

    /// Category of a known actor.
    pub fn category(&self, id: u32) -> Option<ActorCategory> {
        self.known_actors.get(&id).copied()
    }

    /// Number of registered actors.
    pub fn known_count(&self) -> usize {
        self.known_actors.len()
    }

    /// Builds the snapshot for one packet. Actors without metadata are `Other`.
    pub fn snapshot(&self, packet: &TelemetryPacket) -> WorldSnapshot {
        let actors = packet
            .actors
            .iter()
            .map(|update| {
                let category = self.category(update.id).unwrap_or(ActorCategory::Other);
                ActorState::new(ActorId(update.id), category, update.pose(), update.planar_velocity())
            })
            .collect();

        WorldSnapshot::new(packet.header.frame_id, packet.header.timestamp, actors)
    }
}

/// ZMQ-based CARLA telemetry receiver
#[cfg(feature = "carla")]
pub struct CarlaZmqReceiver {
    telemetry_socket: zmq::Socket,
    metadata_socket: zmq::Socket,
    _context: zmq::Context,

    pub feed: TelemetryFeed,
}

#[cfg(feature = "carla")]
impl CarlaZmqReceiver {
    /// Connects to the bridge's telemetry and metadata publishers.
    pub fn new(telemetry_port: u16, metadata_port: u16) -> Result<Self, EnvError> {
        let zmq_err = |e: zmq::Error| EnvError::Disconnected(e.to_string());
        let context = zmq::Context::new();

        let telemetry_socket = context.socket(zmq::SUB).map_err(zmq_err)?;
        telemetry_socket.set_conflate(true).map_err(zmq_err)?;  // Keep only latest
        telemetry_socket.set_rcvtimeo(100).map_err(zmq_err)?;
        telemetry_socket
            .connect(&format!("tcp://127.0.0.1:{}", telemetry_port))
            .map_err(zmq_err)?;
        telemetry_socket.set_subscribe(b"").map_err(zmq_err)?;

        let metadata_socket = context.socket(zmq::SUB).map_err(zmq_err)?;
        metadata_socket
            .connect(&format!("tcp://127.0.0.1:{}", metadata_port))
            .map_err(zmq_err)?;
        metadata_socket.set_subscribe(b"spawn").map_err(zmq_err)?;

        Ok(Self {
            telemetry_socket,
            metadata_socket,
            _context: context,
            feed: TelemetryFeed::new(),
        })
    }

    /// Drains pending spawn metadata, then returns the latest snapshot if a
    /// packet is available.
    pub fn poll_snapshot(&mut self) -> Result<Option<WorldSnapshot>, EnvError> {
        loop {
            match self.metadata_socket.recv_multipart(zmq::DONTWAIT) {
                Ok(parts) if parts.len() >= 2 => {
                    self.feed.register_json(&parts[1])?;
                }
                Ok(_) => {}
                Err(zmq::Error::EAGAIN) => break,
                Err(e) => return Err(EnvError::Disconnected(e.to_string())),
            }
        }

        match self.telemetry_socket.recv_bytes(zmq::DONTWAIT) {
            Ok(data) => {
                let packet = TelemetryPacket::from_bytes(&data)?;
                Ok(Some(self.feed.snapshot(&packet)))
            }
            Err(zmq::Error::EAGAIN) => Ok(None),
            Err(e) => Err(EnvError::Disconnected(e.to_string())),
        }
    }
}
