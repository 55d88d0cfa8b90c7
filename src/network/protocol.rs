//! Protocol Messages
//!
//! Wire format for replication between the authority and its clients.
//! Tagged messages are serialized as JSON for debugging ease; the two hot
//! payloads (input requests and pose snapshots) are flat structs that also
//! encode with bincode for compact frames.

use serde::{Deserialize, Serialize};

use crate::core::hash::{pose_hash, StateHash};
use crate::core::math::Pose;
use crate::vehicle::input::ControlAxis;
use crate::vehicle::state::VehicleId;

/// Encoding/decoding errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON encode or decode failed.
    #[error("json codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary encode or decode failed.
    #[error("binary codec error: {0}")]
    Binary(#[from] bincode::Error),
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Reliable request carrying one raw control value to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlInputRequest {
    /// Vehicle the input is for.
    pub vehicle_id: VehicleId,
    /// Axis being set.
    pub axis: ControlAxis,
    /// Raw value as captured by the client, unclamped.
    pub value: f32,
    /// Per-vehicle send counter (diagnostics only).
    pub sequence: u32,
}

impl ControlInputRequest {
    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Authoritative pose of one vehicle.
///
/// Position and orientation are carried as exact `f32` bit patterns so an
/// observer can reproduce the published pose bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSnapshot {
    /// Vehicle the pose belongs to.
    pub vehicle_id: VehicleId,
    /// Authority tick the pose was taken on (diagnostics only).
    pub tick: u32,
    /// World position.
    pub position: [f32; 3],
    /// World orientation `[x, y, z, w]`.
    pub orientation: [f32; 4],
}

impl PoseSnapshot {
    /// Capture a pose.
    pub fn new(vehicle_id: VehicleId, tick: u32, pose: &Pose) -> Self {
        Self {
            vehicle_id,
            tick,
            position: pose.position_array(),
            orientation: pose.orientation_array(),
        }
    }

    /// Pose exactly as published.
    pub fn pose(&self) -> Pose {
        Pose::from_arrays(self.position, self.orientation)
    }

    /// Hash of the carried pose.
    pub fn pose_hash(&self) -> StateHash {
        pose_hash(&self.pose())
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Control value for a vehicle this client drives.
    ControlInput(ControlInputRequest),

    /// Client is leaving; its vehicle should be despawned.
    Leave {
        /// Vehicle to remove; must be owned by the sender.
        vehicle_id: VehicleId,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Periodic authoritative pose.
    Pose(PoseSnapshot),

    /// Vehicle no longer exists on the authority.
    Despawned {
        /// Vehicle that was removed.
        vehicle_id: VehicleId,
    },

    /// Authority is going away. Observers keep their last pose.
    Shutdown {
        /// Human-readable cause, for client logs.
        reason: String,
    },
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }
}
