//! Vehicle State Definitions
//!
//! The per-replica simulation state of one vehicle, its identifier, and the
//! network role that decides how the replica is driven.

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::core::hash::{StateHash, StateHasher};
use crate::core::math::Pose;
use crate::vehicle::input::ControlFrame;

// =============================================================================
// VEHICLE ID
// =============================================================================

/// Unique vehicle identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VehicleId(pub [u8; 16]);

impl VehicleId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Fresh random identifier for a newly spawned vehicle.
    pub fn generate() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s).ok().map(|u| Self(*u.as_bytes()))
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Short hex form for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

// =============================================================================
// NETWORK ROLE
// =============================================================================

/// How a replica of a vehicle participates in replication.
///
/// Assigned once per session per vehicle instance and never changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkRole {
    /// The server's canonical copy.
    Authority,
    /// The client controlling this vehicle, not authoritative over it.
    AutonomousProxy,
    /// Any other client observing the vehicle.
    SimulatedProxy,
}

impl NetworkRole {
    /// Label used in state dumps.
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkRole::Authority => "Authority",
            NetworkRole::AutonomousProxy => "AutonomousProxy",
            NetworkRole::SimulatedProxy => "SimulatedProxy",
        }
    }

    /// Whether this replica integrates physics itself.
    #[inline]
    pub fn simulates(self) -> bool {
        !matches!(self, NetworkRole::SimulatedProxy)
    }
}

impl fmt::Display for NetworkRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// VEHICLE STATE
// =============================================================================

/// Mutable simulation state of one vehicle replica.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    /// World position and orientation.
    pub pose: Pose,

    /// World-space velocity (m/s).
    pub velocity: Vec3,

    /// Forward/backward intent, within the configured throttle bounds.
    pub throttle: f32,

    /// Lateral intent, within the configured steering bounds.
    pub steering: f32,
}

impl VehicleState {
    /// Vehicle at rest at `pose` with neutral controls.
    pub fn at_rest(pose: Pose) -> Self {
        Self {
            pose,
            ..Default::default()
        }
    }

    /// Current controls as a frame.
    #[inline]
    pub fn controls(&self) -> ControlFrame {
        ControlFrame::new(self.throttle, self.steering)
    }

    /// Overwrite both controls.
    #[inline]
    pub fn set_controls(&mut self, frame: ControlFrame) {
        self.throttle = frame.throttle;
        self.steering = frame.steering;
    }

    /// Speed in m/s.
    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Signed speed along the vehicle's forward axis (m/s).
    #[inline]
    pub fn forward_speed(&self) -> f32 {
        self.pose.forward().dot(self.velocity)
    }

    /// Hash this state into a hasher.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_pose(&self.pose);
        hasher.update_vec3(self.velocity);
        hasher.update_f32(self.throttle);
        hasher.update_f32(self.steering);
    }

    /// Compute the deterministic state hash.
    pub fn compute_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_vehicle_state();
        self.hash_into(&mut hasher);
        hasher.finalize()
    }
}
