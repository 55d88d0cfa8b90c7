//! Core primitives.
//!
//! Vector math conventions and state hashing shared by the simulation and
//! the network layer.

pub mod hash;
pub mod math;

// Re-export core types
pub use hash::{pose_hash, short_hex, StateHash, StateHasher};
pub use math::{safe_normal, Pose, LOCAL_FORWARD, LOCAL_UP, UNITS_PER_METER};
