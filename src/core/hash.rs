//! State Hashing
//!
//! SHA-256 fingerprints of vehicle state, used to
//! - compare an observer's pose with the authority's published pose,
//! - check a replay against the live run,
//! - tag log lines with a compact state id.
//!
//! Floats are hashed by bit pattern, so `0.0` and `-0.0` hash differently.
//! Two replicas only match if they hold identical bits.

use glam::{Quat, Vec3};
use sha2::{Digest, Sha256};

use super::math::Pose;

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

const VEHICLE_STATE_DOMAIN: &[u8] = b"KART_VEHICLE_STATE_V1";
const POSE_DOMAIN: &[u8] = b"KART_POSE_V1";

/// Incremental hasher over float bit patterns.
///
/// Feed fields in a fixed order; the order is part of the hash.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Start a hash in the given domain.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Hasher for a full vehicle state.
    pub fn for_vehicle_state() -> Self {
        Self::new(VEHICLE_STATE_DOMAIN)
    }

    /// Hasher for a replicated pose.
    pub fn for_pose() -> Self {
        Self::new(POSE_DOMAIN)
    }

    /// Feed the little-endian bits of an f32.
    #[inline]
    pub fn update_f32(&mut self, value: f32) {
        self.hasher.update(value.to_bits().to_le_bytes());
    }

    /// Feed x, y, z.
    #[inline]
    pub fn update_vec3(&mut self, value: Vec3) {
        value.to_array().into_iter().for_each(|c| self.update_f32(c));
    }

    /// Feed x, y, z, w.
    #[inline]
    pub fn update_quat(&mut self, value: Quat) {
        value.to_array().into_iter().for_each(|c| self.update_f32(c));
    }

    /// Feed position then orientation.
    #[inline]
    pub fn update_pose(&mut self, pose: &Pose) {
        self.update_vec3(pose.position);
        self.update_quat(pose.orientation);
    }

    /// Finish.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Hash of a pose alone.
pub fn pose_hash(pose: &Pose) -> StateHash {
    let mut hasher = StateHasher::for_pose();
    hasher.update_pose(pose);
    hasher.finalize()
}

/// First six bytes of a hash as hex, for log lines.
pub fn short_hex(hash: &StateHash) -> String {
    hex::encode(&hash[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_hash_is_stable() {
        let a = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_z(0.5));
        let b = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_z(0.5));
        assert_eq!(pose_hash(&a), pose_hash(&b));
    }

    #[test]
    fn test_field_order_is_part_of_hash() {
        let mut a = StateHasher::for_pose();
        a.update_f32(1.0);
        a.update_f32(2.0);

        let mut b = StateHasher::for_pose();
        b.update_f32(2.0);
        b.update_f32(1.0);

        assert_ne!(a.finalize(), b.finalize());
    }

    #[test]
    fn test_domains_differ() {
        let pose = Pose::IDENTITY;
        let mut state = StateHasher::for_vehicle_state();
        state.update_pose(&pose);
        assert_ne!(state.finalize(), pose_hash(&pose));
    }

    #[test]
    fn test_single_bit_changes_hash() {
        let pose = Pose::at(Vec3::new(10.0, 20.0, 0.0));
        let mut nudged = pose;
        nudged.position.x = f32::from_bits(pose.position.x.to_bits() + 1);
        assert_ne!(pose_hash(&pose), pose_hash(&nudged));

        let mut signed = Pose::IDENTITY;
        signed.position.y = -0.0;
        assert_ne!(pose_hash(&Pose::IDENTITY), pose_hash(&signed));
    }

    #[test]
    fn test_short_hex_length() {
        assert_eq!(short_hex(&pose_hash(&Pose::IDENTITY)).len(), 12);
    }
}
