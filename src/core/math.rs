//! Vehicle Math Primitives
//!
//! Thin layer over `glam` with the conventions the simulation relies on:
//!
//! - World space is Z-up and left-handed: +X forward, +Y right. A positive
//!   rotation about +Z turns from +X toward +Y, i.e. to the right.
//! - Velocities are meters/second, positions are world units (centimeters).
//! - Normalizing the zero vector yields the zero vector.

use std::fmt;

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// World units per simulated meter.
///
/// The host world measures positions in centimeters while the force model
/// works in meters/second.
pub const UNITS_PER_METER: f32 = 100.0;

/// Vehicle-local forward axis.
pub const LOCAL_FORWARD: Vec3 = Vec3::X;

/// Vehicle-local up axis.
pub const LOCAL_UP: Vec3 = Vec3::Z;

/// Direction of `v`, or zero when `v` has no length.
#[inline]
pub fn safe_normal(v: Vec3) -> Vec3 {
    v.normalize_or_zero()
}

/// Rigid transform of a vehicle in world space.
#[derive(Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// World position (world units).
    pub position: Vec3,
    /// World orientation (unit quaternion).
    pub orientation: Quat,
}

impl Pose {
    /// Pose at the origin facing +X.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    /// Create a pose from position and orientation.
    #[inline]
    pub const fn new(position: Vec3, orientation: Quat) -> Self {
        Self { position, orientation }
    }

    /// Pose at `position` facing +X.
    #[inline]
    pub const fn at(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }

    /// Pose at `position` rotated `yaw` radians about world up.
    pub fn with_yaw(position: Vec3, yaw: f32) -> Self {
        Self::new(position, Quat::from_axis_angle(LOCAL_UP, yaw))
    }

    /// Forward axis in world space.
    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.orientation * LOCAL_FORWARD
    }

    /// Up axis in world space.
    #[inline]
    pub fn up(&self) -> Vec3 {
        self.orientation * LOCAL_UP
    }

    /// Apply a world-space rotation on top of the current orientation.
    ///
    /// The result is renormalized so repeated small rotations do not
    /// accumulate scale error.
    #[inline]
    pub fn rotate_world(&mut self, delta: Quat) {
        self.orientation = (delta * self.orientation).normalize();
    }

    /// Position as a plain array (wire format).
    #[inline]
    pub fn position_array(&self) -> [f32; 3] {
        self.position.to_array()
    }

    /// Orientation as `[x, y, z, w]` (wire format).
    #[inline]
    pub fn orientation_array(&self) -> [f32; 4] {
        self.orientation.to_array()
    }

    /// Rebuild a pose from wire arrays. No renormalization: the values are
    /// taken exactly as sent.
    #[inline]
    pub fn from_arrays(position: [f32; 3], orientation: [f32; 4]) -> Self {
        Self::new(Vec3::from_array(position), Quat::from_array(orientation))
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl fmt::Debug for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (axis, angle) = self.orientation.to_axis_angle();
        write!(
            f,
            "Pose(({:.2}, {:.2}, {:.2}), {:.1}° about ({:.2}, {:.2}, {:.2}))",
            self.position.x,
            self.position.y,
            self.position.z,
            angle.to_degrees(),
            axis.x,
            axis.y,
            axis.z,
        )
    }
}
