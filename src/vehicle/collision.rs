//! Collision World Boundary
//!
//! The simulation never detects collisions itself. It hands each step's
//! translation to a [`CollisionWorld`] as a swept move and only owns the
//! policy applied afterwards: a blocking hit stops the vehicle dead.
//!
//! Two simple worlds are provided for hosts without their own physics and
//! for tests: an empty [`OpenWorld`] and a [`PlaneWorld`] of solid half-spaces.

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A blocking impact reported by a swept move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BlockingHit {
    /// Where the swept point stopped (world units).
    pub location: Vec3,
    /// Surface normal at the impact.
    pub normal: Vec3,
    /// Fraction of the requested displacement travelled, in `[0, 1]`.
    pub time: f32,
}

/// Result of a swept move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SweepResult {
    /// Position reached: the full target, or the impact point when blocked.
    pub end: Vec3,
    /// First blocking obstruction along the path, if any.
    pub hit: Option<BlockingHit>,
}

impl SweepResult {
    /// Unobstructed move to `end`.
    #[inline]
    pub fn clear(end: Vec3) -> Self {
        Self { end, hit: None }
    }

    /// Move stopped by `hit`.
    #[inline]
    pub fn blocked(hit: BlockingHit) -> Self {
        Self {
            end: hit.location,
            hit: Some(hit),
        }
    }

    /// Whether the move was obstructed.
    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.hit.is_some()
    }
}

/// External collision system.
pub trait CollisionWorld {
    /// Sweep from `start` by `displacement` (world units), stopping at the
    /// first blocking obstruction.
    fn swept_move(&self, start: Vec3, displacement: Vec3) -> SweepResult;
}

impl<W: CollisionWorld + ?Sized> CollisionWorld for &W {
    fn swept_move(&self, start: Vec3, displacement: Vec3) -> SweepResult {
        (**self).swept_move(start, displacement)
    }
}

/// World with nothing in it.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenWorld;

impl CollisionWorld for OpenWorld {
    fn swept_move(&self, start: Vec3, displacement: Vec3) -> SweepResult {
        SweepResult::clear(start + displacement)
    }
}

/// Solid half-space: everything with `normal · p < offset` is blocked.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Unit normal pointing into free space.
    pub normal: Vec3,
    /// Signed distance of the surface from the origin along `normal`.
    pub offset: f32,
}

impl Plane {
    /// Plane through `point` facing `normal`.
    pub fn through(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize_or_zero();
        Self {
            normal,
            offset: normal.dot(point),
        }
    }

    #[inline]
    fn signed_distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) - self.offset
    }
}

/// World made of solid half-spaces (walls, floors).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlaneWorld {
    /// Solid planes.
    pub planes: Vec<Plane>,
}

impl PlaneWorld {
    /// Create from planes.
    pub fn new(planes: Vec<Plane>) -> Self {
        Self { planes }
    }

    /// Earliest impact of a segment against one plane.
    fn sweep_plane(plane: &Plane, start: Vec3, displacement: Vec3) -> Option<f32> {
        let d0 = plane.signed_distance(start);
        let d1 = plane.signed_distance(start + displacement);

        if d1 >= 0.0 {
            return None;
        }
        if d0 <= 0.0 {
            // Starting on or inside the surface: only moving further in is blocked.
            return (d1 < d0).then_some(0.0);
        }
        Some((d0 / (d0 - d1)).clamp(0.0, 1.0))
    }
}

impl CollisionWorld for PlaneWorld {
    fn swept_move(&self, start: Vec3, displacement: Vec3) -> SweepResult {
        let first = self
            .planes
            .iter()
            .filter_map(|plane| Self::sweep_plane(plane, start, displacement).map(|t| (t, plane)))
            .min_by(|a, b| a.0.total_cmp(&b.0));

        match first {
            Some((time, plane)) => SweepResult::blocked(BlockingHit {
                location: start + displacement * time,
                normal: plane.normal,
                time,
            }),
            None => SweepResult::clear(start + displacement),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wall_at_x(x: f32) -> PlaneWorld {
        // Free space is x < wall, solid beyond.
        PlaneWorld::new(vec![Plane::through(Vec3::new(x, 0.0, 0.0), Vec3::NEG_X)])
    }

    #[test]
    fn test_open_world_never_blocks() {
        let result = OpenWorld.swept_move(Vec3::ZERO, Vec3::new(500.0, 0.0, 0.0));
        assert_eq!(result.end, Vec3::new(500.0, 0.0, 0.0));
        assert!(!result.is_blocked());
    }

    #[test]
    fn test_wall_stops_at_impact_point() {
        let world = wall_at_x(100.0);
        let result = world.swept_move(Vec3::ZERO, Vec3::new(400.0, 0.0, 0.0));

        let hit = result.hit.expect("should hit the wall");
        assert!((hit.location.x - 100.0).abs() < 1e-4);
        assert!((hit.time - 0.25).abs() < 1e-6);
        assert_eq!(hit.normal, Vec3::NEG_X);
        assert_eq!(result.end, hit.location);
    }

    #[test]
    fn test_move_short_of_wall_is_clear() {
        let world = wall_at_x(100.0);
        let result = world.swept_move(Vec3::ZERO, Vec3::new(50.0, 0.0, 0.0));
        assert!(!result.is_blocked());
        assert_eq!(result.end.x, 50.0);
    }

    #[test]
    fn test_moving_away_from_contact_is_clear() {
        let world = wall_at_x(100.0);
        let start = Vec3::new(100.0, 0.0, 0.0);
        assert!(!world.swept_move(start, Vec3::new(-10.0, 0.0, 0.0)).is_blocked());
        assert!(world.swept_move(start, Vec3::new(10.0, 0.0, 0.0)).is_blocked());
    }

    #[test]
    fn test_nearest_plane_wins() {
        let world = PlaneWorld::new(vec![
            Plane::through(Vec3::new(300.0, 0.0, 0.0), Vec3::NEG_X),
            Plane::through(Vec3::new(100.0, 0.0, 0.0), Vec3::NEG_X),
        ]);
        let result = world.swept_move(Vec3::ZERO, Vec3::new(500.0, 0.0, 0.0));
        assert!((result.end.x - 100.0).abs() < 1e-4);
    }
}
