//! Vehicle Integrator
//!
//! Advances one vehicle by one time step. This is the routine every simulating
//! replica runs, so it must give identical results for identical inputs.

use glam::{Quat, Vec3};

use crate::core::math::UNITS_PER_METER;
use crate::vehicle::collision::{BlockingHit, CollisionWorld};
use crate::vehicle::config::{SteeringModel, VehicleConfig};
use crate::vehicle::force::net_force;
use crate::vehicle::input::ControlInputLog;
use crate::vehicle::state::VehicleState;

/// Result of a step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepResult {
    /// State after the step.
    pub state: VehicleState,
    /// Blocking impact during the swept move, if any.
    pub hit: Option<BlockingHit>,
}

/// Yaw angle (radians) steering produces this step.
///
/// With [`SteeringModel::TurningRadius`] the turn rate follows forward speed,
/// so a vehicle at rest does not turn and reversing turns the other way.
pub fn steering_angle(state: &VehicleState, config: &VehicleConfig, dt: f32) -> f32 {
    match config.steering {
        SteeringModel::TurningRadius { minimum_turning_radius } => {
            state.forward_speed() * dt / minimum_turning_radius * state.steering
        }
        SteeringModel::FixedRate { max_degrees_per_second } => {
            (max_degrees_per_second * state.steering * dt).to_radians()
        }
    }
}

/// Run one simulation step.
///
/// # Arguments
///
/// * `state` - Current state, including the controls to apply
/// * `config` - Vehicle configuration
/// * `dt` - Elapsed time (seconds); negative or non-finite values leave the
///   state unchanged
/// * `world` - Collision world for the swept move
///
/// # Order
///
/// 1. Rotate heading and velocity about the vehicle's up axis
/// 2. Accumulate driving force, drag and rolling resistance
/// 3. Integrate velocity
/// 4. Sweep the translation through the collision world
/// 5. Zero the velocity if the sweep was blocked
///
/// Rotating the velocity together with the heading keeps speed unchanged
/// through a turn, so the integration itself never makes the vehicle slide.
pub fn step<W>(state: &VehicleState, config: &VehicleConfig, dt: f32, world: &W) -> StepResult
where
    W: CollisionWorld + ?Sized,
{
    let mut next = *state;

    if !dt.is_finite() || dt < 0.0 {
        return StepResult { state: next, hit: None };
    }

    // 1. Heading
    let angle = steering_angle(state, config, dt);
    if angle != 0.0 {
        let delta = Quat::from_axis_angle(next.pose.up(), angle);
        next.velocity = delta * next.velocity;
        next.pose.rotate_world(delta);
    }

    // 2-3. Forces and velocity
    let force = net_force(next.throttle, next.pose.forward(), next.velocity, config);
    let acceleration = force / config.mass;
    next.velocity += acceleration * dt;

    // 4. Translation
    let displacement = next.velocity * UNITS_PER_METER * dt;
    let sweep = world.swept_move(next.pose.position, displacement);
    next.pose.position = sweep.end;

    // 5. Hard stop
    if sweep.is_blocked() {
        next.velocity = Vec3::ZERO;
    }

    StepResult {
        state: next,
        hit: sweep.hit,
    }
}

/// Re-simulate a vehicle from a recorded input log.
///
/// Applies the logged frame for each tick from `start_tick` through the log's
/// last tick, stepping with a fixed `dt`. Given the same initial state, config
/// and world, the result is bit-identical to the live run that produced the
/// log.
pub fn replay<W>(
    initial: VehicleState,
    config: &VehicleConfig,
    log: &ControlInputLog,
    start_tick: u32,
    dt: f32,
    world: &W,
) -> VehicleState
where
    W: CollisionWorld + ?Sized,
{
    let mut state = initial;
    for (_tick, frame) in log.replay_iter(start_tick) {
        state.set_controls(frame);
        state = step(&state, config, dt, world).state;
    }
    state
}
