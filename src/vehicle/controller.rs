//! Authority Controller
//!
//! Drives one replica of a vehicle according to its [`NetworkRole`]:
//!
//! | Role              | Local input                   | Step                  | Snapshots     |
//! |-------------------|-------------------------------|-----------------------|---------------|
//! | `Authority`       | validated, stored             | integrate, publish    | ignored       |
//! | `AutonomousProxy` | clamped, raw value forwarded  | integrate locally     | adopted       |
//! | `SimulatedProxy`  | ignored                       | none                  | adopted       |
//!
//! Only the Authority's state is canonical. Proxies converge by adopting the
//! published pose as-is, with no smoothing.

use std::sync::Arc;

#[cfg(feature = "debug-tracing")]
use tracing::trace;
use tracing::debug;

use crate::core::math::Pose;
use crate::network::protocol::{ControlInputRequest, PoseSnapshot};
use crate::vehicle::collision::CollisionWorld;
use crate::vehicle::config::VehicleConfig;
use crate::vehicle::events::{DiagnosticEvent, DiagnosticsSink, TracingSink};
use crate::vehicle::input::{ControlAxis, ControlInputLog, ValidationResult};
use crate::vehicle::integrator;
use crate::vehicle::state::{NetworkRole, VehicleId, VehicleState};

/// Errors from delivering a control request to a controller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControllerError {
    /// Control requests are only honoured by the authority.
    #[error("vehicle {vehicle} is a {role} replica and cannot accept control input")]
    NotAuthority {
        /// Vehicle the request reached.
        vehicle: VehicleId,
        /// Its role.
        role: NetworkRole,
    },

    /// Request addressed to another vehicle.
    #[error("control input for vehicle {requested} delivered to vehicle {actual}")]
    WrongVehicle {
        /// Vehicle named in the request.
        requested: VehicleId,
        /// Vehicle that received it.
        actual: VehicleId,
    },
}

// =============================================================================
// NETWORK CADENCE
// =============================================================================

/// Publish schedule at a fixed rate, independent of the physics step.
///
/// Elapsed time is kept in whole microseconds so the schedule does not drift
/// with float rounding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NetworkCadence {
    period_us: u64,
    elapsed_us: u64,
}

impl NetworkCadence {
    /// Cadence at `rate_hz` publishes per second. A non-positive or
    /// non-finite rate publishes on every step.
    pub fn new(rate_hz: f32) -> Self {
        let period_us = if rate_hz.is_finite() && rate_hz > 0.0 {
            (1_000_000.0 / f64::from(rate_hz)).round() as u64
        } else {
            0
        };
        // First step publishes
        Self {
            period_us,
            elapsed_us: period_us,
        }
    }

    /// Account for one step of `dt` seconds; true when this step publishes.
    pub fn advance(&mut self, dt: f32) -> bool {
        let due = self.elapsed_us >= self.period_us;
        if due {
            // At most one period of backlog is carried over
            self.elapsed_us = (self.elapsed_us - self.period_us).min(self.period_us);
        }
        if dt.is_finite() && dt > 0.0 {
            self.elapsed_us += (f64::from(dt) * 1_000_000.0).round() as u64;
        }
        due
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// One replica of one vehicle.
pub struct AuthorityController {
    id: VehicleId,
    role: NetworkRole,
    state: VehicleState,
    config: VehicleConfig,
    sink: Arc<dyn DiagnosticsSink>,

    /// Steps taken (the tick the next step runs as).
    tick: u32,
    cadence: NetworkCadence,

    /// Rejections per axis, indexed like [`ControlAxis::ALL`].
    rejections: [u64; 2],

    /// Inputs applied by the authority, when recording.
    input_log: Option<ControlInputLog>,
    /// Ticks of history the log keeps (0 = unbounded).
    log_window: u32,
    /// State the log replays from, and the tick it was taken on.
    replay_base: (u32, VehicleState),
    /// Next replay base, promoted when the window rolls over.
    pending_base: Option<(u32, VehicleState)>,

    /// Outgoing request counter (AutonomousProxy).
    sequence: u32,

    /// Tick of the last adopted snapshot (proxies).
    last_snapshot_tick: Option<u32>,
}

impl AuthorityController {
    /// Spawn a replica at `pose`, at rest with neutral input.
    ///
    /// Diagnostics go to a [`TracingSink`]; use [`Self::with_sink`] to redirect.
    pub fn new(id: VehicleId, role: NetworkRole, pose: Pose, config: VehicleConfig) -> Self {
        let state = VehicleState::at_rest(pose);
        Self {
            id,
            role,
            state,
            config,
            sink: Arc::new(TracingSink),
            tick: 0,
            cadence: NetworkCadence::new(crate::NETWORK_UPDATE_RATE as f32),
            rejections: [0; 2],
            input_log: None,
            log_window: 0,
            replay_base: (0, state),
            pending_base: None,
            sequence: 0,
            last_snapshot_tick: None,
        }
    }

    /// Send diagnostics to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Publish at `rate_hz` instead of the default network rate.
    pub fn with_network_update_rate(mut self, rate_hz: f32) -> Self {
        self.cadence = NetworkCadence::new(rate_hz);
        self
    }

    /// Record applied inputs for replay (authority only).
    ///
    /// With a non-zero `window_ticks` the log keeps between one and two
    /// windows of history; older inputs are dropped and the replay base moves
    /// forward. Zero keeps everything.
    pub fn with_input_recording(mut self, window_ticks: u32) -> Self {
        if self.role == NetworkRole::Authority {
            self.input_log = Some(ControlInputLog::new());
            self.log_window = window_ticks;
        }
        self
    }

    // ===== ACCESSORS =====

    /// Vehicle identifier.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// Role of this replica.
    pub fn role(&self) -> NetworkRole {
        self.role
    }

    /// Current state.
    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Tick and state the recorded input log replays from.
    ///
    /// The spawn state until the log window first rolls over.
    pub fn replay_base(&self) -> (u32, VehicleState) {
        self.replay_base
    }

    /// Current pose.
    pub fn pose(&self) -> Pose {
        self.state.pose
    }

    /// Vehicle configuration.
    pub fn config(&self) -> &VehicleConfig {
        &self.config
    }

    /// Steps taken so far.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Tick of the last adopted snapshot.
    pub fn last_snapshot_tick(&self) -> Option<u32> {
        self.last_snapshot_tick
    }

    /// Rejected inputs on one axis.
    pub fn rejection_count(&self, axis: ControlAxis) -> u64 {
        self.rejections[axis_index(axis)]
    }

    /// Rejected inputs on all axes.
    pub fn total_rejections(&self) -> u64 {
        self.rejections.iter().sum()
    }

    /// Recorded input log, if recording.
    pub fn input_log(&self) -> Option<&ControlInputLog> {
        self.input_log.as_ref()
    }

    // ===== INPUT =====

    /// Apply input captured on this machine.
    ///
    /// Returns the request to forward to the authority when this replica is
    /// the AutonomousProxy. The request carries the raw value; the local copy
    /// is clamped so the local state stays within bounds.
    pub fn set_local_input(&mut self, axis: ControlAxis, value: f32) -> Option<ControlInputRequest> {
        match self.role {
            NetworkRole::SimulatedProxy => None,
            NetworkRole::AutonomousProxy => {
                let clamped = self.config.bounds(axis).clamp(value);
                self.set_axis(axis, clamped);
                self.sequence = self.sequence.wrapping_add(1);
                Some(ControlInputRequest {
                    vehicle_id: self.id,
                    axis,
                    value,
                    sequence: self.sequence,
                })
            }
            NetworkRole::Authority => {
                self.apply_validated(axis, value);
                None
            }
        }
    }

    /// Handle a control request from the driving client.
    ///
    /// Out-of-range values are clamped, applied, counted and reported; they
    /// are never dropped. Duplicates and reordering are harmless: the last
    /// request to arrive wins.
    pub fn receive_control_input(
        &mut self,
        request: &ControlInputRequest,
    ) -> Result<ValidationResult, ControllerError> {
        if self.role != NetworkRole::Authority {
            return Err(ControllerError::NotAuthority {
                vehicle: self.id,
                role: self.role,
            });
        }
        if request.vehicle_id != self.id {
            return Err(ControllerError::WrongVehicle {
                requested: request.vehicle_id,
                actual: self.id,
            });
        }
        Ok(self.apply_validated(request.axis, request.value))
    }

    fn apply_validated(&mut self, axis: ControlAxis, value: f32) -> ValidationResult {
        let bounds = self.config.bounds(axis);
        let result = bounds.validate(value);

        if !result.accepted {
            self.rejections[axis_index(axis)] += 1;
            self.sink.record(&DiagnosticEvent::InputRejected {
                tick: self.tick,
                vehicle: self.id,
                axis,
                proposed: value,
                clamped: result.clamped_value,
                min: bounds.min(),
                max: bounds.max(),
            });
        }

        self.set_axis(axis, result.clamped_value);
        result
    }

    fn set_axis(&mut self, axis: ControlAxis, value: f32) {
        match axis {
            ControlAxis::Throttle => self.state.throttle = value,
            ControlAxis::Steering => self.state.steering = value,
        }
    }

    // ===== REPLICATION =====

    /// Adopt an authoritative pose.
    ///
    /// Proxies take position and orientation exactly as published. The
    /// authority ignores snapshots. Returns whether the pose was adopted.
    pub fn receive_snapshot(&mut self, snapshot: &PoseSnapshot) -> bool {
        if self.role == NetworkRole::Authority || snapshot.vehicle_id != self.id {
            debug!(
                vehicle = %self.id,
                role = %self.role,
                from = %snapshot.vehicle_id,
                "Ignoring pose snapshot"
            );
            return false;
        }

        self.state.pose = snapshot.pose();
        self.last_snapshot_tick = Some(snapshot.tick);
        true
    }

    /// Current pose as a snapshot.
    pub fn snapshot(&self) -> PoseSnapshot {
        PoseSnapshot::new(self.id, self.tick, &self.state.pose)
    }

    // ===== SIMULATION =====

    /// Advance one step.
    ///
    /// Returns a snapshot when this replica is the authority and a publish is
    /// due on the network cadence.
    pub fn step<W>(&mut self, dt: f32, world: &W) -> Option<PoseSnapshot>
    where
        W: CollisionWorld + ?Sized,
    {
        if !self.role.simulates() {
            self.tick = self.tick.wrapping_add(1);
            return None;
        }

        self.record_input();

        let result = integrator::step(&self.state, &self.config, dt, world);
        if let Some(hit) = result.hit {
            self.sink.record(&DiagnosticEvent::CollisionBlocked {
                tick: self.tick,
                vehicle: self.id,
                role: self.role,
                location: hit.location,
                normal: hit.normal,
            });
        }
        self.state = result.state;
        self.tick = self.tick.wrapping_add(1);

        #[cfg(feature = "debug-tracing")]
        trace!(
            vehicle = %self.id,
            tick = self.tick,
            pose = ?self.state.pose,
            velocity = ?self.state.velocity,
            "Stepped"
        );

        if self.role == NetworkRole::Authority && self.cadence.advance(dt) {
            Some(self.snapshot())
        } else {
            None
        }
    }

    fn record_input(&mut self) {
        let Some(log) = self.input_log.as_mut() else {
            return;
        };

        if self.log_window > 0 && self.tick > 0 && self.tick % self.log_window == 0 {
            if let Some(base) = self.pending_base.take() {
                self.replay_base = base;
                log.trim_before(base.0);
            }
            self.pending_base = Some((self.tick, self.state));
        }
        log.record(self.tick, self.state.controls());
    }

    /// Emit a state dump to the diagnostics sink.
    pub fn dump_state(&self) {
        self.sink.record(&DiagnosticEvent::StateDump {
            tick: self.tick,
            vehicle: self.id,
            role: self.role,
            pose: self.state.pose,
            velocity: self.state.velocity,
            throttle: self.state.throttle,
            steering: self.state.steering,
        });
    }
}

impl std::fmt::Debug for AuthorityController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorityController")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("tick", &self.tick)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn axis_index(axis: ControlAxis) -> usize {
    match axis {
        ControlAxis::Throttle => 0,
        ControlAxis::Steering => 1,
    }
}
