//! Diagnostic Events
//!
//! Non-fatal events raised while driving a vehicle, delivered to an injected
//! [`DiagnosticsSink`] instead of a process-global logger.

use std::sync::Mutex;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::math::Pose;
use crate::vehicle::input::ControlAxis;
use crate::vehicle::state::{NetworkRole, VehicleId};

/// Diagnostic event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    /// Authority received a control value outside the legal bounds.
    ///
    /// The clamped value was applied; the raw value may indicate cheating.
    InputRejected {
        /// Authority tick the request was applied on.
        tick: u32,
        /// Vehicle the request targeted.
        vehicle: VehicleId,
        /// Control axis of the request.
        axis: ControlAxis,
        /// Raw value the client sent.
        proposed: f32,
        /// Value actually stored after clamping.
        clamped: f32,
        /// Lower legal bound for the axis.
        min: f32,
        /// Upper legal bound for the axis.
        max: f32,
    },

    /// Swept move stopped by a blocking hit; velocity was zeroed.
    CollisionBlocked {
        /// Tick the move was simulated on.
        tick: u32,
        /// Vehicle that was stopped.
        vehicle: VehicleId,
        /// Role of the replica that simulated the move.
        role: NetworkRole,
        /// Contact point in world units.
        location: Vec3,
        /// Surface normal at the contact point.
        normal: Vec3,
    },

    /// Periodic role/state dump.
    StateDump {
        /// Tick the dump was taken on.
        tick: u32,
        /// Vehicle being dumped.
        vehicle: VehicleId,
        /// Role of the dumping replica.
        role: NetworkRole,
        /// Current world pose.
        pose: Pose,
        /// Current velocity (m/s).
        velocity: Vec3,
        /// Stored throttle value.
        throttle: f32,
        /// Stored steering value.
        steering: f32,
    },
}

impl DiagnosticEvent {
    /// Tick the event was raised on.
    pub fn tick(&self) -> u32 {
        match self {
            DiagnosticEvent::InputRejected { tick, .. }
            | DiagnosticEvent::CollisionBlocked { tick, .. }
            | DiagnosticEvent::StateDump { tick, .. } => *tick,
        }
    }

    /// Vehicle the event concerns.
    pub fn vehicle(&self) -> VehicleId {
        match self {
            DiagnosticEvent::InputRejected { vehicle, .. }
            | DiagnosticEvent::CollisionBlocked { vehicle, .. }
            | DiagnosticEvent::StateDump { vehicle, .. } => *vehicle,
        }
    }

    /// Whether this is an input rejection.
    pub fn is_rejection(&self) -> bool {
        matches!(self, DiagnosticEvent::InputRejected { .. })
    }
}

/// Receiver of diagnostic events.
pub trait DiagnosticsSink: Send + Sync {
    /// Record one event. Must not fail or block for long.
    fn record(&self, event: &DiagnosticEvent);
}

/// Sink that writes events as structured `tracing` records.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&self, event: &DiagnosticEvent) {
        match event {
            DiagnosticEvent::InputRejected {
                tick,
                vehicle,
                axis,
                proposed,
                clamped,
                min,
                max,
            } => {
                warn!(
                    tick,
                    vehicle = %vehicle,
                    axis = %axis,
                    proposed,
                    clamped,
                    min,
                    max,
                    "Rejected out-of-range control input"
                );
            }
            DiagnosticEvent::CollisionBlocked {
                tick,
                vehicle,
                role,
                location,
                normal,
            } => {
                debug!(
                    tick,
                    vehicle = %vehicle,
                    role = %role,
                    location = ?location,
                    normal = ?normal,
                    "Blocked by collision"
                );
            }
            DiagnosticEvent::StateDump {
                tick,
                vehicle,
                role,
                pose,
                velocity,
                throttle,
                steering,
            } => {
                debug!(
                    tick,
                    vehicle = %vehicle,
                    role = %role,
                    pose = ?pose,
                    velocity = ?velocity,
                    throttle,
                    steering,
                    "State dump"
                );
            }
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events recorded so far.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.lock().clone()
    }

    /// Remove and return all recorded events.
    pub fn take(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Number of input rejections recorded.
    pub fn rejection_count(&self) -> usize {
        self.lock().iter().filter(|e| e.is_rejection()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DiagnosticEvent>> {
        // A panicking recorder leaves the Vec intact
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticsSink for RecordingSink {
    fn record(&self, event: &DiagnosticEvent) {
        self.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejection(tick: u32) -> DiagnosticEvent {
        DiagnosticEvent::InputRejected {
            tick,
            vehicle: VehicleId::new([7; 16]),
            axis: ControlAxis::Steering,
            proposed: 5.0,
            clamped: 1.0,
            min: -1.0,
            max: 1.0,
        }
    }

    #[test]
    fn test_recording_sink_collects_in_order() {
        let sink = RecordingSink::new();
        sink.record(&rejection(3));
        sink.record(&DiagnosticEvent::StateDump {
            tick: 4,
            vehicle: VehicleId::new([7; 16]),
            role: NetworkRole::Authority,
            pose: Pose::IDENTITY,
            velocity: Vec3::ZERO,
            throttle: 0.0,
            steering: 1.0,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tick(), 3);
        assert_eq!(sink.rejection_count(), 1);

        assert_eq!(sink.take().len(), 2);
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_event_json_tag() {
        let json = serde_json::to_string(&rejection(1)).unwrap();
        assert!(json.contains("\"event\":\"input_rejected\""));
        assert!(json.contains("\"axis\":\"steering\""));
    }

    #[test]
    fn test_tracing_sink_accepts_all_variants() {
        let sink = TracingSink;
        sink.record(&rejection(1));
        sink.record(&DiagnosticEvent::CollisionBlocked {
            tick: 2,
            vehicle: VehicleId::default(),
            role: NetworkRole::AutonomousProxy,
            location: Vec3::X,
            normal: Vec3::NEG_X,
        });
    }
}
