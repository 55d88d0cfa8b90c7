//! Client Replica
//!
//! Client side of replication: the vehicle this client drives (an
//! AutonomousProxy) plus every other vehicle it watches (SimulatedProxies).
//! Inbound snapshots are routed by vehicle id; local input is applied to the
//! driven vehicle and forwarded to the authority.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::core::math::Pose;
use crate::network::channel::{ClientEndpoint, ConnectionId, InputUplink};
use crate::network::protocol::{ClientMessage, PoseSnapshot, ServerMessage};
use crate::network::session::SessionError;
use crate::vehicle::collision::CollisionWorld;
use crate::vehicle::config::VehicleConfig;
use crate::vehicle::controller::AuthorityController;
use crate::vehicle::events::{DiagnosticsSink, TracingSink};
use crate::vehicle::input::ControlAxis;
use crate::vehicle::state::{NetworkRole, VehicleId};

/// A client's view of the session.
pub struct ClientReplica {
    endpoint: ClientEndpoint,
    vehicle_config: VehicleConfig,
    sink: Arc<dyn DiagnosticsSink>,
    driven: Option<AuthorityController>,
    observed: BTreeMap<VehicleId, AuthorityController>,
    server_gone: bool,
}

impl ClientReplica {
    /// Create a replica reading from `endpoint`.
    pub fn new(endpoint: ClientEndpoint, vehicle_config: VehicleConfig) -> Self {
        Self {
            endpoint,
            vehicle_config,
            sink: Arc::new(TracingSink),
            driven: None,
            observed: BTreeMap::new(),
            server_gone: false,
        }
    }

    /// Send vehicle diagnostics to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Take control of a vehicle. Replaces any previously driven vehicle.
    pub fn possess(&mut self, id: VehicleId, pose: Pose) {
        self.observed.remove(&id);
        self.driven = Some(
            AuthorityController::new(id, NetworkRole::AutonomousProxy, pose, self.vehicle_config)
                .with_sink(Arc::clone(&self.sink)),
        );
        info!(vehicle = %id, "Possessed vehicle");
    }

    /// Start watching a vehicle driven by someone else.
    pub fn observe(&mut self, id: VehicleId, pose: Pose) -> Result<(), SessionError> {
        let driven = self.driven.as_ref().map(AuthorityController::id);
        if driven == Some(id) || self.observed.contains_key(&id) {
            return Err(SessionError::DuplicateVehicle(id));
        }
        self.observed.insert(
            id,
            AuthorityController::new(id, NetworkRole::SimulatedProxy, pose, self.vehicle_config)
                .with_sink(Arc::clone(&self.sink)),
        );
        Ok(())
    }

    /// This client's connection identity (what the authority records as owner).
    pub fn connection_id(&self) -> ConnectionId {
        self.endpoint.id()
    }

    /// The driven vehicle.
    pub fn driven(&self) -> Option<&AuthorityController> {
        self.driven.as_ref()
    }

    /// A watched vehicle.
    pub fn observed(&self, id: &VehicleId) -> Option<&AuthorityController> {
        self.observed.get(id)
    }

    /// Number of watched vehicles.
    pub fn observed_count(&self) -> usize {
        self.observed.len()
    }

    /// Whether the authority has shut down or disconnected.
    pub fn server_gone(&self) -> bool {
        self.server_gone || self.endpoint.is_closed()
    }

    // ===== INPUT =====

    /// Apply local input to the driven vehicle and forward it.
    pub fn set_input(&mut self, axis: ControlAxis, value: f32) -> Result<(), SessionError> {
        let driven = self.driven.as_mut().ok_or(SessionError::NoLocalVehicle)?;
        if let Some(request) = driven.set_local_input(axis, value) {
            self.endpoint.send_control_input(request)?;
        }
        Ok(())
    }

    /// Tell the authority this client is leaving.
    pub fn leave(&mut self) -> Result<(), SessionError> {
        let driven = self.driven.take().ok_or(SessionError::NoLocalVehicle)?;
        self.endpoint.send(ClientMessage::Leave {
            vehicle_id: driven.id(),
        })?;
        Ok(())
    }

    // ===== REPLICATION =====

    /// Apply every queued server message. Returns how many were handled.
    pub fn process_messages(&mut self) -> usize {
        let messages = self.endpoint.poll();
        let count = messages.len();
        for message in messages {
            self.handle_message(message);
        }
        count
    }

    /// Apply one server message.
    pub fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Pose(snapshot) => self.apply_snapshot(&snapshot),
            ServerMessage::Despawned { vehicle_id } => {
                if self.observed.remove(&vehicle_id).is_none()
                    && self.driven.as_ref().map(AuthorityController::id) == Some(vehicle_id)
                {
                    self.driven = None;
                }
                debug!(vehicle = %vehicle_id, "Vehicle despawned by authority");
            }
            ServerMessage::Shutdown { reason } => {
                info!(%reason, "Authority shut down, holding last poses");
                self.server_gone = true;
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: &PoseSnapshot) {
        let target = match self.driven.as_mut() {
            Some(driven) if driven.id() == snapshot.vehicle_id => Some(driven),
            _ => self.observed.get_mut(&snapshot.vehicle_id),
        };

        match target {
            Some(controller) => {
                controller.receive_snapshot(snapshot);
            }
            None => debug!(vehicle = %snapshot.vehicle_id, "Snapshot for unknown vehicle ignored"),
        }
    }

    // ===== SIMULATION =====

    /// Step every local replica by `dt`.
    pub fn step<W>(&mut self, dt: f32, world: &W)
    where
        W: CollisionWorld + ?Sized,
    {
        if let Some(driven) = self.driven.as_mut() {
            driven.step(dt, world);
        }
        for controller in self.observed.values_mut() {
            controller.step(dt, world);
        }
    }

    /// Process inbound messages, then step.
    pub fn frame<W>(&mut self, dt: f32, world: &W) -> usize
    where
        W: CollisionWorld + ?Sized,
    {
        let handled = self.process_messages();
        self.step(dt, world);
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::channel::LoopbackHub;
    use crate::vehicle::collision::OpenWorld;
    use glam::{Quat, Vec3};

    const DT: f32 = 1.0 / 60.0;

    #[test]
    fn test_set_input_forwards_raw_value() {
        let (hub, mut server) = LoopbackHub::new(16);
        let mut replica = ClientReplica::new(hub.connect(), VehicleConfig::default());
        let id = VehicleId::new([4; 16]);
        replica.possess(id, Pose::IDENTITY);

        replica.set_input(ControlAxis::Throttle, 2.5).unwrap();

        match server.try_recv().map(|inbound| inbound.message) {
            Some(ClientMessage::ControlInput(request)) => {
                assert_eq!(request.vehicle_id, id);
                assert_eq!(request.value, 2.5);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(replica.driven().unwrap().state().throttle, 1.0);
    }

    #[test]
    fn test_set_input_without_vehicle_fails() {
        let (hub, _server) = LoopbackHub::new(16);
        let mut replica = ClientReplica::new(hub.connect(), VehicleConfig::default());
        assert!(matches!(
            replica.set_input(ControlAxis::Steering, 0.5),
            Err(SessionError::NoLocalVehicle)
        ));
    }

    #[test]
    fn test_snapshots_routed_by_vehicle() {
        let (hub, server) = LoopbackHub::new(16);
        let mut replica = ClientReplica::new(hub.connect(), VehicleConfig::default());
        let mine = VehicleId::new([1; 16]);
        let theirs = VehicleId::new([2; 16]);
        replica.possess(mine, Pose::IDENTITY);
        replica.observe(theirs, Pose::IDENTITY).unwrap();

        let pose = Pose::new(Vec3::new(10.0, 20.0, 0.0), Quat::from_rotation_z(0.5));
        server.broadcast(ServerMessage::Pose(PoseSnapshot::new(theirs, 3, &pose)));
        server.broadcast(ServerMessage::Pose(PoseSnapshot::new(VehicleId::new([3; 16]), 3, &pose)));

        assert_eq!(replica.process_messages(), 2);
        assert_eq!(replica.observed(&theirs).unwrap().pose(), pose);
        assert_eq!(replica.driven().unwrap().pose(), Pose::IDENTITY);
    }

    #[test]
    fn test_observer_holds_pose_after_shutdown() {
        let (hub, server) = LoopbackHub::new(16);
        let mut replica = ClientReplica::new(hub.connect(), VehicleConfig::default());
        let theirs = VehicleId::new([2; 16]);
        replica.observe(theirs, Pose::IDENTITY).unwrap();

        let pose = Pose::at(Vec3::new(-40.0, 3.0, 0.0));
        server.broadcast(ServerMessage::Pose(PoseSnapshot::new(theirs, 1, &pose)));
        server.broadcast(ServerMessage::Shutdown { reason: "test".into() });
        drop(server);
        drop(hub);

        for _ in 0..30 {
            replica.frame(DT, &OpenWorld);
        }
        assert!(replica.server_gone());
        assert_eq!(replica.observed(&theirs).unwrap().pose(), pose);
    }

    #[test]
    fn test_despawn_removes_observed() {
        let (hub, server) = LoopbackHub::new(16);
        let mut replica = ClientReplica::new(hub.connect(), VehicleConfig::default());
        let theirs = VehicleId::new([2; 16]);
        replica.observe(theirs, Pose::IDENTITY).unwrap();
        assert!(replica.observe(theirs, Pose::IDENTITY).is_err());

        server.broadcast(ServerMessage::Despawned { vehicle_id: theirs });
        replica.process_messages();
        assert_eq!(replica.observed_count(), 0);
    }
}
