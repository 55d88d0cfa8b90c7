//! Authority Session
//!
//! Server side of replication. Owns the canonical (Authority) replica of every
//! vehicle, applies control requests from clients, steps the simulation on a
//! fixed-rate loop and publishes poses on the network cadence.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::math::Pose;
use crate::network::channel::{ChannelError, ConnectionId, Inbound, PoseBroadcast, ServerEndpoint};
use crate::network::protocol::{ClientMessage, PoseSnapshot, ServerMessage};
use crate::vehicle::collision::CollisionWorld;
use crate::vehicle::config::VehicleConfig;
use crate::vehicle::controller::{AuthorityController, ControllerError};
use crate::vehicle::events::{DiagnosticsSink, TracingSink};
use crate::vehicle::integrator;
use crate::vehicle::state::{NetworkRole, VehicleId, VehicleState};

/// Configuration for an authority session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Physics steps per second.
    pub tick_rate: u32,
    /// Pose publishes per second per vehicle.
    pub network_update_rate: f32,
    /// Emit a state dump every N ticks (0 = off).
    pub debug_dump_interval: u32,
    /// Keep a replayable log of applied inputs.
    pub record_inputs: bool,
    /// Ticks of input history kept per vehicle (0 = whole session).
    pub input_log_window: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::TICK_RATE,
            network_update_rate: crate::NETWORK_UPDATE_RATE as f32,
            debug_dump_interval: 0,
            record_inputs: true,
            input_log_window: 60 * crate::TICK_RATE,
        }
    }
}

impl SessionConfig {
    /// Fixed step length in seconds.
    pub fn dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Fixed step length as a duration.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.tick_rate.max(1)))
    }
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No vehicle with this id.
    #[error("unknown vehicle {0}")]
    UnknownVehicle(VehicleId),

    /// A vehicle with this id already exists.
    #[error("vehicle {0} already exists")]
    DuplicateVehicle(VehicleId),

    /// A connection sent a request for a vehicle it does not own.
    #[error("{connection} does not own vehicle {vehicle}")]
    NotOwner {
        /// Vehicle named in the request.
        vehicle: VehicleId,
        /// Connection that sent it.
        connection: ConnectionId,
    },

    /// Client has no vehicle to drive.
    #[error("no locally controlled vehicle")]
    NoLocalVehicle,

    /// Replication channel failure.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Controller refused the request.
    #[error(transparent)]
    Controller(#[from] ControllerError),
}

/// Result of one session tick.
#[derive(Debug, Clone, Default)]
pub struct TickResult {
    /// Tick that was run.
    pub tick: u32,
    /// Client messages handled before stepping.
    pub messages_handled: usize,
    /// Control values that were out of range this tick.
    pub inputs_rejected: usize,
    /// Snapshots published this tick.
    pub published: Vec<PoseSnapshot>,
}

/// Server-side session.
pub struct AuthoritySession {
    config: SessionConfig,
    vehicle_config: VehicleConfig,
    vehicles: BTreeMap<VehicleId, AuthorityController>,
    /// Connection allowed to drive (and remove) each vehicle.
    owners: BTreeMap<VehicleId, ConnectionId>,
    endpoint: ServerEndpoint,
    sink: Arc<dyn DiagnosticsSink>,
    tick: u32,
}

impl AuthoritySession {
    /// Create a session publishing through `endpoint`.
    pub fn new(config: SessionConfig, vehicle_config: VehicleConfig, endpoint: ServerEndpoint) -> Self {
        Self {
            config,
            vehicle_config,
            vehicles: BTreeMap::new(),
            owners: BTreeMap::new(),
            endpoint,
            sink: Arc::new(TracingSink),
            tick: 0,
        }
    }

    /// Send vehicle diagnostics to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current tick.
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Number of vehicles.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Authority replica of a vehicle.
    pub fn vehicle(&self, id: &VehicleId) -> Option<&AuthorityController> {
        self.vehicles.get(id)
    }

    /// All vehicles in id order.
    pub fn vehicles(&self) -> impl Iterator<Item = &AuthorityController> {
        self.vehicles.values()
    }

    // ===== LIFECYCLE =====

    /// Spawn a vehicle with a known id, driven by `owner`.
    pub fn spawn(&mut self, id: VehicleId, owner: ConnectionId, pose: Pose) -> Result<(), SessionError> {
        if self.vehicles.contains_key(&id) {
            return Err(SessionError::DuplicateVehicle(id));
        }

        let mut controller = AuthorityController::new(id, NetworkRole::Authority, pose, self.vehicle_config)
            .with_sink(Arc::clone(&self.sink))
            .with_network_update_rate(self.config.network_update_rate);
        if self.config.record_inputs {
            controller = controller.with_input_recording(self.config.input_log_window);
        }

        self.vehicles.insert(id, controller);
        self.owners.insert(id, owner);
        info!(vehicle = %id, owner = %owner, pose = ?pose, "Vehicle spawned");
        Ok(())
    }

    /// Spawn a vehicle with a fresh id.
    pub fn spawn_new(&mut self, owner: ConnectionId, pose: Pose) -> VehicleId {
        loop {
            let id = VehicleId::generate();
            if self.spawn(id, owner, pose).is_ok() {
                return id;
            }
        }
    }

    /// Remove a vehicle and tell clients.
    pub fn despawn(&mut self, id: &VehicleId) -> Result<AuthorityController, SessionError> {
        let controller = self
            .vehicles
            .remove(id)
            .ok_or(SessionError::UnknownVehicle(*id))?;
        self.owners.remove(id);
        self.endpoint.broadcast(ServerMessage::Despawned { vehicle_id: *id });
        info!(vehicle = %id, "Vehicle despawned");
        Ok(controller)
    }

    // ===== MESSAGES =====

    /// Owner of a vehicle.
    pub fn owner(&self, id: &VehicleId) -> Option<ConnectionId> {
        self.owners.get(id).copied()
    }

    fn check_owner(&self, vehicle: VehicleId, from: ConnectionId) -> Result<(), SessionError> {
        match self.owners.get(&vehicle) {
            None => Err(SessionError::UnknownVehicle(vehicle)),
            Some(owner) if *owner == from => Ok(()),
            Some(_) => Err(SessionError::NotOwner {
                vehicle,
                connection: from,
            }),
        }
    }

    /// Apply one client message received on connection `from`.
    ///
    /// Only the owning connection may drive or remove a vehicle. Returns
    /// whether a control value was rejected.
    pub fn handle_message(&mut self, from: ConnectionId, message: ClientMessage) -> Result<bool, SessionError> {
        match message {
            ClientMessage::ControlInput(request) => {
                self.check_owner(request.vehicle_id, from)?;
                let controller = self
                    .vehicles
                    .get_mut(&request.vehicle_id)
                    .ok_or(SessionError::UnknownVehicle(request.vehicle_id))?;
                let result = controller.receive_control_input(&request)?;
                Ok(!result.accepted)
            }
            ClientMessage::Leave { vehicle_id } => {
                self.check_owner(vehicle_id, from)?;
                self.despawn(&vehicle_id)?;
                Ok(false)
            }
        }
    }

    /// Apply every queued client message.
    ///
    /// Messages for unknown vehicles, or from connections that do not own the
    /// vehicle, are logged and dropped.
    pub fn drain_requests(&mut self) -> (usize, usize) {
        let mut handled = 0;
        let mut rejected = 0;

        while let Some(Inbound { from, message }) = self.endpoint.try_recv() {
            handled += 1;
            match self.handle_message(from, message) {
                Ok(true) => rejected += 1,
                Ok(false) => {}
                Err(e) => warn!(tick = self.tick, connection = %from, error = %e, "Dropped client message"),
            }
        }

        (handled, rejected)
    }

    // ===== SIMULATION =====

    /// Run a single tick: apply queued input, step every vehicle, publish.
    pub fn run_tick<W>(&mut self, world: &W) -> TickResult
    where
        W: CollisionWorld + ?Sized,
    {
        let (messages_handled, inputs_rejected) = self.drain_requests();
        let dt = self.config.dt();
        let dump = self.config.debug_dump_interval > 0
            && self.tick % self.config.debug_dump_interval == 0;

        let mut published = Vec::new();
        for controller in self.vehicles.values_mut() {
            if let Some(snapshot) = controller.step(dt, world) {
                published.push(snapshot);
            }
            if dump {
                controller.dump_state();
            }
        }

        for snapshot in &published {
            self.endpoint.publish_pose(*snapshot);
        }

        let result = TickResult {
            tick: self.tick,
            messages_handled,
            inputs_rejected,
            published,
        };
        self.tick = self.tick.wrapping_add(1);
        result
    }

    /// Run ticks on a fixed-rate timer until `shutdown` fires.
    ///
    /// Missed ticks are skipped rather than bursted. Clients are told the
    /// session is shutting down; they keep their last pose.
    pub async fn run<W>(mut self, world: W, mut shutdown: broadcast::Receiver<()>) -> Self
    where
        W: CollisionWorld + Send,
    {
        let mut tick_interval = interval(self.config.tick_duration());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            tick_rate = self.config.tick_rate,
            network_update_rate = self.config.network_update_rate,
            vehicles = self.vehicles.len(),
            "Authority session running"
        );

        loop {
            tokio::select! {
                _ = tick_interval.tick() => {
                    let result = self.run_tick(&world);
                    if !result.published.is_empty() {
                        debug!(tick = result.tick, snapshots = result.published.len(), "Published poses");
                    }
                }
                _ = shutdown.recv() => {
                    info!(tick = self.tick, "Shutdown signal received");
                    break;
                }
            }
        }

        self.endpoint.broadcast(ServerMessage::Shutdown {
            reason: "session ended".to_string(),
        });
        self
    }

    // ===== VERIFICATION =====

    /// Re-simulate a vehicle from its recorded inputs.
    ///
    /// `None` when input recording is off.
    pub fn replay_vehicle<W>(&self, id: &VehicleId, world: &W) -> Result<Option<VehicleState>, SessionError>
    where
        W: CollisionWorld + ?Sized,
    {
        let controller = self.vehicles.get(id).ok_or(SessionError::UnknownVehicle(*id))?;
        let (base_tick, base_state) = controller.replay_base();
        Ok(controller.input_log().map(|log| {
            integrator::replay(base_state, controller.config(), log, base_tick, self.config.dt(), world)
        }))
    }
}
