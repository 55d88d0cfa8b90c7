//! Vehicle Simulation Module
//!
//! Everything that runs per vehicle per step. Deterministic given the same
//! inputs and collision world.
//!
//! ## Module Structure
//!
//! - `config`: Tuning constants, steering model, input bounds
//! - `force`: Driving force, air and rolling resistance
//! - `integrator`: One simulation step, input replay
//! - `collision`: Collision world boundary
//! - `input`: Control axes, validator, input log
//! - `state`: Vehicle state, ids, network roles
//! - `events`: Diagnostic events and sinks
//! - `controller`: Role-based driver for one replica

pub mod collision;
pub mod config;
pub mod controller;
pub mod events;
pub mod force;
pub mod input;
pub mod integrator;
pub mod state;

// Re-export key types
pub use collision::{BlockingHit, CollisionWorld, OpenWorld, Plane, PlaneWorld, SweepResult};
pub use config::{GravityProvider, InputMapping, StaticInputMapping, WorldSettings};
pub use controller::{AuthorityController, ControllerError};
pub use events::{DiagnosticEvent, DiagnosticsSink, RecordingSink, TracingSink};
pub use input::{AxisBounds, ControlFrame, ControlInputLog};
pub use integrator::{replay, step, StepResult};
