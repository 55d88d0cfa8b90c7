//! # Kart Replication
//!
//! Kart physics with server-authoritative replication.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    KART REPLICATION                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/              - Math and hashing primitives            │
//! │  ├── math.rs        - Pose, units, safe normalization        │
//! │  └── hash.rs        - State hashing for verification         │
//! │                                                              │
//! │  vehicle/           - Simulation (deterministic)             │
//! │  ├── config.rs      - Tuning, steering model, axis bounds    │
//! │  ├── force.rs       - Driving force, drag, rolling           │
//! │  ├── integrator.rs  - Per-step integration and replay        │
//! │  ├── collision.rs   - Swept-move collision boundary          │
//! │  ├── input.rs       - Control axes, validation, input log    │
//! │  ├── state.rs       - Vehicle state, ids, network roles      │
//! │  ├── events.rs      - Diagnostics sink                       │
//! │  └── controller.rs  - Role-based replica driver              │
//! │                                                              │
//! │  network/           - Replication (non-deterministic)        │
//! │  ├── protocol.rs    - Message types                          │
//! │  ├── channel.rs     - Uplink/broadcast, loopback hub         │
//! │  ├── session.rs     - Authority session and tick loop        │
//! │  └── replica.rs     - Client-side replicas                   │
//! │                                                              │
//! │  settings.rs        - TOML settings file                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority Model
//!
//! Every vehicle has one canonical replica, on the server, with role
//! `Authority`. The client driving it runs an `AutonomousProxy` that
//! integrates locally and forwards raw input; every other client runs a
//! `SimulatedProxy` that only adopts the poses the authority publishes.
//! Out-of-range input reaching the authority is clamped and reported, never
//! dropped.
//!
//! ## Determinism
//!
//! `vehicle::integrator::step` is a pure function of state, config, step
//! length and collision world. Given the same initial state and recorded
//! input log, `vehicle::integrator::replay` reproduces the authority's state
//! bit-for-bit on the same platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod network;
pub mod settings;
pub mod vehicle;

// Re-export commonly used types
pub use crate::core::math::{Pose, UNITS_PER_METER};
pub use settings::Settings;
pub use vehicle::config::{ConfigError, SteeringModel, VehicleConfig, VehicleTuning};
pub use vehicle::controller::AuthorityController;
pub use vehicle::input::{validate, ControlAxis, ValidationResult};
pub use vehicle::state::{NetworkRole, VehicleId, VehicleState};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;

/// Pose publish rate per vehicle (Hz)
pub const NETWORK_UPDATE_RATE: u32 = 10;
