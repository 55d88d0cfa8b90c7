//! Network Layer
//!
//! Replication between the authority and its clients. This layer is
//! **non-deterministic**: all physics runs through `vehicle/`.

pub mod channel;
pub mod protocol;
pub mod replica;
pub mod session;

pub use channel::{
    ChannelError, ClientEndpoint, ConnectionId, Inbound, InputUplink, LoopbackHub, PoseBroadcast, ServerEndpoint,
};
pub use protocol::{ClientMessage, ControlInputRequest, PoseSnapshot, ProtocolError, ServerMessage};
pub use replica::ClientReplica;
pub use session::{AuthoritySession, SessionConfig, SessionError, TickResult};
