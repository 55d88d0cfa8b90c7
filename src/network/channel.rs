//! Replication Channel
//!
//! The two directions of replication as traits, plus an in-process
//! implementation on `tokio::sync` channels:
//!
//! ```text
//!   ClientEndpoint ──ControlInput (reliable, ordered)──►  ServerEndpoint
//!   ClientEndpoint ◄──Pose snapshots (lossy broadcast)──  ServerEndpoint
//! ```
//!
//! Snapshots are last-write-wins, so a lagging receiver just skips ahead.
//! Every client endpoint has a [`ConnectionId`] and the server sees which
//! connection each message arrived on.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::TryRecvError as BroadcastTryRecvError};
use tokio::sync::mpsc::{self, error::TryRecvError as MpscTryRecvError};
use tracing::{debug, warn};

use crate::network::protocol::{ClientMessage, ControlInputRequest, PoseSnapshot, ServerMessage};

/// Channel errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    /// The other side is gone.
    #[error("replication channel closed")]
    Closed,
}

/// Identity of one client connection on a hub.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A client message and the connection it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    /// Sending connection.
    pub from: ConnectionId,
    /// The message.
    pub message: ClientMessage,
}

/// Client → authority direction.
pub trait InputUplink {
    /// Deliver a raw control value to the authority, reliably.
    fn send_control_input(&self, request: ControlInputRequest) -> Result<(), ChannelError>;
}

/// Authority → everyone direction.
pub trait PoseBroadcast {
    /// Publish a snapshot to all observers. Returns how many received it.
    fn publish_pose(&self, snapshot: PoseSnapshot) -> usize;
}

/// Default snapshot buffer per receiver.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

// =============================================================================
// LOOPBACK HUB
// =============================================================================

/// In-process replication hub. Clone it to hand out to clients.
#[derive(Clone, Debug)]
pub struct LoopbackHub {
    requests_tx: mpsc::UnboundedSender<Inbound>,
    messages_tx: broadcast::Sender<ServerMessage>,
    next_connection: Arc<AtomicU64>,
}

impl LoopbackHub {
    /// Create a hub and the authority's endpoint.
    pub fn new(capacity: usize) -> (Self, ServerEndpoint) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (messages_tx, _) = broadcast::channel(capacity.max(1));

        let server = ServerEndpoint {
            requests_rx,
            messages_tx: messages_tx.clone(),
        };
        let hub = Self {
            requests_tx,
            messages_tx,
            next_connection: Arc::new(AtomicU64::new(1)),
        };
        (hub, server)
    }

    /// Connect a new client. It receives server messages sent from now on.
    pub fn connect(&self) -> ClientEndpoint {
        ClientEndpoint {
            id: ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed)),
            requests_tx: self.requests_tx.clone(),
            messages_rx: self.messages_tx.subscribe(),
            closed: false,
        }
    }
}

/// Authority side of the hub.
#[derive(Debug)]
pub struct ServerEndpoint {
    requests_rx: mpsc::UnboundedReceiver<Inbound>,
    messages_tx: broadcast::Sender<ServerMessage>,
}

impl ServerEndpoint {
    /// Next pending client message, if any.
    pub fn try_recv(&mut self) -> Option<Inbound> {
        match self.requests_rx.try_recv() {
            Ok(message) => Some(message),
            Err(MpscTryRecvError::Empty) | Err(MpscTryRecvError::Disconnected) => None,
        }
    }

    /// Send a message to all connected clients. Returns the receiver count.
    pub fn broadcast(&self, message: ServerMessage) -> usize {
        // No receivers is not an error: nobody is watching yet.
        self.messages_tx.send(message).unwrap_or(0)
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.messages_tx.receiver_count()
    }
}

impl PoseBroadcast for ServerEndpoint {
    fn publish_pose(&self, snapshot: PoseSnapshot) -> usize {
        self.broadcast(ServerMessage::Pose(snapshot))
    }
}

/// Client side of the hub.
#[derive(Debug)]
pub struct ClientEndpoint {
    id: ConnectionId,
    requests_tx: mpsc::UnboundedSender<Inbound>,
    messages_rx: broadcast::Receiver<ServerMessage>,
    closed: bool,
}

impl ClientEndpoint {
    /// This connection's identity.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Send any client message.
    pub fn send(&self, message: ClientMessage) -> Result<(), ChannelError> {
        self.requests_tx
            .send(Inbound { from: self.id, message })
            .map_err(|_| ChannelError::Closed)
    }

    /// Drain every server message currently queued.
    pub fn poll(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while !self.closed {
            match self.messages_rx.try_recv() {
                Ok(message) => messages.push(message),
                Err(BroadcastTryRecvError::Empty) => break,
                Err(BroadcastTryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Client lagged behind server messages, skipping ahead");
                }
                Err(BroadcastTryRecvError::Closed) => {
                    debug!("Server message channel closed");
                    self.closed = true;
                }
            }
        }
        messages
    }

    /// Wait for the next server message. `None` once the server is gone.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        loop {
            match self.messages_rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Client lagged behind server messages, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.closed = true;
                    return None;
                }
            }
        }
    }

    /// Whether the server side has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl InputUplink for ClientEndpoint {
    fn send_control_input(&self, request: ControlInputRequest) -> Result<(), ChannelError> {
        self.send(ClientMessage::ControlInput(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::Pose;
    use crate::vehicle::input::ControlAxis;
    use crate::vehicle::state::VehicleId;

    fn request(value: f32) -> ControlInputRequest {
        ControlInputRequest {
            vehicle_id: VehicleId::new([1; 16]),
            axis: ControlAxis::Throttle,
            value,
            sequence: 0,
        }
    }

    #[test]
    fn test_requests_arrive_in_order() {
        let (hub, mut server) = LoopbackHub::new(8);
        let client = hub.connect();

        client.send_control_input(request(0.1)).unwrap();
        client.send_control_input(request(0.2)).unwrap();

        let values: Vec<f32> = std::iter::from_fn(|| server.try_recv())
            .filter_map(|inbound| match inbound.message {
                ClientMessage::ControlInput(r) => Some(r.value),
                _ => None,
            })
            .collect();
        assert_eq!(values, vec![0.1, 0.2]);
        assert!(server.try_recv().is_none());
    }

    #[test]
    fn test_messages_carry_sender_identity() {
        let (hub, mut server) = LoopbackHub::new(8);
        let a = hub.connect();
        let b = hub.connect();
        assert_ne!(a.id(), b.id());

        b.send_control_input(request(0.5)).unwrap();
        a.send_control_input(request(0.25)).unwrap();

        assert_eq!(server.try_recv().map(|m| m.from), Some(b.id()));
        assert_eq!(server.try_recv().map(|m| m.from), Some(a.id()));
    }

    #[test]
    fn test_snapshots_reach_every_client() {
        let (hub, server) = LoopbackHub::new(8);
        let mut a = hub.connect();
        let mut b = hub.connect();
        assert_eq!(server.client_count(), 2);

        let snapshot = PoseSnapshot::new(VehicleId::new([1; 16]), 1, &Pose::IDENTITY);
        assert_eq!(server.publish_pose(snapshot), 2);

        assert_eq!(a.poll(), vec![ServerMessage::Pose(snapshot)]);
        assert_eq!(b.poll(), vec![ServerMessage::Pose(snapshot)]);
    }

    #[test]
    fn test_lagging_client_skips_to_newest() {
        let (hub, server) = LoopbackHub::new(2);
        let mut client = hub.connect();

        for tick in 0..5 {
            server.publish_pose(PoseSnapshot::new(VehicleId::default(), tick, &Pose::IDENTITY));
        }

        let ticks: Vec<u32> = client
            .poll()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::Pose(s) => Some(s.tick),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![3, 4]);
    }

    #[test]
    fn test_send_after_server_dropped_fails() {
        let (hub, server) = LoopbackHub::new(8);
        let client = hub.connect();
        drop(server);
        assert_eq!(client.send_control_input(request(1.0)), Err(ChannelError::Closed));
    }

    #[tokio::test]
    async fn test_recv_returns_none_when_all_senders_gone() {
        let (hub, server) = LoopbackHub::new(8);
        let mut client = hub.connect();
        server.broadcast(ServerMessage::Shutdown { reason: "done".into() });
        drop(server);
        drop(hub);

        assert!(matches!(client.recv().await, Some(ServerMessage::Shutdown { .. })));
        assert!(client.recv().await.is_none());
        assert!(client.is_closed());
    }
}
