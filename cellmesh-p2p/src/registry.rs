// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::message::PeerRole;
use crate::SendError;

pub type ConnectionId = u64;

/// Write side of an established connection. Frames are handed to the
/// connection's writer task; cancelling closes both directions.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    role: PeerRole,
    data_tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        peer: SocketAddr,
        role: PeerRole,
        data_tx: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
    ) -> Self {
        Self { id, peer, role, data_tx, cancel }
    }

    #[inline]
    pub fn id(&self) -> ConnectionId { self.id }

    #[inline]
    pub fn peer(&self) -> SocketAddr { self.peer }

    #[inline]
    pub fn role(&self) -> PeerRole { self.role }

    pub fn try_send(&self, frame: Bytes) -> Result<(), SendError> {
        self.data_tx.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => SendError::Fulled,
            TrySendError::Closed(_) => SendError::Closed,
        })
    }

    #[inline]
    pub fn close(&self) { self.cancel.cancel(); }

    #[inline]
    pub fn is_closed(&self) -> bool { self.cancel.is_cancelled() || self.data_tx.is_closed() }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFailure {
    pub id: ConnectionId,
    pub peer: SocketAddr,
    pub error: SendError,
}

/// Established connections of a relay node, split into node peers and
/// everyone else (servers and requesters).
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    next_id: AtomicU64,
    nodes: DashMap<ConnectionId, ConnectionHandle>,
    others: DashMap<ConnectionId, ConnectionHandle>,
}

pub type SharedRegistry = Arc<ConnectionRegistry>;

impl ConnectionRegistry {
    pub fn new() -> Self { Self::default() }

    #[inline]
    pub fn next_id(&self) -> ConnectionId { self.next_id.fetch_add(1, Relaxed) }

    /// The partition is chosen by the role learned during the handshake.
    pub fn register(&self, handle: ConnectionHandle) {
        let partition = self.partition(handle.role());
        partition.insert(handle.id(), handle);
    }

    /// Removes the connection from whichever partition holds it. Unknown ids are ignored.
    pub fn unregister(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.nodes
            .remove(&id)
            .or_else(|| self.others.remove(&id))
            .map(|(_, handle)| handle)
    }

    #[inline]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.nodes.contains_key(&id) || self.others.contains_key(&id)
    }

    #[inline]
    pub fn node_count(&self) -> usize { self.nodes.len() }

    #[inline]
    pub fn other_count(&self) -> usize { self.others.len() }

    pub fn broadcast_to_nodes(&self, frame: &Bytes) -> Vec<BroadcastFailure> {
        Self::broadcast(&self.nodes, frame, None)
    }

    pub fn broadcast_to_others(&self, frame: &Bytes) -> Vec<BroadcastFailure> {
        Self::broadcast(&self.others, frame, None)
    }

    /// Like [`Self::broadcast_to_others`], skipping the connection the frame came from.
    pub fn broadcast_to_others_except(&self, frame: &Bytes, origin: ConnectionId) -> Vec<BroadcastFailure> {
        Self::broadcast(&self.others, frame, Some(origin))
    }

    #[inline]
    fn partition(&self, role: PeerRole) -> &DashMap<ConnectionId, ConnectionHandle> {
        if role.is_node() { &self.nodes } else { &self.others }
    }

    fn broadcast(
        partition: &DashMap<ConnectionId, ConnectionHandle>,
        frame: &Bytes,
        skip: Option<ConnectionId>,
    ) -> Vec<BroadcastFailure> {
        // snapshot first, so no shard lock is held while sending
        let targets: Vec<ConnectionHandle> = partition
            .iter()
            .filter(|kv| Some(*kv.key()) != skip)
            .map(|kv| kv.value().clone())
            .collect();

        targets
            .into_iter()
            .filter_map(|handle| {
                handle.try_send(frame.clone()).err().map(|error| BroadcastFailure {
                    id: handle.id(),
                    peer: handle.peer(),
                    error,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(
        registry: &ConnectionRegistry,
        role: PeerRole,
        capacity: usize,
    ) -> (ConnectionHandle, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = registry.next_id();
        let peer = SocketAddr::from(([127, 0, 0, 1], 40000 + id as u16));
        (ConnectionHandle::new(id, peer, role, tx, CancellationToken::new()), rx)
    }

    #[test]
    fn test_partitions() {
        let registry = ConnectionRegistry::new();
        let (node, _node_rx) = handle(&registry, PeerRole::Node, 4);
        let (server, _server_rx) = handle(&registry, PeerRole::Server, 4);
        let (requester, _requester_rx) = handle(&registry, PeerRole::Requester, 4);

        registry.register(node.clone());
        registry.register(server.clone());
        registry.register(requester);
        assert_eq!(registry.node_count(), 1);
        assert_eq!(registry.other_count(), 2);

        assert!(registry.unregister(server.id()).is_some());
        assert!(registry.unregister(server.id()).is_none());
        assert_eq!(registry.other_count(), 1);
        assert!(registry.contains(node.id()));
    }

    #[test]
    fn test_broadcast_except_origin() {
        let registry = ConnectionRegistry::new();
        let (server, mut server_rx) = handle(&registry, PeerRole::Server, 4);
        let (requester, mut requester_rx) = handle(&registry, PeerRole::Requester, 4);
        let (node, mut node_rx) = handle(&registry, PeerRole::Node, 4);
        registry.register(server);
        registry.register(requester.clone());
        registry.register(node);

        let frame = Bytes::from_static(b"frame");
        assert!(registry.broadcast_to_others_except(&frame, requester.id()).is_empty());

        assert_eq!(server_rx.try_recv().unwrap(), frame);
        assert!(requester_rx.try_recv().is_err());
        assert!(node_rx.try_recv().is_err());

        assert!(registry.broadcast_to_nodes(&frame).is_empty());
        assert_eq!(node_rx.try_recv().unwrap(), frame);
    }

    #[test]
    fn test_broadcast_reports_failures() {
        let registry = ConnectionRegistry::new();
        let (full, _full_rx) = handle(&registry, PeerRole::Server, 1);
        let (closed, closed_rx) = handle(&registry, PeerRole::Server, 1);
        let (healthy, mut healthy_rx) = handle(&registry, PeerRole::Requester, 4);
        drop(closed_rx);

        full.try_send(Bytes::from_static(b"filler")).unwrap();
        registry.register(full.clone());
        registry.register(closed.clone());
        registry.register(healthy);

        let mut failures = registry.broadcast_to_others(&Bytes::from_static(b"frame"));
        failures.sort_by_key(|f| f.id);
        assert_eq!(failures.len(), 2);
        assert_eq!((failures[0].id, failures[0].error), (full.id(), SendError::Fulled));
        assert_eq!((failures[1].id, failures[1].error), (closed.id(), SendError::Closed));
        assert!(healthy_rx.try_recv().is_ok());
    }
}
