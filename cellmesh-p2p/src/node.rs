// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use cellmesh_base::{create_identifier, Identifier, ToHex};
use cellmesh_config::{MeshConfig, PeerAddress};

use crate::codec::MessageCodec;
use crate::connection::{exchange_identification, spawn_frame_writer, ConnectionState, MESSAGE_CHAN_SIZE};
use crate::handshake::{HandshakeMachine, HandshakeRole};
use crate::message::PeerRole;
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, SharedRegistry};
use crate::{P2pError, P2pResult, SendError};

const STARTUP_DELAY_BASE_MS: u64 = 400;
const STARTUP_DELAY_STEP_MS: u64 = 300;

/// Random delay before a node binds, so nodes started together do not race for ports.
pub fn startup_delay() -> Duration {
    let k = rand::thread_rng().gen_range(1..15u64);
    Duration::from_millis(STARTUP_DELAY_BASE_MS + k * STARTUP_DELAY_STEP_MS)
}

/// A relay node: accepts cells and other nodes and forwards every message
/// between the two partitions of its registry.
pub struct RelayNode {
    identifier: Identifier,
    listener: TcpListener,
    local_addr: SocketAddr,
    config: MeshConfig,
    registry: SharedRegistry,
}

impl RelayNode {
    /// Waits a random startup delay, then binds like [`RelayNode::bind`].
    pub async fn start(config: MeshConfig) -> P2pResult<Self> {
        let delay = startup_delay();
        tracing::info!("starting relay node in {:?}", delay);
        tokio::time::sleep(delay).await;
        Self::bind(config).await
    }

    /// Binds the first configured peer address that is free.
    pub async fn bind(config: MeshConfig) -> P2pResult<Self> {
        let mut bound = None;
        for peer in config.peers.iter() {
            match TcpListener::bind((peer.host.as_str(), peer.port)).await {
                Ok(listener) => {
                    bound = Some(listener);
                    break;
                }
                Err(err) => tracing::debug!("bind {} failed: {}", peer, err),
            }
        }

        match bound {
            Some(listener) => Self::with_listener(listener, config),
            None => Err(P2pError::NoFreePort(config.node_ports())),
        }
    }

    /// Binds exactly `addr`, e.g. port 0 in tests.
    pub async fn bind_addr(addr: SocketAddr, config: MeshConfig) -> P2pResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::with_listener(listener, config)
    }

    fn with_listener(listener: TcpListener, config: MeshConfig) -> P2pResult<Self> {
        let local_addr = listener.local_addr()?;
        let identifier = create_identifier(&local_addr.ip().to_string(), local_addr.port() as u32)?;
        tracing::info!("relay node {} listening on {}", identifier.to_hex_lower(), local_addr);

        Ok(Self {
            identifier,
            listener,
            local_addr,
            config,
            registry: Arc::new(ConnectionRegistry::new()),
        })
    }

    #[inline]
    pub fn local_addr(&self) -> SocketAddr { self.local_addr }

    #[inline]
    pub fn identifier(&self) -> &Identifier { &self.identifier }

    #[inline]
    pub fn registry(&self) -> SharedRegistry { self.registry.clone() }

    /// Dials `addr` and relays over the connection once identified.
    pub async fn dial(&self, addr: SocketAddr, shutdown: &CancellationToken) -> P2pResult<()> {
        tracing::debug!(peer = %addr, state = %ConnectionState::Connecting);
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(err) => {
                tracing::debug!(peer = %addr, state = %ConnectionState::Disconnected, "dial failed: {}", err);
                return Err(err.into());
            }
        };
        self.spawn_connection(stream, addr, HandshakeRole::Outbound, shutdown);
        Ok(())
    }

    /// Dials every configured peer other than this node once. Failures are logged only.
    pub async fn dial_peers(&self, shutdown: &CancellationToken) {
        for peer in self.config.peers.iter() {
            let addr = match resolve(peer).await {
                Ok(addr) => addr,
                Err(err) => {
                    tracing::debug!("resolve {} failed: {}", peer, err);
                    continue;
                }
            };
            if self.is_self(addr) {
                continue;
            }
            if let Err(err) = self.dial(addr, shutdown).await {
                tracing::debug!("dial {} failed: {}", peer, err);
            }
        }
    }

    /// Whether `addr` reaches this node's own listener.
    pub fn is_self(&self, addr: SocketAddr) -> bool {
        let local = self.local_addr;
        if addr.port() != local.port() {
            return false;
        }
        let ip = addr.ip();
        ip == local.ip() || local.ip().is_unspecified() || (ip.is_loopback() && local.ip().is_loopback())
    }

    /// Dials configured peers, then accepts until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> P2pResult<()> {
        self.dial_peers(&shutdown).await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(%peer, "accepted");
                        self.spawn_connection(stream, peer, HandshakeRole::Inbound, &shutdown);
                    }
                    Err(err) => tracing::error!("accept failed: {}", err),
                },
            }
        }

        tracing::info!("relay node on {} stopped", self.local_addr);
        Ok(())
    }

    fn spawn_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        direction: HandshakeRole,
        shutdown: &CancellationToken,
    ) {
        let identifier = self.identifier;
        let registry = self.registry.clone();
        let cancel = shutdown.child_token();
        tokio::spawn(async move {
            serve_connection(identifier, registry, stream, peer, direction, cancel).await;
        });
    }
}

async fn serve_connection(
    identifier: Identifier,
    registry: SharedRegistry,
    stream: TcpStream,
    peer: SocketAddr,
    direction: HandshakeRole,
    cancel: CancellationToken,
) {
    tracing::debug!(%peer, state = %ConnectionState::Identifying);
    let (reader, mut writer) = stream.into_split();
    let mut frames = FramedRead::new(reader, MessageCodec::new());
    let mut machine = HandshakeMachine::new(direction, PeerRole::Node, identifier);

    let (role, remote) = match exchange_identification(&mut machine, &mut frames, &mut writer).await {
        Ok(identified) => identified,
        Err(err) => {
            tracing::warn!(%peer, "identification failed: {}", err);
            return;
        }
    };

    let (data_tx, data_rx) = mpsc::channel(MESSAGE_CHAN_SIZE);
    spawn_frame_writer(writer, peer, data_rx, cancel.clone());

    let id = registry.next_id();
    registry.register(ConnectionHandle::new(id, peer, role, data_tx, cancel.clone()));
    tracing::info!(
        %peer,
        state = %ConnectionState::Relaying,
        "{} {} connected as #{}",
        role,
        remote.to_hex_lower(),
        id,
    );

    let result = tokio::select! {
        r = relay(&registry, &mut frames, id, role) => r,
        _ = cancel.cancelled() => Ok(()),
    };
    if let Err(err) = result {
        tracing::error!(%peer, "connection #{} failed: {}", id, err);
    }

    registry.unregister(id);
    cancel.cancel();
    tracing::info!(%peer, state = %ConnectionState::Closed, "connection #{} closed", id);
}

async fn resolve(peer: &PeerAddress) -> std::io::Result<SocketAddr> {
    tokio::net::lookup_host((peer.host.as_str(), peer.port))
        .await?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address"))
}

/// Frames from a node go to the other partition only; frames from a cell go
/// to every node and to every other cell.
async fn relay(
    registry: &ConnectionRegistry,
    frames: &mut FramedRead<OwnedReadHalf, MessageCodec>,
    origin: ConnectionId,
    role: PeerRole,
) -> P2pResult<()> {
    while let Some(frame) = frames.next().await {
        let message = frame?;
        tracing::debug!("relaying {} from #{}", message, origin);

        let bytes = message.to_frame();
        let failures = if role.is_node() {
            registry.broadcast_to_others(&bytes)
        } else {
            let mut failures = registry.broadcast_to_nodes(&bytes);
            failures.extend(registry.broadcast_to_others_except(&bytes, origin));
            failures
        };

        for failure in failures {
            tracing::warn!(peer = %failure.peer, "relay to #{} failed: {}", failure.id, failure.error);
            if failure.error == SendError::Closed {
                if let Some(handle) = registry.unregister(failure.id) {
                    handle.close();
                }
            }
        }
    }
    Err(P2pError::ConnectionClosed)
}
