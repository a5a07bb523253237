// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;

use cellmesh_base::{create_session_identifier, Identifier, ToHex};
use cellmesh_config::MeshConfig;

use crate::codec::MessageCodec;
use crate::connection::{exchange_identification, spawn_message_writer, MESSAGE_CHAN_SIZE};
use crate::dispatch::{CellProfile, DispatchManager, ResultCallback};
use crate::handshake::{HandshakeMachine, HandshakeRole};
use crate::message::{Message, Operation, PeerRole};
use crate::{P2pError, P2pResult};

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Dials a randomly chosen configured node until one accepts, at most
/// `connection_retry_attempts` times.
pub async fn connect_with_retry(config: &MeshConfig) -> P2pResult<TcpStream> {
    let attempts = config.connection_retry_attempts;
    for attempt in 1..=attempts {
        let peer = config.peers.choose(&mut rand::thread_rng()).cloned();
        let Some(peer) = peer else { break };

        match TcpStream::connect((peer.host.as_str(), peer.port)).await {
            Ok(stream) => {
                tracing::info!("connected to node {} on attempt {}", peer, attempt);
                return Ok(stream);
            }
            Err(err) => {
                tracing::warn!("connect to {} failed ({}/{}): {}", peer, attempt, attempts, err);
                if attempt < attempts {
                    tokio::time::sleep(config.connection_retry_delay()).await;
                }
            }
        }
    }

    tracing::error!("no node reachable after {} attempts", attempts);
    Err(P2pError::RetriesExhausted { attempts })
}

/// A server or requester attached to one relay node.
pub struct Cell {
    engine: Arc<DispatchManager>,
    node: Identifier,
    frames: FramedRead<BoxedReader, MessageCodec>,
    writer: BoxedWriter,
    sequence: Arc<AtomicU64>,
}

impl Cell {
    /// Connects to one of the configured nodes and identifies.
    pub async fn connect(profile: CellProfile, config: &MeshConfig) -> P2pResult<Self> {
        let stream = connect_with_retry(config).await?;
        let local = stream.local_addr()?;
        let identifier = create_session_identifier(&local.ip().to_string(), local.port() as u32)?;
        Self::handshake(profile, identifier, stream, config).await
    }

    /// Identifies over an already established transport. The peer must be a node.
    pub async fn handshake<T>(
        profile: CellProfile,
        identifier: Identifier,
        transport: T,
        config: &MeshConfig,
    ) -> P2pResult<Self>
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(transport);
        let mut frames = FramedRead::new(Box::new(reader) as BoxedReader, MessageCodec::new());
        let mut writer = Box::new(writer) as BoxedWriter;

        let mut machine = HandshakeMachine::new(HandshakeRole::Outbound, profile.role(), identifier)
            .expecting(PeerRole::Node);
        let (_, node) = exchange_identification(&mut machine, &mut frames, &mut writer).await?;
        tracing::info!(
            "{} {} attached to node {}",
            profile.role(),
            identifier.to_hex_lower(),
            node.to_hex_lower()
        );

        Ok(Self {
            engine: Arc::new(DispatchManager::new(profile, identifier, config)),
            node,
            frames,
            writer,
            sequence: Arc::new(AtomicU64::new(0)),
        })
    }

    #[inline]
    pub fn identifier(&self) -> &Identifier { self.engine.identifier() }

    #[inline]
    pub fn node(&self) -> &Identifier { &self.node }

    #[inline]
    pub fn engine(&self) -> Arc<DispatchManager> { self.engine.clone() }

    pub fn requester_handle(&self) -> RequesterHandle {
        RequesterHandle { engine: self.engine.clone(), sequence: self.sequence.clone() }
    }

    /// Runs the dispatch and receive loops until either ends or `shutdown`
    /// fires. The first loop to end takes the other down with it.
    pub async fn run(self, on_result: ResultCallback, shutdown: CancellationToken) -> P2pResult<()> {
        let cancel = shutdown.child_token();
        let (outbound_tx, outbound_rx) = mpsc::channel::<Message>(MESSAGE_CHAN_SIZE);
        spawn_message_writer(self.writer, outbound_rx, cancel.clone());

        let engine = self.engine.clone();
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Ok(()),
            _ = cancel.cancelled() => Err(P2pError::ConnectionClosed),
            r = engine.dispatch_loop(outbound_tx.clone()) => r,
            r = engine.receive_loop(self.frames, outbound_tx, on_result) => r,
        };

        cancel.cancel();
        match &result {
            Ok(()) => tracing::info!("{} stopped", engine.profile().role()),
            Err(err) => tracing::error!("{} connection lost: {}", engine.profile().role(), err),
        }
        result
    }
}

/// Submits arithmetic requests to a requester cell's queues.
#[derive(Clone)]
pub struct RequesterHandle {
    engine: Arc<DispatchManager>,
    sequence: Arc<AtomicU64>,
}

impl RequesterHandle {
    /// A handle with its own sequence counter over `engine`.
    pub fn new(engine: Arc<DispatchManager>) -> Self {
        Self { engine, sequence: Arc::new(AtomicU64::new(0)) }
    }

    /// Queues `lhs op rhs` and returns the queued request.
    pub fn submit(&self, op: Operation, lhs: i32, rhs: i32) -> Message {
        let sequence = self.sequence.fetch_add(1, Relaxed);
        let request = Message::request(*self.engine.identifier(), op, lhs, rhs, sequence);
        self.engine.enqueue(request.clone());
        request
    }
}
