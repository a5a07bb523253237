// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;

use cellmesh_base::Identifier;

use crate::codec::MessageCodec;
use crate::handshake::HandshakeMachine;
use crate::message::{Message, PeerRole};
use crate::{P2pError, P2pResult};

pub(crate) const MESSAGE_CHAN_SIZE: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Identifying,
    Relaying,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Identifying => write!(f, "identifying"),
            ConnectionState::Relaying => write!(f, "relaying"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Runs the identification exchange on a fresh connection and returns the
/// peer's role and identifier.
pub async fn exchange_identification<R, W>(
    machine: &mut HandshakeMachine,
    frames: &mut FramedRead<R, MessageCodec>,
    writer: &mut W,
) -> P2pResult<(PeerRole, Identifier)>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Some(hello) = machine.start() {
        writer.write_all(&hello.to_frame()).await?;
    }

    let first = match frames.next().await {
        Some(frame) => frame?,
        None => return Err(P2pError::ConnectionClosed),
    };
    if let Some(reply) = machine.on_message(&first)? {
        writer.write_all(&reply.to_frame()).await?;
    }

    let role = machine.remote_role().ok_or(P2pError::ConnectionClosed)?;
    Ok((role, *first.sender()))
}

/// Drains pre-encoded frames into `writer` until the channel closes, a
/// write fails or `cancel` fires. Cancels `cancel` on the way out.
pub(crate) fn spawn_frame_writer<W>(
    mut writer: W,
    peer: SocketAddr,
    mut data_rx: mpsc::Receiver<Bytes>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = data_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(err) = writer.write_all(&frame).await {
                        tracing::warn!(%peer, "write failed: {}", err);
                        break;
                    }
                }
            }
        }

        cancel.cancel();
        let _ = writer.shutdown().await;
    });
}

/// Like [`spawn_frame_writer`] for a cell's single connection, taking messages.
pub(crate) fn spawn_message_writer<W>(
    writer: W,
    mut outbound_rx: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, MessageCodec::new());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                message = outbound_rx.recv() => {
                    let Some(message) = message else { break };
                    if let Err(err) = sink.send(message).await {
                        tracing::warn!("write to node failed: {}", err);
                        break;
                    }
                }
            }
        }

        cancel.cancel();
        let _ = sink.close().await;
    });
}
