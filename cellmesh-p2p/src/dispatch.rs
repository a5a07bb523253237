// Copyright @ 2023 - 2024, R3E Network
// All Rights Reserved

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use cellmesh_base::{short_hex, Identifier};
use cellmesh_config::MeshConfig;

use crate::message::{Message, MessageKind, PeerRole};
use crate::service::evaluate_request;
use crate::{P2pError, P2pResult, ProtocolError};

/// Receives the text of each correlated result, e.g. `"5"` or `"error: division by zero"`.
pub type ResultCallback = Arc<dyn Fn(String) + Send + Sync>;

/// What a cell emits, what it handles and how its outgoing messages are tracked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellProfile {
    role: PeerRole,
    emits: Vec<MessageKind>,
    handles: Vec<MessageKind>,
    acked: Vec<MessageKind>,
    track_results: bool,
}

impl CellProfile {
    pub fn server() -> Self {
        Self {
            role: PeerRole::Server,
            emits: vec![MessageKind::PrintResult],
            handles: [MessageKind::Identification, MessageKind::Ack]
                .into_iter()
                .chain(MessageKind::REQUESTS)
                .collect(),
            acked: vec![MessageKind::PrintResult],
            track_results: false,
        }
    }

    pub fn requester() -> Self {
        Self {
            role: PeerRole::Requester,
            emits: MessageKind::REQUESTS.to_vec(),
            handles: vec![MessageKind::Identification, MessageKind::PrintResult, MessageKind::Ack],
            acked: MessageKind::REQUESTS.to_vec(),
            track_results: true,
        }
    }

    #[inline]
    pub fn role(&self) -> PeerRole { self.role }

    #[inline]
    pub fn emits(&self, kind: MessageKind) -> bool { self.emits.contains(&kind) }

    #[inline]
    pub fn handles(&self, kind: MessageKind) -> bool { self.handles.contains(&kind) }

    #[inline]
    pub fn needs_ack(&self, kind: MessageKind) -> bool { self.acked.contains(&kind) }

    #[inline]
    pub fn tracks_results(&self) -> bool { self.track_results }
}

/// Per-connection reliability engine of a cell.
///
/// Outgoing messages wait in one FIFO queue per kind. Each dispatch pass
/// sends the head of every queue in kind order and keeps acked kinds in
/// `ack_wait` until the matching Ack arrives. Once `ack_pending_threshold`
/// messages are waiting, passes resend all of them instead of draining the
/// queues.
pub struct DispatchManager {
    profile: CellProfile,
    identifier: Identifier,
    ack_pending_threshold: usize,
    poll_interval: Duration,
    queues: Mutex<BTreeMap<MessageKind, VecDeque<Message>>>,
    ack_wait: DashMap<Vec<u8>, Message>,
    result_wait: DashSet<Vec<u8>>,
}

impl DispatchManager {
    pub fn new(profile: CellProfile, identifier: Identifier, config: &MeshConfig) -> Self {
        Self::with_settings(
            profile,
            identifier,
            config.ack_pending_threshold,
            config.dispatch_poll_interval(),
        )
    }

    pub fn with_settings(
        profile: CellProfile,
        identifier: Identifier,
        ack_pending_threshold: usize,
        poll_interval: Duration,
    ) -> Self {
        let queues = profile.emits.iter().map(|kind| (*kind, VecDeque::new())).collect();
        Self {
            profile,
            identifier,
            ack_pending_threshold,
            poll_interval,
            queues: Mutex::new(queues),
            ack_wait: DashMap::new(),
            result_wait: DashSet::new(),
        }
    }

    #[inline]
    pub fn profile(&self) -> &CellProfile { &self.profile }

    #[inline]
    pub fn identifier(&self) -> &Identifier { &self.identifier }

    /// Queues `message` unless an equal message is already queued.
    /// Kinds this cell does not emit are dropped.
    pub fn enqueue(&self, message: Message) -> bool {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(&message.kind()) else {
            tracing::warn!("{} does not emit {}, dropped", self.profile.role(), message.kind());
            return false;
        };

        if queue.contains(&message) {
            tracing::debug!("{} already queued", short_hex(message.content_hash()));
            return false;
        }

        queue.push_back(message);
        true
    }

    /// Clears the ack-wait entry for `hash`. Returns whether one was pending.
    pub fn register_ack(&self, hash: &[u8]) -> bool {
        self.ack_wait.remove(hash).is_some()
    }

    #[inline]
    pub fn pending_acks(&self) -> usize { self.ack_wait.len() }

    pub fn queued(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }

    #[inline]
    pub fn awaiting_results(&self) -> usize { self.result_wait.len() }

    /// Runs dispatch passes until the outbound channel closes.
    pub async fn dispatch_loop(&self, outbound: mpsc::Sender<Message>) -> P2pResult<()> {
        loop {
            self.dispatch_once(&outbound).await?;
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One dispatch pass.
    pub async fn dispatch_once(&self, outbound: &mpsc::Sender<Message>) -> P2pResult<()> {
        if self.ack_wait.len() >= self.ack_pending_threshold {
            let waiting: Vec<Message> = self.ack_wait.iter().map(|kv| kv.value().clone()).collect();
            tracing::warn!("{} messages awaiting ack, resending", waiting.len());
            for message in waiting {
                send(outbound, message).await?;
            }
            return Ok(());
        }

        let batch: Vec<Message> = {
            let mut queues = self.queues.lock();
            queues.values_mut().filter_map(VecDeque::pop_front).collect()
        };

        for message in batch {
            let hash = message.content_hash().to_vec();
            if self.profile.tracks_results() && message.kind().is_request() {
                self.result_wait.insert(hash.clone());
            }
            if self.profile.needs_ack(message.kind()) {
                self.ack_wait.insert(hash, message.clone());
            }

            tracing::debug!("dispatching {}", message);
            send(outbound, message).await?;
        }
        Ok(())
    }

    /// Handles inbound messages until the stream fails or ends.
    pub async fn receive_loop<S>(
        &self,
        mut inbound: S,
        outbound: mpsc::Sender<Message>,
        on_result: ResultCallback,
    ) -> P2pResult<()>
    where
        S: Stream<Item = Result<Message, ProtocolError>> + Unpin,
    {
        while let Some(frame) = inbound.next().await {
            self.on_message(frame?, &outbound, &on_result).await?;
        }
        Err(P2pError::ConnectionClosed)
    }

    pub async fn on_message(
        &self,
        message: Message,
        outbound: &mpsc::Sender<Message>,
        on_result: &ResultCallback,
    ) -> P2pResult<()> {
        if message.receiver() != self.profile.role() {
            tracing::trace!("not addressed to {}: {}", self.profile.role(), message);
            return Ok(());
        }

        if !self.profile.handles(message.kind()) {
            tracing::warn!("{} does not handle {}, ignored", self.profile.role(), message.kind());
            return Ok(());
        }

        tracing::debug!("received {}", message);
        match message.kind() {
            MessageKind::Identification => {
                tracing::info!("identification from {}", message.identified_role()?);
                Ok(())
            }
            MessageKind::Ack => {
                let hash = message.acked_hash()?;
                if !self.register_ack(hash) {
                    tracing::debug!("ack for {} not pending", short_hex(hash));
                }
                Ok(())
            }
            MessageKind::PrintResult => self.on_print_result(message, outbound, on_result).await,
            kind if kind.is_request() => self.on_request(message, outbound).await,
            _ => Ok(()),
        }
    }

    async fn on_request(&self, request: Message, outbound: &mpsc::Sender<Message>) -> P2pResult<()> {
        let outcome = evaluate_request(&request)?;
        send(outbound, Message::ack(PeerRole::Requester, self.identifier, &request)).await?;

        let result = match outcome {
            Ok(value) => Message::result(self.identifier, &request, value),
            Err(err) => {
                tracing::warn!("evaluating {} failed: {}", request.kind(), err);
                Message::error_result(self.identifier, &request, &err.to_string())
            }
        };
        self.enqueue(result);
        Ok(())
    }

    async fn on_print_result(
        &self,
        result: Message,
        outbound: &mpsc::Sender<Message>,
        on_result: &ResultCallback,
    ) -> P2pResult<()> {
        let body = result.result_body()?;
        send(outbound, Message::ack(PeerRole::Server, self.identifier, &result)).await?;

        if self.result_wait.remove(&body.request_hash).is_none() {
            tracing::warn!("stale result for {}, dropped", short_hex(&body.request_hash));
            return Ok(());
        }
        // a correlated result supersedes the request's pending ack
        self.ack_wait.remove(&body.request_hash);

        tracing::info!("result for {}: {}", short_hex(&body.request_hash), body);
        on_result(body.to_string());
        Ok(())
    }
}

#[inline]
async fn send(outbound: &mpsc::Sender<Message>, message: Message) -> P2pResult<()> {
    outbound.send(message).await.map_err(|_| P2pError::ConnectionClosed)
}

#[cfg(test)]
mod tests {
    use cellmesh_base::create_identifier;

    use super::*;
    use crate::message::Operation;

    fn requester(threshold: usize) -> DispatchManager {
        let id = create_identifier("localhost", 5000).unwrap();
        DispatchManager::with_settings(CellProfile::requester(), id, threshold, Duration::from_millis(1))
    }

    #[test]
    fn test_profiles() {
        let server = CellProfile::server();
        assert!(server.emits(MessageKind::PrintResult));
        assert!(!server.emits(MessageKind::Addition));
        assert!(!server.tracks_results());
        assert!(server.handles(MessageKind::Multiplication));
        assert!(!server.handles(MessageKind::PrintResult));

        let requester = CellProfile::requester();
        assert!(requester.needs_ack(MessageKind::Division));
        assert!(!requester.needs_ack(MessageKind::Ack));
        assert!(requester.tracks_results());
        assert!(requester.handles(MessageKind::PrintResult));
        assert!(!requester.handles(MessageKind::Addition));
    }

    #[test]
    fn test_enqueue_dedup() {
        let engine = requester(10);
        let request = Message::request(*engine.identifier(), Operation::Add, 1, 2, 0);

        assert!(engine.enqueue(request.clone()));
        assert!(!engine.enqueue(request.clone()));
        assert_eq!(engine.queued(), 1);

        let ack = Message::ack(PeerRole::Server, *engine.identifier(), &request);
        assert!(!engine.enqueue(ack));
        assert_eq!(engine.queued(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_in_kind_order() {
        let engine = requester(10);
        let id = *engine.identifier();
        engine.enqueue(Message::request(id, Operation::Div, 8, 2, 0));
        engine.enqueue(Message::request(id, Operation::Add, 1, 2, 1));
        engine.enqueue(Message::request(id, Operation::Add, 3, 4, 2));

        let (tx, mut rx) = mpsc::channel(8);
        engine.dispatch_once(&tx).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().operands().unwrap(), (1, 2));
        assert_eq!(rx.recv().await.unwrap().operands().unwrap(), (8, 2));
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.queued(), 1);
        assert_eq!(engine.pending_acks(), 2);
        assert_eq!(engine.awaiting_results(), 2);
    }

    #[tokio::test]
    async fn test_threshold_resends_and_starves() {
        let engine = requester(1);
        let id = *engine.identifier();
        let first = Message::request(id, Operation::Mul, 2, 3, 0);
        let second = Message::request(id, Operation::Mul, 4, 5, 1);
        engine.enqueue(first.clone());
        engine.enqueue(second);

        let (tx, mut rx) = mpsc::channel(8);
        engine.dispatch_once(&tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), first);

        engine.dispatch_once(&tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), first);
        assert_eq!(engine.queued(), 1);

        assert!(engine.register_ack(first.content_hash()));
        assert!(!engine.register_ack(first.content_hash()));
        engine.dispatch_once(&tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().operands().unwrap(), (4, 5));
    }

    #[tokio::test]
    async fn test_closed_outbound() {
        let engine = requester(10);
        engine.enqueue(Message::request(*engine.identifier(), Operation::Sub, 1, 1, 0));

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        assert!(matches!(engine.dispatch_once(&tx).await, Err(P2pError::ConnectionClosed)));
    }
}
