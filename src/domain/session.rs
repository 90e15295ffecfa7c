//! One peer's connection and its open data channels.
//!
//! A [`Session`] runs two tasks:
//!
//! - an event loop consuming the transport's [`PeerEvent`]s in order
//!   (channel created, channel open, inbound message, state change);
//! - a writer draining the bounded outbound queue that
//!   [`super::Pool::broadcast`] fills, so no broadcast ever waits on a
//!   network send.
//!
//! State machine: `Created → Open → Closed`, or `Created → Closed` when
//! the connection dies before any channel opens.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use tokio::sync::{RwLock, mpsc, watch};

use super::{Pool, SessionId};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::transport::{
    ConnectionState, DataChannel, Payload, PeerConnection, PeerEvent, SessionDescription,
};

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed; no data channel has opened yet.
    Created,
    /// A data channel opened; the session receives broadcasts.
    Open,
    /// Removed from its pool; the connection is gone.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// A message queued for one recipient channel.
#[derive(Debug)]
struct Outbound {
    channel: Arc<dyn DataChannel>,
    payload: Payload,
}

/// One peer connected to a pool.
pub struct Session {
    id: SessionId,
    pool: Weak<Pool>,
    connection: Arc<dyn PeerConnection>,
    channels: RwLock<HashMap<String, Arc<dyn DataChannel>>>,
    state: watch::Sender<SessionState>,
    outbound: mpsc::Sender<Outbound>,
    metrics: Arc<RelayMetrics>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session in state [`SessionState::Created`] and starts its
    /// writer task. Must be called inside a Tokio runtime.
    pub(crate) fn new(
        id: SessionId,
        pool: Weak<Pool>,
        connection: Arc<dyn PeerConnection>,
        metrics: Arc<RelayMetrics>,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let (outbound, queue) = mpsc::channel(queue_capacity.max(1));
        let (state, _) = watch::channel(SessionState::Created);

        tokio::spawn(run_writer(id.clone(), queue, Arc::clone(&metrics)));

        Arc::new(Self {
            id,
            pool,
            connection,
            channels: RwLock::new(HashMap::new()),
            state,
            outbound,
            metrics,
        })
    }

    /// Pool-scoped identifier.
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Returns `true` once a data channel has opened and until the session
    /// closes. Only open sessions receive broadcasts.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Subscribes to state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[cfg(test)]
    pub(crate) async fn channel_labels(&self) -> Vec<String> {
        self.channels.read().await.keys().cloned().collect()
    }

    /// Applies the remote offer and returns the local answer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::BadOffer`] if the transport rejects the offer
    /// and [`RelayError::TransportFailure`] for any other failure.
    pub async fn connect(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, RelayError> {
        let answer = self.connection.answer(offer).await?;
        tracing::debug!(session = %self.id, "offer answered");
        Ok(answer)
    }

    /// Closes the underlying connection and marks the session closed.
    pub(crate) async fn close(&self) -> Result<(), RelayError> {
        let result = self.connection.close().await;
        self.mark_closed();
        result.map_err(RelayError::from)
    }

    /// Queues `payload` for the channel labeled `label`.
    ///
    /// Returns `Ok(false)` if the peer has no such channel.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SendFailure`] if the outbound queue is full or
    /// the writer has stopped.
    pub(crate) async fn enqueue(&self, label: &str, payload: Payload) -> Result<bool, RelayError> {
        let Some(channel) = self.channels.read().await.get(label).cloned() else {
            return Ok(false);
        };
        self.outbound
            .try_send(Outbound { channel, payload })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    RelayError::SendFailure("outbound queue full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => {
                    RelayError::SendFailure("outbound queue closed".to_string())
                }
            })?;
        Ok(true)
    }

    /// Consumes transport events until the session closes or the transport
    /// drops its side of the queue.
    pub(crate) async fn run_events(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<PeerEvent>,
    ) {
        let mut state_rx = self.state.subscribe();
        loop {
            if self.state() == SessionState::Closed {
                break;
            }
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.handle_event(event).await;
                }
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!(session = %self.id, "event loop stopped");
    }

    async fn handle_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::ChannelCreated(channel) => self.on_data_channel(channel).await,
            PeerEvent::ChannelOpened(label) => self.on_open(&label),
            PeerEvent::Message { label, payload } => self.on_message(&label, payload).await,
            PeerEvent::StateChanged(state) => self.on_connection_state_change(state).await,
        }
    }

    async fn on_data_channel(&self, channel: Arc<dyn DataChannel>) {
        let label = channel.label().to_string();
        tracing::info!(session = %self.id, label = %label, "new data channel");
        self.channels.write().await.insert(label, channel);
    }

    fn on_open(&self, label: &str) {
        let opened = self.state.send_if_modified(|state| {
            if *state == SessionState::Created {
                *state = SessionState::Open;
                true
            } else {
                false
            }
        });
        if opened {
            tracing::info!(session = %self.id, label, "session open");
        } else {
            tracing::debug!(session = %self.id, label, "data channel open");
        }
    }

    async fn on_message(&self, label: &str, payload: Payload) {
        self.metrics.message_received();
        let Some(pool) = self.pool.upgrade() else {
            return;
        };
        let recipients = pool.broadcast(&self.id, label, payload).await;
        tracing::trace!(session = %self.id, label, recipients, "message relayed");
    }

    async fn on_connection_state_change(&self, state: ConnectionState) {
        tracing::info!(session = %self.id, %state, "connection state changed");
        if !state.is_terminal() {
            return;
        }
        // Closed before the pool lock is taken, so a join still in flight
        // sees it and refuses to register this session.
        let first = self.mark_closed();
        let removed = match self.pool.upgrade() {
            Some(pool) => match pool.close_session(&self.id).await {
                Ok(()) => true,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(session = %self.id, "session not registered");
                    false
                }
                Err(e) => {
                    tracing::error!(session = %self.id, error = %e, "couldn't close session");
                    true
                }
            },
            None => false,
        };
        if first && !removed {
            if let Err(e) = self.connection.close().await {
                tracing::debug!(session = %self.id, error = %e, "couldn't close connection");
            }
        }
    }

    /// Moves to [`SessionState::Closed`]. Returns `false` if already closed.
    fn mark_closed(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == SessionState::Closed {
                false
            } else {
                *state = SessionState::Closed;
                true
            }
        })
    }
}

/// Sends queued messages one at a time, in queue order.
async fn run_writer(
    id: SessionId,
    mut queue: mpsc::Receiver<Outbound>,
    metrics: Arc<RelayMetrics>,
) {
    while let Some(Outbound { channel, payload }) = queue.recv().await {
        match channel.send(&payload).await {
            Ok(()) => metrics.message_sent(),
            Err(e) => {
                metrics.send_failed();
                tracing::warn!(
                    session = %id,
                    label = channel.label(),
                    error = %e,
                    "couldn't send data"
                );
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::transport::memory::{MemoryTransport, RemotePeer};
    use crate::transport::{ConnectionConfig, Transport};

    async fn standalone() -> (Arc<Session>, RemotePeer, Arc<RelayMetrics>) {
        let transport = MemoryTransport::new();
        let config = ConnectionConfig {
            ice_servers: Vec::new(),
        };
        let Ok(link) = transport.connect(&config).await else {
            panic!("connect failed");
        };
        let Some(peer) = transport.last_peer() else {
            panic!("no remote peer");
        };
        let metrics = Arc::new(RelayMetrics::new());
        let session = Session::new(
            SessionId::from("A"),
            Weak::new(),
            link.connection,
            Arc::clone(&metrics),
            8,
        );
        tokio::spawn(Arc::clone(&session).run_events(link.events));
        (session, peer, metrics)
    }

    async fn reaches(session: &Session, want: SessionState) -> bool {
        let mut rx = session.subscribe_state();
        let res = tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| *s == want)).await;
        matches!(res, Ok(Ok(_)))
    }

    #[tokio::test]
    async fn starts_created() {
        let (session, _peer, _) = standalone().await;
        assert_eq!(session.state(), SessionState::Created);
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn channel_open_makes_session_open() {
        let (session, peer, _) = standalone().await;
        let _chat = peer.open_channel("chat");
        assert!(reaches(&session, SessionState::Open).await);
        assert_eq!(session.channel_labels().await, vec!["chat".to_string()]);
    }

    #[tokio::test]
    async fn created_channel_alone_does_not_open() {
        let (session, peer, _) = standalone().await;
        let _chat = peer.create_channel("chat");
        peer.set_state(ConnectionState::Connected);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.state(), SessionState::Created);
        assert_eq!(session.channel_labels().await.len(), 1);
    }

    #[tokio::test]
    async fn terminal_state_closes_before_open() {
        let (session, peer, _) = standalone().await;
        peer.set_state(ConnectionState::Failed);
        assert!(reaches(&session, SessionState::Closed).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(peer.connection.close_calls(), 1);
    }

    #[tokio::test]
    async fn enqueue_skips_unknown_label() {
        let (session, peer, _) = standalone().await;
        let _chat = peer.open_channel("chat");
        assert!(reaches(&session, SessionState::Open).await);

        let result = session.enqueue("game", Payload::text("x")).await;
        assert!(matches!(result, Ok(false)));
    }

    #[tokio::test]
    async fn enqueue_delivers_through_writer() {
        let (session, peer, metrics) = standalone().await;
        let chat = peer.open_channel("chat");
        assert!(reaches(&session, SessionState::Open).await);

        let result = session.enqueue("chat", Payload::binary(&b"hello"[..])).await;
        assert!(matches!(result, Ok(true)));

        let Some(got) = chat.recv().await else {
            panic!("nothing delivered");
        };
        assert_eq!(&got.data[..], b"hello");
        assert!(!got.is_text());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(metrics.snapshot().messages_sent, 1);
    }

    #[tokio::test]
    async fn writer_counts_send_failures() {
        let (session, peer, metrics) = standalone().await;
        let chat = peer.open_channel("chat");
        assert!(reaches(&session, SessionState::Open).await);
        chat.fail_sends(true);

        let result = session.enqueue("chat", Payload::text("x")).await;
        assert!(matches!(result, Ok(true)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let snap = metrics.snapshot();
        assert_eq!(snap.send_failures, 1);
        assert_eq!(snap.messages_sent, 0);
    }

    #[tokio::test]
    async fn message_without_pool_still_counts() {
        let (session, peer, metrics) = standalone().await;
        let _chat = peer.open_channel("chat");
        assert!(reaches(&session, SessionState::Open).await);

        peer.send("chat", Payload::text("hi"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(metrics.snapshot().messages_received, 1);
    }

    #[tokio::test]
    async fn close_marks_closed_and_closes_connection() {
        let (session, peer, _) = standalone().await;
        assert!(session.close().await.is_ok());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(peer.connection.is_closed());
    }

    #[tokio::test]
    async fn close_error_is_transport_failure() {
        let (session, peer, _) = standalone().await;
        peer.connection.fail_close(true);
        let result = session.close().await;
        assert!(matches!(result, Err(RelayError::TransportFailure(_))));
        assert_eq!(session.state(), SessionState::Closed);
    }
}
