//! In-process transport for tests.
//!
//! Every connection built by [`MemoryTransport`] is paired with a
//! [`RemotePeer`] that plays the browser side: it opens channels, sends
//! messages and changes connection state by pushing [`PeerEvent`]s.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    ConnectionConfig, ConnectionState, DataChannel, Payload, PeerConnection, PeerEvent, PeerLink,
    SessionDescription, Transport, TransportError,
};

/// Offers must start with this prefix to be accepted.
pub(crate) const VALID_OFFER: &str = "v=0\r\no=- 0 0 IN IP4 127.0.0.1\r\n";

#[derive(Debug, Default)]
pub(crate) struct MemoryTransport {
    fail_connect: AtomicBool,
    hang_answers: AtomicBool,
    answer_delay_ms: AtomicU64,
    peers: Mutex<Vec<RemotePeer>>,
}

impl MemoryTransport {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Makes answers on connections built from now on never complete.
    pub(crate) fn hang_answers(&self, hang: bool) {
        self.hang_answers.store(hang, Ordering::SeqCst);
    }

    /// Delays answers on connections built from now on.
    pub(crate) fn delay_answers(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.answer_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Remote side of the most recently built connection.
    pub(crate) fn last_peer(&self) -> Option<RemotePeer> {
        self.peers.lock().ok()?.last().cloned()
    }

    pub(crate) fn connections(&self) -> usize {
        self.peers.lock().map(|p| p.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, _config: &ConnectionConfig) -> Result<PeerLink, TransportError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Setup("memory transport refused".to_string()));
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = Arc::new(MemoryConnection {
            hang_answer: self.hang_answers.load(Ordering::SeqCst),
            answer_delay: Duration::from_millis(self.answer_delay_ms.load(Ordering::SeqCst)),
            ..MemoryConnection::default()
        });
        if let Ok(mut peers) = self.peers.lock() {
            peers.push(RemotePeer {
                events: events_tx,
                connection: Arc::clone(&connection),
            });
        }
        Ok(PeerLink {
            connection,
            events: events_rx,
        })
    }
}

#[derive(Debug, Default)]
pub(crate) struct MemoryConnection {
    hang_answer: bool,
    answer_delay: Duration,
    closed: AtomicBool,
    close_calls: AtomicUsize,
    fail_close: AtomicBool,
}

impl MemoryConnection {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PeerConnection for MemoryConnection {
    async fn answer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        if self.hang_answer {
            std::future::pending::<()>().await;
        }
        if !self.answer_delay.is_zero() {
            tokio::time::sleep(self.answer_delay).await;
        }
        if !offer.sdp.starts_with("v=0") {
            return Err(TransportError::InvalidOffer(
                "sdp must start with v=0".to_string(),
            ));
        }
        Ok(SessionDescription::answer("v=0\r\ns=memory-answer\r\n"))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::Close("memory close refused".to_string()));
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Browser side of a memory connection.
#[derive(Debug, Clone)]
pub(crate) struct RemotePeer {
    events: mpsc::UnboundedSender<PeerEvent>,
    pub(crate) connection: Arc<MemoryConnection>,
}

impl RemotePeer {
    /// Creates and opens a channel; returns the handle whose received
    /// messages the test can inspect.
    pub(crate) fn open_channel(&self, label: &str) -> Arc<MemoryChannel> {
        let channel = self.create_channel(label);
        let _ = self.events.send(PeerEvent::ChannelOpened(label.to_string()));
        channel
    }

    /// Creates a channel without completing its open handshake.
    pub(crate) fn create_channel(&self, label: &str) -> Arc<MemoryChannel> {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Arc::new(MemoryChannel {
            label: label.to_string(),
            delivered: tx,
            inbox: tokio::sync::Mutex::new(rx),
            fail_sends: AtomicBool::new(false),
        });
        let _ = self.events.send(PeerEvent::ChannelCreated(
            Arc::clone(&channel) as Arc<dyn DataChannel>
        ));
        channel
    }

    pub(crate) fn send(&self, label: &str, payload: Payload) {
        let _ = self.events.send(PeerEvent::Message {
            label: label.to_string(),
            payload,
        });
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let _ = self.events.send(PeerEvent::StateChanged(state));
    }
}

/// Data channel that stores what the relay sent to it.
#[derive(Debug)]
pub(crate) struct MemoryChannel {
    label: String,
    delivered: mpsc::UnboundedSender<Payload>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Payload>>,
    fail_sends: AtomicBool,
}

impl MemoryChannel {
    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Waits up to one second for the next delivered message.
    pub(crate) async fn recv(&self) -> Option<Payload> {
        let mut inbox = self.inbox.lock().await;
        tokio::time::timeout(Duration::from_secs(1), inbox.recv())
            .await
            .ok()
            .flatten()
    }

    /// Returns a delivered message if one is already waiting.
    pub(crate) async fn try_recv(&self) -> Option<Payload> {
        self.inbox.lock().await.try_recv().ok()
    }
}

#[async_trait]
impl DataChannel for MemoryChannel {
    fn label(&self) -> &str {
        &self.label
    }

    async fn send(&self, payload: &Payload) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("memory channel refused".to_string()));
        }
        self.delivered
            .send(payload.clone())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}
