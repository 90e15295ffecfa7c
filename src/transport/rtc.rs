//! [`Transport`] implementation on top of the `webrtc` crate.
//!
//! Callbacks registered on the `RTCPeerConnection` and its data channels
//! do nothing except push a [`PeerEvent`] into the session's queue.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::API;
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use super::{
    ConnectionConfig, ConnectionState, DataChannel, Payload, PeerConnection, PeerEvent, PeerLink,
    SessionDescription, Transport, TransportError,
};

/// Builds WebRTC peer connections that only carry data channels.
pub struct WebRtcTransport {
    api: API,
    gather_timeout: Duration,
}

impl WebRtcTransport {
    /// Creates a transport. `gather_timeout` bounds how long an answer
    /// waits for ICE candidate gathering before it is returned.
    #[must_use]
    pub fn new(gather_timeout: Duration) -> Self {
        Self {
            api: APIBuilder::new().build(),
            gather_timeout,
        }
    }
}

impl fmt::Debug for WebRtcTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcTransport")
            .field("gather_timeout", &self.gather_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
    async fn connect(&self, config: &ConnectionConfig) -> Result<PeerLink, TransportError> {
        let ice_servers = if config.ice_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: config.ice_servers.clone(),
                ..Default::default()
            }]
        };
        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = self
            .api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| TransportError::Setup(e.to_string()))?;
        let pc = Arc::new(pc);

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let state_tx = events_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            let _ = state_tx.send(PeerEvent::StateChanged(state.into()));
            Box::pin(async {})
        }));

        pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            attach_channel(dc, &events_tx);
            Box::pin(async {})
        }));

        Ok(PeerLink {
            connection: Arc::new(WebRtcConnection {
                pc,
                gather_timeout: self.gather_timeout,
            }),
            events: events_rx,
        })
    }
}

/// Announces a remote data channel and forwards its open and message
/// callbacks as events.
fn attach_channel(dc: Arc<RTCDataChannel>, events: &mpsc::UnboundedSender<PeerEvent>) {
    let label = dc.label().to_string();
    tracing::debug!(label = %label, id = dc.id(), "remote data channel");

    // Announce first: `on_open` fires immediately for an already open channel.
    let _ = events.send(PeerEvent::ChannelCreated(Arc::new(WebRtcChannel {
        dc: Arc::clone(&dc),
    })));

    let open_tx = events.clone();
    let open_label = label.clone();
    dc.on_open(Box::new(move || {
        let _ = open_tx.send(PeerEvent::ChannelOpened(open_label));
        Box::pin(async {})
    }));

    let msg_tx = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let payload = if msg.is_string {
            Payload::text(msg.data)
        } else {
            Payload::binary(msg.data)
        };
        let _ = msg_tx.send(PeerEvent::Message {
            label: label.clone(),
            payload,
        });
        Box::pin(async {})
    }));
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::Unspecified | RTCPeerConnectionState::New => Self::New,
            RTCPeerConnectionState::Connecting => Self::Connecting,
            RTCPeerConnectionState::Connected => Self::Connected,
            RTCPeerConnectionState::Disconnected => Self::Disconnected,
            RTCPeerConnectionState::Failed => Self::Failed,
            RTCPeerConnectionState::Closed => Self::Closed,
        }
    }
}

struct WebRtcConnection {
    pc: Arc<RTCPeerConnection>,
    gather_timeout: Duration,
}

impl fmt::Debug for WebRtcConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcConnection")
            .field("state", &self.pc.connection_state())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PeerConnection for WebRtcConnection {
    async fn answer(
        &self,
        offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        let remote = RTCSessionDescription::offer(offer.sdp)
            .map_err(|e| TransportError::InvalidOffer(e.to_string()))?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(|e| TransportError::InvalidOffer(e.to_string()))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::Negotiation(e.to_string()))?;

        // Signaling is a single request/response, so candidates must be in
        // the returned SDP.
        let mut gathered = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| TransportError::Negotiation(e.to_string()))?;
        if tokio::time::timeout(self.gather_timeout, gathered.recv())
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_ms = self.gather_timeout.as_millis() as u64,
                "ice gathering incomplete, answering with partial candidates"
            );
        }

        let local = self.pc.local_description().await.ok_or_else(|| {
            TransportError::Negotiation("local description missing after answer".to_string())
        })?;
        Ok(SessionDescription::answer(local.sdp))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.pc
            .close()
            .await
            .map_err(|e| TransportError::Close(e.to_string()))
    }
}

struct WebRtcChannel {
    dc: Arc<RTCDataChannel>,
}

impl fmt::Debug for WebRtcChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebRtcChannel")
            .field("label", &self.dc.label())
            .field("id", &self.dc.id())
            .finish()
    }
}

#[async_trait]
impl DataChannel for WebRtcChannel {
    fn label(&self) -> &str {
        self.dc.label()
    }

    async fn send(&self, payload: &Payload) -> Result<(), TransportError> {
        let result = if payload.is_text() {
            self.dc
                .send_text(String::from_utf8_lossy(&payload.data).into_owned())
                .await
        } else {
            self.dc.send(&payload.data).await
        };
        result
            .map(|_| ())
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn maps_peer_connection_states() {
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Connected),
            ConnectionState::Connected
        );
        assert_eq!(
            ConnectionState::from(RTCPeerConnectionState::Unspecified),
            ConnectionState::New
        );
        assert!(ConnectionState::from(RTCPeerConnectionState::Failed).is_terminal());
        assert!(ConnectionState::from(RTCPeerConnectionState::Disconnected).is_terminal());
    }

    #[tokio::test]
    async fn rejects_garbage_offer() {
        let transport = WebRtcTransport::new(Duration::from_millis(100));
        let config = ConnectionConfig {
            ice_servers: Vec::new(),
        };
        let Ok(link) = transport.connect(&config).await else {
            panic!("peer connection setup failed");
        };
        let result = link
            .connection
            .answer(SessionDescription::offer("not an sdp"))
            .await;
        assert!(matches!(result, Err(TransportError::InvalidOffer(_))));
        let _ = link.connection.close().await;
    }
}
