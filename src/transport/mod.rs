//! Peer transport contract consumed by the relay core.
//!
//! The relay never talks to ICE, DTLS or SCTP directly. It builds peer
//! connections through a [`Transport`], answers offers through the
//! resulting [`PeerConnection`], and learns about everything the remote
//! side does from a stream of [`PeerEvent`]s. [`rtc::WebRtcTransport`]
//! is the production implementation.

#[cfg(test)]
pub(crate) mod memory;
pub mod rtc;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use utoipa::ToSchema;

pub use self::rtc::WebRtcTransport;

/// Connection settings shared by every session of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// STUN/TURN server URLs handed to ICE (e.g. `stun:host:3478`).
    pub ice_servers: Vec<String>,
}

/// Kind of negotiation descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    /// Descriptor sent by the party initiating the connection.
    Offer,
    /// Descriptor returned by the answering party.
    Answer,
}

/// Offer or answer exchanged while negotiating a peer connection.
///
/// Serializes as `{ "type": "answer", "sdp": "v=0..." }`, the shape
/// browsers accept in `RTCPeerConnection.setRemoteDescription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionDescription {
    /// Descriptor kind.
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    /// Raw SDP text.
    pub sdp: String,
}

impl SessionDescription {
    /// Wraps raw SDP text as an offer.
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Wraps raw SDP text as an answer.
    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Peer connection state as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connection object exists, negotiation has not started.
    New,
    /// ICE/DTLS handshake in progress.
    Connecting,
    /// Transport is up.
    Connected,
    /// Connectivity was lost.
    Disconnected,
    /// Negotiation or connectivity failed for good.
    Failed,
    /// Connection was closed locally or remotely.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for states after which the connection is unusable.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Framing of a data channel message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// UTF-8 text message.
    Text,
    /// Opaque binary message.
    Binary,
}

/// One data channel message.
///
/// Cloning is cheap: the bytes are reference counted, so a broadcast
/// shares one buffer across all recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Message framing.
    pub kind: PayloadKind,
    /// Message bytes.
    pub data: Bytes,
}

impl Payload {
    /// Creates a text payload.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self {
            kind: PayloadKind::Text,
            data: data.into(),
        }
    }

    /// Creates a binary payload.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self {
            kind: PayloadKind::Binary,
            data: data.into(),
        }
    }

    /// Returns `true` if the payload is framed as text.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.kind == PayloadKind::Text
    }
}

/// Something the remote peer did, delivered in order per connection.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// The peer connection changed state.
    StateChanged(ConnectionState),
    /// The remote side created a data channel.
    ChannelCreated(Arc<dyn DataChannel>),
    /// The data channel with this label finished its open handshake.
    ChannelOpened(String),
    /// A message arrived on the data channel with this label.
    Message {
        /// Label of the channel the message arrived on.
        label: String,
        /// Message content.
        payload: Payload,
    },
}

/// Errors reported by a transport implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The remote offer could not be parsed or applied.
    #[error("invalid offer: {0}")]
    InvalidOffer(String),

    /// The peer connection could not be constructed.
    #[error("connection setup failed: {0}")]
    Setup(String),

    /// Answer creation or local description failed.
    #[error("negotiation failed: {0}")]
    Negotiation(String),

    /// A data channel send failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Closing the peer connection failed.
    #[error("close failed: {0}")]
    Close(String),
}

/// A freshly built peer connection and the stream of its events.
#[derive(Debug)]
pub struct PeerLink {
    /// Handle used to negotiate and close the connection.
    pub connection: Arc<dyn PeerConnection>,
    /// Events raised by the connection, in the order they happened.
    pub events: mpsc::UnboundedReceiver<PeerEvent>,
}

/// Factory for peer connections.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Builds a new peer connection from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Setup`] if the connection object cannot be
    /// created.
    async fn connect(&self, config: &ConnectionConfig) -> Result<PeerLink, TransportError>;
}

/// One peer connection.
#[async_trait]
pub trait PeerConnection: Send + Sync + fmt::Debug {
    /// Applies the remote `offer` and returns the local answer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidOffer`] if the offer is rejected and
    /// [`TransportError::Negotiation`] for any other negotiation failure.
    async fn answer(&self, offer: SessionDescription)
    -> Result<SessionDescription, TransportError>;

    /// Closes the connection and all of its data channels.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Close`] if the transport reports a failure.
    async fn close(&self) -> Result<(), TransportError>;
}

/// A labeled data channel opened by the remote peer.
#[async_trait]
pub trait DataChannel: Send + Sync + fmt::Debug {
    /// Channel label chosen by the remote side.
    fn label(&self) -> &str;

    /// Sends one message to the remote peer.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Send`] if the message cannot be written.
    async fn send(&self, payload: &Payload) -> Result<(), TransportError>;
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Disconnected.is_terminal());
        assert!(ConnectionState::Closed.is_terminal());
        assert!(!ConnectionState::Connected.is_terminal());
        assert!(!ConnectionState::Connecting.is_terminal());
        assert!(!ConnectionState::New.is_terminal());
    }

    #[test]
    fn answer_serializes_browser_shape() {
        let answer = SessionDescription::answer("v=0\r\n");
        let Ok(value) = serde_json::to_value(&answer) else {
            panic!("serialization failed");
        };
        assert_eq!(value["type"], "answer");
        assert_eq!(value["sdp"], "v=0\r\n");
    }

    #[test]
    fn offer_deserializes_from_descriptor() {
        let json = r#"{"type":"offer","sdp":"v=0"}"#;
        let Ok(desc) = serde_json::from_str::<SessionDescription>(json) else {
            panic!("deserialization failed");
        };
        assert_eq!(desc, SessionDescription::offer("v=0"));
    }

    #[test]
    fn payload_kinds() {
        let text = Payload::text("hello");
        assert!(text.is_text());
        assert_eq!(&text.data[..], b"hello");

        let bin = Payload::binary(vec![0u8, 1, 2]);
        assert!(!bin.is_text());
        assert_eq!(bin.data.len(), 3);
    }
}
