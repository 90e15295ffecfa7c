//! # pool-relay
//!
//! Signaling and broadcast relay for WebRTC data channels.
//!
//! Clients negotiate a peer connection with the relay over HTTP, join a
//! named pool, and every message a peer sends on a data channel is fanned
//! out to the same-labeled channel of every other open peer in the pool.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP signaling, WebRTC data channels)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── Manager ── Pool ── Session (domain/)
//!     │                       │
//!     │                       └── outbound queue + writer task
//!     │
//!     └── Transport contract (transport/) ── webrtc-rs
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod transport;
