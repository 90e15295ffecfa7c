//! Domain layer: pool and session registries and the broadcast engine.
//!
//! A [`Manager`] owns pools by name, each [`Pool`] owns its sessions by
//! id, and each [`Session`] wraps one peer connection and its labeled
//! data channels.

pub mod ids;
pub mod manager;
pub mod pool;
pub mod session;

pub use ids::{PoolName, SessionId};
pub use manager::Manager;
pub use pool::Pool;
pub use session::{Session, SessionState};
