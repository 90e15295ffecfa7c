//! Broadcast domain: a registry of sessions and the fan-out routine.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::session::{Session, SessionState};
use super::{PoolName, SessionId};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::transport::{ConnectionConfig, Payload, SessionDescription, Transport};

/// A named group of sessions that relay messages to one another.
///
/// # Concurrency
///
/// The session map sits behind one lock that is held for map access only.
/// [`Pool::broadcast`] snapshots its recipients under the read lock and
/// queues deliveries after releasing it, so a slow peer never blocks
/// joins, closes or other broadcasts on the same pool.
#[derive(Debug)]
pub struct Pool {
    name: PoolName,
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    metrics: Arc<RelayMetrics>,
    queue_capacity: usize,
    created_at: DateTime<Utc>,
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl Pool {
    pub(crate) fn new(
        name: PoolName,
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        metrics: Arc<RelayMetrics>,
        queue_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            name,
            config,
            transport,
            metrics,
            queue_capacity,
            created_at: Utc::now(),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &PoolName {
        &self.name
    }

    /// Connection settings shared by all sessions of this pool.
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of registered sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Returns the session registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::SessionNotFound`] if no such session exists.
    pub async fn session(&self, id: &SessionId) -> Result<Arc<Session>, RelayError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::SessionNotFound(id.clone()))
    }

    /// Negotiates a new session from `offer` and registers it under `id`.
    ///
    /// The session is registered only once the answer exists; on any
    /// failure nothing remains in the registry and the half-built
    /// connection is closed.
    ///
    /// # Errors
    ///
    /// - [`RelayError::TransportFailure`] if the connection cannot be built
    ///   or dies during negotiation.
    /// - [`RelayError::BadOffer`] if the transport rejects the offer.
    /// - [`RelayError::SessionExists`] if `id` is already registered.
    pub async fn new_session(
        self: &Arc<Self>,
        offer: SessionDescription,
        id: SessionId,
    ) -> Result<SessionDescription, RelayError> {
        let link = self.transport.connect(&self.config).await?;
        let session = Session::new(
            id.clone(),
            Arc::downgrade(self),
            link.connection,
            Arc::clone(&self.metrics),
            self.queue_capacity,
        );
        tokio::spawn(Arc::clone(&session).run_events(link.events));
        let pending = PendingSession::new(session);

        let answer = match pending.session.connect(offer).await {
            Ok(answer) => answer,
            Err(e) => {
                pending.discard().await;
                return Err(e);
            }
        };

        let mut sessions = self.sessions.write().await;
        let rejection = if sessions.contains_key(&id) {
            Some(RelayError::SessionExists(id.clone()))
        } else if pending.session.state() == SessionState::Closed {
            Some(RelayError::TransportFailure(
                "connection closed during negotiation".to_string(),
            ))
        } else {
            None
        };
        if let Some(err) = rejection {
            drop(sessions);
            pending.discard().await;
            return Err(err);
        }
        sessions.insert(id.clone(), pending.commit());
        drop(sessions);
        self.metrics.session_opened();

        tracing::info!(pool = %self.name, session = %id, "session joined");
        Ok(answer)
    }

    /// Removes the session `id` and closes its connection.
    ///
    /// The entry is removed even if closing the connection fails.
    ///
    /// # Errors
    ///
    /// - [`RelayError::SessionNotFound`] if no such session exists (also on
    ///   a second call for the same id).
    /// - [`RelayError::TransportFailure`] if the transport fails to close.
    pub async fn close_session(&self, id: &SessionId) -> Result<(), RelayError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| RelayError::SessionNotFound(id.clone()))?;
        self.metrics.session_closed();
        tracing::info!(pool = %self.name, session = %id, "session closed");
        session.close().await
    }

    /// Delivers `payload` to the `label` channel of every open session
    /// except `sender`.
    ///
    /// Recipients without a `label` channel are skipped. A failed delivery
    /// is logged and counted and never affects the other recipients or
    /// the sender. Returns the number of recipients the payload was queued
    /// for.
    pub async fn broadcast(&self, sender: &SessionId, label: &str, payload: Payload) -> usize {
        let recipients: Vec<Arc<Session>> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(id, session)| *id != sender && session.is_open())
                .map(|(_, session)| Arc::clone(session))
                .collect()
        };

        let mut queued = 0;
        for recipient in recipients {
            match recipient.enqueue(label, payload.clone()).await {
                Ok(true) => queued += 1,
                Ok(false) => {
                    tracing::trace!(
                        pool = %self.name,
                        session = %recipient.id(),
                        label,
                        "recipient has no such channel"
                    );
                }
                Err(e) => {
                    self.metrics.send_failed();
                    tracing::warn!(
                        pool = %self.name,
                        session = %recipient.id(),
                        label,
                        error = %e,
                        "couldn't send data"
                    );
                }
            }
        }
        queued
    }
}

/// Tears down a session that never made it into the registry.
async fn discard(session: &Session) {
    if let Err(e) = session.close().await {
        tracing::debug!(session = %session.id(), error = %e, "close after failed join");
    }
}

/// A negotiated-but-unregistered session.
///
/// Dropping it without [`PendingSession::commit`] closes the session in a
/// background task, so a join whose caller goes away mid-negotiation
/// still releases its connection.
struct PendingSession {
    session: Arc<Session>,
    armed: bool,
}

impl PendingSession {
    fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    fn commit(mut self) -> Arc<Session> {
        self.armed = false;
        Arc::clone(&self.session)
    }

    async fn discard(mut self) {
        self.armed = false;
        discard(&self.session).await;
    }
}

impl Drop for PendingSession {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let session = Arc::clone(&self.session);
        tracing::debug!(session = %session.id(), "join abandoned");
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move { discard(&session).await });
        }
    }
}
