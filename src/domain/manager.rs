//! Top-level registry of pools by name.
//!
//! [`Manager`] stores every pool in a `HashMap` behind a single
//! [`tokio::sync::RwLock`]. Pools live as long as the process; there is no
//! removal.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{Pool, PoolName};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::transport::{ConnectionConfig, Transport};

/// Central store for all pools.
#[derive(Debug)]
pub struct Manager {
    pools: RwLock<HashMap<PoolName, Arc<Pool>>>,
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    metrics: Arc<RelayMetrics>,
    queue_capacity: usize,
}

impl Manager {
    /// Creates an empty manager. Every pool it creates shares `config`
    /// and builds its connections through `transport`; each session gets
    /// an outbound queue of `queue_capacity` messages.
    #[must_use]
    pub fn new(
        config: ConnectionConfig,
        transport: Arc<dyn Transport>,
        metrics: Arc<RelayMetrics>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            config,
            transport,
            metrics,
            queue_capacity,
        }
    }

    /// Shared relay counters.
    #[must_use]
    pub fn metrics(&self) -> &Arc<RelayMetrics> {
        &self.metrics
    }

    /// Creates and registers a pool named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::DuplicateName`] if the name is taken.
    pub async fn new_pool(&self, name: PoolName) -> Result<Arc<Pool>, RelayError> {
        let mut pools = self.pools.write().await;
        if pools.contains_key(&name) {
            return Err(RelayError::DuplicateName(name));
        }
        let pool = Pool::new(
            name.clone(),
            self.config.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.metrics),
            self.queue_capacity,
        );
        pools.insert(name.clone(), Arc::clone(&pool));
        drop(pools);

        self.metrics.pool_created();
        tracing::info!(pool = %name, "pool created");
        Ok(pool)
    }

    /// Returns the pool registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::PoolNotFound`] if no such pool exists.
    pub async fn pool(&self, name: &str) -> Result<Arc<Pool>, RelayError> {
        self.pools
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| RelayError::PoolNotFound(PoolName::from(name)))
    }

    /// Returns the names of all registered pools, in no particular order.
    pub async fn pools(&self) -> Vec<PoolName> {
        self.pools.read().await.keys().cloned().collect()
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.pools.read().await.len()
    }

    #[cfg(test)]
    pub(crate) async fn is_empty(&self) -> bool {
        self.pools.read().await.is_empty()
    }
}
