//! Shared application state injected into all Axum handlers.

use std::fmt;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::domain::Manager;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Pool registry.
    pub manager: Arc<Manager>,
    /// Renders the `/metrics` exposition.
    pub prometheus: PrometheusHandle,
    /// Largest accepted decoded offer, in bytes.
    pub max_offer_bytes: usize,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("manager", &self.manager)
            .field("max_offer_bytes", &self.max_offer_bytes)
            .finish_non_exhaustive()
    }
}
