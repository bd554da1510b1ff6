//! Application state

use minuteur_core::OfflineCacheManager;
use minuteur_proxy::Fetcher;
use std::sync::Arc;

/// Handle rendering the Prometheus exposition
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<OfflineCacheManager>,
    /// Used for requests the manager leaves to the network untouched
    pub fetcher: Arc<dyn Fetcher>,
}

impl AppState {
    pub fn new(manager: Arc<OfflineCacheManager>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { manager, fetcher }
    }
}
