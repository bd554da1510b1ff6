//! API routes

mod control;
mod health;
mod intercept;
pub mod metrics;

use axum::Router;
use std::sync::Arc;

use crate::state::{AppState, MetricsHandle};

pub use control::apply_effects;

/// Create the main router
///
/// Control routes live under `/_offline/`; every other request is
/// intercepted by the offline cache manager.
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let mut router = Router::new()
        .merge(health::routes())
        .merge(control::routes())
        // Must be last so control routes take precedence
        .fallback(intercept::intercept)
        .with_state(state);

    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
}
