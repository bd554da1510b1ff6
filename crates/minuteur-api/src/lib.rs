//! Minuteur Offline HTTP Surface
//!
//! This crate provides the Axum-based host of the offline cache manager:
//! every application request is intercepted and answered through the
//! manager, and the platform events are raised through control routes
//! under `/_offline/`.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::{apply_effects, create_router};
pub use state::{AppState, MetricsHandle};
