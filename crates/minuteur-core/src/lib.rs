//! Minuteur Offline Core Logic
//!
//! This crate provides the offline cache manager of the kitchen timer:
//! asset installation, stale partition cleanup, cache-first request
//! interception with offline fallbacks, and the push, notification,
//! sync and message handlers.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod message;
pub mod notification;

pub use cache::{CacheStats, OfflineCacheManager, spawn_refresh_task};
pub use config::{NotificationConfig, OfflineConfig};
pub use error::CoreError;
pub use events::{
    ActivationReport, Effect, EventOutcome, FetchOutcome, InstallReport, RefreshReport,
    ResponseSource, ServiceEvent, SyncOutcome,
};
pub use lifecycle::{Lifecycle, WorkerState};
pub use message::{ClientMessage, ReplyPort, VersionReply};
pub use notification::{Notification, NotificationAction, NotificationClick, WindowClient};
