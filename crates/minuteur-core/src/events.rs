//! Events delivered to the manager and what handling them produced

use bytes::Bytes;
use minuteur_proxy::{FetchRequest, FetchResponse};
use serde::Serialize;
use url::Url;

use crate::message::{ClientMessage, ReplyPort};
use crate::notification::{Notification, NotificationClick};

/// An event raised by the host platform
#[derive(Debug)]
pub enum ServiceEvent {
    Install,
    Activate,
    Fetch(FetchRequest),
    Sync { tag: String },
    PeriodicSync { tag: String },
    Push { payload: Option<Bytes> },
    NotificationClick(NotificationClick),
    Message {
        message: ClientMessage,
        reply: Option<ReplyPort>,
    },
}

impl ServiceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceEvent::Install => "install",
            ServiceEvent::Activate => "activate",
            ServiceEvent::Fetch(_) => "fetch",
            ServiceEvent::Sync { .. } => "sync",
            ServiceEvent::PeriodicSync { .. } => "periodicsync",
            ServiceEvent::Push { .. } => "push",
            ServiceEvent::NotificationClick(_) => "notificationclick",
            ServiceEvent::Message { .. } => "message",
        }
    }
}

/// Side effect the host platform has to carry out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Activate without waiting for old clients to close
    SkipWaiting,
    /// Take control of every open client
    ClaimClients,
    ShowNotification(Notification),
    CloseNotification,
    FocusClient { id: String },
    OpenWindow { url: Url },
}

/// Where an intercepted response came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResponseSource {
    Cache { partition: String },
    Network,
    /// Substitute served after a network failure
    Fallback { asset: String },
}

/// Result of intercepting a request
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not handled; the request goes to the network untouched
    Bypass(FetchRequest),
    Respond {
        response: FetchResponse,
        source: ResponseSource,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Number of assets stored per partition
    pub assets: usize,
    pub partitions: Vec<String>,
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Stale partitions removed
    pub deleted: Vec<String>,
    pub effects: Vec<Effect>,
}

/// Result of one periodic refresh run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    /// Assets that answered with a status other than 200
    pub skipped: Vec<String>,
    /// Assets that could not be fetched or stored
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    Completed,
    /// The tag is not one this worker handles
    Ignored,
}

/// What handling an event produced
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    Fetch(FetchOutcome),
    Synced(SyncOutcome),
    /// `None` when the periodic sync tag was not recognized
    Refreshed(Option<RefreshReport>),
    Effects(Vec<Effect>),
}
