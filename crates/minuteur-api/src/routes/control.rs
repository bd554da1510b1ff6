//! Platform event routes
//!
//! The host raises the events a browser would raise on its own: client
//! messages, pushes, notification clicks and sync registrations. Effects
//! returned by the manager are carried out here where the host can, and
//! returned to the caller otherwise.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    routing::{get, post},
};
use minuteur_core::{
    CacheStats, ClientMessage, Effect, NotificationClick, RefreshReport, SyncOutcome,
    VersionReply, WorkerState,
};
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Serialize)]
pub struct EffectsResponse {
    pub effects: Vec<Effect>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<VersionReply>,
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub tag: String,
    pub outcome: SyncOutcome,
}

#[derive(Serialize)]
pub struct PeriodicSyncResponse {
    pub tag: String,
    /// `None` when the tag is not handled
    pub report: Option<RefreshReport>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub version: String,
    pub worker_state: WorkerState,
    pub partitions: [String; 3],
    pub stats: CacheStats,
}

/// Create control routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/_offline/message", post(post_message))
        .route("/_offline/push", post(post_push))
        .route("/_offline/notification-click", post(post_notification_click))
        .route("/_offline/sync/{tag}", post(post_sync))
        .route("/_offline/periodic-sync/{tag}", post(post_periodic_sync))
        .route("/_offline/stats", get(get_stats))
}

/// Carry out the effects the host is able to perform
///
/// Skip-waiting activates an installed worker right away. Claiming and
/// window management have no counterpart in a headless host and are only
/// logged.
pub async fn apply_effects(state: &AppState, effects: &[Effect]) -> Result<(), ApiError> {
    for effect in effects {
        match effect {
            Effect::SkipWaiting => {
                if state.manager.lifecycle().can_activate(0) {
                    state.manager.activate().await?;
                }
            }
            Effect::ClaimClients => info!("Claimed open clients"),
            Effect::ShowNotification(notification) => {
                info!("Notification: {} - {}", notification.title, notification.body)
            }
            Effect::CloseNotification => info!("Notification closed"),
            Effect::FocusClient { id } => info!("Focusing client {}", id),
            Effect::OpenWindow { url } => info!("Opening window at {}", url),
        }
    }
    Ok(())
}

/// POST /_offline/message
async fn post_message(
    State(state): State<AppState>,
    Json(message): Json<ClientMessage>,
) -> Result<Json<EffectsResponse>, ApiError> {
    let (tx, rx) = oneshot::channel();
    let effects = state.manager.handle_message(message, Some(tx));
    apply_effects(&state, &effects).await?;

    // The sender is dropped unless the message produced a reply
    let reply = rx.await.ok();

    Ok(Json(EffectsResponse { effects, reply }))
}

/// POST /_offline/push
async fn post_push(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<EffectsResponse>, ApiError> {
    let payload = (!body.is_empty()).then_some(body.as_ref());
    let effects = state.manager.handle_push(payload);
    apply_effects(&state, &effects).await?;

    Ok(Json(EffectsResponse {
        effects,
        reply: None,
    }))
}

/// POST /_offline/notification-click
async fn post_notification_click(
    State(state): State<AppState>,
    Json(click): Json<NotificationClick>,
) -> Result<Json<EffectsResponse>, ApiError> {
    let effects = state.manager.handle_notification_click(&click);
    apply_effects(&state, &effects).await?;

    Ok(Json(EffectsResponse {
        effects,
        reply: None,
    }))
}

/// POST /_offline/sync/{tag}
async fn post_sync(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<SyncResponse>, ApiError> {
    let outcome = state.manager.handle_sync(&tag).await?;
    Ok(Json(SyncResponse { tag, outcome }))
}

/// POST /_offline/periodic-sync/{tag}
async fn post_periodic_sync(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<PeriodicSyncResponse>, ApiError> {
    let report = state.manager.handle_periodic_sync(&tag).await?;
    if let Some(report) = &report
        && !report.failed.is_empty()
    {
        warn!("Periodic refresh left {} assets stale", report.failed.len());
    }
    Ok(Json(PeriodicSyncResponse { tag, report }))
}

/// GET /_offline/stats
async fn get_stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let config = state.manager.config();
    Json(StatsResponse {
        version: config.version.clone(),
        worker_state: state.manager.state(),
        partitions: config.partition_names().map(String::from),
        stats: state.manager.stats().await,
    })
}

#[cfg(test)]
mod tests {
    use crate::routes::create_router;
    use crate::routes::testing::{FakeOrigin, state};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use minuteur_core::WorkerState;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_get_version_message() {
        let app = create_router(state(Arc::new(FakeOrigin::app_shell())), None);

        let response = app
            .oneshot(post_json("/_offline/message", json!({"type": "GET_VERSION"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["reply"], json!({"version": "4.0"}));
        assert_eq!(body["effects"], json!([]));
    }

    #[tokio::test]
    async fn test_skip_waiting_message_activates() {
        let state = state(Arc::new(FakeOrigin::app_shell()));
        state.manager.install().await.unwrap();
        let app = create_router(state.clone(), None);

        let response = app
            .oneshot(post_json("/_offline/message", json!({"type": "SKIP_WAITING"})))
            .await
            .unwrap();
        let body = json_body(response).await;

        assert_eq!(body["effects"], json!([{"effect": "skip_waiting"}]));
        assert!(body.get("reply").is_none());
        assert_eq!(state.manager.state(), WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_push_builds_notification() {
        let app = create_router(state(Arc::new(FakeOrigin::app_shell())), None);

        let request = Request::builder()
            .method("POST")
            .uri("/_offline/push")
            .body(Body::from("Le riz est cuit"))
            .unwrap();
        let body = json_body(app.oneshot(request).await.unwrap()).await;

        let effect = &body["effects"][0];
        assert_eq!(effect["effect"], "show_notification");
        assert_eq!(effect["title"], "Minuteur Cuisine");
        assert_eq!(effect["body"], "Le riz est cuit");
        assert_eq!(effect["vibrate"], json!([300, 100, 300]));
    }

    #[tokio::test]
    async fn test_notification_click_focuses_window() {
        let app = create_router(state(Arc::new(FakeOrigin::app_shell())), None);

        let click = json!({
            "action": "open",
            "clients": [{"id": "w1", "url": "http://localhost:8080/minuteur/"}]
        });
        let body = json_body(
            app.oneshot(post_json("/_offline/notification-click", click))
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(
            body["effects"],
            json!([{"effect": "close_notification"}, {"effect": "focus_client", "id": "w1"}])
        );
    }

    #[tokio::test]
    async fn test_sync_routes() {
        let app = create_router(state(Arc::new(FakeOrigin::app_shell())), None);

        let request = Request::builder()
            .method("POST")
            .uri("/_offline/sync/background-sync")
            .body(Body::empty())
            .unwrap();
        let body = json_body(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(body["outcome"], "completed");

        let request = Request::builder()
            .method("POST")
            .uri("/_offline/periodic-sync/update-cache")
            .body(Body::empty())
            .unwrap();
        let body = json_body(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(body["report"]["refreshed"], json!(["./", "./index.html", "./manifest.json"]));

        let request = Request::builder()
            .method("POST")
            .uri("/_offline/periodic-sync/other")
            .body(Body::empty())
            .unwrap();
        let body = json_body(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["report"], Value::Null);
    }

    #[tokio::test]
    async fn test_stats_and_health() {
        let app = create_router(state(Arc::new(FakeOrigin::app_shell())), None);

        let request = Request::builder()
            .uri("/_offline/stats")
            .body(Body::empty())
            .unwrap();
        let body = json_body(app.clone().oneshot(request).await.unwrap()).await;
        assert_eq!(body["version"], "4.0");
        assert_eq!(body["worker_state"], "parsed");
        assert_eq!(
            body["partitions"],
            json!(["minuteur-cuisine-v4", "static-v4", "dynamic-v4"])
        );
        assert_eq!(body["stats"]["hit_count"], 0);

        let request = Request::builder()
            .uri("/_offline/health")
            .body(Body::empty())
            .unwrap();
        let body = json_body(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["status"], "healthy");
    }
}
