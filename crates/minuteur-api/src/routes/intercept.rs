//! Request interception
//!
//! Turns an incoming request into a [`FetchRequest`] scoped to the
//! application origin, lets the offline cache manager answer it and turns
//! the outcome back into an HTTP response.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderName, HeaderValue, header},
    response::Response,
};
use minuteur_core::{FetchOutcome, ResponseSource};
use minuteur_proxy::{Destination, FetchRequest, FetchResponse, is_hop_by_hop};
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::state::AppState;

/// Response header naming where the answer came from
pub const SOURCE_HEADER: &str = "x-offline-source";

/// Largest request body forwarded to the origin
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Fallback handler: answer any request through the manager
pub async fn intercept(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let request = to_fetch_request(&state.manager.config().scope, request).await?;
    metrics::counter!("minuteur_offline_requests_total").increment(1);

    match state.manager.handle_fetch(request).await? {
        FetchOutcome::Bypass(request) => {
            debug!("Forwarding {} untouched", request.url);
            let response = state.fetcher.fetch(&request).await?;
            Ok(into_response(response, "bypass"))
        }
        FetchOutcome::Respond { response, source } => {
            let label = source_label(&source);
            metrics::counter!("minuteur_offline_responses_total", "source" => label).increment(1);
            Ok(into_response(response, label))
        }
    }
}

fn source_label(source: &ResponseSource) -> &'static str {
    match source {
        ResponseSource::Cache { .. } => "cache",
        ResponseSource::Network => "network",
        ResponseSource::Fallback { .. } => "fallback",
    }
}

/// Resolve the request path against the application origin
///
/// The path replaces the scope's path verbatim rather than being joined as
/// a reference, so `//host/x` stays on the origin.
async fn to_fetch_request(scope: &Url, request: Request) -> Result<FetchRequest, ApiError> {
    let (parts, body) = request.into_parts();

    let mut url = scope.clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());
    url.set_fragment(None);
    if url.origin() != scope.origin() {
        return Err(ApiError::BadRequest(format!(
            "request path {} leaves the application origin",
            parts.uri
        )));
    }

    let destination = parts
        .headers
        .get("sec-fetch-dest")
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.parse::<Destination>().unwrap_or_else(|e| {
                debug!("{}, treating as empty", e);
                Destination::Empty
            })
        })
        .unwrap_or_default();

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read request body: {}", e)))?;

    Ok(FetchRequest {
        method: parts.method,
        url,
        destination,
        headers: parts.headers,
        body,
    })
}

fn into_response(response: FetchResponse, source: &'static str) -> Response {
    let mut out = Response::new(Body::from(response.body));
    *out.status_mut() = response.status;

    let headers = out.headers_mut();
    for (name, value) in response.headers.iter() {
        if !is_hop_by_hop(name) && *name != header::CONTENT_LENGTH {
            headers.append(name.clone(), value.clone());
        }
    }
    headers.insert(
        HeaderName::from_static(SOURCE_HEADER),
        HeaderValue::from_static(source),
    );

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::create_router;
    use crate::routes::testing::{FakeOrigin, scope, state};
    use axum::http::StatusCode;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;
    use tower::ServiceExt;

    fn get(path: &str, destination: &str) -> Request {
        Request::builder()
            .uri(path)
            .header("sec-fetch-dest", destination)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn source(response: &Response) -> &str {
        response.headers()[SOURCE_HEADER].to_str().unwrap()
    }

    #[tokio::test]
    async fn test_request_resolved_against_scope() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/timers?active=1")
            .header("sec-fetch-dest", "iframe")
            .body(Body::from("{}"))
            .unwrap();

        let fetch = to_fetch_request(&scope(), request).await.unwrap();
        assert_eq!(fetch.url.as_str(), "http://localhost:8080/api/timers?active=1");
        assert_eq!(fetch.method, "POST");
        assert_eq!(fetch.destination, Destination::Empty);
        assert_eq!(fetch.body, "{}");
    }

    #[tokio::test]
    async fn test_authority_like_path_stays_on_origin() {
        let fetch = to_fetch_request(&scope(), get("//evil.example.com/steal?x=1", "empty"))
            .await
            .unwrap();
        assert_eq!(fetch.url.host_str(), Some("localhost"));
        assert_eq!(fetch.url.port(), Some(8080));
        assert_eq!(fetch.url.path(), "//evil.example.com/steal");
        assert_eq!(fetch.url.query(), Some("x=1"));
    }

    #[tokio::test]
    async fn test_foreign_host_never_reached() {
        let origin = Arc::new(FakeOrigin::app_shell());
        let app = create_router(state(origin.clone()), None);

        let response = app
            .oneshot(get("//evil.example.com/steal?x=1", "empty"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(origin.calls(), 1);
        assert_eq!(
            origin.seen(),
            vec!["http://localhost:8080//evil.example.com/steal?x=1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cached_then_offline() {
        let origin = Arc::new(FakeOrigin::app_shell());
        let state = state(origin.clone());
        state.manager.install().await.unwrap();
        let app = create_router(state.clone(), None);

        let response = app.clone().oneshot(get("/index.html", "document")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(source(&response), "cache");
        assert_eq!(body_text(response).await, "<html>index</html>");

        let response = app.clone().oneshot(get("/app.js", "script")).await.unwrap();
        assert_eq!(source(&response), "network");
        state.manager.settle().await;

        origin.offline.store(true, Ordering::SeqCst);

        let response = app.clone().oneshot(get("/app.js", "script")).await.unwrap();
        assert_eq!(source(&response), "cache");
        assert_eq!(body_text(response).await, "tick()");

        let response = app.clone().oneshot(get("/recettes/pates", "document")).await.unwrap();
        assert_eq!(source(&response), "fallback");
        assert_eq!(body_text(response).await, "<html>index</html>");

        let response = app.oneshot(get("/api/timers", "empty")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_origin_errors_pass_through() {
        let origin = Arc::new(FakeOrigin::app_shell());
        let app = create_router(state(origin.clone()), None);

        let response = app.oneshot(get("/missing.css", "style")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(source(&response), "network");
        assert_eq!(origin.calls(), 1);
    }
}
