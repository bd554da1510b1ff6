//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use minuteur_core::CoreError;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Network error: {0}")]
    Proxy(#[from] minuteur_proxy::ProxyError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Core(e) => match e {
                CoreError::Proxy(_) | CoreError::AssetUnavailable { .. } => {
                    (StatusCode::BAD_GATEWAY, "NETWORK_ERROR", e.to_string())
                }
                CoreError::Storage(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    e.to_string(),
                ),
                CoreError::InvalidConfig(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    e.to_string(),
                ),
            },
            ApiError::Proxy(e) => (StatusCode::BAD_GATEWAY, "NETWORK_ERROR", e.to_string()),
        };

        let body = axum::Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minuteur_proxy::ProxyError;

    #[test]
    fn test_network_failures_map_to_bad_gateway() {
        let err = ApiError::Core(CoreError::Proxy(ProxyError::Unreachable("x".to_string())));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);

        let err = ApiError::BadRequest("bad".to_string());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);

        let err = ApiError::Core(CoreError::InvalidConfig("bad".to_string()));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
