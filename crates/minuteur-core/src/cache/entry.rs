//! Conversion between network responses and stored entries

use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use minuteur_proxy::{FetchResponse, ResponseType, is_hop_by_hop};
use minuteur_storage::StoredResponse;
use tracing::warn;

/// Capture a network response for storage
pub fn to_stored(response: &FetchResponse) -> StoredResponse {
    let headers = response
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    StoredResponse::new(response.status.as_u16(), headers, response.body.clone())
}

/// Rebuild a response from a stored entry
///
/// Stored entries are always same-origin captures, so the rebuilt response
/// is basic and not redirected.
pub fn to_response(stored: StoredResponse) -> FetchResponse {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK);

    let mut headers = HeaderMap::with_capacity(stored.headers.len());
    for (name, value) in &stored.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!("Dropping unreadable stored header {}", name),
        }
    }

    FetchResponse {
        status,
        headers,
        body: stored.body,
        kind: ResponseType::Basic,
        redirected: false,
    }
}
