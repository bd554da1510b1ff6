//! Dynamic caching and fallback rules

use http::{Method, StatusCode};
use minuteur_proxy::{Destination, FetchRequest, FetchResponse, ResponseType};

use crate::config::OfflineConfig;

/// A response may be copied into a partition only when it is a plain
/// same-origin 200 that was not reached through a redirect
pub fn is_cacheable_response(response: &FetchResponse) -> bool {
    response.status == StatusCode::OK
        && response.kind == ResponseType::Basic
        && !response.redirected
}

/// Whether a request is worth keeping in the dynamic partition
pub fn is_dynamic_candidate(config: &OfflineConfig, request: &FetchRequest) -> bool {
    if request.method != Method::GET {
        return false;
    }

    matches!(
        request.destination,
        Destination::Document | Destination::Script | Destination::Style
    ) || request.url.as_str().contains(&config.icon_marker)
}

pub fn should_cache_dynamic(
    config: &OfflineConfig,
    request: &FetchRequest,
    response: &FetchResponse,
) -> bool {
    is_cacheable_response(response) && is_dynamic_candidate(config, request)
}

/// Asset to serve when a request fails at the network, if any.
/// Documents take precedence over icons.
pub fn fallback_asset<'a>(config: &'a OfflineConfig, request: &FetchRequest) -> Option<&'a str> {
    if request.destination == Destination::Document {
        Some(&config.offline_document)
    } else if request.url.as_str().contains(&config.icon_marker) {
        Some(&config.fallback_icon)
    } else {
        None
    }
}
