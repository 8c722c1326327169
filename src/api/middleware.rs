//! Request middleware: rate limiting, then identification.

use super::{errors::ApiError, state::AppState};
use crate::auth::identify;
use axum::{
    extract::{ConnectInfo, Extension, Request},
    http::{HeaderMap, HeaderValue, header::VARY},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::debug;

/// Reject the request with 429 when its client has exhausted its bucket.
pub async fn rate_limit(
    Extension(state): Extension<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_id(request.headers(), peer, state.limiter().config().trust_proxy());

    if !state.limiter().admit(&client).await {
        return Err(ApiError::RateLimitExceeded);
    }
    Ok(next.run(request).await)
}

/// Attach the caller's `Identity` to the request. Every response varies on
/// `Authorization`, including rejections from this stage.
pub async fn authenticate(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut response = match identify(state.tokens(), request.headers()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(err) => {
            debug!("identification failed: {err}");
            ApiError::from(err).into_response()
        }
    };
    response
        .headers_mut()
        .append(VARY, HeaderValue::from_static("Authorization"));
    response
}

/// Rate limit key for the caller. With `trust_proxy` this is the first
/// `X-Forwarded-For` entry, then `X-Real-IP`; the socket peer otherwise.
pub(crate) fn client_id(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    let peer_ip = || peer.map_or_else(|| "unknown".to_string(), |addr| addr.ip().to_string());
    if !trust_proxy {
        return peer_ip();
    }
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(forwarded) = forwarded {
        return forwarded.to_string();
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map_or_else(peer_ip, str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_prefers_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.9, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        let peer = Some(SocketAddr::from(([127, 0, 0, 1], 4000)));
        assert_eq!(client_id(&headers, peer, true), "203.0.113.9");
    }

    #[test]
    fn client_id_falls_back_to_real_ip_then_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static(" 198.51.100.4 "));
        let peer = Some(SocketAddr::from(([127, 0, 0, 1], 4000)));
        assert_eq!(client_id(&headers, peer, true), "198.51.100.4");

        assert_eq!(client_id(&HeaderMap::new(), peer, true), "127.0.0.1");
        assert_eq!(client_id(&HeaderMap::new(), None, true), "unknown");
    }

    #[test]
    fn empty_forwarded_for_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" "));
        let peer = Some(SocketAddr::from(([192, 0, 2, 1], 80)));
        assert_eq!(client_id(&headers, peer, true), "192.0.2.1");
    }

    #[test]
    fn untrusted_headers_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        let peer = Some(SocketAddr::from(([192, 0, 2, 7], 5000)));
        assert_eq!(client_id(&headers, peer, false), "192.0.2.7");
        assert_eq!(client_id(&headers, None, false), "unknown");
    }
}
