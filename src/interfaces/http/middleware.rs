//! Request gating middleware
//!
//! `rate_limit_middleware` wraps the whole router; `auth_middleware` wraps the
//! protected routes and attaches the caller's [`Identity`] and [`ClientInfo`]
//! as request extensions.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::application::auth::{AccessGate, ClientInfo, RateDecision};
use crate::interfaces::http::error::ApiError;

pub const AUTH_COOKIE: &str = "auth_token";

#[derive(Clone)]
pub struct SecurityState {
    pub gate: Arc<AccessGate>,
    /// Honour `X-Forwarded-For` / `X-Real-IP`.
    pub trust_proxy_headers: bool,
}

/// Resolve the client address: proxy headers when trusted, then the socket
/// peer, then `"unknown"`.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let real_ip = || {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        if let Some(ip) = forwarded.or_else(real_ip) {
            return ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// `Authorization: Bearer <token>` first, then the `auth_token` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == AUTH_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn client_info(request: &Request<Body>, trust_proxy: bool) -> ClientInfo {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    ClientInfo {
        ip: client_ip(request.headers(), peer, trust_proxy),
        user_agent: request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string(),
    }
}

/// Rejects over-budget clients with 429 before any other work happens.
pub async fn rate_limit_middleware(
    State(state): State<SecurityState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_info(&request, state.trust_proxy_headers);
    match state.gate.check_rate(&client.ip) {
        RateDecision::Allowed { .. } => {
            request.extensions_mut().insert(client);
            next.run(request).await
        }
        denied => ApiError::rate_limited(denied.retry_after()).into_response(),
    }
}

/// Allow-list, token and session checks for protected routes.
pub async fn auth_middleware(
    State(state): State<SecurityState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let client = match request.extensions().get::<ClientInfo>() {
        Some(client) => client.clone(),
        None => client_info(&request, state.trust_proxy_headers),
    };
    let token = extract_token(request.headers());

    match state.gate.authorize(&client.ip, token.as_deref()).await {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            request.extensions_mut().insert(client);
            next.run(request).await
        }
        Err(err) => ApiError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for &(k, v) in pairs {
            map.append(k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn proxy_headers_only_when_trusted() {
        let h = headers(&[("x-forwarded-for", "203.0.113.7, 10.0.0.1"), ("x-real-ip", "198.51.100.2")]);
        let peer: SocketAddr = "192.0.2.10:4000".parse().unwrap();

        assert_eq!(client_ip(&h, Some(peer), true), "203.0.113.7");
        assert_eq!(client_ip(&h, Some(peer), false), "192.0.2.10");

        let h = headers(&[("x-real-ip", "198.51.100.2")]);
        assert_eq!(client_ip(&h, Some(peer), true), "198.51.100.2");
        assert_eq!(client_ip(&HeaderMap::new(), None, true), "unknown");
    }

    #[test]
    fn bearer_takes_precedence_over_cookie() {
        let h = headers(&[
            ("authorization", "Bearer header-token"),
            ("cookie", "theme=dark; auth_token=cookie-token"),
        ]);
        assert_eq!(extract_token(&h).as_deref(), Some("header-token"));

        let h = headers(&[("cookie", "theme=dark; auth_token=cookie-token")]);
        assert_eq!(extract_token(&h).as_deref(), Some("cookie-token"));

        let h = headers(&[("authorization", "Basic abc"), ("cookie", "auth_token=")]);
        assert_eq!(extract_token(&h), None);
    }
}
