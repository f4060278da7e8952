//! services/api/src/web/middleware.rs
//!
//! Identifies the calling client so quota can be charged per client.

use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

pub const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN_CLIENT: &str = "unknown";

/// The key a request's quota is charged against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKey(pub String);

/// Middleware that derives the `ClientKey` and inserts it into request extensions.
///
/// The first `X-Forwarded-For` entry wins, then the peer address, then `"unknown"`.
pub async fn identify_client(mut req: Request, next: Next) -> Response {
    let key = client_key(&req);
    req.extensions_mut().insert(key);
    next.run(req).await
}

fn client_key(req: &Request) -> ClientKey {
    let forwarded = req
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(first) = forwarded {
        return ClientKey(first.to_string());
    }

    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(peer)) => ClientKey(peer.ip().to_string()),
        None => ClientKey(UNKNOWN_CLIENT.to_string()),
    }
}
