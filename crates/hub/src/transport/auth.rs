// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, Request, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::HubError;
use crate::identity::Identity;
use crate::state::HubState;

/// Extract a Bearer token from HTTP headers.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers.get("authorization")?.to_str().ok()?.strip_prefix("Bearer ")
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Extract and percent-decode `?token=...` from a request URI. Browsers
/// cannot set headers on WebSocket upgrades, so clients pass it here instead.
pub fn query_token(uri: &Uri) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(uri).ok()?.0.token
}

/// Axum middleware that resolves the caller's [`Identity`] and stores it in
/// request extensions.
///
/// Exempt: `/api/v1/health`.
pub async fn auth_layer(
    State(state): State<Arc<HubState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if req.uri().path() == "/api/v1/health" {
        return next.run(req).await;
    }

    let token = bearer_token(req.headers()).map(str::to_owned).or_else(|| query_token(req.uri()));
    let identity: Option<Identity> = token.and_then(|t| state.identities.resolve(&t));
    match identity {
        Some(identity) => {
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        None => {
            tracing::debug!(path = %req.uri().path(), "rejecting unauthenticated request");
            HubError::Unauthorized.to_http_response("unauthorized").into_response()
        }
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
