// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `GET /ws`: upgrade an authenticated request into a notification session.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures_util::StreamExt;

use crate::error::HubError;
use crate::identity::Identity;
use crate::session::ConnectionSession;
use crate::state::HubState;

/// WebSocket upgrade handler. The auth layer has already attached the
/// caller's identity.
pub async fn ws_handler(
    State(state): State<Arc<HubState>>,
    Extension(identity): Extension<Identity>,
    ws: WebSocketUpgrade,
) -> Response {
    // Answer with a proper 429 where possible; registration re-checks the
    // limit atomically after the upgrade.
    if let Some(max) = state.config.max_connections_per_user {
        if state.registry.connections_for(identity.user_id).await >= max {
            return HubError::TooManyConnections
                .to_http_response(format!("user {} already has {max} connections", identity.user_id))
                .into_response();
        }
    }

    ws.on_failed_upgrade(|e| tracing::debug!(err = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| async move {
            let (sink, stream) = socket.split();
            ConnectionSession::new(state, identity).run(stream, sink).await;
        })
        .into_response()
}
