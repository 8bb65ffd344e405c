// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::state::HubState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connections: usize,
    pub users: usize,
    pub channels: usize,
    pub relay_dropped: u64,
}

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        connections: s.registry.connection_count().await,
        users: s.registry.user_count().await,
        channels: s.channels.channel_count().await,
        relay_dropped: s.relay.dropped(),
    })
}
