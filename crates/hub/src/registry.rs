// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live connections grouped by authenticated user.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::connection::{fan_out, Connection, Frame};
use crate::error::HubError;

/// Maps `user_id` to that user's live connections (multi-device, multi-tab).
///
/// One lock guards the whole table: a broadcast holds the read lock for its
/// full iteration, so a concurrent unregister is observed either entirely
/// before or entirely after it.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<i64, Vec<Arc<Connection>>>>,
    max_per_user: Option<usize>,
}

impl ClientRegistry {
    pub fn new(max_per_user: Option<usize>) -> Self {
        Self { clients: RwLock::new(HashMap::new()), max_per_user }
    }

    /// Add a connection to its user's bucket.
    ///
    /// Only fails when a per-user limit is configured and already reached.
    pub async fn register(&self, conn: Arc<Connection>) -> Result<(), HubError> {
        let mut clients = self.clients.write().await;
        let bucket = clients.entry(conn.user_id()).or_default();
        if let Some(max) = self.max_per_user {
            if bucket.len() >= max {
                return Err(HubError::TooManyConnections);
            }
        }
        if !bucket.iter().any(|c| c.id() == conn.id()) {
            bucket.push(conn);
        }
        Ok(())
    }

    /// Remove a connection by identity. Unknown connections are a no-op.
    ///
    /// Returns whether the connection was present.
    pub async fn unregister(&self, conn: &Connection) -> bool {
        let mut clients = self.clients.write().await;
        let Some(bucket) = clients.get_mut(&conn.user_id()) else {
            return false;
        };
        let before = bucket.len();
        bucket.retain(|c| c.id() != conn.id());
        let removed = bucket.len() != before;
        if bucket.is_empty() {
            clients.remove(&conn.user_id());
        }
        removed
    }

    /// Deliver to every live connection of `user_id`. Zero recipients is fine.
    pub async fn send_to_user(&self, user_id: i64, frame: &Frame) -> usize {
        let clients = self.clients.read().await;
        match clients.get(&user_id) {
            Some(bucket) => fan_out(bucket, frame, "send_to_user"),
            None => 0,
        }
    }

    /// Deliver to every live connection whose role is admin, across all users.
    pub async fn send_to_admins(&self, frame: &Frame) -> usize {
        let clients = self.clients.read().await;
        let admins = clients.values().flatten().filter(|c| c.is_admin());
        fan_out(admins, frame, "send_to_admins")
    }

    /// Total live connections.
    pub async fn connection_count(&self) -> usize {
        self.clients.read().await.values().map(Vec::len).sum()
    }

    /// Users with at least one live connection.
    pub async fn user_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Live connection count for one user.
    pub async fn connections_for(&self, user_id: i64) -> usize {
        self.clients.read().await.get(&user_id).map_or(0, Vec::len)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
