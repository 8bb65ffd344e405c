// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named broadcast channels and their subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::connection::{fan_out, Connection, Frame};

/// Maps a client-chosen channel name to its subscribed connections.
///
/// Membership is a set: subscribing the same connection twice leaves one
/// entry, so a publish reaches each subscriber at most once. Channels exist
/// only while they have subscribers.
#[derive(Debug, Default)]
pub struct ChannelTable {
    subscribers: RwLock<HashMap<String, Vec<Arc<Connection>>>>,
}

impl ChannelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `conn` to `channel`. Returns `false` if it was already subscribed.
    pub async fn subscribe(&self, channel: &str, conn: Arc<Connection>) -> bool {
        let mut subs = self.subscribers.write().await;
        let members = subs.entry(channel.to_owned()).or_default();
        if members.iter().any(|c| c.id() == conn.id()) {
            return false;
        }
        members.push(conn);
        true
    }

    /// Remove `conn` from one channel. Absence is a no-op.
    pub async fn unsubscribe(&self, channel: &str, conn: &Connection) -> bool {
        let mut subs = self.subscribers.write().await;
        let Some(members) = subs.get_mut(channel) else {
            return false;
        };
        let before = members.len();
        members.retain(|c| c.id() != conn.id());
        let removed = members.len() != before;
        if members.is_empty() {
            subs.remove(channel);
        }
        removed
    }

    /// Remove `conn` from every channel, whether or not the caller tracked
    /// its memberships. Returns the number of channels it was removed from.
    pub async fn unsubscribe_all(&self, conn: &Connection) -> usize {
        let mut subs = self.subscribers.write().await;
        let mut removed = 0;
        subs.retain(|_, members| {
            let before = members.len();
            members.retain(|c| c.id() != conn.id());
            if members.len() != before {
                removed += 1;
            }
            !members.is_empty()
        });
        removed
    }

    /// Deliver to every subscriber of `channel`. Zero subscribers is fine.
    pub async fn publish(&self, channel: &str, frame: &Frame) -> usize {
        let subs = self.subscribers.read().await;
        match subs.get(channel) {
            Some(members) => fan_out(members, frame, "publish"),
            None => 0,
        }
    }

    /// Number of channels with at least one subscriber.
    pub async fn channel_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers.read().await.get(channel).map_or(0, Vec::len)
    }
}

#[cfg(test)]
#[path = "channels_tests.rs"]
mod tests;
