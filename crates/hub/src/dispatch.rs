// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routes decoded envelopes to the channel table, the registry and the relay.
//!
//! Live fan-out is best-effort. For `direct` envelopes the relay is invoked
//! after fan-out regardless of how many recipients were online.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::channels::ChannelTable;
use crate::connection::{Connection, Frame};
use crate::envelope::{Envelope, Intent, Recipient, Rejection};
use crate::registry::ClientRegistry;
use crate::relay::{MessageLogEntry, Relay};

/// Result of routing one envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Subscribed { channel: String, added: bool },
    Unsubscribed { channel: String, removed: bool },
    Published { channel: String, delivered: usize },
    Direct { to: Recipient, delivered: usize },
    Dropped(Rejection),
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<ClientRegistry>,
    channels: Arc<ChannelTable>,
    relay: Arc<dyn Relay>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ClientRegistry>,
        channels: Arc<ChannelTable>,
        relay: Arc<dyn Relay>,
    ) -> Self {
        Self { registry, channels, relay }
    }

    /// Decode the envelope's intent and route it. Rejections are logged and
    /// returned; they never end the session.
    pub async fn dispatch(&self, conn: &Arc<Connection>, envelope: Envelope) -> Dispatched {
        match Intent::try_from(envelope) {
            Ok(intent) => self.route(conn, intent).await,
            Err(rejection) => {
                warn!(conn_id = conn.id(), user_id = conn.user_id(), "dropping envelope: {rejection}");
                Dispatched::Dropped(rejection)
            }
        }
    }

    pub async fn route(&self, conn: &Arc<Connection>, intent: Intent) -> Dispatched {
        let outbound = intent.outbound(conn.user_id()).and_then(|env| match Frame::json(&env) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(conn_id = conn.id(), err = %e, "failed to encode outbound envelope");
                None
            }
        });

        match intent {
            Intent::Subscribe { channel } => {
                let added = self.channels.subscribe(&channel, Arc::clone(conn)).await;
                debug!(conn_id = conn.id(), user_id = conn.user_id(), %channel, added, "subscribe");
                Dispatched::Subscribed { channel, added }
            }
            Intent::Unsubscribe { channel } => {
                let removed = self.channels.unsubscribe(&channel, conn).await;
                debug!(conn_id = conn.id(), user_id = conn.user_id(), %channel, removed, "unsubscribe");
                Dispatched::Unsubscribed { channel, removed }
            }
            Intent::Publish { channel, .. } => {
                let delivered = match outbound {
                    Some(ref frame) => self.channels.publish(&channel, frame).await,
                    None => 0,
                };
                debug!(conn_id = conn.id(), user_id = conn.user_id(), %channel, delivered, "publish");
                Dispatched::Published { channel, delivered }
            }
            Intent::Direct { to, message } => {
                let delivered = match (outbound, to) {
                    (Some(ref frame), Recipient::Admins) => {
                        self.registry.send_to_admins(frame).await
                    }
                    (Some(ref frame), Recipient::User(id)) => {
                        self.registry.send_to_user(id, frame).await
                    }
                    (None, _) => 0,
                };
                debug!(conn_id = conn.id(), user_id = conn.user_id(), %to, delivered, "direct");
                self.relay.relay(MessageLogEntry::new(conn.user_id(), to, message));
                Dispatched::Direct { to, delivered }
            }
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
