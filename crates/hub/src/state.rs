// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channels::ChannelTable;
use crate::config::HubConfig;
use crate::connection::ConnectionId;
use crate::dispatch::Dispatcher;
use crate::identity::IdentityResolver;
use crate::registry::ClientRegistry;
use crate::relay::Relay;

/// Poll interval while waiting for sessions to finish cleanup.
const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Shared hub state. Each instance owns its own tables, so tests can run
/// isolated hubs side by side.
pub struct HubState {
    pub config: HubConfig,
    pub registry: Arc<ClientRegistry>,
    pub channels: Arc<ChannelTable>,
    pub relay: Arc<dyn Relay>,
    pub identities: Arc<dyn IdentityResolver>,
    /// Cancelled on process shutdown; every session exits its read loop.
    pub shutdown: CancellationToken,
    next_conn_id: AtomicU64,
}

impl HubState {
    pub fn new(
        config: HubConfig,
        identities: Arc<dyn IdentityResolver>,
        relay: Arc<dyn Relay>,
        shutdown: CancellationToken,
    ) -> Self {
        let registry = Arc::new(ClientRegistry::new(config.max_connections_per_user));
        Self {
            config,
            registry,
            channels: Arc::new(ChannelTable::new()),
            relay,
            identities,
            shutdown,
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.channels),
            Arc::clone(&self.relay),
        )
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Wait for every session to unregister, up to `grace`.
    ///
    /// Returns `true` if the registry emptied in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        let wait = async {
            while self.registry.connection_count().await > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        };
        tokio::time::timeout(grace, wait).await.is_ok()
    }
}
