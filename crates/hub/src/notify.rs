// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server-originated notifications pushed to live connections.
//!
//! Other backend services publish to `{prefix}.notify.>`:
//! - `notify.admins` → every admin connection
//! - `notify.user.<user_id>` → every connection of that user
//! - `notify.events` → domain events; `complaint_created` goes to admins
//!
//! Payloads must be JSON objects and are forwarded verbatim. Notifications
//! are live-only and never reach the relay.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::connection::Frame;
use crate::registry::ClientRegistry;

/// Event type on `notify.events` that is forwarded to admins.
pub const COMPLAINT_CREATED: &str = "complaint_created";

/// Push targets for server-originated frames.
pub trait Notifier: Send + Sync {
    fn notify_admins<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, usize>;
    fn notify_user<'a>(&'a self, user_id: i64, frame: &'a Frame) -> BoxFuture<'a, usize>;
}

impl Notifier for ClientRegistry {
    fn notify_admins<'a>(&'a self, frame: &'a Frame) -> BoxFuture<'a, usize> {
        Box::pin(self.send_to_admins(frame))
    }

    fn notify_user<'a>(&'a self, user_id: i64, frame: &'a Frame) -> BoxFuture<'a, usize> {
        Box::pin(self.send_to_user(user_id, frame))
    }
}

/// Where a notification subject routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyTarget {
    Admins,
    User(i64),
    Events,
}

impl NotifyTarget {
    /// Parse `{prefix}.notify.{admins|user.<id>|events}`.
    pub fn from_subject(prefix: &str, subject: &str) -> Option<Self> {
        let suffix = subject.strip_prefix(prefix)?.strip_prefix(".notify.")?;
        match suffix {
            "admins" => Some(Self::Admins),
            "events" => Some(Self::Events),
            other => other.strip_prefix("user.")?.parse().ok().map(Self::User),
        }
    }
}

/// Spawn the intake subscriber on an existing client. Ends on shutdown.
pub fn spawn_notification_intake(
    client: async_nats::Client,
    prefix: String,
    notifier: Arc<dyn Notifier>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_intake(client, &prefix, notifier, shutdown).await {
            tracing::error!(err = %e, "notification intake failed");
        }
    })
}

async fn run_intake(
    client: async_nats::Client,
    prefix: &str,
    notifier: Arc<dyn Notifier>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let subject = format!("{prefix}.notify.>");
    let mut sub = client.subscribe(subject.clone()).await?;
    info!(%subject, "notification intake subscribed");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = sub.next() => {
                let Some(msg) = msg else { break };
                let Some(target) = NotifyTarget::from_subject(prefix, msg.subject.as_str()) else {
                    debug!(subject = %msg.subject, "notify: unrouted subject");
                    continue;
                };
                handle_notification(notifier.as_ref(), target, &msg.payload).await;
            }
        }
    }
    Ok(())
}

/// Validate one payload and push it to its target.
///
/// Returns the number of live connections reached, or `None` if the
/// notification was dropped.
pub async fn handle_notification(
    notifier: &dyn Notifier,
    target: NotifyTarget,
    payload: &[u8],
) -> Option<usize> {
    let object: serde_json::Map<String, serde_json::Value> = match serde_json::from_slice(payload)
    {
        Ok(o) => o,
        Err(e) => {
            warn!(?target, err = %e, "notify: payload is not a JSON object");
            return None;
        }
    };

    if target == NotifyTarget::Events {
        let kind = object.get("type").and_then(|t| t.as_str()).unwrap_or_default();
        if kind != COMPLAINT_CREATED {
            debug!(kind, "notify: ignoring event");
            return None;
        }
    }

    let frame = match Frame::json(&object) {
        Ok(f) => f,
        Err(e) => {
            warn!(err = %e, "notify: failed to encode frame");
            return None;
        }
    };
    let delivered = match target {
        NotifyTarget::Admins | NotifyTarget::Events => notifier.notify_admins(&frame).await,
        NotifyTarget::User(user_id) => notifier.notify_user(user_id, &frame).await,
    };
    debug!(?target, delivered, "notify: pushed");
    Some(delivered)
}

#[cfg(test)]
#[path = "notify_tests.rs"]
mod tests;
