// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable side path for direct messages.
//!
//! Every `direct` envelope is handed to [`Relay::relay`] whether or not any
//! recipient was online. [`OutboundRelay`] fans each entry into two bounded
//! queues, one per downstream (broker and message log), each drained by its
//! own worker so a stalled downstream never delays the other or the
//! connection's receive loop. When a queue is full the new entry is dropped
//! for that downstream and counted.

pub mod log;
pub mod nats;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::envelope::Recipient;
use crate::identity::ADMIN_ROLE;

/// Durable record of one direct message. Exactly one of `to_user_id` and
/// `to_role` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub from_user_id: i64,
    pub to_user_id: Option<i64>,
    pub to_role: Option<String>,
    pub message: String,
}

impl MessageLogEntry {
    pub fn new(from_user_id: i64, to: Recipient, message: impl Into<String>) -> Self {
        let (to_user_id, to_role) = match to {
            Recipient::Admins => (None, Some(ADMIN_ROLE.to_owned())),
            Recipient::User(id) => (Some(id), None),
        };
        Self { from_user_id, to_user_id, to_role, message: message.into() }
    }
}

/// Accepts direct messages for durable delivery. Must not block.
pub trait Relay: Send + Sync {
    fn relay(&self, entry: MessageLogEntry);

    /// Entries dropped because a downstream queue was full or closed.
    fn dropped(&self) -> u64 {
        0
    }
}

/// External at-least-once publish sink.
pub trait BrokerSink: Send + Sync {
    fn send_message(&self, payload: String) -> BoxFuture<'_, anyhow::Result<()>>;
}

/// Append-only store for direct messages.
pub trait MessageLog: Send + Sync {
    fn save<'a>(&'a self, entry: &'a MessageLogEntry) -> BoxFuture<'a, anyhow::Result<()>>;
}

type EntryTx = mpsc::Sender<Arc<MessageLogEntry>>;
type EntryRx = mpsc::Receiver<Arc<MessageLogEntry>>;
type Submission = BoxFuture<'static, anyhow::Result<()>>;

/// Queue-backed [`Relay`] feeding a broker worker and a log worker.
pub struct OutboundRelay {
    broker_tx: Option<EntryTx>,
    log_tx: Option<EntryTx>,
    dropped: AtomicU64,
}

/// Join handles for the relay workers.
pub struct RelayWorkers {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl OutboundRelay {
    /// Start one worker per configured downstream. Either may be absent.
    pub fn spawn(
        broker: Option<Arc<dyn BrokerSink>>,
        log: Option<Arc<dyn MessageLog>>,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Arc<Self>, RelayWorkers) {
        let capacity = capacity.max(1);
        let mut handles = Vec::new();

        let broker_tx = broker.map(|broker| {
            let (tx, rx) = mpsc::channel(capacity);
            let submit = move |entry: Arc<MessageLogEntry>| -> Submission {
                let broker = Arc::clone(&broker);
                Box::pin(async move {
                    let payload = serde_json::to_string(&*entry)?;
                    broker.send_message(payload).await
                })
            };
            handles.push(tokio::spawn(drain_queue("broker", rx, shutdown.clone(), submit)));
            tx
        });

        let log_tx = log.map(|log| {
            let (tx, rx) = mpsc::channel(capacity);
            let submit = move |entry: Arc<MessageLogEntry>| -> Submission {
                let log = Arc::clone(&log);
                Box::pin(async move { log.save(&entry).await })
            };
            handles.push(tokio::spawn(drain_queue("message log", rx, shutdown.clone(), submit)));
            tx
        });

        let relay = Arc::new(Self { broker_tx, log_tx, dropped: AtomicU64::new(0) });
        (relay, RelayWorkers { handles, shutdown })
    }

    fn enqueue(&self, tx: &EntryTx, entry: &Arc<MessageLogEntry>, downstream: &'static str) {
        if let Err(e) = tx.try_send(Arc::clone(entry)) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue full",
                mpsc::error::TrySendError::Closed(_) => "worker stopped",
            };
            warn!(
                downstream,
                reason,
                from_user_id = entry.from_user_id,
                "relay: dropping direct message"
            );
        }
    }
}

impl Relay for OutboundRelay {
    fn relay(&self, entry: MessageLogEntry) {
        if self.broker_tx.is_none() && self.log_tx.is_none() {
            debug!(from_user_id = entry.from_user_id, "relay: no downstreams configured");
            return;
        }
        let entry = Arc::new(entry);
        if let Some(ref tx) = self.broker_tx {
            self.enqueue(tx, &entry, "broker");
        }
        if let Some(ref tx) = self.log_tx {
            self.enqueue(tx, &entry, "message log");
        }
    }

    fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl RelayWorkers {
    /// Stop the workers after they flush what is already queued, waiting at
    /// most `grace`.
    pub async fn shutdown(self, grace: Duration) {
        self.shutdown.cancel();
        let joined = futures_util::future::join_all(self.handles);
        if tokio::time::timeout(grace, joined).await.is_err() {
            warn!(?grace, "relay workers did not drain within grace period");
        }
    }
}

/// Submit queued entries one at a time until shutdown, then flush the rest.
async fn drain_queue<F>(
    downstream: &'static str,
    mut rx: EntryRx,
    shutdown: CancellationToken,
    submit: F,
) where
    F: Fn(Arc<MessageLogEntry>) -> Submission,
{
    loop {
        tokio::select! {
            biased;
            entry = rx.recv() => {
                let Some(entry) = entry else { return };
                submit_one(downstream, &submit, entry).await;
            }
            _ = shutdown.cancelled() => break,
        }
    }

    rx.close();
    while let Some(entry) = rx.recv().await {
        submit_one(downstream, &submit, entry).await;
    }
    debug!(downstream, "relay worker stopped");
}

async fn submit_one<F>(downstream: &'static str, submit: &F, entry: Arc<MessageLogEntry>)
where
    F: Fn(Arc<MessageLogEntry>) -> Submission,
{
    let from_user_id = entry.from_user_id;
    if let Err(e) = submit(entry).await {
        warn!(downstream, from_user_id, err = %format!("{e:#}"), "relay: submission failed");
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
