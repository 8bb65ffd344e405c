// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live connection handles shared between the registry and channel tables.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::DeliveryError;
use crate::identity::Identity;

/// Process-unique connection identifier. Tables compare connections by this,
/// never by `(user_id, role)`, since one user may hold many connections.
pub type ConnectionId = u64;

/// A serialized outbound text frame. Fan-out serializes once and every
/// recipient shares the same bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Arc<str>);

impl Frame {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        Ok(Self(serde_json::to_string(value)?.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Frame {
    fn from(text: &str) -> Self {
        Self(text.into())
    }
}

/// One live duplex connection bound to one identity for its lifetime.
///
/// The handle owns the sending side of the connection's outbound queue; the
/// session's writer task owns the receiving side and the transport sink.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    identity: Identity,
    tx: mpsc::Sender<Frame>,
}

impl Connection {
    /// Create a handle with an outbound queue of `capacity` frames.
    pub fn new(
        id: ConnectionId,
        identity: Identity,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Arc::new(Self { id, identity, tx }), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> i64 {
        self.identity.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.identity.is_admin()
    }

    /// Queue a frame without waiting. A full queue drops the frame for this
    /// connection only.
    pub fn deliver(&self, frame: &Frame) -> Result<(), DeliveryError> {
        self.tx.try_send(frame.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Deliver `frame` to every connection in `targets`, isolating failures.
///
/// Returns the number of connections the frame was queued for.
pub(crate) fn fan_out<'a>(
    targets: impl IntoIterator<Item = &'a Arc<Connection>>,
    frame: &Frame,
    context: &str,
) -> usize {
    let mut delivered = 0;
    for conn in targets {
        match conn.deliver(frame) {
            Ok(()) => delivered += 1,
            Err(e) => {
                tracing::warn!(
                    conn_id = conn.id(),
                    user_id = conn.user_id(),
                    err = %e,
                    "{context}: delivery failed"
                );
            }
        }
    }
    delivered
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
