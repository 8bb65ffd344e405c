// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection lifecycle: register, read loop, cleanup.
//!
//! The session owns the inbound half of the transport. Outbound frames flow
//! through the connection's bounded queue to a dedicated writer task that
//! owns the outbound half, so a broadcast never waits on a slow socket.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::connection::{Connection, Frame};
use crate::envelope::Envelope;
use crate::error::HubError;
use crate::identity::Identity;
use crate::state::HubState;

/// How long cleanup waits for the writer to flush its close frame.
const WRITER_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// RFC 6455 "try again later" close code.
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer sent a close frame or the stream ended.
    PeerClosed,
    /// Transport read error.
    ReadError,
    /// A frame could not be decoded as an envelope.
    DecodeError,
    /// The hub is shutting down.
    Shutdown,
    /// Registration was refused; the session never became active.
    Refused(HubError),
}

/// One upgraded connection, from registration until cleanup.
pub struct ConnectionSession {
    state: Arc<HubState>,
    conn: Arc<Connection>,
    outbound: mpsc::Receiver<Frame>,
}

impl ConnectionSession {
    pub fn new(state: Arc<HubState>, identity: Identity) -> Self {
        let id = state.next_connection_id();
        let (conn, outbound) = Connection::new(id, identity, state.config.outbound_buffer);
        Self { state, conn, outbound }
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Drive the session until the peer leaves, the transport fails, a frame
    /// is undecodable, or the hub shuts down.
    ///
    /// Envelopes are processed strictly in arrival order. On every exit path
    /// the connection is removed from all channels and from the registry.
    pub async fn run<R, E, W>(self, mut inbound: R, mut sink: W) -> SessionEnd
    where
        R: Stream<Item = Result<Message, E>> + Unpin + Send,
        E: Display + Send,
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: Display,
    {
        let Self { state, conn, outbound } = self;

        if let Err(e) = state.registry.register(Arc::clone(&conn)).await {
            warn!(conn_id = conn.id(), user_id = conn.user_id(), err = %e, "registration refused");
            let close = CloseFrame { code: CLOSE_TRY_AGAIN_LATER, reason: e.as_str().into() };
            let _ = sink.send(Message::Close(Some(close))).await;
            return SessionEnd::Refused(e);
        }
        info!(
            conn_id = conn.id(),
            user_id = conn.user_id(),
            role = %conn.identity().role,
            "session opened"
        );

        let mut writer = tokio::spawn(write_frames(conn.id(), outbound, sink));
        let dispatcher = state.dispatcher();

        let end = loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break SessionEnd::Shutdown,
                msg = inbound.next() => {
                    let envelope = match msg {
                        Some(Ok(Message::Text(text))) => Envelope::decode(text.as_str().as_bytes()),
                        Some(Ok(Message::Binary(data))) => Envelope::decode(&data),
                        Some(Ok(Message::Close(_))) | None => break SessionEnd::PeerClosed,
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            debug!(conn_id = conn.id(), err = %e, "read failed");
                            break SessionEnd::ReadError;
                        }
                    };
                    match envelope {
                        Ok(envelope) => {
                            dispatcher.dispatch(&conn, envelope).await;
                        }
                        Err(e) => {
                            warn!(conn_id = conn.id(), user_id = conn.user_id(), err = %e, "undecodable frame");
                            break SessionEnd::DecodeError;
                        }
                    }
                }
            }
        };

        let channels = state.channels.unsubscribe_all(&conn).await;
        let registered = state.registry.unregister(&conn).await;
        info!(
            conn_id = conn.id(),
            user_id = conn.user_id(),
            channels,
            registered,
            reason = ?end,
            "session closed"
        );

        // The last sender lives in `conn`; dropping it ends the writer.
        drop(conn);
        if tokio::time::timeout(WRITER_CLOSE_TIMEOUT, &mut writer).await.is_err() {
            debug!("writer did not finish before timeout");
            writer.abort();
        }
        end
    }
}

/// Forward queued frames to the transport until the queue closes or a
/// write fails, then send a close frame.
async fn write_frames<W>(conn_id: u64, mut rx: mpsc::Receiver<Frame>, mut sink: W)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(Message::Text(frame.as_str().into())).await {
            debug!(conn_id, err = %e, "write failed");
            return;
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
