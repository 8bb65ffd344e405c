// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: builders, recording collaborators, and an
//! in-memory session client.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::{CancellationToken, PollSender};

use crate::config::HubConfig;
use crate::identity::{Identity, IdentityResolver, TokenEntry, TokenTable};
use crate::relay::{BrokerSink, MessageLog, MessageLogEntry, Relay};
use crate::session::{ConnectionSession, SessionEnd};
use crate::state::HubState;

/// Default wait for anything asynchronous in tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Builder for constructing `HubState` in tests with sensible defaults.
pub struct HubStateBuilder {
    config: HubConfig,
    tokens: Vec<TokenEntry>,
    relay: Option<Arc<dyn Relay>>,
    shutdown: CancellationToken,
}

impl Default for HubStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HubStateBuilder {
    pub fn new() -> Self {
        Self {
            config: HubConfig::test(),
            tokens: vec![],
            relay: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Accept `token` as the given identity.
    pub fn token(mut self, token: &str, user_id: i64, role: &str) -> Self {
        self.tokens.push(TokenEntry { token: token.to_owned(), user_id, role: role.to_owned() });
        self
    }

    pub fn relay(mut self, relay: Arc<dyn Relay>) -> Self {
        self.relay = Some(relay);
        self
    }

    pub fn outbound_buffer(mut self, capacity: usize) -> Self {
        self.config.outbound_buffer = capacity;
        self
    }

    pub fn max_connections_per_user(mut self, max: usize) -> Self {
        self.config.max_connections_per_user = Some(max);
        self
    }

    pub fn shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn build(self) -> Arc<HubState> {
        let identities: Arc<dyn IdentityResolver> = Arc::new(TokenTable::new(self.tokens));
        let relay: Arc<dyn Relay> = match self.relay {
            Some(relay) => relay,
            None => Arc::new(RecordingRelay::default()),
        };
        Arc::new(HubState::new(self.config, identities, relay, self.shutdown))
    }
}

/// Relay that records every entry it is handed.
#[derive(Debug, Default)]
pub struct RecordingRelay {
    entries: Mutex<Vec<MessageLogEntry>>,
}

impl RecordingRelay {
    pub fn entries(&self) -> Vec<MessageLogEntry> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Relay for RecordingRelay {
    fn relay(&self, entry: MessageLogEntry) {
        lock(&self.entries).push(entry);
    }
}

/// Broker that records payloads, optionally failing or waiting on a gate.
#[derive(Debug, Default)]
pub struct RecordingBroker {
    payloads: Mutex<Vec<String>>,
    attempts: AtomicUsize,
    fail: bool,
    gate: Option<Arc<Notify>>,
}

impl RecordingBroker {
    /// A broker whose every publish fails.
    pub fn failing() -> Self {
        Self { fail: true, ..Self::default() }
    }

    /// A broker that waits for one `notify_one` per publish.
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self { gate: Some(gate), ..Self::default() }
    }

    pub fn payloads(&self) -> Vec<String> {
        lock(&self.payloads).clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl BrokerSink for RecordingBroker {
    fn send_message(&self, payload: String) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            if self.fail {
                anyhow::bail!("broker unavailable");
            }
            lock(&self.payloads).push(payload);
            Ok(())
        })
    }
}

/// Message log that keeps entries in memory.
#[derive(Debug, Default)]
pub struct RecordingLog {
    entries: Mutex<Vec<MessageLogEntry>>,
}

impl RecordingLog {
    pub fn entries(&self) -> Vec<MessageLogEntry> {
        lock(&self.entries).clone()
    }
}

impl MessageLog for RecordingLog {
    fn save<'a>(&'a self, entry: &'a MessageLogEntry) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            lock(&self.entries).push(entry.clone());
            Ok(())
        })
    }
}

/// Poll `check` until it returns true or [`TEST_TIMEOUT`] elapses.
pub async fn wait_until<F, Fut>(mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !check().await {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("condition not met within {TEST_TIMEOUT:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

/// In-memory peer for a [`ConnectionSession`], without a real socket.
pub struct SessionClient {
    inbound: Option<mpsc::Sender<Result<Message, axum::Error>>>,
    outbound: mpsc::Receiver<Message>,
    handle: JoinHandle<SessionEnd>,
}

impl SessionClient {
    /// Start a session for `identity` without waiting for registration.
    pub fn spawn(state: &Arc<HubState>, identity: Identity) -> Self {
        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, out_rx) = mpsc::channel(64);
        let session = ConnectionSession::new(Arc::clone(state), identity);
        let handle =
            tokio::spawn(session.run(ReceiverStream::new(in_rx), PollSender::new(out_tx)));
        Self { inbound: Some(in_tx), outbound: out_rx, handle }
    }

    /// Start a session and wait until it is registered.
    pub async fn connect(state: &Arc<HubState>, user_id: i64, role: &str) -> anyhow::Result<Self> {
        let before = state.registry.connections_for(user_id).await;
        let client = Self::spawn(state, Identity::new(user_id, role));
        wait_until(|| {
            let state = Arc::clone(state);
            async move { state.registry.connections_for(user_id).await > before }
        })
        .await?;
        Ok(client)
    }

    pub async fn send(&self, msg: Message) -> anyhow::Result<()> {
        let tx = self.inbound.as_ref().ok_or_else(|| anyhow::anyhow!("client hung up"))?;
        tx.send(Ok(msg)).await.map_err(|_| anyhow::anyhow!("session stopped reading"))
    }

    pub async fn send_json(&self, value: &serde_json::Value) -> anyhow::Result<()> {
        self.send(Message::Text(serde_json::to_string(value)?.into())).await
    }

    /// Inject a transport read error.
    pub async fn send_error(&self) -> anyhow::Result<()> {
        let tx = self.inbound.as_ref().ok_or_else(|| anyhow::anyhow!("client hung up"))?;
        let err = axum::Error::new(std::io::Error::other("connection reset"));
        tx.send(Err(err)).await.map_err(|_| anyhow::anyhow!("session stopped reading"))
    }

    /// Next outbound message, or an error on timeout.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        tokio::time::timeout(TEST_TIMEOUT, self.outbound.recv())
            .await
            .map_err(|_| anyhow::anyhow!("recv timeout"))?
            .ok_or_else(|| anyhow::anyhow!("outbound closed"))
    }

    pub async fn recv_json(&mut self) -> anyhow::Result<serde_json::Value> {
        match self.recv().await? {
            Message::Text(text) => Ok(serde_json::from_str(text.as_str())?),
            other => anyhow::bail!("expected Text message, got {other:?}"),
        }
    }

    /// Assert nothing arrives within `within`.
    pub async fn expect_silence(&mut self, within: Duration) -> anyhow::Result<()> {
        match tokio::time::timeout(within, self.outbound.recv()).await {
            Err(_) => Ok(()),
            Ok(Some(msg)) => anyhow::bail!("unexpected message: {msg:?}"),
            Ok(None) => anyhow::bail!("outbound closed"),
        }
    }

    /// Drop the inbound stream so the session sees end-of-stream.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Wait for the session task to finish.
    pub async fn finished(self) -> anyhow::Result<SessionEnd> {
        let end = tokio::time::timeout(TEST_TIMEOUT, self.handle)
            .await
            .map_err(|_| anyhow::anyhow!("session did not finish"))??;
        Ok(end)
    }

    /// Send a close frame and wait for the session to finish.
    pub async fn close(self) -> anyhow::Result<SessionEnd> {
        self.send(Message::Close(None)).await?;
        self.finished().await
    }
}

/// Spawn an HTTP server on a random port for integration testing.
///
/// Returns the bound address and a join handle for the server task.
pub async fn spawn_http_server(
    state: Arc<HubState>,
) -> anyhow::Result<(std::net::SocketAddr, JoinHandle<()>)> {
    let router = crate::transport::build_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((addr, handle))
}

/// Assert that a `Result` is `Err` and its display string contains `substr`.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = format!("{err:#}");
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
