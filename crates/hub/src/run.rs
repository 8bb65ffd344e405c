// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process lifecycle: wire collaborators, serve, drain on shutdown.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::HubConfig;
use crate::identity::{IdentityResolver, TokenTable};
use crate::notify::{spawn_notification_intake, Notifier};
use crate::relay::log::JsonlMessageLog;
use crate::relay::nats::{NatsBroker, NatsConfig};
use crate::relay::{BrokerSink, MessageLog, OutboundRelay};
use crate::state::HubState;
use crate::transport::build_router;

/// Initialize tracing subscriber based on config.
pub fn init_tracing(config: &HubConfig) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Run the hub until SIGINT/SIGTERM, then drain sessions and relay queues.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let identities: Arc<dyn IdentityResolver> = match config.tokens_file {
        Some(ref path) => {
            let table = TokenTable::load(path)?;
            info!(tokens = table.len(), path = %path.display(), "identity table loaded");
            Arc::new(table)
        }
        None => {
            warn!("no --tokens-file configured; every connection will be rejected");
            Arc::new(TokenTable::default())
        }
    };

    let nats = match config.nats_url {
        Some(ref url) => {
            let nats_config = NatsConfig {
                url: url.clone(),
                token: config.nats_token.clone(),
                prefix: config.nats_prefix.clone(),
                stream: config.nats_stream.clone(),
            };
            let client = crate::relay::nats::connect(&nats_config).await?;
            Some((client, nats_config))
        }
        None => None,
    };

    let broker: Option<Arc<dyn BrokerSink>> = match nats {
        Some((ref client, ref nats_config)) => {
            Some(Arc::new(NatsBroker::new(client.clone(), nats_config).await))
        }
        None => None,
    };
    let log: Option<Arc<dyn MessageLog>> = match config.message_log {
        Some(ref path) => {
            let log = JsonlMessageLog::open(path)?;
            info!(path = %log.path().display(), "message log opened");
            Some(Arc::new(log))
        }
        None => None,
    };

    // Relay workers outlive the sessions so late direct messages still drain.
    let relay_shutdown = CancellationToken::new();
    let (relay, workers) =
        OutboundRelay::spawn(broker, log, config.relay_queue, relay_shutdown);

    let grace = config.shutdown_grace();
    let addr = config.bind_addr();
    let state = Arc::new(HubState::new(config, identities, relay, shutdown.clone()));

    let intake = nats.map(|(client, nats_config)| {
        let notifier: Arc<dyn Notifier> = state.registry.clone();
        spawn_notification_intake(client, nats_config.prefix, notifier, shutdown.clone())
    });

    let listener = TcpListener::bind(&addr).await?;
    info!("notifyhub listening on {}", listener.local_addr()?);

    let router = build_router(Arc::clone(&state));
    axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned()).await?;

    info!("shutting down");
    if !state.drain(grace).await {
        warn!(
            remaining = state.registry.connection_count().await,
            "sessions still open after grace period"
        );
    }
    workers.shutdown(grace).await;
    if let Some(handle) = intake {
        let _ = handle.await;
    }
    info!("notifyhub stopped");
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
