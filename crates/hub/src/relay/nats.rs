// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JetStream broker sink for relayed direct messages.
//!
//! Publishes each entry to `{prefix}.messages.direct` and waits for the
//! server's publish acknowledgement, so an `Ok` means the message is stored
//! in the stream.

use futures_util::future::BoxFuture;
use tracing::{info, warn};

use super::BrokerSink;

/// Connection settings shared by the broker sink and notification intake.
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URL (e.g. "nats://127.0.0.1:4222").
    pub url: String,
    /// Auth token for NATS connection.
    pub token: Option<String>,
    /// Subject prefix (default: "notifyhub").
    pub prefix: String,
    /// JetStream stream name for relayed messages.
    pub stream: String,
}

/// Connect to the NATS server.
pub async fn connect(config: &NatsConfig) -> anyhow::Result<async_nats::Client> {
    let mut opts = async_nats::ConnectOptions::new();
    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }
    opts = opts.retry_on_initial_connect();

    info!(url = %config.url, prefix = %config.prefix, "connecting to NATS");
    let client = opts.connect(&config.url).await?;
    info!("NATS connected");
    Ok(client)
}

/// Subject that relayed direct messages are published to.
pub fn direct_subject(prefix: &str) -> String {
    format!("{prefix}.messages.direct")
}

/// Publishes relay payloads to a JetStream stream.
pub struct NatsBroker {
    jetstream: async_nats::jetstream::Context,
    subject: String,
}

impl NatsBroker {
    /// Wrap a connected client, creating the stream if it does not exist.
    ///
    /// A failure to provision the stream is logged rather than returned:
    /// publishes will fail and be logged individually until it exists.
    pub async fn new(client: async_nats::Client, config: &NatsConfig) -> Self {
        let jetstream = async_nats::jetstream::new(client);
        let subject = direct_subject(&config.prefix);

        let stream_config = async_nats::jetstream::stream::Config {
            name: config.stream.clone(),
            subjects: vec![subject.clone()],
            ..Default::default()
        };
        match jetstream.get_or_create_stream(stream_config).await {
            Ok(_) => info!(stream = %config.stream, %subject, "JetStream stream ready"),
            Err(e) => warn!(stream = %config.stream, err = %e, "JetStream stream unavailable"),
        }

        Self { jetstream, subject }
    }

    async fn publish(&self, payload: String) -> anyhow::Result<()> {
        let ack = self.jetstream.publish(self.subject.clone(), payload.into()).await?;
        ack.await?;
        Ok(())
    }
}

impl BrokerSink for NatsBroker {
    fn send_message(&self, payload: String) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(self.publish(payload))
    }
}
