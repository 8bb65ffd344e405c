// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the notification hub.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "notifyhub", version, about = "Real-time notification hub")]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "NOTIFYHUB_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 9810, env = "NOTIFYHUB_PORT")]
    pub port: u16,

    /// Path to the JSON identity table (`{"tokens": [...]}`).
    /// If unset, every request is rejected as unauthorized.
    #[arg(long, env = "NOTIFYHUB_TOKENS_FILE")]
    pub tokens_file: Option<PathBuf>,

    /// Path to the append-only JSONL message log. If unset, direct messages
    /// are not persisted.
    #[arg(long, env = "NOTIFYHUB_MESSAGE_LOG")]
    pub message_log: Option<PathBuf>,

    /// NATS server URL for the broker relay and notification intake.
    #[arg(long, env = "NOTIFYHUB_NATS_URL")]
    pub nats_url: Option<String>,

    /// Auth token for the NATS connection.
    #[arg(long, env = "NOTIFYHUB_NATS_TOKEN")]
    pub nats_token: Option<String>,

    /// Subject prefix for published and consumed NATS subjects.
    #[arg(long, default_value = "notifyhub", env = "NOTIFYHUB_NATS_PREFIX")]
    pub nats_prefix: String,

    /// JetStream stream that stores relayed direct messages.
    #[arg(long, default_value = "NOTIFYHUB_MESSAGES", env = "NOTIFYHUB_NATS_STREAM")]
    pub nats_stream: String,

    /// Outbound frame queue capacity per connection. Frames beyond this are
    /// dropped for that connection.
    #[arg(long, default_value_t = 256, env = "NOTIFYHUB_OUTBOUND_BUFFER")]
    pub outbound_buffer: usize,

    /// Capacity of each relay work queue (broker and message log).
    #[arg(long, default_value_t = 1024, env = "NOTIFYHUB_RELAY_QUEUE")]
    pub relay_queue: usize,

    /// Maximum simultaneous connections per user. Unlimited if unset.
    #[arg(long, env = "NOTIFYHUB_MAX_CONNECTIONS_PER_USER")]
    pub max_connections_per_user: Option<usize>,

    /// Grace period for draining sessions and relay queues on shutdown.
    #[arg(long, default_value_t = 5000, env = "NOTIFYHUB_SHUTDOWN_GRACE_MS")]
    pub shutdown_grace_ms: u64,

    /// Log filter directive.
    #[arg(long, default_value = "info", env = "NOTIFYHUB_LOG_LEVEL")]
    pub log_level: String,

    /// Log format (`text` or `json`).
    #[arg(long, default_value = "text", env = "NOTIFYHUB_LOG_FORMAT")]
    pub log_format: String,
}

impl HubConfig {
    /// Config for tests: ephemeral port, no collaborators, short grace.
    pub fn test() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 0,
            tokens_file: None,
            message_log: None,
            nats_url: None,
            nats_token: None,
            nats_prefix: "notifyhub".to_owned(),
            nats_stream: "NOTIFYHUB_MESSAGES".to_owned(),
            outbound_buffer: 64,
            relay_queue: 64,
            max_connections_per_user: None,
            shutdown_grace_ms: 500,
            log_level: "debug".to_owned(),
            log_format: "text".to_owned(),
        }
    }

    /// Reject settings that would leave the hub unable to deliver anything.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.outbound_buffer == 0 {
            anyhow::bail!("--outbound-buffer must be at least 1");
        }
        if self.relay_queue == 0 {
            anyhow::bail!("--relay-queue must be at least 1");
        }
        if self.max_connections_per_user == Some(0) {
            anyhow::bail!("--max-connections-per-user must be at least 1 when set");
        }
        match self.log_format.as_str() {
            "text" | "json" => {}
            other => anyhow::bail!("invalid --log-format: {other} (expected text or json)"),
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
