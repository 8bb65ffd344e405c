// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::envelope::Recipient;
use crate::test_support::{wait_until, RecordingBroker, RecordingLog};

use super::log::{JsonlMessageLog, LoggedMessage};
use super::{BrokerSink, MessageLog, MessageLogEntry, OutboundRelay, Relay};

#[test]
fn entry_for_admins_sets_role_only() {
    let entry = MessageLogEntry::new(42, Recipient::Admins, "help");
    assert_eq!(entry.from_user_id, 42);
    assert_eq!(entry.to_user_id, None);
    assert_eq!(entry.to_role.as_deref(), Some("admin"));
    assert_eq!(entry.message, "help");
}

#[test]
fn entry_for_user_sets_user_only() {
    let entry = MessageLogEntry::new(9, Recipient::User(42), "resolved");
    assert_eq!(entry.to_user_id, Some(42));
    assert_eq!(entry.to_role, None);
}

#[tokio::test]
async fn entry_reaches_both_downstreams() -> anyhow::Result<()> {
    let broker = Arc::new(RecordingBroker::default());
    let log = Arc::new(RecordingLog::default());
    let (relay, workers) = OutboundRelay::spawn(
        Some(broker.clone() as Arc<dyn BrokerSink>),
        Some(log.clone() as Arc<dyn MessageLog>),
        8,
        CancellationToken::new(),
    );

    relay.relay(MessageLogEntry::new(42, Recipient::Admins, "help"));
    workers.shutdown(Duration::from_secs(5)).await;

    let payloads = broker.payloads();
    assert_eq!(payloads.len(), 1);
    let sent: MessageLogEntry = serde_json::from_str(&payloads[0])?;
    assert_eq!(sent, MessageLogEntry::new(42, Recipient::Admins, "help"));
    assert_eq!(log.entries(), vec![sent]);
    assert_eq!(relay.dropped(), 0);
    Ok(())
}

#[tokio::test]
async fn failing_broker_does_not_stop_log_writes() -> anyhow::Result<()> {
    let broker = Arc::new(RecordingBroker::failing());
    let log = Arc::new(RecordingLog::default());
    let (relay, workers) = OutboundRelay::spawn(
        Some(broker.clone() as Arc<dyn BrokerSink>),
        Some(log.clone() as Arc<dyn MessageLog>),
        8,
        CancellationToken::new(),
    );

    relay.relay(MessageLogEntry::new(1, Recipient::User(2), "a"));
    relay.relay(MessageLogEntry::new(1, Recipient::User(2), "b"));
    workers.shutdown(Duration::from_secs(5)).await;

    assert_eq!(broker.attempts(), 2);
    assert!(broker.payloads().is_empty());
    let messages: Vec<_> = log.entries().into_iter().map(|e| e.message).collect();
    assert_eq!(messages, ["a", "b"]);
    Ok(())
}

#[tokio::test]
async fn stalled_broker_does_not_delay_log() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let broker = Arc::new(RecordingBroker::gated(Arc::clone(&gate)));
    let log = Arc::new(RecordingLog::default());
    let (relay, workers) = OutboundRelay::spawn(
        Some(broker.clone() as Arc<dyn BrokerSink>),
        Some(log.clone() as Arc<dyn MessageLog>),
        8,
        CancellationToken::new(),
    );

    relay.relay(MessageLogEntry::new(1, Recipient::Admins, "x"));
    wait_until(|| {
        let log = Arc::clone(&log);
        async move { log.entries().len() == 1 }
    })
    .await?;
    assert!(broker.payloads().is_empty());

    gate.notify_one();
    workers.shutdown(Duration::from_secs(5)).await;
    assert_eq!(broker.payloads().len(), 1);
    Ok(())
}

#[tokio::test]
async fn full_queue_drops_new_entry_and_counts() -> anyhow::Result<()> {
    let gate = Arc::new(Notify::new());
    let broker = Arc::new(RecordingBroker::gated(Arc::clone(&gate)));
    let (relay, workers) = OutboundRelay::spawn(
        Some(broker.clone() as Arc<dyn BrokerSink>),
        None,
        1,
        CancellationToken::new(),
    );

    // First entry is held by the worker, second fills the queue.
    relay.relay(MessageLogEntry::new(1, Recipient::Admins, "first"));
    wait_until(|| {
        let broker = Arc::clone(&broker);
        async move { broker.attempts() == 1 }
    })
    .await?;
    relay.relay(MessageLogEntry::new(1, Recipient::Admins, "second"));
    relay.relay(MessageLogEntry::new(1, Recipient::Admins, "third"));
    assert_eq!(relay.dropped(), 1);

    gate.notify_one();
    gate.notify_one();
    workers.shutdown(Duration::from_secs(5)).await;

    let messages: Vec<String> = broker
        .payloads()
        .iter()
        .map(|p| serde_json::from_str::<MessageLogEntry>(p).map(|e| e.message))
        .collect::<Result<_, _>>()?;
    assert_eq!(messages, ["first", "second"]);
    Ok(())
}

#[tokio::test]
async fn shutdown_flushes_queued_entries() -> anyhow::Result<()> {
    let log = Arc::new(RecordingLog::default());
    let (relay, workers) =
        OutboundRelay::spawn(None, Some(log.clone() as Arc<dyn MessageLog>), 16, CancellationToken::new());

    for i in 0..10 {
        relay.relay(MessageLogEntry::new(i, Recipient::Admins, format!("m{i}")));
    }
    workers.shutdown(Duration::from_secs(5)).await;

    assert_eq!(log.entries().len(), 10);
    Ok(())
}

#[tokio::test]
async fn relay_after_shutdown_is_counted_as_dropped() -> anyhow::Result<()> {
    let log = Arc::new(RecordingLog::default());
    let (relay, workers) =
        OutboundRelay::spawn(None, Some(log.clone() as Arc<dyn MessageLog>), 4, CancellationToken::new());
    workers.shutdown(Duration::from_secs(5)).await;

    relay.relay(MessageLogEntry::new(1, Recipient::User(2), "late"));
    assert_eq!(relay.dropped(), 1);
    assert!(log.entries().is_empty());
    Ok(())
}

#[tokio::test]
async fn no_downstreams_is_a_no_op() {
    let (relay, workers) = OutboundRelay::spawn(None, None, 4, CancellationToken::new());
    relay.relay(MessageLogEntry::new(1, Recipient::Admins, "x"));
    assert_eq!(relay.dropped(), 0);
    workers.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn jsonl_log_appends_one_line_per_entry() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("messages.jsonl");
    let log = JsonlMessageLog::open(&path)?;

    log.save(&MessageLogEntry::new(42, Recipient::Admins, "help")).await?;
    log.save(&MessageLogEntry::new(9, Recipient::User(42), "on it")).await?;

    let contents = std::fs::read_to_string(&path)?;
    let lines: Vec<LoggedMessage> =
        contents.lines().map(serde_json::from_str).collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].entry, MessageLogEntry::new(42, Recipient::Admins, "help"));
    assert_eq!(lines[1].entry.to_user_id, Some(42));
    assert!(lines[0].timestamp_ms > 0);
    Ok(())
}
