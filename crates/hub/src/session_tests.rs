// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::HubError;
use crate::identity::Identity;
use crate::test_support::{wait_until, HubStateBuilder, RecordingRelay, SessionClient};

use super::SessionEnd;

const SILENCE: Duration = Duration::from_millis(150);

#[tokio::test]
async fn peer_close_cleans_up_registry_and_channels() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().build();
    let client = SessionClient::connect(&state, 42, "user").await?;

    client.send_json(&json!({"type": "subscribe", "channel": "room1"})).await?;
    client.send_json(&json!({"type": "subscribe", "channel": "room2"})).await?;
    let s = Arc::clone(&state);
    wait_until(|| {
        let s = Arc::clone(&s);
        async move { s.channels.channel_count().await == 2 }
    })
    .await?;

    assert_eq!(client.close().await?, SessionEnd::PeerClosed);
    assert_eq!(state.registry.connection_count().await, 0);
    assert_eq!(state.channels.channel_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn end_of_stream_is_peer_closed() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().build();
    let mut client = SessionClient::connect(&state, 1, "user").await?;

    client.hang_up();

    assert_eq!(client.finished().await?, SessionEnd::PeerClosed);
    assert_eq!(state.registry.connection_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn read_error_ends_session_with_cleanup() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().build();
    let client = SessionClient::connect(&state, 1, "user").await?;
    client.send_json(&json!({"type": "subscribe", "channel": "room1"})).await?;

    client.send_error().await?;

    assert_eq!(client.finished().await?, SessionEnd::ReadError);
    assert_eq!(state.registry.connection_count().await, 0);
    assert_eq!(state.channels.channel_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn undecodable_frame_ends_session() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().build();
    let client = SessionClient::connect(&state, 1, "user").await?;

    client.send(Message::Text("not json".into())).await?;

    assert_eq!(client.finished().await?, SessionEnd::DecodeError);
    assert_eq!(state.registry.connection_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn null_fields_do_not_end_session() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().build();
    let mut client = SessionClient::connect(&state, 1, "user").await?;

    client.send_json(&json!({"type": "subscribe", "channel": "room1", "to": null})).await?;
    let s = Arc::clone(&state);
    wait_until(|| {
        let s = Arc::clone(&s);
        async move { s.channels.subscriber_count("room1").await == 1 }
    })
    .await?;
    client
        .send_json(&json!({"type": "publish", "channel": "room1", "from": null, "message": "hi"}))
        .await?;

    let got = client.recv_json().await?;
    assert_eq!(got["message"], "hi");
    assert_eq!(got["from"], "1");
    assert_eq!(state.registry.connections_for(1).await, 1);
    assert_eq!(client.close().await?, SessionEnd::PeerClosed);
    Ok(())
}

#[tokio::test]
async fn binary_frames_are_decoded_as_json() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().build();
    let client = SessionClient::connect(&state, 1, "user").await?;

    let body = serde_json::to_vec(&json!({"type": "subscribe", "channel": "room1"}))?;
    client.send(Message::Binary(body.into())).await?;

    let s = Arc::clone(&state);
    wait_until(|| {
        let s = Arc::clone(&s);
        async move { s.channels.subscriber_count("room1").await == 1 }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn rejected_envelope_keeps_session_alive() -> anyhow::Result<()> {
    let relay = Arc::new(RecordingRelay::default());
    let state = HubStateBuilder::new().relay(relay.clone()).build();
    let sender = SessionClient::connect(&state, 42, "user").await?;
    let mut admin = SessionClient::connect(&state, 1, "admin").await?;

    sender.send_json(&json!({"type": "direct", "to": "bob", "message": "x"})).await?;
    sender.send_json(&json!({"type": "direct", "to": "admins", "message": "help"})).await?;

    let got = admin.recv_json().await?;
    assert_eq!(got["message"], "help");
    assert_eq!(got["from"], "42");
    admin.expect_silence(SILENCE).await?;
    // Only the valid direct was relayed.
    wait_until(|| {
        let relay = Arc::clone(&relay);
        async move { relay.len() == 1 }
    })
    .await?;
    assert_eq!(relay.entries()[0].message, "help");
    Ok(())
}

#[tokio::test]
async fn envelopes_are_processed_in_arrival_order() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().build();
    let mut listener = SessionClient::connect(&state, 1, "user").await?;
    let sender = SessionClient::connect(&state, 2, "user").await?;

    listener.send_json(&json!({"type": "subscribe", "channel": "room1"})).await?;
    let s = Arc::clone(&state);
    wait_until(|| {
        let s = Arc::clone(&s);
        async move { s.channels.subscriber_count("room1").await == 1 }
    })
    .await?;

    for i in 0..20 {
        sender.send_json(&json!({"type": "publish", "channel": "room1", "message": format!("m{i}")})).await?;
    }
    for i in 0..20 {
        let got = listener.recv_json().await?;
        assert_eq!(got["message"], format!("m{i}"));
    }
    Ok(())
}

#[tokio::test]
async fn ping_frames_are_ignored() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().build();
    let mut client = SessionClient::connect(&state, 1, "user").await?;

    client.send(Message::Ping(vec![1, 2, 3].into())).await?;
    client.expect_silence(SILENCE).await?;
    assert_eq!(state.registry.connection_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn shutdown_ends_every_session() -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let state = HubStateBuilder::new().shutdown(shutdown.clone()).build();
    let a = SessionClient::connect(&state, 1, "user").await?;
    let mut b = SessionClient::connect(&state, 2, "admin").await?;

    shutdown.cancel();

    assert_eq!(a.finished().await?, SessionEnd::Shutdown);
    assert!(matches!(b.recv().await?, Message::Close(_)));
    assert_eq!(b.finished().await?, SessionEnd::Shutdown);
    assert!(state.drain(Duration::from_secs(1)).await);
    Ok(())
}

#[tokio::test]
async fn per_user_limit_refuses_extra_connection() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().max_connections_per_user(1).build();
    let _first = SessionClient::connect(&state, 7, "user").await?;

    let mut second = SessionClient::spawn(&state, Identity::new(7, "user"));
    let close = second.recv().await?;

    assert!(matches!(close, Message::Close(Some(ref frame)) if frame.reason.as_str() == "TOO_MANY_CONNECTIONS"));
    assert_eq!(second.finished().await?, SessionEnd::Refused(HubError::TooManyConnections));
    assert_eq!(state.registry.connections_for(7).await, 1);
    Ok(())
}

#[tokio::test]
async fn slow_reader_drops_frames_without_blocking_sender() -> anyhow::Result<()> {
    let state = HubStateBuilder::new().outbound_buffer(1).build();
    let _slow = SessionClient::connect(&state, 1, "admin").await?;
    let mut sender = SessionClient::connect(&state, 2, "user").await?;
    sender.send_json(&json!({"type": "subscribe", "channel": "echo"})).await?;

    // The slow admin never reads; its queues fill and further frames drop.
    for i in 0..200 {
        sender.send_json(&json!({"type": "direct", "to": "admins", "message": format!("m{i}")})).await?;
    }
    sender.send_json(&json!({"type": "publish", "channel": "echo", "message": "done"})).await?;

    let got = sender.recv_json().await?;
    assert_eq!(got["message"], "done");
    Ok(())
}
