// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn intent(json: &str) -> Result<Intent, Rejection> {
    match Envelope::decode(json.as_bytes()) {
        Ok(env) => Intent::try_from(env),
        Err(e) => Err(Rejection::UnknownType(format!("decode failed: {e}"))),
    }
}

#[test]
fn missing_fields_default_to_empty() -> anyhow::Result<()> {
    let env = Envelope::decode(br#"{"type":"direct"}"#)?;
    assert_eq!(env.kind, "direct");
    assert_eq!(env.to, "");
    assert_eq!(env.message, "");
    Ok(())
}

#[test]
fn null_fields_decode_as_empty() -> anyhow::Result<()> {
    let env = Envelope::decode(
        br#"{"type":"subscribe","channel":"room1","from":null,"to":null,"message":null}"#,
    )?;
    assert_eq!(env.kind, "subscribe");
    assert_eq!(env.channel, "room1");
    assert_eq!(env.from, "");
    assert_eq!(env.to, "");
    assert_eq!(env.message, "");
    assert_eq!(Intent::try_from(env), Ok(Intent::Subscribe { channel: "room1".into() }));
    Ok(())
}

#[test]
fn unknown_fields_are_ignored() -> anyhow::Result<()> {
    let env = Envelope::decode(
        br#"{"type":"publish","channel":"room1","message":"hi","priority":3,"meta":{"a":1}}"#,
    )?;
    assert_eq!(env.channel, "room1");
    assert_eq!(env.message, "hi");
    Ok(())
}

#[yare::parameterized(
    not_json = { b"hello" as &[u8] },
    truncated = { br#"{"type":"subscribe""# },
    wrong_field_type = { br#"{"type":"publish","message":42}"# },
    array = { b"[1,2,3]" },
)]
fn undecodable_bytes_fail(bytes: &[u8]) {
    assert!(Envelope::decode(bytes).is_err());
}

#[test]
fn decodes_each_intent() {
    assert_eq!(
        intent(r#"{"type":"subscribe","channel":"room1"}"#),
        Ok(Intent::Subscribe { channel: "room1".into() })
    );
    assert_eq!(
        intent(r#"{"type":"unsubscribe","channel":"room1"}"#),
        Ok(Intent::Unsubscribe { channel: "room1".into() })
    );
    assert_eq!(
        intent(r#"{"type":"publish","channel":"room1","message":"hi"}"#),
        Ok(Intent::Publish { channel: "room1".into(), message: "hi".into() })
    );
    assert_eq!(
        intent(r#"{"type":"direct","to":"admins","message":"help"}"#),
        Ok(Intent::Direct { to: Recipient::Admins, message: "help".into() })
    );
    assert_eq!(
        intent(r#"{"type":"direct","to":"42","message":"yo"}"#),
        Ok(Intent::Direct { to: Recipient::User(42), message: "yo".into() })
    );
}

#[yare::parameterized(
    word = { "bob" },
    empty = { "" },
    admin_singular = { "admin" },
    float = { "4.2" },
    overflow = { "99999999999999999999" },
)]
fn bad_recipient_is_rejected(to: &str) {
    let env = Envelope { kind: "direct".into(), to: to.into(), ..Default::default() };
    assert_eq!(Intent::try_from(env), Err(Rejection::BadRecipient(to.into())));
}

#[test]
fn unknown_type_is_rejected() {
    assert_eq!(
        intent(r#"{"type":"shout","message":"x"}"#),
        Err(Rejection::UnknownType("shout".into()))
    );
    assert_eq!(intent(r#"{"message":"x"}"#), Err(Rejection::UnknownType(String::new())));
}

#[yare::parameterized(
    subscribe = { "subscribe" },
    unsubscribe = { "unsubscribe" },
    publish = { "publish" },
)]
fn channel_required(kind: &str) {
    let env = Envelope { kind: kind.into(), ..Default::default() };
    assert_eq!(Intent::try_from(env), Err(Rejection::EmptyChannel));
}

#[test]
fn outbound_stamps_authenticated_sender() -> anyhow::Result<()> {
    let publish = Intent::Publish { channel: "room1".into(), message: "hi".into() };
    let env = publish.outbound(7).ok_or_else(|| anyhow::anyhow!("publish has an outbound"))?;
    let json = serde_json::to_value(&env)?;
    assert_eq!(json["type"], "publish");
    assert_eq!(json["channel"], "room1");
    assert_eq!(json["from"], "7");
    assert_eq!(json["message"], "hi");

    let direct = Intent::Direct { to: Recipient::Admins, message: "help".into() };
    let env = direct.outbound(7).ok_or_else(|| anyhow::anyhow!("direct has an outbound"))?;
    assert_eq!(env.to, "admins");
    assert_eq!(env.from, "7");

    assert!(Intent::Subscribe { channel: "x".into() }.outbound(7).is_none());
    Ok(())
}
