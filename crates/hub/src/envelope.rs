// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire envelope and the typed intent it decodes to.
//!
//! The wire shape is a flat JSON object with fixed field names:
//! `{"type", "channel", "from", "to", "message"}`. Missing and `null` fields
//! decode as empty strings and unknown fields are ignored. Undecodable bytes are a
//! transport-level failure; a decodable envelope with a bad `type` or `to`
//! is a [`Rejection`] and only that envelope is dropped.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// `to` value addressing every admin connection.
pub const ADMINS_RECIPIENT: &str = "admins";

/// Wire-level unit exchanged after the upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default, deserialize_with = "null_as_empty")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub channel: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub from: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub to: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub message: String,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Envelope {
    /// Decode one text or binary frame.
    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Target of a `direct` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    Admins,
    User(i64),
}

impl Recipient {
    pub fn parse(to: &str) -> Option<Self> {
        if to == ADMINS_RECIPIENT {
            return Some(Self::Admins);
        }
        to.parse::<i64>().ok().map(Self::User)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Admins => f.write_str(ADMINS_RECIPIENT),
            Self::User(id) => write!(f, "{id}"),
        }
    }
}

/// What a decoded envelope asks the hub to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Publish { channel: String, message: String },
    Direct { to: Recipient, message: String },
}

/// A decodable envelope the hub refuses to act on. Never fatal to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    UnknownType(String),
    BadRecipient(String),
    EmptyChannel,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType(t) => write!(f, "unknown message type: {t:?}"),
            Self::BadRecipient(to) => write!(f, "invalid recipient: {to:?}"),
            Self::EmptyChannel => f.write_str("channel is required"),
        }
    }
}

impl TryFrom<Envelope> for Intent {
    type Error = Rejection;

    fn try_from(env: Envelope) -> Result<Self, Rejection> {
        let require_channel = |channel: String| {
            if channel.is_empty() {
                Err(Rejection::EmptyChannel)
            } else {
                Ok(channel)
            }
        };
        match env.kind.as_str() {
            "subscribe" => Ok(Self::Subscribe { channel: require_channel(env.channel)? }),
            "unsubscribe" => Ok(Self::Unsubscribe { channel: require_channel(env.channel)? }),
            "publish" => Ok(Self::Publish {
                channel: require_channel(env.channel)?,
                message: env.message,
            }),
            "direct" => match Recipient::parse(&env.to) {
                Some(to) => Ok(Self::Direct { to, message: env.message }),
                None => Err(Rejection::BadRecipient(env.to)),
            },
            _ => Err(Rejection::UnknownType(env.kind)),
        }
    }
}

impl Intent {
    /// Envelope delivered to live recipients, with `from` set to the sender's
    /// authenticated user id rather than whatever the client claimed.
    pub fn outbound(&self, from_user_id: i64) -> Option<Envelope> {
        let from = from_user_id.to_string();
        match self {
            Self::Publish { channel, message } => Some(Envelope {
                kind: "publish".to_owned(),
                channel: channel.clone(),
                from,
                to: String::new(),
                message: message.clone(),
            }),
            Self::Direct { to, message } => Some(Envelope {
                kind: "direct".to_owned(),
                channel: String::new(),
                from,
                to: to.to_string(),
                message: message.clone(),
            }),
            Self::Subscribe { .. } | Self::Unsubscribe { .. } => None,
        }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
