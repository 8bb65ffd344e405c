// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authenticated identities and the token table that resolves them.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Role string that receives `direct` messages addressed to `admins`.
pub const ADMIN_ROLE: &str = "admin";

/// A verified `(user_id, role)` pair handed to the hub by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: i64,
    pub role: String,
}

impl Identity {
    pub fn new(user_id: i64, role: impl Into<String>) -> Self {
        Self { user_id, role: role.into() }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Maps a bearer token to an identity. The JWT layer of the wider backend
/// plugs in here; `TokenTable` is the file-backed stand-in.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Identity>;
}

/// One row of the identity table file.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: i64,
    pub role: String,
}

/// Identity table file layout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenFile {
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

/// Static token → identity table.
#[derive(Debug, Default)]
pub struct TokenTable {
    entries: Vec<TokenEntry>,
}

impl TokenTable {
    pub fn new(entries: Vec<TokenEntry>) -> Self {
        Self { entries }
    }

    /// Load the table from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading tokens file {}", path.display()))?;
        let file: TokenFile = serde_json::from_str(&contents)
            .with_context(|| format!("parsing tokens file {}", path.display()))?;
        Ok(Self::new(file.tokens))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IdentityResolver for TokenTable {
    fn resolve(&self, token: &str) -> Option<Identity> {
        // Scan every entry so lookup time does not depend on the match position.
        let mut found = None;
        for entry in &self.entries {
            if constant_time_eq(&entry.token, token) && found.is_none() {
                found = Some(Identity::new(entry.user_id, entry.role.clone()));
            }
        }
        found
    }
}

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
