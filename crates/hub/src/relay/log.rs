// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed append-only message log.
//!
//! Each direct message is appended as one JSONL line. The hub never reads
//! the file back; downstream tooling owns it.

use std::path::{Path, PathBuf};

use anyhow::Context;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::{MessageLog, MessageLogEntry};

/// One persisted line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedMessage {
    #[serde(flatten)]
    pub entry: MessageLogEntry,
    pub timestamp_ms: u64,
}

/// Appends [`LoggedMessage`] lines to a single file.
#[derive(Debug)]
pub struct JsonlMessageLog {
    path: PathBuf,
}

impl JsonlMessageLog {
    /// Open (creating if needed) the log file and its parent directory.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating message log dir {}", dir.display()))?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening message log {}", path.display()))?;
        Ok(Self { path: path.to_owned() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &MessageLogEntry) -> anyhow::Result<()> {
        let record = LoggedMessage { entry: entry.clone(), timestamp_ms: epoch_ms() };
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening message log {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl MessageLog for JsonlMessageLog {
    fn save<'a>(&'a self, entry: &'a MessageLogEntry) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(self.append(entry))
    }
}

/// Return current epoch millis.
fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
