//! JSONL replay client.
//!
//! Serves recorded channel dumps from a directory of JSONL files (one file
//! per channel, one [`ChannelMessage`] per line). The file stem is the
//! channel reference. History pages are served newest-first; the live
//! subscription replays messages in publication order.
//!
//! This is the client the shipped binary runs against for local and replay
//! runs; the production platform client is wired in by the embedder.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;

use chronicle_core::ChannelMessage;

use super::{Channel, ChannelClient, MessageStats};
use crate::error::{Error, Result};

/// One loaded channel dump.
#[derive(Debug)]
struct ReplayChannel {
    /// File stem the dump was loaded from.
    reference: String,
    meta: Channel,
    /// Messages sorted ascending by message id.
    messages: Vec<ChannelMessage>,
}

/// Replay client over a directory of JSONL channel dumps.
#[derive(Debug)]
pub struct ReplayClient {
    channels: Vec<ReplayChannel>,
}

impl ReplayClient {
    /// Load all channel dumps from a directory.
    ///
    /// Files with other extensions are ignored; malformed lines are logged
    /// and skipped.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "replay directory does not exist: {}",
                dir.display()
            )));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension()
                        .is_some_and(|ext| ext == "jsonl" || ext == "json" || ext == "ndjson")
            })
            .collect();

        // Sort for deterministic load order
        files.sort();

        let mut channels = Vec::new();
        for path in files {
            let reference = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();

            let contents = std::fs::read_to_string(&path)?;
            let mut messages = Vec::new();
            let mut parse_errors = 0usize;

            for (line_num, line) in contents.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ChannelMessage>(line) {
                    Ok(msg) => messages.push(msg),
                    Err(e) => {
                        parse_errors += 1;
                        tracing::warn!(
                            "{}:{}: skipping malformed line: {}",
                            path.display(),
                            line_num + 1,
                            e
                        );
                    }
                }
            }

            if messages.is_empty() {
                tracing::warn!("Dump {} contains no messages; skipping", path.display());
                continue;
            }

            messages.sort_by_key(|m| m.message_id);

            let first = &messages[0];
            let meta = Channel {
                id: first.channel_id,
                title: first.channel_name.clone(),
                handle: first.channel_handle.clone(),
            };

            tracing::info!(
                "Loaded dump «{}»: {} messages ({} parse errors)",
                reference,
                messages.len(),
                parse_errors
            );

            channels.push(ReplayChannel {
                reference,
                meta,
                messages,
            });
        }

        Ok(Self { channels })
    }

    /// Channel references of all loaded dumps (the file stems).
    pub fn references(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.reference.clone()).collect()
    }

    fn by_id(&self, channel_id: i64) -> Option<&ReplayChannel> {
        self.channels.iter().find(|c| c.meta.id == channel_id)
    }
}

#[async_trait]
impl ChannelClient for ReplayClient {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn resolve_channel(&self, reference: &str) -> Result<Channel> {
        self.channels
            .iter()
            .find(|c| {
                c.reference == reference
                    || c.meta.handle.as_deref() == Some(reference)
                    || c.meta.id.to_string() == reference
            })
            .map(|c| c.meta.clone())
            .ok_or_else(|| Error::ChannelResolution {
                reference: reference.to_string(),
                reason: "no dump for this channel".to_string(),
            })
    }

    async fn subscribe(&self, channel_ids: &[i64]) -> Result<mpsc::Receiver<ChannelMessage>> {
        // Interleave the subscribed dumps in publication order, the way the
        // live feed would have delivered them.
        let wanted: HashSet<i64> = channel_ids.iter().copied().collect();
        let mut feed: Vec<ChannelMessage> = self
            .channels
            .iter()
            .filter(|c| wanted.contains(&c.meta.id))
            .flat_map(|c| c.messages.iter().cloned())
            .collect();
        feed.sort_by_key(|m| (m.date, m.message_id));

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for message in feed {
                if tx.send(message).await.is_err() {
                    // Receiver dropped - subscription ended
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn history_page(
        &self,
        channel_id: i64,
        before_message_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<ChannelMessage>> {
        let Some(channel) = self.by_id(channel_id) else {
            return Err(Error::Client(format!("unknown channel id {}", channel_id)));
        };

        // `rev()` over the ascending list yields newest-first
        let page: Vec<ChannelMessage> = channel
            .messages
            .iter()
            .rev()
            .filter(|m| before_message_id.is_none_or(|before| m.message_id < before))
            .take(limit)
            .cloned()
            .collect();

        Ok(page)
    }

    async fn message_stats(
        &self,
        channel_id: i64,
        message_id: i64,
    ) -> Result<Option<MessageStats>> {
        let Some(channel) = self.by_id(channel_id) else {
            return Err(Error::Client(format!("unknown channel id {}", channel_id)));
        };

        Ok(channel
            .messages
            .iter()
            .find(|m| m.message_id == message_id)
            .map(|m| MessageStats {
                views: m.views.unwrap_or(0),
                reactions_count: m
                    .reactions
                    .as_ref()
                    .map(|r| r.iter().map(|b| b.count).sum())
                    .unwrap_or(0),
            }))
    }
}
