//! Test doubles shared across the crate's test modules.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use chronicle_core::{ChannelMessage, MediaKind, MediaRef};

use crate::client::{Channel, ChannelClient, MessageStats};
use crate::error::{Error, Result};
use crate::media::MediaSink;

/// Build an ungrouped message in the default test channel (id 1000).
pub(crate) fn single_message(message_id: i64, text: &str) -> ChannelMessage {
    ChannelMessage {
        message_id,
        channel_id: 1000,
        channel_name: "Test Channel".to_string(),
        channel_handle: Some("testchannel".to_string()),
        grouped_id: None,
        text: text.to_string(),
        date: DateTime::from_timestamp(1_750_000_000, 0).unwrap(),
        views: None,
        reactions: None,
        media: Vec::new(),
    }
}

/// Build an album member carrying the given media kinds.
pub(crate) fn album_message(
    message_id: i64,
    grouped_id: i64,
    text: &str,
    media_kinds: &[MediaKind],
) -> ChannelMessage {
    let mut msg = single_message(message_id, text);
    msg.grouped_id = Some(grouped_id);
    msg.media = media_kinds
        .iter()
        .map(|kind| MediaRef {
            kind: *kind,
            source: format!("dumps/{}.{}", message_id, kind.extension()),
        })
        .collect();
    msg
}

/// Build a message with an explicit publication date and album id.
pub(crate) fn dated_message(
    message_id: i64,
    date: DateTime<Utc>,
    grouped_id: Option<i64>,
) -> ChannelMessage {
    let mut msg = single_message(message_id, &format!("post {}", message_id));
    msg.date = date;
    msg.grouped_id = grouped_id;
    msg
}

/// Media sink returning deterministic paths without touching the filesystem.
#[derive(Default)]
pub(crate) struct FakeMediaSink;

#[async_trait]
impl MediaSink for FakeMediaSink {
    async fn place(
        &self,
        message: &ChannelMessage,
        media: &MediaRef,
        index: usize,
    ) -> Result<Option<String>> {
        Ok(Some(format!(
            "media/{}/{}-{}.{}",
            message.channel_id,
            message.message_id,
            index,
            media.kind.extension()
        )))
    }
}

/// Scripted in-memory platform client.
pub(crate) struct MockClient {
    channels: Vec<Channel>,
    messages: Mutex<Vec<ChannelMessage>>,
    stats: Mutex<HashMap<(i64, i64), MessageStats>>,
    failing_stats: Mutex<HashSet<(i64, i64)>>,
    history_fail_after: AtomicUsize,
    history_calls: AtomicUsize,
}

impl MockClient {
    pub fn new(channels: Vec<Channel>) -> Self {
        Self {
            channels,
            messages: Mutex::new(Vec::new()),
            stats: Mutex::new(HashMap::new()),
            failing_stats: Mutex::new(HashSet::new()),
            history_fail_after: AtomicUsize::new(usize::MAX),
            history_calls: AtomicUsize::new(0),
        }
    }

    /// Add a message to the scripted history/feed.
    pub fn add_message(&self, message: ChannelMessage) {
        self.messages.lock().push(message);
    }

    /// Script the point-lookup answer for one message.
    pub fn set_stats(&self, channel_id: i64, message_id: i64, stats: MessageStats) {
        self.stats.lock().insert((channel_id, message_id), stats);
    }

    /// Make the point lookup for one message fail.
    pub fn fail_stats_for(&self, channel_id: i64, message_id: i64) {
        self.failing_stats.lock().insert((channel_id, message_id));
    }

    /// Make every history fetch after the first `pages` fail.
    pub fn fail_history_after(&self, pages: usize) {
        self.history_fail_after.store(pages, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChannelClient for MockClient {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn resolve_channel(&self, reference: &str) -> Result<Channel> {
        self.channels
            .iter()
            .find(|c| {
                c.handle.as_deref() == Some(reference)
                    || c.id.to_string() == reference
                    || c.title == reference
            })
            .cloned()
            .ok_or_else(|| Error::ChannelResolution {
                reference: reference.to_string(),
                reason: "unknown channel".to_string(),
            })
    }

    async fn subscribe(&self, channel_ids: &[i64]) -> Result<mpsc::Receiver<ChannelMessage>> {
        let wanted: HashSet<i64> = channel_ids.iter().copied().collect();
        let feed: Vec<ChannelMessage> = self
            .messages
            .lock()
            .iter()
            .filter(|m| wanted.contains(&m.channel_id))
            .cloned()
            .collect();

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for message in feed {
                if tx.send(message).await.is_err() {
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
        let calls = self.history_calls.fetch_add(1, Ordering::SeqCst);
        if calls >= self.history_fail_after.load(Ordering::SeqCst) {
            return Err(Error::Client("simulated history failure".to_string()));
        }

        let mut page: Vec<ChannelMessage> = self
            .messages
            .lock()
            .iter()
            .filter(|m| m.channel_id == channel_id)
            .filter(|m| before_message_id.is_none_or(|before| m.message_id < before))
            .cloned()
            .collect();
        page.sort_by(|a, b| b.message_id.cmp(&a.message_id));
        page.truncate(limit);

        Ok(page)
    }

    async fn message_stats(
        &self,
        channel_id: i64,
        message_id: i64,
    ) -> Result<Option<MessageStats>> {
        if self.failing_stats.lock().contains(&(channel_id, message_id)) {
            return Err(Error::Client("simulated lookup failure".to_string()));
        }

        Ok(self.stats.lock().get(&(channel_id, message_id)).copied())
    }
}
