//! The normalized post model and group-normalization helpers.
//!
//! A [`NewPost`] is the canonical unit of content handed to the persistence
//! gateway: one row per `(channel_id, message_id)` pair, where the message id
//! is the album's representative message for grouped posts.

use chrono::{DateTime, Utc};

use crate::message::ChannelMessage;

/// Sentinel stored in `reactions_count` when reactions are disabled on the
/// channel. Rows carrying it are never selected for stats refresh.
pub const REACTIONS_DISABLED: i64 = -1;

/// A normalized post record, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub message_id: i64,
    pub channel_id: i64,
    pub grouped_id: Option<i64>,
    pub channel_name: String,
    pub post_text: String,
    pub post_date: DateTime<Utc>,
    pub views: i64,
    pub reactions_count: i64,
    pub link: String,
    /// Archival copy of the source messages, write-once.
    pub raw_data: serde_json::Value,
    pub photo_paths: Vec<String>,
    pub video_paths: Vec<String>,
}

/// The statistics slice of a stored post, as selected for refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostStats {
    pub channel_id: i64,
    pub message_id: i64,
    pub views: i64,
    pub reactions_count: i64,
}

/// A statistics write-back for one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsUpdate {
    pub channel_id: i64,
    pub message_id: i64,
    pub views: i64,
    pub reactions_count: i64,
}

/// Pick the representative message of a group: the first message carrying
/// non-empty text, falling back to the first message when none does.
pub fn representative(messages: &[ChannelMessage]) -> Option<&ChannelMessage> {
    messages
        .iter()
        .find(|m| !m.text.trim().is_empty())
        .or_else(|| messages.first())
}

/// Total reaction count on a message, or [`REACTIONS_DISABLED`] when the
/// platform reports no reaction data at all.
pub fn reactions_total(message: &ChannelMessage) -> i64 {
    match &message.reactions {
        None => REACTIONS_DISABLED,
        Some(reactions) => reactions.iter().map(|r| r.count).sum(),
    }
}

/// Build the public permalink for a message, using the channel's public
/// handle when it has one and the numeric channel id otherwise.
pub fn permalink(handle: Option<&str>, channel_id: i64, message_id: i64) -> String {
    match handle {
        Some(h) if !h.is_empty() => format!("https://t.me/{}/{}", h, message_id),
        _ => format!("https://t.me/{}/{}", channel_id, message_id),
    }
}
