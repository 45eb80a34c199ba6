//! The inbound message model.
//!
//! A [`ChannelMessage`] is one message as delivered by the platform: it may be
//! a complete post on its own, or one member of an album (a set of messages
//! sharing a `grouped_id`). The ingestion pipeline reassembles albums and
//! normalizes groups into [`crate::post::NewPost`] records.
//!
//! The type is serde round-trippable: the same shape is archived verbatim in
//! a post's `raw_data` column and read back from JSONL channel dumps by the
//! replay source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of media attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Video => "video",
        }
    }

    /// File extension used when the media is placed on disk.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Photo => "jpg",
            Self::Video => "mp4",
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "photo" => Ok(Self::Photo),
            "video" => Ok(Self::Video),
            other => Err(Error::InvalidField {
                field: "media_kind",
                reason: format!("unknown kind '{}'", other),
            }),
        }
    }
}

/// One reaction bucket on a message (emoji plus how many users picked it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: i64,
}

/// Reference to a media asset attached to a message.
///
/// `source` is whatever locator the upstream client hands us (a file path for
/// replay dumps, a download reference for a live client). The media sink
/// resolves it into a stored path; the core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    pub source: String,
}

/// A message as received from the platform, scoped to one broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Platform-assigned message id, unique within the channel.
    pub message_id: i64,
    /// Numeric id of the channel the message belongs to.
    pub channel_id: i64,
    /// Human-readable channel title.
    #[serde(default)]
    pub channel_name: String,
    /// Public handle of the channel, if it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_handle: Option<String>,
    /// Album identifier; messages sharing one belong to the same logical post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_id: Option<i64>,
    /// Message text (empty for media-only album members).
    #[serde(default)]
    pub text: String,
    /// Publication timestamp (UTC, platform-assigned).
    pub date: DateTime<Utc>,
    /// View counter as reported by the platform, if available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<i64>,
    /// Reaction buckets; `None` means reactions are disabled on the channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<Reaction>>,
    /// Media attached to this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<MediaRef>,
}

impl ChannelMessage {
    /// Whether this message is part of an album.
    pub fn is_grouped(&self) -> bool {
        self.grouped_id.is_some()
    }
}
